//! Background tasks: the calendar push sweep, SMS call reminders, and
//! housekeeping for expired OAuth states and old webhook events.

use std::time::Duration;

use axum::http::HeaderMap;
use chrono::{FixedOffset, TimeZone, Utc};

use crate::calendar;
use crate::db::{AppState, queries};
use crate::models::{ActorType, AuditAction};
use crate::util::AuditLogBuilder;

/// Webhook event ids are only kept for replay prevention; the provider
/// retries for a few days at most.
const WEBHOOK_EVENT_RETENTION_DAYS: i64 = 30;

/// Reminder texts show wall-clock time in BRT.
const BRT_OFFSET_SECS: i32 = -3 * 3600;

/// Retry pending calendar pushes on an interval. Does nothing when the
/// Google integration is not configured.
pub fn spawn_calendar_sweep(state: AppState, interval_secs: u64) {
    let Some(google) = state.google.clone() else {
        tracing::info!("calendar sweep not started: Google integration not configured");
        return;
    };

    tokio::spawn(async move {
        let interval = Duration::from_secs(interval_secs.max(30));
        loop {
            tokio::time::sleep(interval).await;
            match calendar::run_pending_sweep(&state, &google).await {
                Ok(0) => {}
                Ok(pushed) => tracing::debug!(pushed, "calendar sweep pushed pending changes"),
                Err(e) => tracing::warn!(error = %e, "calendar sweep failed"),
            }
        }
    });

    tracing::info!(interval_secs, "calendar sweep started");
}

/// Send SMS reminders for calls starting within the lead window. Does
/// nothing when Twilio is not configured; companies whose plan has no call
/// reminders are skipped (and picked up again if they upgrade in time).
pub fn spawn_reminder_task(state: AppState, lead_minutes: i64) {
    if state.twilio.is_none() {
        tracing::info!("reminder task not started: Twilio not configured");
        return;
    }

    tokio::spawn(async move {
        let interval = Duration::from_secs(60);
        loop {
            tokio::time::sleep(interval).await;
            if let Err(e) = run_reminder_pass(&state, lead_minutes).await {
                tracing::warn!(error = %e, "reminder pass failed");
            }
        }
    });

    tracing::info!(lead_minutes, "call reminder task started");
}

async fn run_reminder_pass(state: &AppState, lead_minutes: i64) -> crate::error::Result<()> {
    let Some(twilio) = state.twilio.clone() else {
        return Ok(());
    };

    let candidates = {
        let conn = state.db.get()?;
        queries::list_due_reminder_candidates(&conn, Utc::now().timestamp(), lead_minutes)?
    };

    for candidate in candidates {
        // Claim before sending so a crash cannot double-text anyone. The
        // claim sticks even if the send fails; the next run moves on.
        let company = {
            let conn = state.db.get()?;
            let Some(company) = queries::get_company_by_id(&conn, &candidate.company_id)? else {
                continue;
            };
            if !queries::company_effective_plan(&conn, &company)?
                .limits()
                .call_reminders
            {
                continue;
            }
            if !queries::try_claim_reminder(&conn, &candidate.agendamento_id)? {
                continue;
            }
            company
        };

        let body = format!(
            "Lembrete: ligação com {} às {}.",
            candidate.customer_name,
            format_brt_time(candidate.scheduled_at)
        );

        match twilio.send_sms(&candidate.seller_phone, &body).await {
            Ok(sid) => {
                tracing::info!(
                    agendamento_id = %candidate.agendamento_id,
                    seller_id = %candidate.seller_id,
                    sid,
                    "call reminder sent"
                );
                let audit_result = state.audit.get().map_err(crate::error::AppError::from).and_then(|ac| {
                    AuditLogBuilder::new(&ac, state.audit_log_enabled, &HeaderMap::new())
                        .actor(ActorType::System, None, Some("reminder"))
                        .company(&company.id, &company.name)
                        .action(AuditAction::SendCallReminder)
                        .resource("agendamento", &candidate.agendamento_id)
                        .resource_name(&candidate.customer_name)
                        .save()
                });
                if let Err(e) = audit_result {
                    tracing::warn!(error = %e, "reminder audit log write failed");
                }
            }
            Err(e) => {
                tracing::warn!(
                    agendamento_id = %candidate.agendamento_id,
                    error = %e,
                    "call reminder send failed"
                );
            }
        }
    }

    Ok(())
}

fn format_brt_time(ts: i64) -> String {
    match FixedOffset::east_opt(BRT_OFFSET_SECS)
        .and_then(|offset| offset.timestamp_opt(ts, 0).single())
    {
        Some(dt) => dt.format("%H:%M").to_string(),
        None => "--:--".to_string(),
    }
}

/// Hourly housekeeping: expired OAuth states and old webhook dedupe
/// records.
pub fn spawn_maintenance_task(state: AppState) {
    tokio::spawn(async move {
        let interval = Duration::from_secs(60 * 60);
        loop {
            tokio::time::sleep(interval).await;

            match state.db.get() {
                Ok(conn) => {
                    match queries::purge_expired_oauth_states(&conn) {
                        Ok(n) if n > 0 => tracing::debug!(purged = n, "expired oauth states purged"),
                        Ok(_) => {}
                        Err(e) => tracing::warn!(error = %e, "oauth state purge failed"),
                    }
                    match queries::purge_old_webhook_events(&conn, WEBHOOK_EVENT_RETENTION_DAYS) {
                        Ok(n) if n > 0 => tracing::debug!(purged = n, "old webhook events purged"),
                        Ok(_) => {}
                        Err(e) => tracing::warn!(error = %e, "webhook event purge failed"),
                    }
                }
                Err(e) => tracing::warn!(error = %e, "maintenance task could not get a connection"),
            }
        }
    });

    tracing::info!("maintenance task started (hourly)");
}
