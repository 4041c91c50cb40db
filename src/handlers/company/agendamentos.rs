use axum::extract::{Extension, State};
use axum::http::HeaderMap;

use crate::calendar;
use crate::db::{AppState, queries};
use crate::error::{AppError, Result, msg};
use crate::extractors::{Json, Path, Query};
use crate::middleware::SellerContext;
use crate::models::{
    Agendamento, AgendamentoFilter, AgendamentoStatus, AuditAction, CreateAgendamento,
    UpdateAgendamento, UpdateAgendamentoStatus,
};
use crate::pagination::Paginated;
use crate::util::AuditLogBuilder;

/// Whether a write to this seller's calls should reach Google: the plan
/// covers sync and the seller has a connected account.
fn wants_calendar_push(
    conn: &rusqlite::Connection,
    ctx: &SellerContext,
    seller_id: &str,
) -> Result<bool> {
    if !ctx.limits().calendar_sync {
        return Ok(false);
    }
    Ok(queries::get_calendar_account_by_seller(conn, seller_id)?.is_some())
}

/// Schedule a call. Managers may schedule on behalf of another seller via
/// `seller_id`. When the plan covers calendar sync and the seller has a
/// connected calendar, the event is pushed to Google in the background.
pub async fn create_agendamento(
    State(state): State<AppState>,
    Extension(ctx): Extension<SellerContext>,
    headers: HeaderMap,
    Json(input): Json<CreateAgendamento>,
) -> Result<Json<Agendamento>> {
    input.validate()?;

    let agendamento = {
        let conn = state.db.get()?;
        let audit_conn = state.audit.get()?;

        let seller_id = match input.seller_id.as_deref() {
            Some(id) if id != ctx.seller.id => {
                if !ctx.can_act_for(id) {
                    return Err(AppError::Forbidden(
                        "Only managers can schedule calls for other sellers".into(),
                    ));
                }
                let seller = queries::get_seller(&conn, &ctx.company.id, id)?
                    .ok_or_else(|| AppError::BadRequest(msg::SELLER_NOT_FOUND.into()))?;
                seller.id
            }
            _ => ctx.seller.id.clone(),
        };

        if let Some(ref deal_id) = input.deal_id {
            queries::get_deal(&conn, &ctx.company.id, deal_id)?
                .ok_or_else(|| AppError::BadRequest(msg::DEAL_NOT_FOUND.into()))?;
        }

        let calendar_pending = wants_calendar_push(&conn, &ctx, &seller_id)?;
        let agendamento =
            queries::create_agendamento(&conn, &ctx.company.id, &seller_id, &input, calendar_pending)?;

        AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers)
            .context(&ctx)
            .action(AuditAction::CreateAgendamento)
            .resource("agendamento", &agendamento.id)
            .resource_name(&agendamento.customer_name)
            .details(&serde_json::json!({
                "scheduled_at": agendamento.scheduled_at,
                "seller_id": agendamento.seller_id,
            }))
            .save()?;

        agendamento
    };

    if agendamento.calendar_pending {
        calendar::spawn_push(state.clone(), agendamento.clone());
    }

    Ok(Json(agendamento))
}

pub async fn list_agendamentos(
    State(state): State<AppState>,
    Extension(ctx): Extension<SellerContext>,
    Query(filter): Query<AgendamentoFilter>,
) -> Result<Json<Paginated<Agendamento>>> {
    let conn = state.db.get()?;
    let (items, total) = queries::list_agendamentos(&conn, &ctx.company.id, &filter)?;
    Ok(Json(Paginated::new(
        items,
        total,
        filter.limit(),
        filter.offset(),
    )))
}

pub async fn get_agendamento(
    State(state): State<AppState>,
    Extension(ctx): Extension<SellerContext>,
    Path(agendamento_id): Path<String>,
) -> Result<Json<Agendamento>> {
    let conn = state.db.get()?;
    let agendamento = queries::get_agendamento(&conn, &ctx.company.id, &agendamento_id)?
        .ok_or_else(|| AppError::NotFound(msg::CALL_NOT_FOUND.into()))?;
    Ok(Json(agendamento))
}

pub async fn update_agendamento(
    State(state): State<AppState>,
    Extension(ctx): Extension<SellerContext>,
    Path(agendamento_id): Path<String>,
    headers: HeaderMap,
    Json(input): Json<UpdateAgendamento>,
) -> Result<Json<Agendamento>> {
    input.validate()?;

    let agendamento = {
        let conn = state.db.get()?;
        let audit_conn = state.audit.get()?;

        let existing = queries::get_agendamento(&conn, &ctx.company.id, &agendamento_id)?
            .ok_or_else(|| AppError::NotFound(msg::CALL_NOT_FOUND.into()))?;
        if !ctx.can_act_for(&existing.seller_id) {
            return Err(AppError::Forbidden(
                "You can only edit your own calls".into(),
            ));
        }
        if existing.status != AgendamentoStatus::Scheduled {
            return Err(AppError::Conflict(
                "Only scheduled calls can be edited".into(),
            ));
        }

        if let Some(Some(ref deal_id)) = input.deal_id {
            queries::get_deal(&conn, &ctx.company.id, deal_id)?
                .ok_or_else(|| AppError::BadRequest(msg::DEAL_NOT_FOUND.into()))?;
        }

        let mark_pending = wants_calendar_push(&conn, &ctx, &existing.seller_id)?;
        let agendamento = queries::update_agendamento(
            &conn,
            &ctx.company.id,
            &agendamento_id,
            &input,
            mark_pending,
        )?
        .ok_or_else(|| AppError::NotFound(msg::CALL_NOT_FOUND.into()))?;

        AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers)
            .context(&ctx)
            .action(AuditAction::UpdateAgendamento)
            .resource("agendamento", &agendamento.id)
            .resource_name(&agendamento.customer_name)
            .save()?;

        agendamento
    };

    if agendamento.calendar_pending {
        calendar::spawn_push(state.clone(), agendamento.clone());
    }

    Ok(Json(agendamento))
}

/// Close out a call: `scheduled` moves to `completed`, `no_show` or
/// `cancelled`. Cancelling removes the Google event.
pub async fn update_agendamento_status(
    State(state): State<AppState>,
    Extension(ctx): Extension<SellerContext>,
    Path(agendamento_id): Path<String>,
    headers: HeaderMap,
    Json(input): Json<UpdateAgendamentoStatus>,
) -> Result<Json<Agendamento>> {
    if !input.status.is_terminal() {
        return Err(AppError::BadRequest(
            "A call cannot move back to scheduled".into(),
        ));
    }

    let agendamento = {
        let conn = state.db.get()?;
        let audit_conn = state.audit.get()?;

        let existing = queries::get_agendamento(&conn, &ctx.company.id, &agendamento_id)?
            .ok_or_else(|| AppError::NotFound(msg::CALL_NOT_FOUND.into()))?;
        if !ctx.can_act_for(&existing.seller_id) {
            return Err(AppError::Forbidden(
                "You can only update your own calls".into(),
            ));
        }
        if existing.status != AgendamentoStatus::Scheduled {
            return Err(AppError::Conflict("The call is already closed".into()));
        }

        // Only a cancellation has anything to say to Google; completed and
        // no-show keep the event as a record.
        let mark_pending = input.status == AgendamentoStatus::Cancelled
            && existing.google_event_id.is_some()
            && wants_calendar_push(&conn, &ctx, &existing.seller_id)?;

        let agendamento = queries::set_agendamento_status(
            &conn,
            &ctx.company.id,
            &agendamento_id,
            input.status,
            mark_pending,
        )?
        .ok_or_else(|| AppError::NotFound(msg::CALL_NOT_FOUND.into()))?;

        AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers)
            .context(&ctx)
            .action(AuditAction::UpdateAgendamentoStatus)
            .resource("agendamento", &agendamento.id)
            .resource_name(&agendamento.customer_name)
            .details(&serde_json::json!({ "status": agendamento.status.as_str() }))
            .save()?;

        agendamento
    };

    if agendamento.calendar_pending {
        calendar::spawn_push(state.clone(), agendamento.clone());
    }

    Ok(Json(agendamento))
}

/// Delete a call. If it had a Google event, a best-effort background delete
/// removes the remote copy.
pub async fn delete_agendamento(
    State(state): State<AppState>,
    Extension(ctx): Extension<SellerContext>,
    Path(agendamento_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>> {
    let remote_cleanup = {
        let conn = state.db.get()?;
        let audit_conn = state.audit.get()?;

        let existing = queries::get_agendamento(&conn, &ctx.company.id, &agendamento_id)?
            .ok_or_else(|| AppError::NotFound(msg::CALL_NOT_FOUND.into()))?;
        if !ctx.can_act_for(&existing.seller_id) {
            return Err(AppError::Forbidden(
                "You can only delete your own calls".into(),
            ));
        }

        let wants_cleanup = existing.google_event_id.is_some()
            && wants_calendar_push(&conn, &ctx, &existing.seller_id)?;

        queries::delete_agendamento(&conn, &ctx.company.id, &agendamento_id)?;

        AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers)
            .context(&ctx)
            .action(AuditAction::DeleteAgendamento)
            .resource("agendamento", &agendamento_id)
            .resource_name(&existing.customer_name)
            .save()?;

        wants_cleanup.then_some(existing)
    };

    // The row is gone; push a cancelled snapshot so the remote event is
    // deleted too. The row updates inside the push are no-ops.
    if let Some(mut snapshot) = remote_cleanup {
        snapshot.status = AgendamentoStatus::Cancelled;
        calendar::spawn_push(state.clone(), snapshot);
    }

    Ok(Json(serde_json::json!({ "success": true })))
}
