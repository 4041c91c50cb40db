//! Mercado Pago webhook: subscription (preapproval) state changes.
//!
//! The notification body is only a pointer; the authoritative state is
//! re-fetched from the API before anything is written. Status codes steer
//! the provider's retry behavior: 2xx acknowledges, 4xx drops bad requests,
//! 5xx asks for a retry.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
};

use crate::db::{AppState, queries};
use crate::db::queries::WebhookOutcome;
use crate::error::AppError;
use crate::integrations::WebhookNotification;
use crate::models::{ActorType, AuditAction, SubscriptionStatus};
use crate::util::AuditLogBuilder;

/// Result type for webhook branches: status plus a short reason.
type WebhookResult = (StatusCode, &'static str);

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

pub async fn handle_mercadopago_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> WebhookResult {
    let Some(mp) = state.mercadopago.clone() else {
        // Nothing to verify against; acknowledge so the provider does not
        // retry forever against a deployment without billing.
        tracing::warn!("mercadopago webhook received but billing is not configured");
        return (StatusCode::OK, "Billing not configured");
    };

    let notification: WebhookNotification = match serde_json::from_slice(&body) {
        Ok(n) => n,
        Err(e) => {
            tracing::debug!(error = %e, "mercadopago webhook body did not parse");
            return (StatusCode::BAD_REQUEST, "Invalid JSON");
        }
    };

    // Topic check comes first: other topics (payments, chargebacks) are
    // acknowledged unconditionally, whatever their headers look like.
    if !notification.is_subscription_topic() {
        tracing::debug!(topic = ?notification.topic, "ignoring non-subscription topic");
        return (StatusCode::OK, "Ignored topic");
    }

    let Some(data_id) = notification.data_id() else {
        return (StatusCode::BAD_REQUEST, "Missing data.id");
    };

    let Some(x_signature) = header_str(&headers, "x-signature") else {
        return (StatusCode::BAD_REQUEST, "Missing x-signature header");
    };
    let Some(x_request_id) = header_str(&headers, "x-request-id") else {
        return (StatusCode::BAD_REQUEST, "Missing x-request-id header");
    };

    match mp.verify_webhook_signature(x_signature, x_request_id, &data_id) {
        Ok(true) => {}
        Ok(false) => {
            tracing::warn!(data_id, "mercadopago webhook signature rejected");
            return (StatusCode::UNAUTHORIZED, "Invalid signature");
        }
        Err(e) => {
            tracing::debug!(error = %e, "malformed mercadopago signature header");
            return (StatusCode::BAD_REQUEST, "Malformed signature header");
        }
    }

    // Never trust the pushed state: re-fetch the preapproval.
    let preapproval = match mp.get_preapproval(&data_id).await {
        Ok(p) => p,
        Err(AppError::NotFound(_)) => {
            tracing::warn!(data_id, "preapproval unknown to the API; acknowledging");
            return (StatusCode::OK, "Unknown preapproval");
        }
        Err(e) => {
            // No dedupe record was written yet, so the provider's retry
            // gets a clean attempt.
            tracing::error!(data_id, error = %e, "preapproval re-fetch failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Provider fetch failed");
        }
    };

    let Some(status) = SubscriptionStatus::from_provider(&preapproval.status) else {
        tracing::debug!(
            data_id,
            status = %preapproval.status,
            "ignoring unmapped preapproval status"
        );
        return (StatusCode::OK, "Ignored status");
    };
    let paid_through = preapproval.next_payment_ts();
    let event_id = notification.event_id();

    let outcome = {
        let mut conn = match state.db.get() {
            Ok(c) => c,
            Err(e) => {
                tracing::error!(error = %e, "webhook could not get a db connection");
                return (StatusCode::INTERNAL_SERVER_ERROR, "Database unavailable");
            }
        };
        match queries::apply_preapproval_update(
            &mut conn,
            &event_id,
            &preapproval.id,
            status,
            paid_through,
        ) {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(data_id, error = %e, "webhook apply failed");
                return (StatusCode::INTERNAL_SERVER_ERROR, "Database error");
            }
        }
    };

    match outcome {
        WebhookOutcome::Applied {
            subscription,
            company,
        } => {
            tracing::info!(
                subscription_id = %subscription.id,
                company_id = %subscription.company_id,
                status = status.as_str(),
                "subscription updated from webhook"
            );

            // Audit failures must not turn a processed webhook into a retry.
            let details = serde_json::json!({
                "preapproval_id": subscription.mp_preapproval_id,
                "status": status.as_str(),
                "paid_through": paid_through,
            });
            let audit_result = state.audit.get().map_err(AppError::from).and_then(|ac| {
                let mut builder = AuditLogBuilder::new(&ac, state.audit_log_enabled, &headers)
                    .actor(ActorType::System, None, Some("mercadopago"))
                    .action(AuditAction::ProcessBillingWebhook)
                    .resource("subscription", &subscription.id)
                    .details(&details);
                if let Some(company) = &company {
                    builder = builder.company(&company.id, &company.name);
                }
                builder.save()
            });
            if let Err(e) = audit_result {
                tracing::warn!(error = %e, "webhook audit log write failed");
            }

            (StatusCode::OK, "Processed")
        }
        WebhookOutcome::Duplicate => {
            tracing::debug!(event_id, "duplicate webhook event");
            (StatusCode::OK, "Already processed")
        }
        WebhookOutcome::UnknownPreapproval => {
            tracing::warn!(data_id, "preapproval does not match any subscription");
            (StatusCode::OK, "No matching subscription")
        }
    }
}
