mod agendamentos;
mod audit_logs;
mod billing;
mod calendar;
mod companies;
mod dashboard;
mod deals;
mod metas;
mod rankings;
mod sellers;

pub use agendamentos::*;
pub use audit_logs::*;
pub use billing::*;
pub use calendar::*;
pub use companies::*;
pub use dashboard::*;
pub use deals::*;
pub use metas::*;
pub use rankings::*;
pub use sellers::*;

use axum::{
    Router, middleware,
    routing::{delete, get, post, put},
};

use crate::db::AppState;
use crate::middleware::seller_auth;

/// Authenticated API surface. Every route here runs behind bearer API key
/// auth; role and plan checks live in the handlers.
pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        // Company profile
        .route("/company", get(get_company))
        .route("/company", put(update_company))
        // Team
        .route("/sellers", post(create_seller))
        .route("/sellers", get(list_sellers))
        .route("/sellers/{seller_id}", get(get_seller))
        .route("/sellers/{seller_id}", put(update_seller))
        .route("/sellers/{seller_id}", delete(deactivate_seller))
        .route("/sellers/{seller_id}/rotate-key", post(rotate_seller_key))
        // Deals pipeline
        .route("/deals", post(create_deal))
        .route("/deals", get(list_deals))
        .route("/deals/pipeline", get(pipeline_summary))
        .route("/deals/{deal_id}", get(get_deal))
        .route("/deals/{deal_id}", put(update_deal))
        .route("/deals/{deal_id}", delete(delete_deal))
        .route("/deals/{deal_id}/stage", post(move_deal_stage))
        // Metas (monthly goals)
        .route("/metas", put(upsert_meta))
        .route("/metas", get(list_metas))
        .route("/metas/progress", get(metas_progress))
        .route("/metas/{meta_id}", get(get_meta))
        .route("/metas/{meta_id}", delete(delete_meta))
        // Agendamentos (scheduled calls)
        .route("/agendamentos", post(create_agendamento))
        .route("/agendamentos", get(list_agendamentos))
        .route("/agendamentos/{agendamento_id}", get(get_agendamento))
        .route("/agendamentos/{agendamento_id}", put(update_agendamento))
        .route("/agendamentos/{agendamento_id}", delete(delete_agendamento))
        .route(
            "/agendamentos/{agendamento_id}/status",
            post(update_agendamento_status),
        )
        // Google Calendar connection
        .route("/calendar/connect", post(connect_calendar))
        .route("/calendar", get(calendar_status))
        .route("/calendar", delete(disconnect_calendar))
        // Gamification
        .route("/rankings", get(get_rankings))
        .route("/dashboard", get(get_dashboard))
        // Billing
        .route("/billing/checkout", post(create_checkout))
        .route("/billing/subscription", get(get_subscription))
        .route("/billing/subscription", delete(cancel_subscription))
        // Audit trail
        .route("/audit", get(list_audit_logs))
        .layer(middleware::from_fn_with_state(state, seller_auth))
}
