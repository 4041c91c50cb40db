use axum::extract::{Extension, State};
use axum::http::HeaderMap;

use crate::calendar;
use crate::db::{AppState, queries};
use crate::error::{AppError, Result, msg};
use crate::extractors::Json;
use crate::middleware::SellerContext;
use crate::models::{AuditAction, CalendarAccountView, ConnectUrlResponse};
use crate::util::AuditLogBuilder;

/// Start the Google OAuth flow. Returns the consent URL; Google sends the
/// browser back to `/oauth/google/callback` with a single-use state token.
pub async fn connect_calendar(
    State(state): State<AppState>,
    Extension(ctx): Extension<SellerContext>,
) -> Result<Json<ConnectUrlResponse>> {
    ctx.require_calendar_sync()?;

    let google = state
        .google
        .as_ref()
        .ok_or_else(|| AppError::Unavailable(msg::CALENDAR_NOT_CONFIGURED.into()))?;

    let conn = state.db.get()?;
    let oauth_state = queries::create_oauth_state(&conn, &ctx.seller.id)?;

    Ok(Json(ConnectUrlResponse {
        url: google.consent_url(&oauth_state),
    }))
}

/// The authenticated seller's calendar connection, if any.
pub async fn calendar_status(
    State(state): State<AppState>,
    Extension(ctx): Extension<SellerContext>,
) -> Result<Json<CalendarAccountView>> {
    let conn = state.db.get()?;
    let account = queries::get_calendar_account_by_seller(&conn, &ctx.seller.id)?
        .ok_or_else(|| AppError::NotFound(msg::CALENDAR_NOT_CONNECTED.into()))?;
    Ok(Json(CalendarAccountView::from(&account)))
}

/// Disconnect the seller's calendar. Revokes the Google grant when the
/// integration is configured; always drops the stored tokens. Works on any
/// plan, with or without the Google client configured.
pub async fn disconnect_calendar(
    State(state): State<AppState>,
    Extension(ctx): Extension<SellerContext>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>> {
    let removed = match state.google.clone() {
        Some(google) => calendar::disconnect(&state, &google, &ctx.seller.id).await?,
        None => {
            let conn = state.db.get()?;
            queries::delete_calendar_account(&conn, &ctx.seller.id)?
        }
    };

    if !removed {
        return Err(AppError::NotFound(msg::CALENDAR_NOT_CONNECTED.into()));
    }

    let audit_conn = state.audit.get()?;
    AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers)
        .context(&ctx)
        .action(AuditAction::DisconnectCalendar)
        .resource("calendar_account", &ctx.seller.id)
        .resource_name(&ctx.seller.name)
        .save()?;

    Ok(Json(serde_json::json!({ "success": true })))
}
