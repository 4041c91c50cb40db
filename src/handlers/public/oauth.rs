use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::Redirect;
use reqwest::Url;
use serde::Deserialize;

use crate::calendar;
use crate::db::{AppState, queries};
use crate::error::{AppError, Result, msg};
use crate::extractors::Query;
use crate::models::{ActorType, AuditAction};
use crate::util::AuditLogBuilder;

#[derive(Debug, Deserialize)]
pub struct GoogleCallbackQuery {
    pub state: Option<String>,
    pub code: Option<String>,
    /// Set by Google when the user denied the consent screen.
    pub error: Option<String>,
}

/// Google OAuth redirect target. The `state` token was minted at
/// `/calendar/connect` and is single-use; anything unknown or expired is
/// rejected before we talk to Google at all.
pub async fn google_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<GoogleCallbackQuery>,
) -> Result<Redirect> {
    if let Some(reason) = query.error {
        // User backed out at the consent screen. Burn the state token if
        // Google echoed one back, then land them on the app.
        if let Some(token) = query.state.as_deref() {
            let conn = state.db.get()?;
            let _ = queries::consume_oauth_state(&conn, token)?;
        }
        tracing::info!(reason, "google consent denied");
        return Ok(redirect_to_app(&state.app_url, "denied"));
    }

    let token = query
        .state
        .ok_or_else(|| AppError::BadRequest("Missing state parameter".into()))?;
    let code = query
        .code
        .ok_or_else(|| AppError::BadRequest("Missing code parameter".into()))?;

    let seller_id = {
        let conn = state.db.get()?;
        queries::consume_oauth_state(&conn, &token)?
    }
    .ok_or_else(|| AppError::BadRequest("Unknown or expired authorization state".into()))?;

    let google = state
        .google
        .clone()
        .ok_or_else(|| AppError::Unavailable(msg::CALENDAR_NOT_CONFIGURED.into()))?;

    let account = calendar::complete_connect(&state, &google, &seller_id, &code).await?;

    {
        let conn = state.db.get()?;
        let audit_conn = state.audit.get()?;
        if let Some(seller) = queries::get_seller_by_id(&conn, &seller_id)? {
            let company = queries::get_company_by_id(&conn, &seller.company_id)?;
            let mut builder = AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers)
                .actor(ActorType::Seller, Some(&seller.id), Some(&seller.name))
                .action(AuditAction::ConnectCalendar)
                .resource("calendar_account", &account.seller_id)
                .resource_name(&account.google_email);
            if let Some(company) = &company {
                builder = builder.company(&company.id, &company.name);
            }
            builder.save()?;
        }
    }

    tracing::info!(seller_id, email = %account.google_email, "calendar connected");

    Ok(redirect_to_app(&state.app_url, "connected"))
}

/// Land on the web app with a `calendar=<status>` marker, tolerating an
/// `app_url` that already carries a query string.
fn redirect_to_app(app_url: &str, status: &str) -> Redirect {
    let target = match Url::parse(app_url) {
        Ok(mut url) => {
            url.query_pairs_mut().append_pair("calendar", status);
            url.to_string()
        }
        Err(_) => {
            let sep = if app_url.contains('?') { '&' } else { '?' };
            format!("{app_url}{sep}calendar={status}")
        }
    };
    Redirect::temporary(&target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redirect_appends_to_existing_query() {
        let r = redirect_to_app("https://app.example.com/?tab=settings", "connected");
        let response = axum::response::IntoResponse::into_response(r);
        let location = response
            .headers()
            .get(axum::http::header::LOCATION)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(location.contains("tab=settings"));
        assert!(location.contains("calendar=connected"));
    }
}
