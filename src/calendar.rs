//! Google Calendar sync for agendamentos.
//!
//! Writes mark the row `calendar_pending` when the seller has a connected
//! calendar. The actual push runs out of band (spawned after the handler
//! responds, retried by the background sweep), so Google latency or an
//! outage never blocks the API. A push that fails leaves the pending flag
//! set and the sweep picks it up on the next pass.

use tracing::{debug, warn};

use crate::db::{AppState, queries};
use crate::error::{AppError, Result};
use crate::integrations::{CalendarEvent, GoogleClient, GoogleError};
use crate::models::{Agendamento, AgendamentoStatus, CalendarAccount};

/// Refresh the access token when it expires within this margin.
const TOKEN_REFRESH_MARGIN_SECS: i64 = 60;

/// Rows handled per sweep pass.
const SWEEP_BATCH: i64 = 50;

fn upstream(e: GoogleError) -> AppError {
    AppError::Upstream(format!("Google Calendar: {}", e))
}

fn event_for(a: &Agendamento) -> CalendarEvent {
    CalendarEvent::for_call(
        format!("Ligação: {}", a.customer_name),
        a.notes.clone(),
        a.scheduled_at,
        a.duration_min,
    )
}

enum PushAction {
    Created(String),
    Patched,
    Deleted,
    Nothing,
}

/// Exchange an authorization code and store the connected account.
pub async fn complete_connect(
    state: &AppState,
    google: &GoogleClient,
    seller_id: &str,
    code: &str,
) -> Result<CalendarAccount> {
    let tokens = google.exchange_code(code).await.map_err(|e| match e {
        GoogleError::InvalidGrant => {
            AppError::BadRequest("Authorization code expired or already used".into())
        }
        other => upstream(other),
    })?;
    let refresh_token = tokens
        .refresh_token
        .ok_or_else(|| AppError::Upstream("Google did not return a refresh token".into()))?;

    let google_email = google
        .fetch_user_email(&tokens.access_token)
        .await
        .map_err(upstream)?;

    let access_enc = state
        .master_key
        .encrypt_token(seller_id, &tokens.access_token)?;
    let refresh_enc = state.master_key.encrypt_token(seller_id, &refresh_token)?;
    let expires_at = chrono::Utc::now().timestamp() + tokens.expires_in;

    let conn = state.db.get()?;
    let account = queries::upsert_calendar_account(
        &conn,
        seller_id,
        &google_email,
        &access_enc,
        &refresh_enc,
        expires_at,
    )?;
    debug!(seller_id, google_email = %account.google_email, "calendar connected");
    Ok(account)
}

/// Disconnect a seller's calendar: best-effort token revocation at Google,
/// then drop the stored account. Returns false when nothing was connected.
pub async fn disconnect(
    state: &AppState,
    google: &GoogleClient,
    seller_id: &str,
) -> Result<bool> {
    let account = {
        let conn = state.db.get()?;
        queries::get_calendar_account_by_seller(&conn, seller_id)?
    };
    let Some(account) = account else {
        return Ok(false);
    };

    match state
        .master_key
        .decrypt_token(seller_id, &account.refresh_token_enc)
    {
        Ok(refresh_token) => {
            if let Err(e) = google.revoke_token(&refresh_token).await {
                warn!(seller_id, error = %e, "token revocation failed; dropping account anyway");
            }
        }
        Err(e) => warn!(seller_id, error = %e, "could not decrypt refresh token for revocation"),
    }

    let conn = state.db.get()?;
    queries::delete_calendar_account(&conn, seller_id)?;
    Ok(true)
}

/// A decrypted access token, refreshed first when it is about to expire.
/// None means the grant is dead and the account was disconnected.
async fn usable_access_token(
    state: &AppState,
    google: &GoogleClient,
    account: &CalendarAccount,
) -> Result<Option<String>> {
    let now = chrono::Utc::now().timestamp();
    if account.token_expires_at > now + TOKEN_REFRESH_MARGIN_SECS {
        let token = state
            .master_key
            .decrypt_token(&account.seller_id, &account.access_token_enc)?;
        return Ok(Some(token));
    }
    refresh_access_token_now(state, google, account).await
}

async fn refresh_access_token_now(
    state: &AppState,
    google: &GoogleClient,
    account: &CalendarAccount,
) -> Result<Option<String>> {
    let refresh_token = state
        .master_key
        .decrypt_token(&account.seller_id, &account.refresh_token_enc)?;

    match google.refresh_access_token(&refresh_token).await {
        Ok(tokens) => {
            let access_enc = state
                .master_key
                .encrypt_token(&account.seller_id, &tokens.access_token)?;
            let refresh_enc = match &tokens.refresh_token {
                Some(rotated) => Some(state.master_key.encrypt_token(&account.seller_id, rotated)?),
                None => None,
            };
            let expires_at = chrono::Utc::now().timestamp() + tokens.expires_in;

            let conn = state.db.get()?;
            queries::update_calendar_tokens(
                &conn,
                &account.seller_id,
                &access_enc,
                expires_at,
                refresh_enc.as_deref(),
            )?;
            Ok(Some(tokens.access_token))
        }
        Err(GoogleError::InvalidGrant) => {
            warn!(
                seller_id = %account.seller_id,
                "Google grant revoked; disconnecting calendar"
            );
            let conn = state.db.get()?;
            queries::delete_calendar_account(&conn, &account.seller_id)?;
            Ok(None)
        }
        Err(e) => Err(upstream(e)),
    }
}

async fn push_remote(
    google: &GoogleClient,
    account: &CalendarAccount,
    a: &Agendamento,
    token: &str,
) -> std::result::Result<PushAction, GoogleError> {
    match a.status {
        AgendamentoStatus::Scheduled => {
            let event = event_for(a);
            match &a.google_event_id {
                Some(event_id) => {
                    match google
                        .patch_event(token, &account.calendar_id, event_id, &event)
                        .await
                    {
                        Ok(()) => Ok(PushAction::Patched),
                        // The user deleted the event by hand; recreate it
                        Err(GoogleError::NotFound) => {
                            let id = google
                                .insert_event(token, &account.calendar_id, &event)
                                .await?;
                            Ok(PushAction::Created(id))
                        }
                        Err(e) => Err(e),
                    }
                }
                None => {
                    let id = google
                        .insert_event(token, &account.calendar_id, &event)
                        .await?;
                    Ok(PushAction::Created(id))
                }
            }
        }
        AgendamentoStatus::Cancelled => match &a.google_event_id {
            Some(event_id) => {
                google
                    .delete_event(token, &account.calendar_id, event_id)
                    .await?;
                Ok(PushAction::Deleted)
            }
            None => Ok(PushAction::Nothing),
        },
        // Completed and no-show calls keep their event as a record
        AgendamentoStatus::Completed | AgendamentoStatus::NoShow => Ok(PushAction::Nothing),
    }
}

/// Push one agendamento's current state to the seller's calendar.
///
/// A 401 mid-call (token invalidated server-side) triggers one refresh and
/// one retry; a dead grant disconnects the account and the push becomes a
/// no-op.
pub async fn push(state: &AppState, google: &GoogleClient, a: &Agendamento) -> Result<()> {
    let account = {
        let conn = state.db.get()?;
        queries::get_calendar_account_by_seller(&conn, &a.seller_id)?
    };
    let Some(account) = account else {
        let conn = state.db.get()?;
        queries::clear_calendar_pending(&conn, &a.id)?;
        return Ok(());
    };

    let Some(token) = usable_access_token(state, google, &account).await? else {
        return Ok(());
    };

    let action = match push_remote(google, &account, a, &token).await {
        Ok(action) => action,
        Err(GoogleError::Unauthorized) => {
            let Some(token) = refresh_access_token_now(state, google, &account).await? else {
                return Ok(());
            };
            push_remote(google, &account, a, &token)
                .await
                .map_err(upstream)?
        }
        Err(e) => return Err(upstream(e)),
    };

    let conn = state.db.get()?;
    match action {
        PushAction::Created(event_id) => {
            queries::set_agendamento_event(&conn, &a.id, &event_id)?;
        }
        PushAction::Patched | PushAction::Nothing => {
            queries::clear_calendar_pending(&conn, &a.id)?;
        }
        PushAction::Deleted => {
            queries::clear_agendamento_event(&conn, &a.id)?;
        }
    }
    queries::touch_calendar_synced(&conn, &a.seller_id)?;
    debug!(agendamento_id = %a.id, seller_id = %a.seller_id, "calendar push done");
    Ok(())
}

/// Fire-and-forget push after a handler write. Failures only log; the row
/// stays pending and the sweep retries it.
pub fn spawn_push(state: AppState, agendamento: Agendamento) {
    let Some(google) = state.google.clone() else {
        return;
    };
    tokio::spawn(async move {
        if let Err(e) = push(&state, &google, &agendamento).await {
            warn!(
                agendamento_id = %agendamento.id,
                error = %e,
                "calendar push failed; sweep will retry"
            );
        }
    });
}

/// Retry every pending row once. Returns how many pushes succeeded.
pub async fn run_pending_sweep(state: &AppState, google: &GoogleClient) -> Result<usize> {
    let pending = {
        let conn = state.db.get()?;
        queries::list_calendar_pending(&conn, SWEEP_BATCH)?
    };

    let mut pushed = 0;
    for a in pending {
        match push(state, google, &a).await {
            Ok(()) => pushed += 1,
            Err(e) => warn!(agendamento_id = %a.id, error = %e, "sweep push failed"),
        }
    }
    Ok(pushed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GoogleConfig;
    use crate::crypto::MasterKey;
    use crate::db::{create_pool, init_audit_db, init_db};
    use crate::models::{CreateAgendamento, CreateCompany, Seller};

    fn test_state(dir: &tempfile::TempDir) -> AppState {
        let db = create_pool(dir.path().join("main.db").to_str().unwrap()).unwrap();
        init_db(&db.get().unwrap()).unwrap();
        let audit = create_pool(dir.path().join("audit.db").to_str().unwrap()).unwrap();
        init_audit_db(&audit.get().unwrap()).unwrap();
        AppState {
            db,
            audit,
            master_key: MasterKey::from_base64(&MasterKey::generate()).unwrap(),
            base_url: "http://localhost:8080".to_string(),
            app_url: "http://localhost:3000".to_string(),
            audit_log_enabled: false,
            mercadopago: None,
            google: None,
            twilio: None,
        }
    }

    fn google_client(server: &mockito::Server) -> GoogleClient {
        GoogleClient::with_base_urls(
            &GoogleConfig {
                client_id: "cid".to_string(),
                client_secret: "csecret".to_string(),
                redirect_url: "http://localhost:8080/oauth/google/callback".to_string(),
            },
            &server.url(),
            &server.url(),
            &server.url(),
        )
    }

    fn seed_seller(state: &AppState) -> Seller {
        let mut conn = state.db.get().unwrap();
        let (_, owner, _) = queries::create_company(
            &mut conn,
            &CreateCompany {
                name: "Vendas Teste".to_string(),
                owner_name: "Ana".to_string(),
                owner_email: "ana@example.com".to_string(),
                owner_phone: None,
            },
        )
        .unwrap();
        owner
    }

    fn connect_account(state: &AppState, seller: &Seller, expires_at: i64) {
        let conn = state.db.get().unwrap();
        let access = state
            .master_key
            .encrypt_token(&seller.id, "access-old")
            .unwrap();
        let refresh = state
            .master_key
            .encrypt_token(&seller.id, "refresh-1")
            .unwrap();
        queries::upsert_calendar_account(
            &conn,
            &seller.id,
            "ana@gmail.example",
            &access,
            &refresh,
            expires_at,
        )
        .unwrap();
    }

    fn pending_call(state: &AppState, seller: &Seller) -> Agendamento {
        let conn = state.db.get().unwrap();
        queries::create_agendamento(
            &conn,
            &seller.company_id,
            &seller.id,
            &CreateAgendamento {
                deal_id: None,
                customer_name: "Maria".to_string(),
                customer_phone: None,
                scheduled_at: chrono::Utc::now().timestamp() + 3600,
                duration_min: Some(45),
                seller_id: None,
                notes: None,
            },
            true,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_push_creates_event_and_stores_id() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);
        let seller = seed_seller(&state);
        connect_account(&state, &seller, chrono::Utc::now().timestamp() + 3600);
        let call = pending_call(&state, &seller);

        let mut server = mockito::Server::new_async().await;
        let insert = server
            .mock("POST", "/calendar/v3/calendars/primary/events")
            .match_header("authorization", "Bearer access-old")
            .with_status(200)
            .with_body(r#"{"id": "evt-1"}"#)
            .create_async()
            .await;

        let google = google_client(&server);
        push(&state, &google, &call).await.unwrap();
        insert.assert_async().await;

        let conn = state.db.get().unwrap();
        let stored = queries::get_agendamento(&conn, &seller.company_id, &call.id)
            .unwrap()
            .unwrap();
        assert_eq!(stored.google_event_id.as_deref(), Some("evt-1"));
        assert!(!stored.calendar_pending);

        let account = queries::get_calendar_account_by_seller(&conn, &seller.id)
            .unwrap()
            .unwrap();
        assert!(account.last_synced_at.is_some());
    }

    #[tokio::test]
    async fn test_push_refreshes_expired_token() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);
        let seller = seed_seller(&state);
        // Token already expired, so the push must refresh first
        connect_account(&state, &seller, chrono::Utc::now().timestamp() - 10);
        let call = pending_call(&state, &seller);

        let mut server = mockito::Server::new_async().await;
        let refresh = server
            .mock("POST", "/token")
            .with_status(200)
            .with_body(r#"{"access_token": "access-fresh", "expires_in": 3600}"#)
            .create_async()
            .await;
        let insert = server
            .mock("POST", "/calendar/v3/calendars/primary/events")
            .match_header("authorization", "Bearer access-fresh")
            .with_status(200)
            .with_body(r#"{"id": "evt-2"}"#)
            .create_async()
            .await;

        let google = google_client(&server);
        push(&state, &google, &call).await.unwrap();
        refresh.assert_async().await;
        insert.assert_async().await;

        let conn = state.db.get().unwrap();
        let account = queries::get_calendar_account_by_seller(&conn, &seller.id)
            .unwrap()
            .unwrap();
        assert!(account.token_expires_at > chrono::Utc::now().timestamp());
        let stored_access = state
            .master_key
            .decrypt_token(&seller.id, &account.access_token_enc)
            .unwrap();
        assert_eq!(stored_access, "access-fresh");
    }

    #[tokio::test]
    async fn test_revoked_grant_disconnects_account() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);
        let seller = seed_seller(&state);
        connect_account(&state, &seller, chrono::Utc::now().timestamp() - 10);
        let call = pending_call(&state, &seller);

        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/token")
            .with_status(400)
            .with_body(r#"{"error": "invalid_grant"}"#)
            .create_async()
            .await;

        let google = google_client(&server);
        // Not an error: the account is dropped and the push becomes a no-op
        push(&state, &google, &call).await.unwrap();

        let conn = state.db.get().unwrap();
        assert!(
            queries::get_calendar_account_by_seller(&conn, &seller.id)
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_cancelled_call_deletes_remote_event() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);
        let seller = seed_seller(&state);
        connect_account(&state, &seller, chrono::Utc::now().timestamp() + 3600);
        let call = pending_call(&state, &seller);
        {
            let conn = state.db.get().unwrap();
            queries::set_agendamento_event(&conn, &call.id, "evt-old").unwrap();
        }
        let cancelled = {
            let conn = state.db.get().unwrap();
            queries::set_agendamento_status(
                &conn,
                &seller.company_id,
                &call.id,
                AgendamentoStatus::Cancelled,
                true,
            )
            .unwrap()
            .unwrap()
        };

        let mut server = mockito::Server::new_async().await;
        let delete = server
            .mock("DELETE", "/calendar/v3/calendars/primary/events/evt-old")
            .with_status(204)
            .create_async()
            .await;

        let google = google_client(&server);
        push(&state, &google, &cancelled).await.unwrap();
        delete.assert_async().await;

        let conn = state.db.get().unwrap();
        let stored = queries::get_agendamento(&conn, &seller.company_id, &call.id)
            .unwrap()
            .unwrap();
        assert!(stored.google_event_id.is_none());
        assert!(!stored.calendar_pending);
    }

    #[tokio::test]
    async fn test_sweep_retries_pending_rows() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);
        let seller = seed_seller(&state);
        connect_account(&state, &seller, chrono::Utc::now().timestamp() + 3600);
        pending_call(&state, &seller);
        pending_call(&state, &seller);

        let mut server = mockito::Server::new_async().await;
        let insert = server
            .mock("POST", "/calendar/v3/calendars/primary/events")
            .with_status(200)
            .with_body(r#"{"id": "evt-s"}"#)
            .expect(2)
            .create_async()
            .await;

        let google = google_client(&server);
        let pushed = run_pending_sweep(&state, &google).await.unwrap();
        assert_eq!(pushed, 2);
        insert.assert_async().await;

        let conn = state.db.get().unwrap();
        assert!(queries::list_calendar_pending(&conn, 10).unwrap().is_empty());
    }
}
