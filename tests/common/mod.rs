//! Shared fixtures for the integration tests.
//!
//! State is backed by temp-file databases so every pooled connection sees
//! the same data. Routers are built without the rate-limit layers; those
//! need per-connection peer info that `oneshot` requests do not carry.

#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    http::Request,
    routing::{get, post},
};
use tempfile::TempDir;

pub use gamesales::crypto::MasterKey;
pub use gamesales::db::{AppState, create_pool, init_audit_db, init_db, queries};
pub use gamesales::models::*;
pub use gamesales::plans::Plan;

use gamesales::handlers;

/// Fixed key, only for tests.
pub fn test_master_key() -> MasterKey {
    MasterKey::from_bytes([0u8; 32])
}

/// App state over fresh temp databases. Keep the `TempDir` alive for the
/// duration of the test; dropping it deletes the files.
pub fn test_state() -> (TempDir, AppState) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");

    let db = create_pool(dir.path().join("main.db").to_str().unwrap())
        .expect("Failed to create db pool");
    init_db(&db.get().unwrap()).expect("Failed to initialize schema");

    let audit = create_pool(dir.path().join("audit.db").to_str().unwrap())
        .expect("Failed to create audit pool");
    init_audit_db(&audit.get().unwrap()).expect("Failed to initialize audit schema");

    let state = AppState {
        db,
        audit,
        master_key: test_master_key(),
        base_url: "http://localhost:8080".to_string(),
        app_url: "http://localhost:5173".to_string(),
        audit_log_enabled: true,
        mercadopago: None,
        google: None,
        twilio: None,
    };
    (dir, state)
}

/// The authenticated API surface, auth middleware included.
pub fn company_app(state: AppState) -> Router {
    handlers::company::router(state.clone()).with_state(state)
}

/// Public endpoints without the governor layers.
pub fn public_app(state: AppState) -> Router {
    Router::new()
        .route("/companies", post(handlers::public::create_company))
        .route(
            "/oauth/google/callback",
            get(handlers::public::google_callback),
        )
        .with_state(state)
}

/// Webhook endpoint without the governor layer.
pub fn webhook_app(state: AppState) -> Router {
    Router::new()
        .route(
            "/webhooks/mercadopago",
            post(handlers::webhooks::handle_mercadopago_webhook),
        )
        .with_state(state)
}

/// Create a company with its bootstrap owner. Returns the company, the
/// owner, and the owner's plaintext API key.
pub fn create_test_company(state: &AppState, name: &str) -> (Company, Seller, String) {
    let mut conn = state.db.get().unwrap();
    queries::create_company(
        &mut conn,
        &CreateCompany {
            name: name.to_string(),
            owner_name: format!("{} Owner", name),
            owner_email: format!("owner@{}.example", name.to_lowercase().replace(' ', "-")),
            owner_phone: None,
        },
    )
    .expect("Failed to create test company")
}

/// Add a seller to a company. Returns the seller and their API key.
pub fn add_seller(
    state: &AppState,
    company_id: &str,
    name: &str,
    email: &str,
    role: SellerRole,
) -> (Seller, String) {
    let conn = state.db.get().unwrap();
    queries::create_seller(
        &conn,
        company_id,
        &CreateSeller {
            name: name.to_string(),
            email: email.to_string(),
            phone: None,
            role,
        },
    )
    .expect("Failed to create test seller")
}

/// Put a company on a paid plan through the normal billing path: a
/// subscription row plus an applied "authorized" provider update.
pub fn activate_plan(state: &AppState, company_id: &str, plan: Plan) -> Subscription {
    let mut conn = state.db.get().unwrap();
    let preapproval_id = format!("mp-pre-{}", uuid::Uuid::new_v4().as_simple());
    queries::create_subscription(&conn, company_id, plan, &preapproval_id)
        .expect("Failed to create test subscription");
    let outcome = queries::apply_preapproval_update(
        &mut conn,
        &format!("evt-{}", uuid::Uuid::new_v4().as_simple()),
        &preapproval_id,
        SubscriptionStatus::Active,
        None,
    )
    .expect("Failed to activate test subscription");
    match outcome {
        queries::WebhookOutcome::Applied { subscription, .. } => subscription,
        _ => panic!("Activation should apply"),
    }
}

/// Create a deal owned by a seller, at the lead stage.
pub fn create_test_deal(
    state: &AppState,
    company_id: &str,
    seller_id: &str,
    title: &str,
    value_cents: i64,
) -> Deal {
    let conn = state.db.get().unwrap();
    queries::create_deal(
        &conn,
        company_id,
        seller_id,
        &CreateDeal {
            title: title.to_string(),
            customer_name: "Cliente Teste".to_string(),
            customer_email: None,
            customer_phone: None,
            value_cents,
            seller_id: None,
            expected_close_at: None,
            notes: None,
        },
    )
    .expect("Failed to create test deal")
}

/// Create a deal and move it straight to won.
pub fn create_won_deal(
    state: &AppState,
    company_id: &str,
    seller_id: &str,
    title: &str,
    value_cents: i64,
) -> Deal {
    let deal = create_test_deal(state, company_id, seller_id, title, value_cents);
    let conn = state.db.get().unwrap();
    queries::move_deal_stage(&conn, company_id, &deal.id, DealStage::Won, None)
        .expect("Failed to move test deal")
        .expect("Deal should exist")
}

/// Create a scheduled call for a seller.
pub fn create_test_agendamento(
    state: &AppState,
    company_id: &str,
    seller_id: &str,
    scheduled_at: i64,
) -> Agendamento {
    let conn = state.db.get().unwrap();
    queries::create_agendamento(
        &conn,
        company_id,
        seller_id,
        &CreateAgendamento {
            deal_id: None,
            customer_name: "Cliente Teste".to_string(),
            customer_phone: Some("+5511999990000".to_string()),
            scheduled_at,
            duration_min: Some(30),
            seller_id: None,
            notes: None,
        },
        false,
    )
    .expect("Failed to create test agendamento")
}

/// Point the state's Mercado Pago client at a mock server. The webhook
/// secret is fixed so tests can compute valid signatures.
pub const TEST_MP_WEBHOOK_SECRET: &str = "whsec_test";

pub fn attach_mercadopago(state: &mut AppState, base_url: &str) {
    let config = gamesales::config::MercadoPagoConfig {
        access_token: "TEST-access-token".to_string(),
        webhook_secret: TEST_MP_WEBHOOK_SECRET.to_string(),
    };
    state.mercadopago = Some(std::sync::Arc::new(
        gamesales::integrations::MercadoPagoClient::with_base_url(&config, base_url),
    ));
}

/// Point the state's Google client at a mock server (auth, token and API
/// hosts all collapse onto it).
pub fn attach_google(state: &mut AppState, base_url: &str) {
    let config = gamesales::config::GoogleConfig {
        client_id: "test-client".to_string(),
        client_secret: "test-secret".to_string(),
        redirect_url: "http://localhost:8080/oauth/google/callback".to_string(),
    };
    state.google = Some(std::sync::Arc::new(
        gamesales::integrations::GoogleClient::with_base_urls(
            &config, base_url, base_url, base_url,
        ),
    ));
}

pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// A request with a bearer API key and an optional JSON body.
pub fn authed_request(
    method: &str,
    uri: &str,
    api_key: &str,
    body: Option<serde_json::Value>,
) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Bearer {}", api_key));
    match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

/// Collect a response body as JSON.
pub async fn body_json(response: axum::http::Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).expect("Response should be valid JSON")
}

/// Collect a response body as plain text.
pub async fn body_text(response: axum::http::Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8_lossy(&bytes).to_string()
}
