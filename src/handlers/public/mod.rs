mod oauth;
mod signup;

pub use oauth::*;
pub use signup::*;

use axum::{
    Json, Router,
    routing::{get, post},
};
use serde::Serialize;

use crate::config::RateLimitConfig;
use crate::db::AppState;
use crate::rate_limit;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub fn router(rate_limit: RateLimitConfig) -> Router<AppState> {
    let relaxed = Router::new()
        .route("/health", get(health))
        .layer(rate_limit::relaxed_layer(rate_limit.relaxed_rpm));

    let standard = Router::new()
        .route("/companies", post(create_company))
        .layer(rate_limit::standard_layer(rate_limit.standard_rpm));

    // The callback triggers a token exchange against Google, so it gets the
    // tightest budget.
    let strict = Router::new()
        .route("/oauth/google/callback", get(google_callback))
        .layer(rate_limit::strict_layer(rate_limit.strict_rpm));

    relaxed.merge(standard).merge(strict)
}
