pub mod mercadopago;

pub use mercadopago::handle_mercadopago_webhook;

use axum::{Router, routing::post};

use crate::config::RateLimitConfig;
use crate::db::AppState;
use crate::rate_limit;

pub fn router(rate_limit: RateLimitConfig) -> Router<AppState> {
    Router::new()
        .route("/webhooks/mercadopago", post(handle_mercadopago_webhook))
        .layer(rate_limit::standard_layer(rate_limit.standard_rpm))
}
