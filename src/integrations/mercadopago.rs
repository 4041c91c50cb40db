use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::config::MercadoPagoConfig;
use crate::error::{AppError, Result};

type HmacSha256 = Hmac<Sha256>;

const DEFAULT_API_BASE: &str = "https://api.mercadopago.com";

/// Subscription (preapproval) state as Mercado Pago reports it.
/// `next_payment_date` is RFC 3339 with offset.
#[derive(Debug, Clone, Deserialize)]
pub struct Preapproval {
    pub id: String,
    pub status: String,
    pub external_reference: Option<String>,
    pub reason: Option<String>,
    pub next_payment_date: Option<String>,
    pub init_point: Option<String>,
}

impl Preapproval {
    /// `next_payment_date` as a unix timestamp, if present and parseable.
    pub fn next_payment_ts(&self) -> Option<i64> {
        self.next_payment_date
            .as_deref()
            .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.timestamp())
    }
}

#[derive(Debug, Serialize)]
struct AutoRecurring {
    frequency: u32,
    frequency_type: &'static str,
    transaction_amount: f64,
    currency_id: &'static str,
}

#[derive(Debug, Serialize)]
struct CreatePreapprovalRequest<'a> {
    reason: &'a str,
    external_reference: &'a str,
    payer_email: &'a str,
    back_url: &'a str,
    auto_recurring: AutoRecurring,
}

/// Incoming webhook notification body. Mercado Pago sends several topics on
/// the same endpoint; only `subscription_preapproval` is acted on, and the
/// payload's status is never trusted (the preapproval is re-fetched).
#[derive(Debug, Deserialize)]
pub struct WebhookNotification {
    /// Notification id (numeric in live traffic); used for deduplication.
    pub id: Option<serde_json::Value>,
    #[serde(rename = "type")]
    pub topic: Option<String>,
    pub action: Option<String>,
    pub data: Option<WebhookData>,
}

#[derive(Debug, Deserialize)]
pub struct WebhookData {
    pub id: Option<serde_json::Value>,
}

impl WebhookNotification {
    /// The resource (preapproval) id carried in `data.id`. Arrives as either
    /// a string or a number depending on the topic.
    pub fn data_id(&self) -> Option<String> {
        self.data.as_ref().and_then(|d| d.id.as_ref()).map(json_id)
    }

    /// Stable id for replay prevention: the notification id when present,
    /// otherwise topic + resource id.
    pub fn event_id(&self) -> String {
        match &self.id {
            Some(id) => json_id(id),
            None => format!(
                "{}:{}",
                self.topic.as_deref().unwrap_or("unknown"),
                self.data_id().unwrap_or_default()
            ),
        }
    }

    pub fn is_subscription_topic(&self) -> bool {
        matches!(self.topic.as_deref(), Some("subscription_preapproval"))
    }
}

fn json_id(v: &serde_json::Value) -> String {
    match v {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone)]
pub struct MercadoPagoClient {
    client: Client,
    access_token: String,
    webhook_secret: String,
    base_url: String,
}

impl MercadoPagoClient {
    pub fn new(config: &MercadoPagoConfig) -> Self {
        Self::with_base_url(config, DEFAULT_API_BASE)
    }

    /// Point the client at a different API host (tests).
    pub fn with_base_url(config: &MercadoPagoConfig, base_url: &str) -> Self {
        Self {
            client: Client::new(),
            access_token: config.access_token.clone(),
            webhook_secret: config.webhook_secret.clone(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Create a recurring preapproval for a plan purchase. Returns the
    /// preapproval id and the hosted checkout URL (`init_point`).
    ///
    /// `external_reference` carries our company id so the subscription can
    /// always be traced back even if local state is lost.
    pub async fn create_preapproval(
        &self,
        reason: &str,
        external_reference: &str,
        payer_email: &str,
        amount_cents: i64,
        back_url: &str,
    ) -> Result<Preapproval> {
        let body = CreatePreapprovalRequest {
            reason,
            external_reference,
            payer_email,
            back_url,
            auto_recurring: AutoRecurring {
                frequency: 1,
                frequency_type: "months",
                transaction_amount: amount_cents as f64 / 100.0,
                currency_id: "BRL",
            },
        };

        let response = self
            .client
            .post(format!("{}/preapproval", self.base_url))
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("Mercado Pago API error: {}", e)))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream(format!(
                "Mercado Pago API error: {}",
                error_text
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("Failed to parse Mercado Pago response: {}", e)))
    }

    /// Fetch the authoritative state of a preapproval. The webhook handler
    /// always goes through this instead of trusting the notification body.
    pub async fn get_preapproval(&self, preapproval_id: &str) -> Result<Preapproval> {
        let response = self
            .client
            .get(format!("{}/preapproval/{}", self.base_url, preapproval_id))
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("Mercado Pago API error: {}", e)))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(AppError::NotFound(format!(
                "Preapproval {} not found",
                preapproval_id
            )));
        }

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream(format!(
                "Mercado Pago API error: {}",
                error_text
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("Failed to parse Mercado Pago response: {}", e)))
    }

    /// Cancel a preapproval at the provider.
    pub async fn cancel_preapproval(&self, preapproval_id: &str) -> Result<Preapproval> {
        let response = self
            .client
            .put(format!("{}/preapproval/{}", self.base_url, preapproval_id))
            .bearer_auth(&self.access_token)
            .json(&serde_json::json!({ "status": "cancelled" }))
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("Mercado Pago API error: {}", e)))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream(format!(
                "Mercado Pago API error: {}",
                error_text
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("Failed to parse Mercado Pago response: {}", e)))
    }

    /// Maximum age of a webhook timestamp before it's rejected (in seconds).
    const WEBHOOK_TIMESTAMP_TOLERANCE_SECS: i64 = 300;

    /// Verify the `x-signature` header of a webhook request.
    ///
    /// Mercado Pago signs a manifest assembled from the resource id, the
    /// `x-request-id` header and the `ts` value from the signature header:
    ///
    /// `id:{data.id};request-id:{x-request-id};ts:{ts};`
    ///
    /// The signature header itself is `ts=<unix>,v1=<hex hmac-sha256>`.
    pub fn verify_webhook_signature(
        &self,
        x_signature: &str,
        x_request_id: &str,
        data_id: &str,
    ) -> Result<bool> {
        let mut timestamp = None;
        let mut sig_v1 = None;

        for part in x_signature.split(',') {
            let part = part.trim();
            if let Some(t) = part.strip_prefix("ts=") {
                timestamp = Some(t);
            } else if let Some(s) = part.strip_prefix("v1=") {
                sig_v1 = Some(s);
            }
        }

        let timestamp_str = timestamp
            .ok_or_else(|| AppError::BadRequest("Invalid signature header format".into()))?;
        let sig_v1 = sig_v1
            .ok_or_else(|| AppError::BadRequest("Invalid signature header format".into()))?;

        // Parse and validate timestamp to prevent replay attacks.
        let timestamp: i64 = timestamp_str
            .parse()
            .map_err(|_| AppError::BadRequest("Invalid timestamp in signature".into()))?;

        let now = chrono::Utc::now().timestamp();
        let age = now - timestamp;

        if age > Self::WEBHOOK_TIMESTAMP_TOLERANCE_SECS {
            tracing::warn!(
                "Mercado Pago webhook rejected: timestamp too old (age={}s, max={}s)",
                age,
                Self::WEBHOOK_TIMESTAMP_TOLERANCE_SECS
            );
            return Ok(false);
        }

        // Also reject timestamps from the future (clock skew tolerance: 60 seconds)
        if age < -60 {
            tracing::warn!(
                "Mercado Pago webhook rejected: timestamp in the future (age={}s)",
                age
            );
            return Ok(false);
        }

        let manifest = format!(
            "id:{};request-id:{};ts:{};",
            data_id, x_request_id, timestamp_str
        );

        let mut mac = HmacSha256::new_from_slice(self.webhook_secret.as_bytes())
            .map_err(|_| AppError::Internal("Invalid webhook secret".into()))?;
        mac.update(manifest.as_bytes());
        let expected = hex::encode(mac.finalize().into_bytes());

        // Use constant-time comparison to prevent timing attacks.
        let expected_bytes = expected.as_bytes();
        let provided_bytes = sig_v1.as_bytes();

        // Length check is not constant-time, but that's fine - signature length
        // is not secret (it's always 64 hex chars for SHA-256)
        if expected_bytes.len() != provided_bytes.len() {
            return Ok(false);
        }

        Ok(expected_bytes.ct_eq(provided_bytes).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> MercadoPagoClient {
        MercadoPagoClient::new(&MercadoPagoConfig {
            access_token: "TEST-token".to_string(),
            webhook_secret: "whsec_test".to_string(),
        })
    }

    fn sign(secret: &str, manifest: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(manifest.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn test_signature_valid() {
        let c = client();
        let ts = chrono::Utc::now().timestamp();
        let manifest = format!("id:pre123;request-id:req-1;ts:{};", ts);
        let v1 = sign("whsec_test", &manifest);
        let header = format!("ts={},v1={}", ts, v1);

        assert!(c.verify_webhook_signature(&header, "req-1", "pre123").unwrap());
    }

    #[test]
    fn test_signature_wrong_secret() {
        let c = client();
        let ts = chrono::Utc::now().timestamp();
        let manifest = format!("id:pre123;request-id:req-1;ts:{};", ts);
        let v1 = sign("other_secret", &manifest);
        let header = format!("ts={},v1={}", ts, v1);

        assert!(!c.verify_webhook_signature(&header, "req-1", "pre123").unwrap());
    }

    #[test]
    fn test_signature_stale_timestamp() {
        let c = client();
        let ts = chrono::Utc::now().timestamp() - 600;
        let manifest = format!("id:pre123;request-id:req-1;ts:{};", ts);
        let v1 = sign("whsec_test", &manifest);
        let header = format!("ts={},v1={}", ts, v1);

        assert!(!c.verify_webhook_signature(&header, "req-1", "pre123").unwrap());
    }

    #[test]
    fn test_signature_future_timestamp() {
        let c = client();
        let ts = chrono::Utc::now().timestamp() + 120;
        let manifest = format!("id:pre123;request-id:req-1;ts:{};", ts);
        let v1 = sign("whsec_test", &manifest);
        let header = format!("ts={},v1={}", ts, v1);

        assert!(!c.verify_webhook_signature(&header, "req-1", "pre123").unwrap());
    }

    #[test]
    fn test_signature_malformed_header() {
        let c = client();
        assert!(c.verify_webhook_signature("garbage", "req-1", "pre123").is_err());
        assert!(c.verify_webhook_signature("ts=abc,v1=def", "req-1", "pre123").is_err());
    }

    #[test]
    fn test_notification_event_id() {
        let n: WebhookNotification = serde_json::from_value(serde_json::json!({
            "id": 12345,
            "type": "subscription_preapproval",
            "action": "updated",
            "data": { "id": "pre123" }
        }))
        .unwrap();
        assert_eq!(n.event_id(), "12345");
        assert_eq!(n.data_id().as_deref(), Some("pre123"));
        assert!(n.is_subscription_topic());

        let no_id: WebhookNotification = serde_json::from_value(serde_json::json!({
            "type": "payment",
            "data": { "id": 777 }
        }))
        .unwrap();
        assert_eq!(no_id.event_id(), "payment:777");
        assert!(!no_id.is_subscription_topic());
    }

    #[test]
    fn test_next_payment_ts() {
        let p = Preapproval {
            id: "pre123".to_string(),
            status: "authorized".to_string(),
            external_reference: None,
            reason: None,
            next_payment_date: Some("2025-04-10T11:58:44.000-04:00".to_string()),
            init_point: None,
        };
        assert_eq!(p.next_payment_ts(), Some(1744300724));

        let bad = Preapproval {
            next_payment_date: Some("not-a-date".to_string()),
            ..p.clone()
        };
        assert_eq!(bad.next_payment_ts(), None);
    }
}
