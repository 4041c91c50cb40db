use reqwest::Client;
use tracing::debug;

use crate::config::TwilioConfig;
use crate::error::{AppError, Result};

const DEFAULT_API_BASE: &str = "https://api.twilio.com";

/// Thin client for the Twilio Messages API. Used for call reminders only,
/// so the surface is a single send.
#[derive(Debug, Clone)]
pub struct TwilioClient {
    client: Client,
    account_sid: String,
    auth_token: String,
    from_number: String,
    base_url: String,
}

impl TwilioClient {
    pub fn new(config: &TwilioConfig) -> Self {
        Self::with_base_url(config, DEFAULT_API_BASE)
    }

    /// Point the client at a different host (tests).
    pub fn with_base_url(config: &TwilioConfig, base_url: &str) -> Self {
        Self {
            client: Client::new(),
            account_sid: config.account_sid.clone(),
            auth_token: config.auth_token.clone(),
            from_number: config.from_number.clone(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Send one SMS. Returns the provider message SID.
    pub async fn send_sms(&self, to: &str, body: &str) -> Result<String> {
        let url = format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.base_url, self.account_sid
        );

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[
                ("To", to),
                ("From", self.from_number.as_str()),
                ("Body", body),
            ])
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("Twilio request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream(format!(
                "Twilio API error {}: {}",
                status, body
            )));
        }

        let created: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("Twilio response parse failed: {}", e)))?;

        let sid = created
            .get("sid")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        debug!(sid = %sid, to = %to, "sent SMS");
        Ok(sid)
    }
}
