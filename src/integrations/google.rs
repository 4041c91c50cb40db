use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::GoogleConfig;

const DEFAULT_AUTH_BASE: &str = "https://accounts.google.com";
const DEFAULT_OAUTH_BASE: &str = "https://oauth2.googleapis.com";
const DEFAULT_API_BASE: &str = "https://www.googleapis.com";

/// Scopes requested at consent: calendar event writes plus the user's email
/// for display.
const SCOPES: &str = "https://www.googleapis.com/auth/calendar.events openid email";

/// Errors from the Google OAuth/Calendar APIs. Callers branch on
/// `Unauthorized` (refresh and retry once) and `InvalidGrant` (the refresh
/// token is dead, the account must reconnect); everything else surfaces.
#[derive(Debug, Error)]
pub enum GoogleError {
    #[error("access token rejected")]
    Unauthorized,
    #[error("refresh token revoked or expired")]
    InvalidGrant,
    #[error("resource not found")]
    NotFound,
    #[error("Google API error: {0}")]
    Api(String),
    #[error("network error: {0}")]
    Network(String),
}

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    /// Only present on the initial code exchange (with `access_type=offline`).
    pub refresh_token: Option<String>,
    pub expires_in: i64,
}

#[derive(Debug, Deserialize)]
struct UserInfo {
    email: String,
}

/// Calendar event payload for insert/patch. Times are RFC 3339 UTC.
#[derive(Debug, Serialize)]
pub struct CalendarEvent {
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub start: EventTime,
    pub end: EventTime,
}

#[derive(Debug, Serialize)]
pub struct EventTime {
    #[serde(rename = "dateTime")]
    pub date_time: String,
}

impl CalendarEvent {
    /// Build an event for a call: `[start, start + duration_min)`.
    pub fn for_call(
        summary: String,
        description: Option<String>,
        start_ts: i64,
        duration_min: i64,
    ) -> Self {
        let to_rfc3339 = |ts: i64| {
            chrono::DateTime::from_timestamp(ts, 0)
                .unwrap_or_default()
                .to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
        };
        Self {
            summary,
            description,
            start: EventTime {
                date_time: to_rfc3339(start_ts),
            },
            end: EventTime {
                date_time: to_rfc3339(start_ts + duration_min * 60),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct CreatedEvent {
    id: String,
}

#[derive(Debug, Clone)]
pub struct GoogleClient {
    client: Client,
    client_id: String,
    client_secret: String,
    redirect_url: String,
    auth_base: String,
    oauth_base: String,
    api_base: String,
}

impl GoogleClient {
    pub fn new(config: &GoogleConfig) -> Self {
        Self::with_base_urls(config, DEFAULT_AUTH_BASE, DEFAULT_OAUTH_BASE, DEFAULT_API_BASE)
    }

    /// Point the client at different hosts (tests).
    pub fn with_base_urls(
        config: &GoogleConfig,
        auth_base: &str,
        oauth_base: &str,
        api_base: &str,
    ) -> Self {
        Self {
            client: Client::new(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_url: config.redirect_url.clone(),
            auth_base: auth_base.trim_end_matches('/').to_string(),
            oauth_base: oauth_base.trim_end_matches('/').to_string(),
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }

    /// Consent URL for the authorization-code flow. `access_type=offline` +
    /// `prompt=consent` force a refresh token on every connect.
    pub fn consent_url(&self, state: &str) -> String {
        let url = Url::parse_with_params(
            &format!("{}/o/oauth2/v2/auth", self.auth_base),
            &[
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", self.redirect_url.as_str()),
                ("response_type", "code"),
                ("scope", SCOPES),
                ("access_type", "offline"),
                ("prompt", "consent"),
                ("state", state),
            ],
        )
        .expect("static consent URL is valid");
        url.to_string()
    }

    /// Exchange an authorization code for tokens.
    pub async fn exchange_code(&self, code: &str) -> Result<TokenResponse, GoogleError> {
        let response = self
            .client
            .post(format!("{}/token", self.oauth_base))
            .form(&[
                ("code", code),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("redirect_uri", self.redirect_url.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .map_err(|e| GoogleError::Network(e.to_string()))?;

        Self::token_result(response).await
    }

    /// Refresh an access token. `invalid_grant` means the user revoked
    /// access (or the token expired); the account must reconnect.
    pub async fn refresh_access_token(
        &self,
        refresh_token: &str,
    ) -> Result<TokenResponse, GoogleError> {
        let response = self
            .client
            .post(format!("{}/token", self.oauth_base))
            .form(&[
                ("refresh_token", refresh_token),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(|e| GoogleError::Network(e.to_string()))?;

        Self::token_result(response).await
    }

    async fn token_result(response: reqwest::Response) -> Result<TokenResponse, GoogleError> {
        if response.status().is_success() {
            return response
                .json()
                .await
                .map_err(|e| GoogleError::Api(format!("bad token response: {}", e)));
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if body.contains("invalid_grant") {
            return Err(GoogleError::InvalidGrant);
        }
        Err(GoogleError::Api(format!("token endpoint {}: {}", status, body)))
    }

    /// Best-effort revocation on disconnect.
    pub async fn revoke_token(&self, token: &str) -> Result<(), GoogleError> {
        let response = self
            .client
            .post(format!("{}/revoke", self.oauth_base))
            .form(&[("token", token)])
            .send()
            .await
            .map_err(|e| GoogleError::Network(e.to_string()))?;

        // Google answers 400 for already-revoked tokens; both are fine here.
        if response.status().is_success() || response.status() == StatusCode::BAD_REQUEST {
            Ok(())
        } else {
            Err(GoogleError::Api(format!(
                "revoke endpoint {}",
                response.status()
            )))
        }
    }

    /// The connected account's email, for display.
    pub async fn fetch_user_email(&self, access_token: &str) -> Result<String, GoogleError> {
        let response = self
            .client
            .get(format!("{}/oauth2/v2/userinfo", self.api_base))
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| GoogleError::Network(e.to_string()))?;

        let info: UserInfo = Self::api_result(response).await?;
        Ok(info.email)
    }

    /// Insert a calendar event; returns the event id.
    pub async fn insert_event(
        &self,
        access_token: &str,
        calendar_id: &str,
        event: &CalendarEvent,
    ) -> Result<String, GoogleError> {
        let response = self
            .client
            .post(format!(
                "{}/calendar/v3/calendars/{}/events",
                self.api_base, calendar_id
            ))
            .bearer_auth(access_token)
            .json(event)
            .send()
            .await
            .map_err(|e| GoogleError::Network(e.to_string()))?;

        let created: CreatedEvent = Self::api_result(response).await?;
        Ok(created.id)
    }

    /// Patch an existing event.
    pub async fn patch_event(
        &self,
        access_token: &str,
        calendar_id: &str,
        event_id: &str,
        event: &CalendarEvent,
    ) -> Result<(), GoogleError> {
        let response = self
            .client
            .patch(format!(
                "{}/calendar/v3/calendars/{}/events/{}",
                self.api_base, calendar_id, event_id
            ))
            .bearer_auth(access_token)
            .json(event)
            .send()
            .await
            .map_err(|e| GoogleError::Network(e.to_string()))?;

        Self::api_result::<serde_json::Value>(response).await.map(|_| ())
    }

    /// Delete an event. 404/410 count as success: the user already removed
    /// it in Google.
    pub async fn delete_event(
        &self,
        access_token: &str,
        calendar_id: &str,
        event_id: &str,
    ) -> Result<(), GoogleError> {
        let response = self
            .client
            .delete(format!(
                "{}/calendar/v3/calendars/{}/events/{}",
                self.api_base, calendar_id, event_id
            ))
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| GoogleError::Network(e.to_string()))?;

        match response.status() {
            s if s.is_success() => Ok(()),
            StatusCode::NOT_FOUND | StatusCode::GONE => Ok(()),
            StatusCode::UNAUTHORIZED => Err(GoogleError::Unauthorized),
            s => Err(GoogleError::Api(format!("delete event {}", s))),
        }
    }

    async fn api_result<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, GoogleError> {
        match response.status() {
            s if s.is_success() => response
                .json()
                .await
                .map_err(|e| GoogleError::Api(format!("bad response body: {}", e))),
            StatusCode::UNAUTHORIZED => Err(GoogleError::Unauthorized),
            StatusCode::NOT_FOUND | StatusCode::GONE => Err(GoogleError::NotFound),
            s => {
                let body = response.text().await.unwrap_or_default();
                Err(GoogleError::Api(format!("{}: {}", s, body)))
            }
        }
    }
}
