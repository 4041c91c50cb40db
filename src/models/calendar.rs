use serde::Serialize;

/// A seller's Google Calendar connection. Token blobs are envelope-encrypted
/// with a DEK derived from the seller id and never serialized.
#[derive(Debug, Clone)]
pub struct CalendarAccount {
    pub id: String,
    pub seller_id: String,
    pub google_email: String,
    pub access_token_enc: Vec<u8>,
    pub refresh_token_enc: Vec<u8>,
    /// When the stored access token expires (unix).
    pub token_expires_at: i64,
    /// Target calendar; `primary` unless the user picked another.
    pub calendar_id: String,
    pub connected_at: i64,
    pub last_synced_at: Option<i64>,
}

/// What the API exposes about a connection.
#[derive(Debug, Serialize)]
pub struct CalendarAccountView {
    pub google_email: String,
    pub calendar_id: String,
    pub connected_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_synced_at: Option<i64>,
}

impl From<&CalendarAccount> for CalendarAccountView {
    fn from(account: &CalendarAccount) -> Self {
        Self {
            google_email: account.google_email.clone(),
            calendar_id: account.calendar_id.clone(),
            connected_at: account.connected_at,
            last_synced_at: account.last_synced_at,
        }
    }
}

/// Consent URL handed to the SPA to start the flow.
#[derive(Debug, Serialize)]
pub struct ConnectUrlResponse {
    pub url: String,
}
