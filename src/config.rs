use std::env;

use crate::crypto::MasterKey;
use crate::error::{AppError, Result};

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: String,
    pub audit_database_path: String,
    /// Public URL of this service (OAuth redirect URIs are built from it).
    pub base_url: String,
    /// URL of the web app; OAuth callbacks and checkout back-urls land there.
    pub app_url: String,
    pub dev_mode: bool,
    pub rate_limit: RateLimitConfig,
    pub audit_log_enabled: bool,
    pub audit_log_retention_days: i64,
    pub google: Option<GoogleConfig>,
    pub mercadopago: Option<MercadoPagoConfig>,
    pub twilio: Option<TwilioConfig>,
    /// How often the background sweep pushes pending calendar changes.
    pub calendar_sync_interval_secs: u64,
    /// How far ahead of a call the reminder fires.
    pub reminder_lead_minutes: i64,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub strict_rpm: u32,
    pub standard_rpm: u32,
    pub relaxed_rpm: u32,
}

#[derive(Debug, Clone)]
pub struct GoogleConfig {
    pub client_id: String,
    pub client_secret: String,
    /// Registered redirect URI; defaults to {base_url}/oauth/google/callback.
    pub redirect_url: String,
}

#[derive(Debug, Clone)]
pub struct MercadoPagoConfig {
    pub access_token: String,
    pub webhook_secret: String,
}

#[derive(Debug, Clone)]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: String,
    pub from_number: String,
}

fn env_u32(name: &str, default: u32) -> u32 {
    env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let dev_mode = env::var("GAMESALES_ENV")
            .map(|v| v == "dev" || v == "development")
            .unwrap_or(false);

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port: u16 = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3000);

        let base_url =
            env::var("BASE_URL").unwrap_or_else(|_| format!("http://{}:{}", host, port));
        let app_url = env::var("APP_URL").unwrap_or_else(|_| base_url.clone());

        let google = match (env::var("GOOGLE_CLIENT_ID"), env::var("GOOGLE_CLIENT_SECRET")) {
            (Ok(client_id), Ok(client_secret)) => Some(GoogleConfig {
                client_id,
                client_secret,
                redirect_url: env::var("GOOGLE_REDIRECT_URL")
                    .unwrap_or_else(|_| format!("{}/oauth/google/callback", base_url)),
            }),
            _ => None,
        };

        let mercadopago = match (env::var("MP_ACCESS_TOKEN"), env::var("MP_WEBHOOK_SECRET")) {
            (Ok(access_token), Ok(webhook_secret)) => Some(MercadoPagoConfig {
                access_token,
                webhook_secret,
            }),
            _ => None,
        };

        let twilio = match (
            env::var("TWILIO_ACCOUNT_SID"),
            env::var("TWILIO_AUTH_TOKEN"),
            env::var("TWILIO_FROM_NUMBER"),
        ) {
            (Ok(account_sid), Ok(auth_token), Ok(from_number)) => Some(TwilioConfig {
                account_sid,
                auth_token,
                from_number,
            }),
            _ => None,
        };

        Self {
            host,
            port,
            database_path: env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "gamesales.db".to_string()),
            audit_database_path: env::var("AUDIT_DATABASE_PATH")
                .unwrap_or_else(|_| "gamesales_audit.db".to_string()),
            base_url,
            app_url,
            dev_mode,
            rate_limit: RateLimitConfig {
                strict_rpm: env_u32("RATE_LIMIT_STRICT_RPM", 10),
                standard_rpm: env_u32("RATE_LIMIT_STANDARD_RPM", 30),
                relaxed_rpm: env_u32("RATE_LIMIT_RELAXED_RPM", 60),
            },
            audit_log_enabled: env::var("AUDIT_LOG_ENABLED")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(true),
            audit_log_retention_days: env::var("AUDIT_LOG_RETENTION_DAYS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(365),
            google,
            mercadopago,
            twilio,
            calendar_sync_interval_secs: env::var("CALENDAR_SYNC_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(300),
            reminder_lead_minutes: env::var("REMINDER_LEAD_MINUTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Load the master encryption key: GAMESALES_MASTER_KEY (base64) takes
    /// precedence, then GAMESALES_MASTER_KEY_FILE. In dev mode a missing key
    /// falls back to an ephemeral one (encrypted tokens do not survive
    /// restarts); in production it is a startup error.
    pub fn load_master_key(&self) -> Result<MasterKey> {
        if let Ok(encoded) = env::var("GAMESALES_MASTER_KEY") {
            return MasterKey::from_base64(&encoded);
        }

        if let Ok(path) = env::var("GAMESALES_MASTER_KEY_FILE") {
            let encoded = std::fs::read_to_string(&path).map_err(|e| {
                AppError::Internal(format!("Failed to read master key file {}: {}", path, e))
            })?;
            return MasterKey::from_base64(&encoded);
        }

        if self.dev_mode {
            tracing::warn!(
                "No master key configured; using an ephemeral key (dev mode only)"
            );
            return MasterKey::from_base64(&MasterKey::generate());
        }

        Err(AppError::Internal(
            "GAMESALES_MASTER_KEY or GAMESALES_MASTER_KEY_FILE must be set".into(),
        ))
    }
}
