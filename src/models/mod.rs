mod agendamento;
mod audit_log;
mod calendar;
mod company;
mod dashboard;
mod deal;
mod meta;
mod ranking;
mod seller;
mod subscription;

pub use agendamento::*;
pub use audit_log::*;
pub use calendar::*;
pub use company::*;
pub use dashboard::*;
pub use deal::*;
pub use meta::*;
pub use ranking::*;
pub use seller::*;
pub use subscription::*;

use serde::{Deserialize, Deserializer};

use crate::error::{AppError, Result, msg};

/// Basic email sanity check: one `@`, non-empty local part, a dot in the
/// domain. Intentionally permissive; it only has to catch obvious typos
/// before the address becomes a per-company unique key.
pub(crate) fn validate_email(email: &str) -> Result<()> {
    let email = email.trim();
    let Some((local, domain)) = email.split_once('@') else {
        return Err(AppError::BadRequest(msg::INVALID_EMAIL.into()));
    };
    if local.is_empty() || domain.is_empty() || !domain.contains('.') || domain.contains('@') {
        return Err(AppError::BadRequest(msg::INVALID_EMAIL.into()));
    }
    Ok(())
}

pub(crate) fn validate_non_empty(value: &str, message: &'static str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(AppError::BadRequest(message.into()));
    }
    Ok(())
}

/// Deserialize a double Option field where:
/// - Field absent in JSON → None (don't update)
/// - Field present with null → Some(None) (set to NULL in DB)
/// - Field present with value → Some(Some(value)) (set to value)
pub(crate) fn deserialize_optional_nullable<'de, D, T>(
    deserializer: D,
) -> std::result::Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    let value: Option<T> = Option::deserialize(deserializer)?;
    Ok(Some(value))
}
