use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result, msg};

/// Monthly goal for a seller, or for the whole company when `seller_id`
/// is NULL. One meta per (company, seller, period).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Meta {
    pub id: String,
    pub company_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seller_id: Option<String>,
    /// `YYYY-MM`.
    pub period: String,
    pub target_value_cents: i64,
    pub target_deals: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Deserialize)]
pub struct UpsertMeta {
    /// Omit for a company-wide meta.
    #[serde(default)]
    pub seller_id: Option<String>,
    pub period: String,
    pub target_value_cents: i64,
    pub target_deals: i64,
}

impl UpsertMeta {
    pub fn validate(&self) -> Result<()> {
        validate_period(&self.period)?;
        if self.target_value_cents < 0 || self.target_deals < 0 {
            return Err(AppError::BadRequest("Targets must not be negative".into()));
        }
        Ok(())
    }
}

/// A meta joined with what was actually won in its period.
#[derive(Debug, Serialize)]
pub struct MetaProgress {
    #[serde(flatten)]
    pub meta: Meta,
    pub won_value_cents: i64,
    pub won_deals: i64,
    /// Percent of the value target, 100 when the target is zero.
    pub value_attainment_pct: f64,
    pub deals_attainment_pct: f64,
    pub hit: bool,
}

impl MetaProgress {
    pub fn compute(meta: Meta, won_value_cents: i64, won_deals: i64) -> Self {
        let value_attainment_pct = attainment(won_value_cents, meta.target_value_cents);
        let deals_attainment_pct = attainment(won_deals, meta.target_deals);
        let hit = value_attainment_pct >= 100.0;
        Self {
            meta,
            won_value_cents,
            won_deals,
            value_attainment_pct,
            deals_attainment_pct,
            hit,
        }
    }
}

fn attainment(actual: i64, target: i64) -> f64 {
    if target <= 0 {
        return 100.0;
    }
    (actual as f64 / target as f64 * 100.0 * 10.0).round() / 10.0
}

/// Validate and normalize a `YYYY-MM` period string.
pub fn validate_period(period: &str) -> Result<&str> {
    let bytes = period.as_bytes();
    let well_formed = bytes.len() == 7
        && bytes[4] == b'-'
        && period[..4].chars().all(|c| c.is_ascii_digit())
        && period[5..].chars().all(|c| c.is_ascii_digit());

    if !well_formed {
        return Err(AppError::BadRequest(msg::INVALID_PERIOD.into()));
    }

    let month: u32 = period[5..].parse().unwrap_or(0);
    if !(1..=12).contains(&month) {
        return Err(AppError::BadRequest(msg::INVALID_PERIOD.into()));
    }

    Ok(period)
}

/// Unix timestamp range [start, end) covered by a `YYYY-MM` period, UTC.
pub fn period_bounds(period: &str) -> Result<(i64, i64)> {
    use chrono::NaiveDate;

    validate_period(period)?;
    let year: i32 = period[..4].parse().map_err(|_| AppError::BadRequest(msg::INVALID_PERIOD.into()))?;
    let month: u32 = period[5..].parse().map_err(|_| AppError::BadRequest(msg::INVALID_PERIOD.into()))?;

    let start = NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| AppError::BadRequest(msg::INVALID_PERIOD.into()))?;
    let end = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    }
    .ok_or_else(|| AppError::BadRequest(msg::INVALID_PERIOD.into()))?;

    let to_ts = |d: chrono::NaiveDate| d.and_hms_opt(0, 0, 0).unwrap().and_utc().timestamp();
    Ok((to_ts(start), to_ts(end)))
}

/// The current `YYYY-MM` period, UTC.
pub fn current_period() -> String {
    chrono::Utc::now().format("%Y-%m").to_string()
}
