//! Row mapping trait and helpers for reducing boilerplate in queries.
//!
//! This module provides a `FromRow` trait that models can implement to
//! define how they are constructed from database rows, plus helper functions
//! for common query patterns.

use rusqlite::{Connection, OptionalExtension, Row, ToSql};

use crate::models::*;

/// Parse a string column into an enum type, converting parse errors to rusqlite errors.
///
/// This provides graceful error handling instead of panicking when database
/// contains invalid enum values (from corruption, migration errors, etc.).
fn parse_enum<T: std::str::FromStr>(row: &Row, col: usize, col_name: &str) -> rusqlite::Result<T> {
    row.get::<_, String>(col)?.parse::<T>().map_err(|_| {
        rusqlite::Error::InvalidColumnType(col, col_name.to_string(), rusqlite::types::Type::Text)
    })
}

/// Trait for constructing a type from a database row.
///
/// Implementing this trait allows using the `query_one` and `query_all`
/// helper functions, reducing repetitive row mapping closures.
pub trait FromRow: Sized {
    /// Construct an instance from a database row.
    fn from_row(row: &Row) -> rusqlite::Result<Self>;
}

/// Query for a single optional result.
pub fn query_one<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Option<T>> {
    conn.query_row(sql, params, T::from_row)
        .optional()
        .map_err(Into::into)
}

/// Query for multiple results.
pub fn query_all<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, T::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ============ SQL SELECT Constants ============

pub const COMPANY_COLS: &str = "id, name, plan, created_at, updated_at, deleted_at";

pub const SELLER_COLS: &str =
    "id, company_id, name, email, phone, role, api_key_hash, created_at, updated_at, deleted_at";

pub const DEAL_COLS: &str = "id, company_id, seller_id, title, customer_name, customer_email, customer_phone, value_cents, stage, expected_close_at, notes, loss_reason, closed_at, created_at, updated_at";

pub const META_COLS: &str =
    "id, company_id, seller_id, period, target_value_cents, target_deals, created_at, updated_at";

pub const AGENDAMENTO_COLS: &str = "id, company_id, seller_id, deal_id, customer_name, customer_phone, scheduled_at, duration_min, status, notes, google_event_id, calendar_pending, reminder_sent, created_at, updated_at";

pub const SUBSCRIPTION_COLS: &str =
    "id, company_id, plan, status, mp_preapproval_id, paid_through, created_at, updated_at";

pub const CALENDAR_ACCOUNT_COLS: &str = "id, seller_id, google_email, access_token, refresh_token, token_expires_at, calendar_id, connected_at, last_synced_at";

pub const AUDIT_LOG_COLS: &str = "id, timestamp, actor_type, actor_id, actor_name, action, resource_type, resource_id, resource_name, details, company_id, company_name, ip_address, user_agent";

// ============ FromRow Implementations ============

impl FromRow for Company {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Company {
            id: row.get(0)?,
            name: row.get(1)?,
            plan: parse_enum(row, 2, "plan")?,
            created_at: row.get(3)?,
            updated_at: row.get(4)?,
            deleted_at: row.get(5)?,
        })
    }
}

impl FromRow for Seller {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Seller {
            id: row.get(0)?,
            company_id: row.get(1)?,
            name: row.get(2)?,
            email: row.get(3)?,
            phone: row.get(4)?,
            role: parse_enum(row, 5, "role")?,
            api_key_hash: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
            deleted_at: row.get(9)?,
        })
    }
}

impl FromRow for Deal {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Deal {
            id: row.get(0)?,
            company_id: row.get(1)?,
            seller_id: row.get(2)?,
            title: row.get(3)?,
            customer_name: row.get(4)?,
            customer_email: row.get(5)?,
            customer_phone: row.get(6)?,
            value_cents: row.get(7)?,
            stage: parse_enum(row, 8, "stage")?,
            expected_close_at: row.get(9)?,
            notes: row.get(10)?,
            loss_reason: row.get(11)?,
            closed_at: row.get(12)?,
            created_at: row.get(13)?,
            updated_at: row.get(14)?,
        })
    }
}

impl FromRow for Meta {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Meta {
            id: row.get(0)?,
            company_id: row.get(1)?,
            seller_id: row.get(2)?,
            period: row.get(3)?,
            target_value_cents: row.get(4)?,
            target_deals: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }
}

impl FromRow for Agendamento {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Agendamento {
            id: row.get(0)?,
            company_id: row.get(1)?,
            seller_id: row.get(2)?,
            deal_id: row.get(3)?,
            customer_name: row.get(4)?,
            customer_phone: row.get(5)?,
            scheduled_at: row.get(6)?,
            duration_min: row.get(7)?,
            status: parse_enum(row, 8, "status")?,
            notes: row.get(9)?,
            google_event_id: row.get(10)?,
            calendar_pending: row.get::<_, i32>(11)? != 0,
            reminder_sent: row.get::<_, i32>(12)? != 0,
            created_at: row.get(13)?,
            updated_at: row.get(14)?,
        })
    }
}

impl FromRow for Subscription {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Subscription {
            id: row.get(0)?,
            company_id: row.get(1)?,
            plan: parse_enum(row, 2, "plan")?,
            status: parse_enum(row, 3, "status")?,
            mp_preapproval_id: row.get(4)?,
            paid_through: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }
}

impl FromRow for CalendarAccount {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(CalendarAccount {
            id: row.get(0)?,
            seller_id: row.get(1)?,
            google_email: row.get(2)?,
            access_token_enc: row.get(3)?,
            refresh_token_enc: row.get(4)?,
            token_expires_at: row.get(5)?,
            calendar_id: row.get(6)?,
            connected_at: row.get(7)?,
            last_synced_at: row.get(8)?,
        })
    }
}

impl FromRow for AuditLog {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let details_str: Option<String> = row.get(9)?;
        Ok(AuditLog {
            id: row.get(0)?,
            timestamp: row.get(1)?,
            actor_type: parse_enum(row, 2, "actor_type")?,
            actor_id: row.get(3)?,
            actor_name: row.get(4)?,
            action: row.get(5)?,
            resource_type: row.get(6)?,
            resource_id: row.get(7)?,
            resource_name: row.get(8)?,
            details: details_str.and_then(|s| serde_json::from_str(&s).ok()),
            company_id: row.get(10)?,
            company_name: row.get(11)?,
            ip_address: row.get(12)?,
            user_agent: row.get(13)?,
        })
    }
}
