use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params, types::Value};
use uuid::Uuid;

use crate::crypto::{hash_secret, normalize_email};
use crate::error::{AppError, Result};
use crate::id::EntityType;
use crate::models::*;
use crate::plans::{Plan, effective_plan};

use super::from_row::{
    AGENDAMENTO_COLS, AUDIT_LOG_COLS, CALENDAR_ACCOUNT_COLS, COMPANY_COLS, DEAL_COLS, FromRow,
    META_COLS, SELLER_COLS, SUBSCRIPTION_COLS, query_all, query_one,
};

fn now() -> i64 {
    Utc::now().timestamp()
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

/// Builder for dynamic UPDATE statements with optional fields.
/// Combines multiple field updates into a single query for efficiency.
struct UpdateBuilder {
    table: &'static str,
    id: String,
    company_id: Option<String>,
    only_active: bool,
    fields: Vec<(&'static str, Value)>,
    track_updated_at: bool,
}

impl UpdateBuilder {
    fn new(table: &'static str, id: &str) -> Self {
        Self {
            table,
            id: id.to_string(),
            company_id: None,
            only_active: false,
            fields: Vec::new(),
            track_updated_at: false,
        }
    }

    /// Restrict the update to rows belonging to one company. Every
    /// tenant-owned table should be updated through this.
    fn scope_company(mut self, company_id: &str) -> Self {
        self.company_id = Some(company_id.to_string());
        self
    }

    /// Restrict the update to rows that are not soft-deleted.
    fn only_active(mut self) -> Self {
        self.only_active = true;
        self
    }

    fn with_updated_at(mut self) -> Self {
        self.track_updated_at = true;
        self
    }

    fn set(mut self, column: &'static str, value: impl Into<Value>) -> Self {
        self.fields.push((column, value.into()));
        self
    }

    fn set_opt<V: Into<Value>>(self, column: &'static str, value: Option<V>) -> Self {
        match value {
            Some(v) => self.set(column, v),
            None => self,
        }
    }

    /// Set a column to an explicit value (including NULL).
    /// Use this for Option<T> where Some(v) = set to v, None = set to NULL.
    fn set_nullable<V: Into<Value>>(mut self, column: &'static str, value: Option<V>) -> Self {
        match value {
            Some(v) => self.fields.push((column, v.into())),
            None => self.fields.push((column, Value::Null)),
        }
        self
    }

    /// Execute the update and return the updated entity using RETURNING clause.
    /// Returns None if no rows matched (entity not found or no fields to update).
    fn execute_returning<T: super::from_row::FromRow>(
        mut self,
        conn: &Connection,
        returning_cols: &str,
    ) -> Result<Option<T>> {
        if self.fields.is_empty() {
            return Ok(None);
        }
        if self.track_updated_at {
            self.fields.push(("updated_at", now().into()));
        }
        let sets: Vec<String> = self
            .fields
            .iter()
            .map(|(col, _)| format!("{} = ?", col))
            .collect();
        let mut values: Vec<Value> = self.fields.into_iter().map(|(_, v)| v).collect();
        values.push(self.id.into());

        let mut where_clause = String::from("WHERE id = ?");
        if let Some(company_id) = self.company_id {
            where_clause.push_str(" AND company_id = ?");
            values.push(company_id.into());
        }
        if self.only_active {
            where_clause.push_str(" AND deleted_at IS NULL");
        }

        let sql = format!(
            "UPDATE {} SET {} {} RETURNING {}",
            self.table,
            sets.join(", "),
            where_clause,
            returning_cols
        );
        conn.query_row(&sql, rusqlite::params_from_iter(values), T::from_row)
            .optional()
            .map_err(Into::into)
    }
}

// ============ Companies ============

/// Create a company together with its bootstrap owner.
/// Returns the company, the owner, and the owner's plaintext API key.
pub fn create_company(
    conn: &mut Connection,
    input: &CreateCompany,
) -> Result<(Company, Seller, String)> {
    let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;

    let company_id = EntityType::Company.gen_id();
    let now = now();

    tx.execute(
        "INSERT INTO companies (id, name, plan, created_at, updated_at)
         VALUES (?1, ?2, 'free', ?3, ?4)",
        params![&company_id, &input.name, now, now],
    )?;

    let seller_id = EntityType::Seller.gen_id();
    let email = normalize_email(&input.owner_email);
    let api_key = generate_api_key();
    let api_key_hash = hash_secret(&api_key);

    tx.execute(
        "INSERT INTO sellers (id, company_id, name, email, phone, role, api_key_hash, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, 'owner', ?6, ?7, ?8)",
        params![
            &seller_id,
            &company_id,
            &input.owner_name,
            &email,
            &input.owner_phone,
            &api_key_hash,
            now,
            now
        ],
    )?;

    tx.commit()?;

    let company = Company {
        id: company_id.clone(),
        name: input.name.clone(),
        plan: Plan::Free,
        created_at: now,
        updated_at: now,
        deleted_at: None,
    };
    let owner = Seller {
        id: seller_id,
        company_id,
        name: input.owner_name.clone(),
        email,
        phone: input.owner_phone.clone(),
        role: SellerRole::Owner,
        api_key_hash,
        created_at: now,
        updated_at: now,
        deleted_at: None,
    };

    Ok((company, owner, api_key))
}

pub fn get_company_by_id(conn: &Connection, id: &str) -> Result<Option<Company>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM companies WHERE id = ?1 AND deleted_at IS NULL",
            COMPANY_COLS
        ),
        &[&id],
    )
}

/// Update a company. Returns the updated company, or None if not found.
pub fn update_company(
    conn: &Connection,
    id: &str,
    input: &UpdateCompany,
) -> Result<Option<Company>> {
    UpdateBuilder::new("companies", id)
        .with_updated_at()
        .only_active()
        .set_opt("name", input.name.clone())
        .execute_returning(conn, COMPANY_COLS)
}

// ============ Sellers ============

/// Generate an API key with the gs_live_ prefix.
pub fn generate_api_key() -> String {
    format!(
        "gs_live_{}{}",
        Uuid::new_v4().as_simple(),
        Uuid::new_v4().as_simple()
    )
}

/// Get an active seller by API key, provided their company is active too.
pub fn get_seller_by_api_key(conn: &Connection, api_key: &str) -> Result<Option<Seller>> {
    let hash = hash_secret(api_key);
    query_one(
        conn,
        &format!(
            "SELECT {} FROM sellers
             WHERE api_key_hash = ?1 AND deleted_at IS NULL
               AND company_id IN (SELECT id FROM companies WHERE deleted_at IS NULL)",
            SELLER_COLS
        ),
        &[&hash],
    )
}

/// Create a seller. Returns the seller and their plaintext API key.
/// Fails with Conflict when the email is already used by an active seller.
pub fn create_seller(
    conn: &Connection,
    company_id: &str,
    input: &CreateSeller,
) -> Result<(Seller, String)> {
    let id = EntityType::Seller.gen_id();
    let now = now();
    let email = normalize_email(&input.email);
    let api_key = generate_api_key();
    let api_key_hash = hash_secret(&api_key);

    conn.execute(
        "INSERT INTO sellers (id, company_id, name, email, phone, role, api_key_hash, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            &id,
            company_id,
            &input.name,
            &email,
            &input.phone,
            input.role.as_str(),
            &api_key_hash,
            now,
            now
        ],
    )
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict("A seller with this email already exists".into())
        } else {
            e.into()
        }
    })?;

    Ok((
        Seller {
            id,
            company_id: company_id.to_string(),
            name: input.name.clone(),
            email,
            phone: input.phone.clone(),
            role: input.role,
            api_key_hash,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        },
        api_key,
    ))
}

pub fn get_seller(conn: &Connection, company_id: &str, id: &str) -> Result<Option<Seller>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM sellers WHERE id = ?1 AND company_id = ?2 AND deleted_at IS NULL",
            SELLER_COLS
        ),
        &[&id, &company_id],
    )
}

/// Look up an active seller without tenant scoping. Server-internal flows
/// only (the OAuth callback knows a seller id but has no authenticated
/// company).
pub fn get_seller_by_id(conn: &Connection, id: &str) -> Result<Option<Seller>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM sellers WHERE id = ?1 AND deleted_at IS NULL",
            SELLER_COLS
        ),
        &[&id],
    )
}

pub fn list_sellers(
    conn: &Connection,
    company_id: &str,
    include_deactivated: bool,
) -> Result<Vec<Seller>> {
    let deleted_filter = if include_deactivated {
        ""
    } else {
        "AND deleted_at IS NULL"
    };
    query_all(
        conn,
        &format!(
            "SELECT {} FROM sellers WHERE company_id = ?1 {} ORDER BY created_at ASC",
            SELLER_COLS, deleted_filter
        ),
        &[&company_id],
    )
}

/// Update a seller. Returns the updated seller, or None if not found.
pub fn update_seller(
    conn: &Connection,
    company_id: &str,
    id: &str,
    input: &UpdateSeller,
) -> Result<Option<Seller>> {
    let mut builder = UpdateBuilder::new("sellers", id)
        .scope_company(company_id)
        .only_active()
        .with_updated_at()
        .set_opt("name", input.name.clone())
        .set_opt("role", input.role.map(|r| r.as_str().to_string()));

    // Handle phone: Option<Option<String>>
    if let Some(ref phone) = input.phone {
        builder = builder.set_nullable("phone", phone.clone());
    }

    builder.execute_returning(conn, SELLER_COLS)
}

/// Deactivate (soft delete) a seller; their API key stops working
/// immediately. Returns true if the seller was active.
pub fn deactivate_seller(conn: &Connection, company_id: &str, id: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE sellers SET deleted_at = ?1, updated_at = ?1
         WHERE id = ?2 AND company_id = ?3 AND deleted_at IS NULL",
        params![now(), id, company_id],
    )?;
    Ok(affected > 0)
}

/// Replace a seller's API key. Returns the seller and the new plaintext key.
pub fn rotate_seller_api_key(
    conn: &Connection,
    company_id: &str,
    id: &str,
) -> Result<Option<(Seller, String)>> {
    let api_key = generate_api_key();
    let api_key_hash = hash_secret(&api_key);

    let seller: Option<Seller> = UpdateBuilder::new("sellers", id)
        .scope_company(company_id)
        .only_active()
        .with_updated_at()
        .set("api_key_hash", api_key_hash)
        .execute_returning(conn, SELLER_COLS)?;

    Ok(seller.map(|s| (s, api_key)))
}

pub fn count_active_sellers(conn: &Connection, company_id: &str) -> Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM sellers WHERE company_id = ?1 AND deleted_at IS NULL",
        params![company_id],
        |row| row.get(0),
    )
    .map_err(Into::into)
}

pub fn count_active_owners(conn: &Connection, company_id: &str) -> Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM sellers
         WHERE company_id = ?1 AND role = 'owner' AND deleted_at IS NULL",
        params![company_id],
        |row| row.get(0),
    )
    .map_err(Into::into)
}

// ============ Deals ============

pub fn create_deal(
    conn: &Connection,
    company_id: &str,
    seller_id: &str,
    input: &CreateDeal,
) -> Result<Deal> {
    let id = EntityType::Deal.gen_id();
    let now = now();

    conn.execute(
        "INSERT INTO deals (id, company_id, seller_id, title, customer_name, customer_email, customer_phone, value_cents, stage, expected_close_at, notes, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 'lead', ?9, ?10, ?11, ?12)",
        params![
            &id,
            company_id,
            seller_id,
            &input.title,
            &input.customer_name,
            &input.customer_email,
            &input.customer_phone,
            input.value_cents,
            input.expected_close_at,
            &input.notes,
            now,
            now
        ],
    )?;

    Ok(Deal {
        id,
        company_id: company_id.to_string(),
        seller_id: seller_id.to_string(),
        title: input.title.clone(),
        customer_name: input.customer_name.clone(),
        customer_email: input.customer_email.clone(),
        customer_phone: input.customer_phone.clone(),
        value_cents: input.value_cents,
        stage: DealStage::Lead,
        expected_close_at: input.expected_close_at,
        notes: input.notes.clone(),
        loss_reason: None,
        closed_at: None,
        created_at: now,
        updated_at: now,
    })
}

pub fn get_deal(conn: &Connection, company_id: &str, id: &str) -> Result<Option<Deal>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM deals WHERE id = ?1 AND company_id = ?2",
            DEAL_COLS
        ),
        &[&id, &company_id],
    )
}

pub fn list_deals(
    conn: &Connection,
    company_id: &str,
    filter: &DealFilter,
) -> Result<(Vec<Deal>, i64)> {
    let mut where_clause = String::from("WHERE company_id = ?");
    let mut filter_params: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(company_id.to_string())];

    if let Some(stage) = filter.stage {
        where_clause.push_str(" AND stage = ?");
        filter_params.push(Box::new(stage.as_str().to_string()));
    }
    if let Some(ref seller_id) = filter.seller_id {
        where_clause.push_str(" AND seller_id = ?");
        filter_params.push(Box::new(seller_id.clone()));
    }
    if let Some(ref period) = filter.created_in {
        let (start, end) = period_bounds(period)?;
        where_clause.push_str(" AND created_at >= ? AND created_at < ?");
        filter_params.push(Box::new(start));
        filter_params.push(Box::new(end));
    }
    if let Some(ref period) = filter.closed_in {
        let (start, end) = period_bounds(period)?;
        where_clause.push_str(" AND closed_at >= ? AND closed_at < ?");
        filter_params.push(Box::new(start));
        filter_params.push(Box::new(end));
    }

    let count_sql = format!("SELECT COUNT(*) FROM deals {}", where_clause);
    let filter_refs: Vec<&dyn rusqlite::ToSql> = filter_params.iter().map(|b| b.as_ref()).collect();
    let total: i64 = conn.query_row(&count_sql, filter_refs.as_slice(), |row| row.get(0))?;

    let select_sql = format!(
        "SELECT {} FROM deals {} ORDER BY created_at DESC LIMIT ? OFFSET ?",
        DEAL_COLS, where_clause
    );
    let limit = filter.limit();
    let offset = filter.offset();
    let mut select_params = filter_params;
    select_params.push(Box::new(limit));
    select_params.push(Box::new(offset));
    let select_refs: Vec<&dyn rusqlite::ToSql> = select_params.iter().map(|b| b.as_ref()).collect();

    let deals = query_all(conn, &select_sql, select_refs.as_slice())?;
    Ok((deals, total))
}

/// Update a deal's editable fields. Stage changes go through
/// `move_deal_stage` so the closed_at bookkeeping stays consistent.
pub fn update_deal(
    conn: &Connection,
    company_id: &str,
    id: &str,
    input: &UpdateDeal,
) -> Result<Option<Deal>> {
    let mut builder = UpdateBuilder::new("deals", id)
        .scope_company(company_id)
        .with_updated_at()
        .set_opt("title", input.title.clone())
        .set_opt("customer_name", input.customer_name.clone())
        .set_opt("value_cents", input.value_cents);

    if let Some(ref customer_email) = input.customer_email {
        builder = builder.set_nullable("customer_email", customer_email.clone());
    }
    if let Some(ref customer_phone) = input.customer_phone {
        builder = builder.set_nullable("customer_phone", customer_phone.clone());
    }
    if let Some(expected_close_at) = input.expected_close_at {
        builder = builder.set_nullable("expected_close_at", expected_close_at);
    }
    if let Some(ref notes) = input.notes {
        builder = builder.set_nullable("notes", notes.clone());
    }

    builder.execute_returning(conn, DEAL_COLS)
}

/// Move a deal to another stage.
///
/// Entering won or lost stamps closed_at; leaving them clears it and the
/// loss reason. A single UPDATE keeps the row consistent with the stage
/// CHECK constraint.
pub fn move_deal_stage(
    conn: &Connection,
    company_id: &str,
    id: &str,
    stage: DealStage,
    loss_reason: Option<&str>,
) -> Result<Option<Deal>> {
    let now = now();
    let closed_at = if stage.is_terminal() { Some(now) } else { None };
    let loss_reason = if stage == DealStage::Lost {
        loss_reason
    } else {
        None
    };

    conn.query_row(
        &format!(
            "UPDATE deals SET stage = ?1, closed_at = ?2, loss_reason = ?3, updated_at = ?4
             WHERE id = ?5 AND company_id = ?6 RETURNING {}",
            DEAL_COLS
        ),
        params![stage.as_str(), closed_at, loss_reason, now, id, company_id],
        Deal::from_row,
    )
    .optional()
    .map_err(Into::into)
}

pub fn delete_deal(conn: &Connection, company_id: &str, id: &str) -> Result<bool> {
    let deleted = conn.execute(
        "DELETE FROM deals WHERE id = ?1 AND company_id = ?2",
        params![id, company_id],
    )?;
    Ok(deleted > 0)
}

/// Aggregate the pipeline by stage. Stages with no deals still appear with
/// zero counts so clients render a complete funnel.
pub fn pipeline_summary(
    conn: &Connection,
    company_id: &str,
    seller_id: Option<&str>,
) -> Result<PipelineSummary> {
    use std::collections::HashMap;

    let mut by_stage: HashMap<String, (i64, i64)> = HashMap::new();
    let rows: Vec<(String, i64, i64)> = match seller_id {
        Some(seller_id) => {
            let mut stmt = conn.prepare(
                "SELECT stage, COUNT(*), COALESCE(SUM(value_cents), 0) FROM deals
                 WHERE company_id = ?1 AND seller_id = ?2 GROUP BY stage",
            )?;
            let rows = stmt
                .query_map(params![company_id, seller_id], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
                })?
                .collect::<std::result::Result<_, _>>()?;
            rows
        }
        None => {
            let mut stmt = conn.prepare(
                "SELECT stage, COUNT(*), COALESCE(SUM(value_cents), 0) FROM deals
                 WHERE company_id = ?1 GROUP BY stage",
            )?;
            let rows = stmt
                .query_map(params![company_id], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
                })?
                .collect::<std::result::Result<_, _>>()?;
            rows
        }
    };
    for (stage, count, value) in rows {
        by_stage.insert(stage, (count, value));
    }

    let mut stages = Vec::with_capacity(6);
    let mut open_count = 0;
    let mut open_value_cents = 0;
    for stage in DealStage::all() {
        let (count, value_cents) = by_stage.get(stage.as_str()).copied().unwrap_or((0, 0));
        if !stage.is_terminal() {
            open_count += count;
            open_value_cents += value_cents;
        }
        stages.push(StageSummary {
            stage,
            count,
            value_cents,
        });
    }

    Ok(PipelineSummary {
        stages,
        open_count,
        open_value_cents,
    })
}

/// Count and sum deals won in [start, end), for the whole company or one
/// seller.
pub fn won_totals(
    conn: &Connection,
    company_id: &str,
    seller_id: Option<&str>,
    start: i64,
    end: i64,
) -> Result<(i64, i64)> {
    match seller_id {
        Some(seller_id) => conn
            .query_row(
                "SELECT COUNT(*), COALESCE(SUM(value_cents), 0) FROM deals
                 WHERE company_id = ?1 AND seller_id = ?2 AND stage = 'won'
                   AND closed_at >= ?3 AND closed_at < ?4",
                params![company_id, seller_id, start, end],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map_err(Into::into),
        None => conn
            .query_row(
                "SELECT COUNT(*), COALESCE(SUM(value_cents), 0) FROM deals
                 WHERE company_id = ?1 AND stage = 'won'
                   AND closed_at >= ?2 AND closed_at < ?3",
                params![company_id, start, end],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map_err(Into::into),
    }
}

// ============ Metas ============

/// Create or replace the meta for (company, seller, period). The partial
/// unique indexes distinguish the per-seller and company-wide cases, so the
/// upsert needs a conflict target per case.
pub fn upsert_meta(conn: &Connection, company_id: &str, input: &UpsertMeta) -> Result<Meta> {
    let id = EntityType::Meta.gen_id();
    let now = now();

    let sql = if input.seller_id.is_some() {
        format!(
            "INSERT INTO metas (id, company_id, seller_id, period, target_value_cents, target_deals, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT (company_id, seller_id, period) WHERE seller_id IS NOT NULL
             DO UPDATE SET target_value_cents = excluded.target_value_cents,
                           target_deals = excluded.target_deals,
                           updated_at = excluded.updated_at
             RETURNING {}",
            META_COLS
        )
    } else {
        format!(
            "INSERT INTO metas (id, company_id, seller_id, period, target_value_cents, target_deals, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT (company_id, period) WHERE seller_id IS NULL
             DO UPDATE SET target_value_cents = excluded.target_value_cents,
                           target_deals = excluded.target_deals,
                           updated_at = excluded.updated_at
             RETURNING {}",
            META_COLS
        )
    };

    conn.query_row(
        &sql,
        params![
            &id,
            company_id,
            &input.seller_id,
            &input.period,
            input.target_value_cents,
            input.target_deals,
            now,
            now
        ],
        Meta::from_row,
    )
    .map_err(Into::into)
}

pub fn get_meta(conn: &Connection, company_id: &str, id: &str) -> Result<Option<Meta>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM metas WHERE id = ?1 AND company_id = ?2",
            META_COLS
        ),
        &[&id, &company_id],
    )
}

/// The company-wide meta for a period, if one is set.
pub fn get_company_meta(conn: &Connection, company_id: &str, period: &str) -> Result<Option<Meta>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM metas WHERE company_id = ?1 AND period = ?2 AND seller_id IS NULL",
            META_COLS
        ),
        &[&company_id, &period],
    )
}

pub fn list_metas(conn: &Connection, company_id: &str, period: Option<&str>) -> Result<Vec<Meta>> {
    match period {
        Some(period) => query_all(
            conn,
            &format!(
                "SELECT {} FROM metas WHERE company_id = ?1 AND period = ?2
                 ORDER BY seller_id IS NOT NULL, created_at ASC",
                META_COLS
            ),
            &[&company_id, &period],
        ),
        None => query_all(
            conn,
            &format!(
                "SELECT {} FROM metas WHERE company_id = ?1
                 ORDER BY period DESC, seller_id IS NOT NULL, created_at ASC",
                META_COLS
            ),
            &[&company_id],
        ),
    }
}

pub fn delete_meta(conn: &Connection, company_id: &str, id: &str) -> Result<bool> {
    let deleted = conn.execute(
        "DELETE FROM metas WHERE id = ?1 AND company_id = ?2",
        params![id, company_id],
    )?;
    Ok(deleted > 0)
}

/// Join a meta with what was actually won in its period.
pub fn meta_progress(conn: &Connection, meta: Meta) -> Result<MetaProgress> {
    let (start, end) = period_bounds(&meta.period)?;
    let (won_deals, won_value_cents) = won_totals(
        conn,
        &meta.company_id,
        meta.seller_id.as_deref(),
        start,
        end,
    )?;
    Ok(MetaProgress::compute(meta, won_value_cents, won_deals))
}

// ============ Agendamentos ============

pub fn create_agendamento(
    conn: &Connection,
    company_id: &str,
    seller_id: &str,
    input: &CreateAgendamento,
    calendar_pending: bool,
) -> Result<Agendamento> {
    let id = EntityType::Agendamento.gen_id();
    let now = now();
    let duration_min = input.duration_min.unwrap_or(30);

    conn.execute(
        "INSERT INTO agendamentos (id, company_id, seller_id, deal_id, customer_name, customer_phone, scheduled_at, duration_min, status, notes, calendar_pending, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 'scheduled', ?9, ?10, ?11, ?12)",
        params![
            &id,
            company_id,
            seller_id,
            &input.deal_id,
            &input.customer_name,
            &input.customer_phone,
            input.scheduled_at,
            duration_min,
            &input.notes,
            calendar_pending as i32,
            now,
            now
        ],
    )?;

    Ok(Agendamento {
        id,
        company_id: company_id.to_string(),
        seller_id: seller_id.to_string(),
        deal_id: input.deal_id.clone(),
        customer_name: input.customer_name.clone(),
        customer_phone: input.customer_phone.clone(),
        scheduled_at: input.scheduled_at,
        duration_min,
        status: AgendamentoStatus::Scheduled,
        notes: input.notes.clone(),
        google_event_id: None,
        calendar_pending,
        reminder_sent: false,
        created_at: now,
        updated_at: now,
    })
}

pub fn get_agendamento(
    conn: &Connection,
    company_id: &str,
    id: &str,
) -> Result<Option<Agendamento>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM agendamentos WHERE id = ?1 AND company_id = ?2",
            AGENDAMENTO_COLS
        ),
        &[&id, &company_id],
    )
}

pub fn list_agendamentos(
    conn: &Connection,
    company_id: &str,
    filter: &AgendamentoFilter,
) -> Result<(Vec<Agendamento>, i64)> {
    let mut where_clause = String::from("WHERE company_id = ?");
    let mut filter_params: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(company_id.to_string())];

    if let Some(status) = filter.status {
        where_clause.push_str(" AND status = ?");
        filter_params.push(Box::new(status.as_str().to_string()));
    }
    if let Some(ref seller_id) = filter.seller_id {
        where_clause.push_str(" AND seller_id = ?");
        filter_params.push(Box::new(seller_id.clone()));
    }
    if let Some(from) = filter.from {
        where_clause.push_str(" AND scheduled_at >= ?");
        filter_params.push(Box::new(from));
    }
    if let Some(to) = filter.to {
        where_clause.push_str(" AND scheduled_at < ?");
        filter_params.push(Box::new(to));
    }

    let count_sql = format!("SELECT COUNT(*) FROM agendamentos {}", where_clause);
    let filter_refs: Vec<&dyn rusqlite::ToSql> = filter_params.iter().map(|b| b.as_ref()).collect();
    let total: i64 = conn.query_row(&count_sql, filter_refs.as_slice(), |row| row.get(0))?;

    let select_sql = format!(
        "SELECT {} FROM agendamentos {} ORDER BY scheduled_at ASC LIMIT ? OFFSET ?",
        AGENDAMENTO_COLS, where_clause
    );
    let limit = filter.limit();
    let offset = filter.offset();
    let mut select_params = filter_params;
    select_params.push(Box::new(limit));
    select_params.push(Box::new(offset));
    let select_refs: Vec<&dyn rusqlite::ToSql> = select_params.iter().map(|b| b.as_ref()).collect();

    let items = query_all(conn, &select_sql, select_refs.as_slice())?;
    Ok((items, total))
}

pub fn update_agendamento(
    conn: &Connection,
    company_id: &str,
    id: &str,
    input: &UpdateAgendamento,
    mark_calendar_pending: bool,
) -> Result<Option<Agendamento>> {
    let mut builder = UpdateBuilder::new("agendamentos", id)
        .scope_company(company_id)
        .with_updated_at()
        .set_opt("customer_name", input.customer_name.clone())
        .set_opt("scheduled_at", input.scheduled_at)
        .set_opt("duration_min", input.duration_min);

    if let Some(ref customer_phone) = input.customer_phone {
        builder = builder.set_nullable("customer_phone", customer_phone.clone());
    }
    if let Some(ref deal_id) = input.deal_id {
        builder = builder.set_nullable("deal_id", deal_id.clone());
    }
    if let Some(ref notes) = input.notes {
        builder = builder.set_nullable("notes", notes.clone());
    }
    // Rescheduling resets the reminder so the new time gets one
    if input.scheduled_at.is_some() {
        builder = builder.set("reminder_sent", 0i64);
    }
    if mark_calendar_pending {
        builder = builder.set("calendar_pending", 1i64);
    }

    builder.execute_returning(conn, AGENDAMENTO_COLS)
}

pub fn set_agendamento_status(
    conn: &Connection,
    company_id: &str,
    id: &str,
    status: AgendamentoStatus,
    mark_calendar_pending: bool,
) -> Result<Option<Agendamento>> {
    let mut builder = UpdateBuilder::new("agendamentos", id)
        .scope_company(company_id)
        .with_updated_at()
        .set("status", status.as_str().to_string());

    if mark_calendar_pending {
        builder = builder.set("calendar_pending", 1i64);
    }

    builder.execute_returning(conn, AGENDAMENTO_COLS)
}

pub fn delete_agendamento(conn: &Connection, company_id: &str, id: &str) -> Result<bool> {
    let deleted = conn.execute(
        "DELETE FROM agendamentos WHERE id = ?1 AND company_id = ?2",
        params![id, company_id],
    )?;
    Ok(deleted > 0)
}

/// Record a successful calendar push: remember the event and clear the
/// pending flag.
pub fn set_agendamento_event(conn: &Connection, id: &str, event_id: &str) -> Result<()> {
    conn.execute(
        "UPDATE agendamentos SET google_event_id = ?1, calendar_pending = 0 WHERE id = ?2",
        params![event_id, id],
    )?;
    Ok(())
}

pub fn clear_calendar_pending(conn: &Connection, id: &str) -> Result<()> {
    conn.execute(
        "UPDATE agendamentos SET calendar_pending = 0 WHERE id = ?1",
        params![id],
    )?;
    Ok(())
}

/// Forget a remote event (after it was deleted in Google).
pub fn clear_agendamento_event(conn: &Connection, id: &str) -> Result<()> {
    conn.execute(
        "UPDATE agendamentos SET google_event_id = NULL, calendar_pending = 0 WHERE id = ?1",
        params![id],
    )?;
    Ok(())
}

/// Calls whose latest change has not reached Google yet, restricted to
/// sellers that are active and still connected.
pub fn list_calendar_pending(conn: &Connection, limit: i64) -> Result<Vec<Agendamento>> {
    let cols: String = AGENDAMENTO_COLS
        .split(", ")
        .map(|c| format!("a.{}", c))
        .collect::<Vec<_>>()
        .join(", ");
    query_all(
        conn,
        &format!(
            "SELECT {} FROM agendamentos a
             JOIN sellers s ON s.id = a.seller_id AND s.deleted_at IS NULL
             JOIN calendar_accounts ca ON ca.seller_id = a.seller_id
             WHERE a.calendar_pending = 1
             ORDER BY a.updated_at ASC LIMIT ?1",
            cols
        ),
        &[&limit],
    )
}

/// Scheduled calls starting within the next seven days.
pub fn count_upcoming_agendamentos(conn: &Connection, company_id: &str, now: i64) -> Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM agendamentos
         WHERE company_id = ?1 AND status = 'scheduled'
           AND scheduled_at >= ?2 AND scheduled_at < ?3",
        params![company_id, now, now + 7 * 86400],
        |row| row.get(0),
    )
    .map_err(Into::into)
}

/// A scheduled call whose reminder window has opened, joined with the
/// seller the SMS goes to.
#[derive(Debug)]
pub struct ReminderCandidate {
    pub agendamento_id: String,
    pub company_id: String,
    pub seller_id: String,
    pub seller_name: String,
    pub seller_phone: String,
    pub customer_name: String,
    pub scheduled_at: i64,
}

/// Calls starting within the next `lead_minutes` that have not been
/// reminded, for sellers with a phone on file.
pub fn list_due_reminder_candidates(
    conn: &Connection,
    now: i64,
    lead_minutes: i64,
) -> Result<Vec<ReminderCandidate>> {
    let horizon = now + lead_minutes * 60;
    let mut stmt = conn.prepare(
        "SELECT a.id, a.company_id, a.seller_id, s.name, s.phone, a.customer_name, a.scheduled_at
         FROM agendamentos a
         JOIN sellers s ON s.id = a.seller_id AND s.deleted_at IS NULL
         WHERE a.status = 'scheduled' AND a.reminder_sent = 0
           AND s.phone IS NOT NULL
           AND a.scheduled_at > ?1 AND a.scheduled_at <= ?2",
    )?;
    let candidates = stmt
        .query_map(params![now, horizon], |row| {
            Ok(ReminderCandidate {
                agendamento_id: row.get(0)?,
                company_id: row.get(1)?,
                seller_id: row.get(2)?,
                seller_name: row.get(3)?,
                seller_phone: row.get(4)?,
                customer_name: row.get(5)?,
                scheduled_at: row.get(6)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(candidates)
}

/// Atomically claim a reminder. Returns false when another worker (or a
/// previous run) already claimed it, so each call is reminded at most once.
pub fn try_claim_reminder(conn: &Connection, agendamento_id: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE agendamentos SET reminder_sent = 1
         WHERE id = ?1 AND reminder_sent = 0 AND status = 'scheduled'",
        params![agendamento_id],
    )?;
    Ok(affected > 0)
}

// ============ Calendar Accounts ============

/// Connect (or reconnect) a seller's Google Calendar. Reconnecting keeps
/// the original connected_at and replaces the tokens.
pub fn upsert_calendar_account(
    conn: &Connection,
    seller_id: &str,
    google_email: &str,
    access_token_enc: &[u8],
    refresh_token_enc: &[u8],
    token_expires_at: i64,
) -> Result<CalendarAccount> {
    let id = EntityType::CalendarAccount.gen_id();
    let now = now();

    conn.query_row(
        &format!(
            "INSERT INTO calendar_accounts (id, seller_id, google_email, access_token, refresh_token, token_expires_at, calendar_id, connected_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'primary', ?7)
             ON CONFLICT (seller_id) DO UPDATE SET
                 google_email = excluded.google_email,
                 access_token = excluded.access_token,
                 refresh_token = excluded.refresh_token,
                 token_expires_at = excluded.token_expires_at
             RETURNING {}",
            CALENDAR_ACCOUNT_COLS
        ),
        params![
            &id,
            seller_id,
            google_email,
            access_token_enc,
            refresh_token_enc,
            token_expires_at,
            now
        ],
        CalendarAccount::from_row,
    )
    .map_err(Into::into)
}

pub fn get_calendar_account_by_seller(
    conn: &Connection,
    seller_id: &str,
) -> Result<Option<CalendarAccount>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM calendar_accounts WHERE seller_id = ?1",
            CALENDAR_ACCOUNT_COLS
        ),
        &[&seller_id],
    )
}

/// Store a refreshed access token (and, when Google rotated it, the new
/// refresh token).
pub fn update_calendar_tokens(
    conn: &Connection,
    seller_id: &str,
    access_token_enc: &[u8],
    token_expires_at: i64,
    refresh_token_enc: Option<&[u8]>,
) -> Result<()> {
    match refresh_token_enc {
        Some(refresh) => {
            conn.execute(
                "UPDATE calendar_accounts SET access_token = ?1, token_expires_at = ?2, refresh_token = ?3
                 WHERE seller_id = ?4",
                params![access_token_enc, token_expires_at, refresh, seller_id],
            )?;
        }
        None => {
            conn.execute(
                "UPDATE calendar_accounts SET access_token = ?1, token_expires_at = ?2
                 WHERE seller_id = ?3",
                params![access_token_enc, token_expires_at, seller_id],
            )?;
        }
    }
    Ok(())
}

pub fn touch_calendar_synced(conn: &Connection, seller_id: &str) -> Result<()> {
    conn.execute(
        "UPDATE calendar_accounts SET last_synced_at = ?1 WHERE seller_id = ?2",
        params![now(), seller_id],
    )?;
    Ok(())
}

pub fn delete_calendar_account(conn: &Connection, seller_id: &str) -> Result<bool> {
    let deleted = conn.execute(
        "DELETE FROM calendar_accounts WHERE seller_id = ?1",
        params![seller_id],
    )?;
    Ok(deleted > 0)
}

// ============ OAuth States ============

/// Single-use states expire after ten minutes.
const OAUTH_STATE_TTL_SECS: i64 = 600;

/// Create a single-use OAuth state token for a seller's consent flow.
pub fn create_oauth_state(conn: &Connection, seller_id: &str) -> Result<String> {
    let state = format!(
        "{}{}",
        Uuid::new_v4().as_simple(),
        Uuid::new_v4().as_simple()
    );
    let now = now();
    conn.execute(
        "INSERT INTO oauth_states (state, seller_id, created_at, expires_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![&state, seller_id, now, now + OAUTH_STATE_TTL_SECS],
    )?;
    Ok(state)
}

/// Atomically consume a state token. Returns the seller it was issued for,
/// or None when the token is unknown, already used, or expired.
pub fn consume_oauth_state(conn: &Connection, state: &str) -> Result<Option<String>> {
    conn.query_row(
        "DELETE FROM oauth_states WHERE state = ?1 AND expires_at > ?2 RETURNING seller_id",
        params![state, now()],
        |row| row.get(0),
    )
    .optional()
    .map_err(Into::into)
}

pub fn purge_expired_oauth_states(conn: &Connection) -> Result<usize> {
    let deleted = conn.execute(
        "DELETE FROM oauth_states WHERE expires_at <= ?1",
        params![now()],
    )?;
    Ok(deleted)
}

// ============ Subscriptions ============

pub fn create_subscription(
    conn: &Connection,
    company_id: &str,
    plan: Plan,
    mp_preapproval_id: &str,
) -> Result<Subscription> {
    let id = EntityType::Subscription.gen_id();
    let now = now();

    conn.execute(
        "INSERT INTO subscriptions (id, company_id, plan, status, mp_preapproval_id, created_at, updated_at)
         VALUES (?1, ?2, ?3, 'pending', ?4, ?5, ?6)",
        params![&id, company_id, plan.as_str(), mp_preapproval_id, now, now],
    )?;

    Ok(Subscription {
        id,
        company_id: company_id.to_string(),
        plan,
        status: SubscriptionStatus::Pending,
        mp_preapproval_id: mp_preapproval_id.to_string(),
        paid_through: None,
        created_at: now,
        updated_at: now,
    })
}

/// Drop pending checkout rows; a re-checkout replaces them. Rows that ever
/// got past checkout are kept for the paid-through history.
pub fn delete_pending_subscriptions(conn: &Connection, company_id: &str) -> Result<usize> {
    let deleted = conn.execute(
        "DELETE FROM subscriptions WHERE company_id = ?1 AND status = 'pending'",
        params![company_id],
    )?;
    Ok(deleted)
}

/// The subscription that governs a company's access: the newest row that
/// ever got past checkout, falling back to the newest pending one.
pub fn get_subscription_by_company(
    conn: &Connection,
    company_id: &str,
) -> Result<Option<Subscription>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM subscriptions WHERE company_id = ?1
             ORDER BY (status = 'pending') ASC, created_at DESC LIMIT 1",
            SUBSCRIPTION_COLS
        ),
        &[&company_id],
    )
}

pub fn get_subscription_by_preapproval(
    conn: &Connection,
    mp_preapproval_id: &str,
) -> Result<Option<Subscription>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM subscriptions WHERE mp_preapproval_id = ?1",
            SUBSCRIPTION_COLS
        ),
        &[&mp_preapproval_id],
    )
}

pub fn set_subscription_status(
    conn: &Connection,
    id: &str,
    status: SubscriptionStatus,
) -> Result<Option<Subscription>> {
    conn.query_row(
        &format!(
            "UPDATE subscriptions SET status = ?1, updated_at = ?2 WHERE id = ?3 RETURNING {}",
            SUBSCRIPTION_COLS
        ),
        params![status.as_str(), now(), id],
        Subscription::from_row,
    )
    .optional()
    .map_err(Into::into)
}

/// What the company can actually use right now.
pub fn company_effective_plan(conn: &Connection, company: &Company) -> Result<Plan> {
    let subscription = get_subscription_by_company(conn, &company.id)?;
    Ok(effective_plan(company.plan, subscription.as_ref(), now()))
}

/// Outcome of applying a provider notification to our records.
pub enum WebhookOutcome {
    /// The update was fresh and persisted.
    Applied {
        subscription: Subscription,
        company: Option<Company>,
    },
    /// This event id was already processed; acknowledge without writing.
    Duplicate,
    /// The preapproval does not belong to any of our subscriptions;
    /// acknowledge so the provider stops retrying.
    UnknownPreapproval,
}

/// Apply a (re-fetched) preapproval state to the subscription it backs.
///
/// All writes happen in one IMMEDIATE transaction with the dedupe record,
/// so a crash mid-way leaves nothing behind and the provider's retry gets a
/// clean second attempt.
pub fn apply_preapproval_update(
    conn: &mut Connection,
    event_id: &str,
    mp_preapproval_id: &str,
    status: SubscriptionStatus,
    paid_through: Option<i64>,
) -> Result<WebhookOutcome> {
    let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;

    if !try_record_webhook_event(&tx, "mercadopago", event_id)? {
        return Ok(WebhookOutcome::Duplicate);
    }

    let subscription: Option<Subscription> = query_one(
        &tx,
        &format!(
            "SELECT {} FROM subscriptions WHERE mp_preapproval_id = ?1",
            SUBSCRIPTION_COLS
        ),
        &[&mp_preapproval_id],
    )?;
    let Some(subscription) = subscription else {
        // Keep the dedupe record; this preapproval will never be ours
        tx.commit()?;
        return Ok(WebhookOutcome::UnknownPreapproval);
    };

    let now = now();
    tx.execute(
        "UPDATE subscriptions SET status = ?1, paid_through = ?2, updated_at = ?3 WHERE id = ?4",
        params![status.as_str(), paid_through, now, &subscription.id],
    )?;

    // An authorized subscription upgrades the stored plan. Lapses degrade
    // through effective-plan resolution instead of a write here, so the
    // grace window keeps working.
    if status == SubscriptionStatus::Active {
        tx.execute(
            "UPDATE companies SET plan = ?1, updated_at = ?2 WHERE id = ?3 AND deleted_at IS NULL",
            params![subscription.plan.as_str(), now, &subscription.company_id],
        )?;
    }

    let company: Option<Company> = query_one(
        &tx,
        &format!(
            "SELECT {} FROM companies WHERE id = ?1 AND deleted_at IS NULL",
            COMPANY_COLS
        ),
        &[&subscription.company_id],
    )?;

    tx.commit()?;

    Ok(WebhookOutcome::Applied {
        subscription: Subscription {
            status,
            paid_through,
            updated_at: now,
            ..subscription
        },
        company,
    })
}

// ============ Webhook Events ============

pub fn try_record_webhook_event(conn: &Connection, provider: &str, event_id: &str) -> Result<bool> {
    let affected = conn.execute(
        "INSERT OR IGNORE INTO webhook_events (id, provider, event_id, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![Uuid::new_v4().to_string(), provider, event_id, now()],
    )?;
    Ok(affected > 0)
}

/// Purge old webhook events beyond the retention period. These only exist
/// for replay prevention; Mercado Pago retries for a few days at most.
pub fn purge_old_webhook_events(conn: &Connection, retention_days: i64) -> Result<usize> {
    let cutoff = now() - (retention_days * 86400);
    let deleted = conn.execute(
        "DELETE FROM webhook_events WHERE created_at < ?1",
        params![cutoff],
    )?;
    Ok(deleted)
}

// ============ Rankings ============

/// The gamified leaderboard for one month. Every active seller appears,
/// including those with no activity yet. Ties break by won value, then by
/// name so the order is stable.
pub fn period_rankings(
    conn: &Connection,
    company_id: &str,
    period: &str,
) -> Result<Vec<RankingEntry>> {
    use std::collections::HashMap;

    let (start, end) = period_bounds(period)?;

    let sellers = list_sellers(conn, company_id, false)?;

    let mut won: HashMap<String, (i64, i64)> = HashMap::new();
    {
        let mut stmt = conn.prepare(
            "SELECT seller_id, COUNT(*), COALESCE(SUM(value_cents), 0) FROM deals
             WHERE company_id = ?1 AND stage = 'won' AND closed_at >= ?2 AND closed_at < ?3
             GROUP BY seller_id",
        )?;
        let rows = stmt.query_map(params![company_id, start, end], |row| {
            Ok((row.get::<_, String>(0)?, row.get(1)?, row.get(2)?))
        })?;
        for row in rows {
            let (seller_id, count, value) = row?;
            won.insert(seller_id, (count, value));
        }
    }

    let mut completed: HashMap<String, i64> = HashMap::new();
    {
        let mut stmt = conn.prepare(
            "SELECT seller_id, COUNT(*) FROM agendamentos
             WHERE company_id = ?1 AND status = 'completed'
               AND scheduled_at >= ?2 AND scheduled_at < ?3
             GROUP BY seller_id",
        )?;
        let rows = stmt.query_map(params![company_id, start, end], |row| {
            Ok((row.get::<_, String>(0)?, row.get(1)?))
        })?;
        for row in rows {
            let (seller_id, count) = row?;
            completed.insert(seller_id, count);
        }
    }

    let mut targets: HashMap<String, i64> = HashMap::new();
    {
        let mut stmt = conn.prepare(
            "SELECT seller_id, target_value_cents FROM metas
             WHERE company_id = ?1 AND period = ?2 AND seller_id IS NOT NULL",
        )?;
        let rows = stmt.query_map(params![company_id, period], |row| {
            Ok((row.get::<_, String>(0)?, row.get(1)?))
        })?;
        for row in rows {
            let (seller_id, target) = row?;
            targets.insert(seller_id, target);
        }
    }

    let mut entries: Vec<RankingEntry> = sellers
        .into_iter()
        .map(|seller| {
            let (won_deals, won_value_cents) = won.get(&seller.id).copied().unwrap_or((0, 0));
            let completed_calls = completed.get(&seller.id).copied().unwrap_or(0);
            let meta_hit = targets
                .get(&seller.id)
                .map(|&target| target <= 0 || won_value_cents >= target)
                .unwrap_or(false);
            RankingEntry {
                rank: 0,
                seller_id: seller.id,
                seller_name: seller.name,
                points: score(won_deals, won_value_cents, completed_calls, meta_hit),
                won_deals,
                won_value_cents,
                completed_calls,
                meta_hit,
            }
        })
        .collect();

    entries.sort_by(|a, b| {
        b.points
            .cmp(&a.points)
            .then(b.won_value_cents.cmp(&a.won_value_cents))
            .then(a.seller_name.cmp(&b.seller_name))
    });
    for (i, entry) in entries.iter_mut().enumerate() {
        entry.rank = (i + 1) as i64;
    }

    Ok(entries)
}

// ============ Dashboard ============

/// One call that answers the app's home screen: funnel, current month won
/// totals, upcoming calls, company meta progress, and the podium.
///
/// The caller passes the effective plan it already resolved; plans without
/// rankings get an empty podium rather than a 402 (the rest of the dashboard
/// stays useful on the free plan).
pub fn dashboard_summary(
    conn: &Connection,
    company_id: &str,
    period: &str,
    effective_plan: Plan,
) -> Result<DashboardSummary> {
    let (start, end) = period_bounds(period)?;

    let pipeline = pipeline_summary(conn, company_id, None)?;
    let (won_deals, won_value_cents) = won_totals(conn, company_id, None, start, end)?;
    let upcoming_calls = count_upcoming_agendamentos(conn, company_id, now())?;
    let subscription_status = get_subscription_by_company(conn, company_id)?.map(|s| s.status);

    let company_meta = match get_company_meta(conn, company_id, period)? {
        Some(meta) => Some(meta_progress(conn, meta)?),
        None => None,
    };

    let top_sellers = if effective_plan.limits().rankings {
        let mut entries = period_rankings(conn, company_id, period)?;
        entries.truncate(3);
        entries
    } else {
        Vec::new()
    };

    Ok(DashboardSummary {
        period: period.to_string(),
        effective_plan,
        subscription_status,
        pipeline,
        won_deals,
        won_value_cents,
        upcoming_calls,
        company_meta,
        top_sellers,
    })
}

// ============ Audit Logs ============

#[allow(clippy::too_many_arguments)]
pub fn create_audit_log(
    conn: &Connection,
    enabled: bool,
    actor_type: ActorType,
    actor_id: Option<&str>,
    actor_name: Option<&str>,
    action: &str,
    resource_type: &str,
    resource_id: &str,
    resource_name: Option<&str>,
    details: Option<&serde_json::Value>,
    company_id: Option<&str>,
    company_name: Option<&str>,
    ip_address: Option<&str>,
    user_agent: Option<&str>,
) -> Result<AuditLog> {
    let id = EntityType::AuditLog.gen_id();
    let timestamp = now();

    // Skip database insert if audit logging is disabled
    if enabled {
        let details_str = details.map(|d| d.to_string());
        conn.execute(
            "INSERT INTO audit_logs (id, timestamp, actor_type, actor_id, actor_name, action, resource_type, resource_id, resource_name, details, company_id, company_name, ip_address, user_agent)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                &id,
                timestamp,
                actor_type.as_ref(),
                actor_id,
                actor_name,
                action,
                resource_type,
                resource_id,
                resource_name,
                &details_str,
                company_id,
                company_name,
                ip_address,
                user_agent
            ],
        )?;
    }

    Ok(AuditLog {
        id,
        timestamp,
        actor_type,
        actor_id: actor_id.map(String::from),
        actor_name: actor_name.map(String::from),
        action: action.to_string(),
        resource_type: resource_type.to_string(),
        resource_id: resource_id.to_string(),
        resource_name: resource_name.map(String::from),
        details: details.cloned(),
        company_id: company_id.map(String::from),
        company_name: company_name.map(String::from),
        ip_address: ip_address.map(String::from),
        user_agent: user_agent.map(String::from),
    })
}

/// Query a company's audit trail with optional filters, newest first.
pub fn query_audit_logs(
    conn: &Connection,
    company_id: &str,
    query: &AuditLogQuery,
) -> Result<(Vec<AuditLog>, i64)> {
    // Helper to build filter params (avoids duplication between COUNT and SELECT)
    let build_filter_params = || -> Vec<Box<dyn rusqlite::ToSql>> {
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(company_id.to_string())];
        if let Some(ref v) = query.action {
            params.push(Box::new(v.clone()));
        }
        if let Some(ref v) = query.resource_type {
            params.push(Box::new(v.clone()));
        }
        if let Some(ref v) = query.resource_id {
            params.push(Box::new(v.clone()));
        }
        if let Some(ref v) = query.actor_id {
            params.push(Box::new(v.clone()));
        }
        if let Some(v) = query.from_timestamp {
            params.push(Box::new(v));
        }
        if let Some(v) = query.to_timestamp {
            params.push(Box::new(v));
        }
        params
    };

    let mut where_clause = String::from("WHERE company_id = ?");
    if query.action.is_some() {
        where_clause.push_str(" AND action = ?");
    }
    if query.resource_type.is_some() {
        where_clause.push_str(" AND resource_type = ?");
    }
    if query.resource_id.is_some() {
        where_clause.push_str(" AND resource_id = ?");
    }
    if query.actor_id.is_some() {
        where_clause.push_str(" AND actor_id = ?");
    }
    if query.from_timestamp.is_some() {
        where_clause.push_str(" AND timestamp >= ?");
    }
    if query.to_timestamp.is_some() {
        where_clause.push_str(" AND timestamp <= ?");
    }

    let count_sql = format!("SELECT COUNT(*) FROM audit_logs {}", where_clause);
    let filter_params = build_filter_params();
    let filter_refs: Vec<&dyn rusqlite::ToSql> = filter_params.iter().map(|b| b.as_ref()).collect();
    let total: i64 = conn.query_row(&count_sql, filter_refs.as_slice(), |row| row.get(0))?;

    let select_sql = format!(
        "SELECT {} FROM audit_logs {} ORDER BY timestamp DESC LIMIT ? OFFSET ?",
        AUDIT_LOG_COLS, where_clause
    );
    let mut select_params = build_filter_params();
    select_params.push(Box::new(query.limit()));
    select_params.push(Box::new(query.offset()));
    let select_refs: Vec<&dyn rusqlite::ToSql> = select_params.iter().map(|b| b.as_ref()).collect();

    let logs = query_all(conn, &select_sql, select_refs.as_slice())?;
    Ok((logs, total))
}

/// Purge audit logs beyond the retention period. Returns the number of
/// deleted records. Called on startup when AUDIT_LOG_RETENTION_DAYS > 0.
pub fn purge_old_audit_logs(conn: &Connection, retention_days: i64) -> Result<usize> {
    let cutoff = now() - (retention_days * 86400);
    let deleted = conn.execute(
        "DELETE FROM audit_logs WHERE timestamp < ?1",
        params![cutoff],
    )?;
    Ok(deleted)
}

// ============ Demo Seed ============

/// What `--seed` prints at startup.
#[derive(Debug)]
pub struct SeedResult {
    pub company_id: String,
    pub owner_email: String,
    pub owner_api_key: String,
}

/// Create a demo company with a small team, a pipeline, metas, and a couple
/// of scheduled calls. Intended for local development.
pub fn seed_demo_data(conn: &mut Connection) -> Result<SeedResult> {
    let (company, owner, owner_api_key) = create_company(
        conn,
        &CreateCompany {
            name: "Vendas Sul".to_string(),
            owner_name: "Ana Lima".to_string(),
            owner_email: "ana@vendassul.example".to_string(),
            owner_phone: Some("+5551999990001".to_string()),
        },
    )?;

    let (bruno, _) = create_seller(
        conn,
        &company.id,
        &CreateSeller {
            name: "Bruno Costa".to_string(),
            email: "bruno@vendassul.example".to_string(),
            phone: Some("+5551999990002".to_string()),
            role: SellerRole::Manager,
        },
    )?;
    let (carla, _) = create_seller(
        conn,
        &company.id,
        &CreateSeller {
            name: "Carla Souza".to_string(),
            email: "carla@vendassul.example".to_string(),
            phone: None,
            role: SellerRole::Seller,
        },
    )?;

    let deals = [
        (&owner.id, "Pacote anual Loja Mar", "Maria Silva", 250_000_i64),
        (&bruno.id, "Expansão Padaria Trigo", "João Santos", 120_000),
        (&carla.id, "Consultoria Café Norte", "Paula Dias", 80_000),
        (&owner.id, "Renovação Auto Peças BR", "Carlos Souza", 310_000),
    ];
    let mut created = Vec::new();
    for (seller_id, title, customer, value) in deals {
        created.push(create_deal(
            conn,
            &company.id,
            seller_id,
            &CreateDeal {
                title: title.to_string(),
                customer_name: customer.to_string(),
                customer_email: None,
                customer_phone: None,
                value_cents: value,
                seller_id: None,
                expected_close_at: None,
                notes: None,
            },
        )?);
    }

    // Walk two deals down the funnel, close one
    move_deal_stage(conn, &company.id, &created[0].id, DealStage::Qualified, None)?;
    move_deal_stage(conn, &company.id, &created[1].id, DealStage::Proposal, None)?;
    move_deal_stage(conn, &company.id, &created[3].id, DealStage::Won, None)?;

    let period = current_period();
    upsert_meta(
        conn,
        &company.id,
        &UpsertMeta {
            seller_id: None,
            period: period.clone(),
            target_value_cents: 1_000_000,
            target_deals: 10,
        },
    )?;
    upsert_meta(
        conn,
        &company.id,
        &UpsertMeta {
            seller_id: Some(owner.id.clone()),
            period,
            target_value_cents: 300_000,
            target_deals: 3,
        },
    )?;

    let in_two_hours = now() + 7200;
    create_agendamento(
        conn,
        &company.id,
        &owner.id,
        &CreateAgendamento {
            deal_id: Some(created[0].id.clone()),
            customer_name: "Maria Silva".to_string(),
            customer_phone: Some("+5551988880001".to_string()),
            scheduled_at: in_two_hours,
            duration_min: Some(45),
            seller_id: None,
            notes: Some("Apresentar proposta".to_string()),
        },
        false,
    )?;
    create_agendamento(
        conn,
        &company.id,
        &bruno.id,
        &CreateAgendamento {
            deal_id: None,
            customer_name: "João Santos".to_string(),
            customer_phone: None,
            scheduled_at: in_two_hours + 86400,
            duration_min: None,
            seller_id: None,
            notes: None,
        },
        false,
    )?;

    Ok(SeedResult {
        company_id: company.id,
        owner_email: owner.email,
        owner_api_key,
    })
}
