use axum::extract::{Extension, State};
use axum::http::HeaderMap;
use serde::Deserialize;

use crate::db::{AppState, queries};
use crate::error::{AppError, Result, msg};
use crate::extractors::{Json, Path, Query};
use crate::middleware::SellerContext;
use crate::models::{AuditAction, Meta, MetaProgress, UpsertMeta, current_period, validate_period};
use crate::util::AuditLogBuilder;

#[derive(Debug, Deserialize, Default)]
pub struct MetaPeriodQuery {
    /// `YYYY-MM`; defaults to the current month where the endpoint allows.
    pub period: Option<String>,
}

/// Create or replace the meta for (seller, period). `seller_id` absent means
/// the company-wide meta. Upsert keeps one row per scope and period.
pub async fn upsert_meta(
    State(state): State<AppState>,
    Extension(ctx): Extension<SellerContext>,
    headers: HeaderMap,
    Json(input): Json<UpsertMeta>,
) -> Result<Json<Meta>> {
    ctx.require_manager()?;
    input.validate()?;

    let conn = state.db.get()?;
    let audit_conn = state.audit.get()?;

    if let Some(ref seller_id) = input.seller_id {
        queries::get_seller(&conn, &ctx.company.id, seller_id)?
            .ok_or_else(|| AppError::BadRequest(msg::SELLER_NOT_FOUND.into()))?;
    }

    let meta = queries::upsert_meta(&conn, &ctx.company.id, &input)?;

    AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers)
        .context(&ctx)
        .action(AuditAction::UpsertMeta)
        .resource("meta", &meta.id)
        .resource_name(&meta.period)
        .details(&serde_json::json!({
            "seller_id": meta.seller_id,
            "target_value_cents": meta.target_value_cents,
            "target_deals": meta.target_deals,
        }))
        .save()?;

    Ok(Json(meta))
}

pub async fn list_metas(
    State(state): State<AppState>,
    Extension(ctx): Extension<SellerContext>,
    Query(query): Query<MetaPeriodQuery>,
) -> Result<Json<Vec<Meta>>> {
    if let Some(ref period) = query.period {
        validate_period(period)?;
    }
    let conn = state.db.get()?;
    let metas = queries::list_metas(&conn, &ctx.company.id, query.period.as_deref())?;
    Ok(Json(metas))
}

/// Progress of every meta in a period against won deals closed in that
/// month.
pub async fn metas_progress(
    State(state): State<AppState>,
    Extension(ctx): Extension<SellerContext>,
    Query(query): Query<MetaPeriodQuery>,
) -> Result<Json<Vec<MetaProgress>>> {
    let period = match query.period {
        Some(period) => {
            validate_period(&period)?;
            period
        }
        None => current_period(),
    };

    let conn = state.db.get()?;
    let metas = queries::list_metas(&conn, &ctx.company.id, Some(&period))?;
    let mut progress = Vec::with_capacity(metas.len());
    for meta in metas {
        progress.push(queries::meta_progress(&conn, meta)?);
    }
    Ok(Json(progress))
}

pub async fn get_meta(
    State(state): State<AppState>,
    Extension(ctx): Extension<SellerContext>,
    Path(meta_id): Path<String>,
) -> Result<Json<MetaProgress>> {
    let conn = state.db.get()?;
    let meta = queries::get_meta(&conn, &ctx.company.id, &meta_id)?
        .ok_or_else(|| AppError::NotFound(msg::META_NOT_FOUND.into()))?;
    let progress = queries::meta_progress(&conn, meta)?;
    Ok(Json(progress))
}

pub async fn delete_meta(
    State(state): State<AppState>,
    Extension(ctx): Extension<SellerContext>,
    Path(meta_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>> {
    ctx.require_manager()?;

    let conn = state.db.get()?;
    let audit_conn = state.audit.get()?;

    let existing = queries::get_meta(&conn, &ctx.company.id, &meta_id)?
        .ok_or_else(|| AppError::NotFound(msg::META_NOT_FOUND.into()))?;

    queries::delete_meta(&conn, &ctx.company.id, &meta_id)?;

    AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers)
        .context(&ctx)
        .action(AuditAction::DeleteMeta)
        .resource("meta", &meta_id)
        .resource_name(&existing.period)
        .save()?;

    Ok(Json(serde_json::json!({ "success": true })))
}
