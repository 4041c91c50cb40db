use axum::extract::{Extension, State};
use axum::http::HeaderMap;

use crate::db::{AppState, queries};
use crate::error::{AppError, Result, msg};
use crate::extractors::{Json, Path, Query};
use crate::middleware::SellerContext;
use crate::models::{AuditAction, CreateDeal, Deal, DealFilter, MoveDealStage, PipelineSummary, UpdateDeal};
use crate::pagination::Paginated;
use crate::util::AuditLogBuilder;

/// Create a deal in the `lead` stage. Managers may attribute it to another
/// seller via `seller_id`; everyone else creates their own.
pub async fn create_deal(
    State(state): State<AppState>,
    Extension(ctx): Extension<SellerContext>,
    headers: HeaderMap,
    Json(input): Json<CreateDeal>,
) -> Result<Json<Deal>> {
    input.validate()?;

    let conn = state.db.get()?;
    let audit_conn = state.audit.get()?;

    let seller_id = match input.seller_id.as_deref() {
        Some(id) if id != ctx.seller.id => {
            if !ctx.can_act_for(id) {
                return Err(AppError::Forbidden(
                    "Only managers can create deals for other sellers".into(),
                ));
            }
            let seller = queries::get_seller(&conn, &ctx.company.id, id)?
                .ok_or_else(|| AppError::BadRequest(msg::SELLER_NOT_FOUND.into()))?;
            seller.id
        }
        _ => ctx.seller.id.clone(),
    };

    let deal = queries::create_deal(&conn, &ctx.company.id, &seller_id, &input)?;

    AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers)
        .context(&ctx)
        .action(AuditAction::CreateDeal)
        .resource("deal", &deal.id)
        .resource_name(&deal.title)
        .details(&serde_json::json!({ "value_cents": deal.value_cents, "seller_id": deal.seller_id }))
        .save()?;

    Ok(Json(deal))
}

pub async fn list_deals(
    State(state): State<AppState>,
    Extension(ctx): Extension<SellerContext>,
    Query(filter): Query<DealFilter>,
) -> Result<Json<Paginated<Deal>>> {
    let conn = state.db.get()?;
    let (deals, total) = queries::list_deals(&conn, &ctx.company.id, &filter)?;
    Ok(Json(Paginated::new(
        deals,
        total,
        filter.limit(),
        filter.offset(),
    )))
}

/// Per-stage counts and values, plus open totals. `seller_id` narrows it to
/// one seller's pipeline.
pub async fn pipeline_summary(
    State(state): State<AppState>,
    Extension(ctx): Extension<SellerContext>,
    Query(filter): Query<DealFilter>,
) -> Result<Json<PipelineSummary>> {
    let conn = state.db.get()?;
    let summary = queries::pipeline_summary(&conn, &ctx.company.id, filter.seller_id.as_deref())?;
    Ok(Json(summary))
}

pub async fn get_deal(
    State(state): State<AppState>,
    Extension(ctx): Extension<SellerContext>,
    Path(deal_id): Path<String>,
) -> Result<Json<Deal>> {
    let conn = state.db.get()?;
    let deal = queries::get_deal(&conn, &ctx.company.id, &deal_id)?
        .ok_or_else(|| AppError::NotFound(msg::DEAL_NOT_FOUND.into()))?;
    Ok(Json(deal))
}

pub async fn update_deal(
    State(state): State<AppState>,
    Extension(ctx): Extension<SellerContext>,
    Path(deal_id): Path<String>,
    headers: HeaderMap,
    Json(input): Json<UpdateDeal>,
) -> Result<Json<Deal>> {
    input.validate()?;

    let conn = state.db.get()?;
    let audit_conn = state.audit.get()?;

    let existing = queries::get_deal(&conn, &ctx.company.id, &deal_id)?
        .ok_or_else(|| AppError::NotFound(msg::DEAL_NOT_FOUND.into()))?;
    if !ctx.can_act_for(&existing.seller_id) {
        return Err(AppError::Forbidden(
            "You can only edit your own deals".into(),
        ));
    }

    let deal = queries::update_deal(&conn, &ctx.company.id, &deal_id, &input)?
        .ok_or_else(|| AppError::NotFound(msg::DEAL_NOT_FOUND.into()))?;

    AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers)
        .context(&ctx)
        .action(AuditAction::UpdateDeal)
        .resource("deal", &deal.id)
        .resource_name(&deal.title)
        .save()?;

    Ok(Json(deal))
}

/// Move a deal through the pipeline. Won/lost stamp `closed_at`; reopening
/// clears it. Losing requires a reason.
pub async fn move_deal_stage(
    State(state): State<AppState>,
    Extension(ctx): Extension<SellerContext>,
    Path(deal_id): Path<String>,
    headers: HeaderMap,
    Json(input): Json<MoveDealStage>,
) -> Result<Json<Deal>> {
    input.validate()?;

    let conn = state.db.get()?;
    let audit_conn = state.audit.get()?;

    let existing = queries::get_deal(&conn, &ctx.company.id, &deal_id)?
        .ok_or_else(|| AppError::NotFound(msg::DEAL_NOT_FOUND.into()))?;
    if !ctx.can_act_for(&existing.seller_id) {
        return Err(AppError::Forbidden(
            "You can only move your own deals".into(),
        ));
    }

    let deal = queries::move_deal_stage(
        &conn,
        &ctx.company.id,
        &deal_id,
        input.stage,
        input.loss_reason.as_deref(),
    )?
    .ok_or_else(|| AppError::NotFound(msg::DEAL_NOT_FOUND.into()))?;

    AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers)
        .context(&ctx)
        .action(AuditAction::MoveDealStage)
        .resource("deal", &deal.id)
        .resource_name(&deal.title)
        .details(&serde_json::json!({
            "from": existing.stage.as_str(),
            "to": deal.stage.as_str(),
        }))
        .save()?;

    Ok(Json(deal))
}

pub async fn delete_deal(
    State(state): State<AppState>,
    Extension(ctx): Extension<SellerContext>,
    Path(deal_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>> {
    let conn = state.db.get()?;
    let audit_conn = state.audit.get()?;

    let existing = queries::get_deal(&conn, &ctx.company.id, &deal_id)?
        .ok_or_else(|| AppError::NotFound(msg::DEAL_NOT_FOUND.into()))?;
    if !ctx.can_act_for(&existing.seller_id) {
        return Err(AppError::Forbidden(
            "You can only delete your own deals".into(),
        ));
    }

    queries::delete_deal(&conn, &ctx.company.id, &deal_id)?;

    AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers)
        .context(&ctx)
        .action(AuditAction::DeleteDeal)
        .resource("deal", &deal_id)
        .resource_name(&existing.title)
        .save()?;

    Ok(Json(serde_json::json!({ "success": true })))
}
