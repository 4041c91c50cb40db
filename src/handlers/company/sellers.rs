use axum::extract::{Extension, State};
use axum::http::HeaderMap;

use crate::db::{AppState, queries};
use crate::error::{AppError, Result, msg};
use crate::extractors::{Json, Path, Query};
use crate::middleware::SellerContext;
use crate::models::{AuditAction, CreateSeller, Seller, SellerCreated, SellerRole, UpdateSeller};
use crate::util::AuditLogBuilder;

#[derive(Debug, serde::Deserialize, Default)]
pub struct ListSellersQuery {
    /// Include deactivated sellers in the listing.
    #[serde(default)]
    pub include_deactivated: bool,
}

/// Create a seller. The plain API key appears once, in this response.
pub async fn create_seller(
    State(state): State<AppState>,
    Extension(ctx): Extension<SellerContext>,
    headers: HeaderMap,
    Json(input): Json<CreateSeller>,
) -> Result<Json<SellerCreated>> {
    ctx.require_manager()?;
    if input.role == SellerRole::Owner {
        // Only an owner can mint another owner.
        ctx.require_owner()?;
    }
    input.validate()?;

    let conn = state.db.get()?;
    let audit_conn = state.audit.get()?;

    let active = queries::count_active_sellers(&conn, &ctx.company.id)?;
    let limits = ctx.limits();
    if limits.seller_cap_reached(active) {
        return Err(AppError::PlanLimit(format!(
            "The {} plan allows at most {} active sellers",
            ctx.effective_plan.as_str(),
            limits.max_sellers.unwrap_or(active),
        )));
    }

    let (seller, api_key) = queries::create_seller(&conn, &ctx.company.id, &input)?;

    AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers)
        .context(&ctx)
        .action(AuditAction::CreateSeller)
        .resource("seller", &seller.id)
        .resource_name(&seller.name)
        .details(&serde_json::json!({ "email": seller.email, "role": seller.role.as_str() }))
        .save()?;

    Ok(Json(SellerCreated { seller, api_key }))
}

pub async fn list_sellers(
    State(state): State<AppState>,
    Extension(ctx): Extension<SellerContext>,
    Query(query): Query<ListSellersQuery>,
) -> Result<Json<Vec<Seller>>> {
    let conn = state.db.get()?;
    let sellers = queries::list_sellers(&conn, &ctx.company.id, query.include_deactivated)?;
    Ok(Json(sellers))
}

pub async fn get_seller(
    State(state): State<AppState>,
    Extension(ctx): Extension<SellerContext>,
    Path(seller_id): Path<String>,
) -> Result<Json<Seller>> {
    let conn = state.db.get()?;
    let seller = queries::get_seller(&conn, &ctx.company.id, &seller_id)?
        .ok_or_else(|| AppError::NotFound(msg::SELLER_NOT_FOUND.into()))?;
    Ok(Json(seller))
}

pub async fn update_seller(
    State(state): State<AppState>,
    Extension(ctx): Extension<SellerContext>,
    Path(seller_id): Path<String>,
    headers: HeaderMap,
    Json(input): Json<UpdateSeller>,
) -> Result<Json<Seller>> {
    ctx.require_manager()?;
    input.validate()?;

    let conn = state.db.get()?;
    let audit_conn = state.audit.get()?;

    let existing = queries::get_seller(&conn, &ctx.company.id, &seller_id)?
        .ok_or_else(|| AppError::NotFound(msg::SELLER_NOT_FOUND.into()))?;

    if let Some(role) = input.role {
        // Promoting to or demoting from owner is owner-only, and the
        // company must keep at least one active owner.
        if role == SellerRole::Owner || existing.role == SellerRole::Owner {
            ctx.require_owner()?;
        }
        if existing.role == SellerRole::Owner
            && role != SellerRole::Owner
            && queries::count_active_owners(&conn, &ctx.company.id)? <= 1
        {
            return Err(AppError::Conflict(
                "A company needs at least one active owner".into(),
            ));
        }
    }

    let seller = queries::update_seller(&conn, &ctx.company.id, &seller_id, &input)?
        .ok_or_else(|| AppError::NotFound(msg::SELLER_NOT_FOUND.into()))?;

    AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers)
        .context(&ctx)
        .action(AuditAction::UpdateSeller)
        .resource("seller", &seller.id)
        .resource_name(&seller.name)
        .details(&serde_json::json!({ "role": input.role.map(|r| r.as_str()) }))
        .save()?;

    Ok(Json(seller))
}

/// Deactivate a seller. Their API key stops working; their deals, metas and
/// history stay attributed to them.
pub async fn deactivate_seller(
    State(state): State<AppState>,
    Extension(ctx): Extension<SellerContext>,
    Path(seller_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>> {
    ctx.require_manager()?;

    let conn = state.db.get()?;
    let audit_conn = state.audit.get()?;

    let existing = queries::get_seller(&conn, &ctx.company.id, &seller_id)?
        .ok_or_else(|| AppError::NotFound(msg::SELLER_NOT_FOUND.into()))?;

    if existing.role == SellerRole::Owner {
        ctx.require_owner()?;
        if queries::count_active_owners(&conn, &ctx.company.id)? <= 1 {
            return Err(AppError::Conflict(
                "A company needs at least one active owner".into(),
            ));
        }
    }

    queries::deactivate_seller(&conn, &ctx.company.id, &seller_id)?;

    AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers)
        .context(&ctx)
        .action(AuditAction::DeactivateSeller)
        .resource("seller", &seller_id)
        .resource_name(&existing.name)
        .save()?;

    Ok(Json(serde_json::json!({ "success": true })))
}

/// Rotate a seller's API key. The old key stops working immediately.
/// Sellers can rotate their own; managers and owners anyone's.
pub async fn rotate_seller_key(
    State(state): State<AppState>,
    Extension(ctx): Extension<SellerContext>,
    Path(seller_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<SellerCreated>> {
    if !ctx.can_act_for(&seller_id) {
        return Err(AppError::Forbidden(
            "You can only rotate your own API key".into(),
        ));
    }

    let conn = state.db.get()?;
    let audit_conn = state.audit.get()?;

    let (seller, api_key) = queries::rotate_seller_api_key(&conn, &ctx.company.id, &seller_id)?
        .ok_or_else(|| AppError::NotFound(msg::SELLER_NOT_FOUND.into()))?;

    AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers)
        .context(&ctx)
        .action(AuditAction::RotateApiKey)
        .resource("seller", &seller.id)
        .resource_name(&seller.name)
        .save()?;

    Ok(Json(SellerCreated { seller, api_key }))
}
