use axum::extract::{Extension, State};
use axum::http::HeaderMap;

use crate::db::{AppState, queries};
use crate::error::{AppError, Result, msg};
use crate::extractors::Json;
use crate::middleware::SellerContext;
use crate::models::{AuditAction, Company, UpdateCompany};
use crate::util::AuditLogBuilder;

/// The authenticated seller's company.
pub async fn get_company(Extension(ctx): Extension<SellerContext>) -> Result<Json<Company>> {
    Ok(Json(ctx.company))
}

pub async fn update_company(
    State(state): State<AppState>,
    Extension(ctx): Extension<SellerContext>,
    headers: HeaderMap,
    Json(input): Json<UpdateCompany>,
) -> Result<Json<Company>> {
    ctx.require_manager()?;
    input.validate()?;

    let conn = state.db.get()?;
    let audit_conn = state.audit.get()?;

    let company = queries::update_company(&conn, &ctx.company.id, &input)?
        .ok_or_else(|| AppError::NotFound(msg::COMPANY_NOT_FOUND.into()))?;

    AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers)
        .context(&ctx)
        .action(AuditAction::UpdateCompany)
        .resource("company", &company.id)
        .resource_name(&company.name)
        .save()?;

    Ok(Json(company))
}
