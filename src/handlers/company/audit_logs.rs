use axum::extract::{Extension, State};

use crate::db::{AppState, queries};
use crate::error::Result;
use crate::extractors::{Json, Query};
use crate::middleware::SellerContext;
use crate::models::{AuditLogQuery, AuditLogResponse};
use crate::pagination::Paginated;

/// The company's audit trail, newest first. Managers and owners only.
pub async fn list_audit_logs(
    State(state): State<AppState>,
    Extension(ctx): Extension<SellerContext>,
    Query(query): Query<AuditLogQuery>,
) -> Result<Json<Paginated<AuditLogResponse>>> {
    ctx.require_manager()?;

    let audit_conn = state.audit.get()?;
    let (logs, total) = queries::query_audit_logs(&audit_conn, &ctx.company.id, &query)?;
    let responses: Vec<AuditLogResponse> = logs.into_iter().map(Into::into).collect();

    Ok(Json(Paginated::new(
        responses,
        total,
        query.limit(),
        query.offset(),
    )))
}
