use axum::extract::State;
use axum::http::HeaderMap;

use crate::db::{AppState, queries};
use crate::error::Result;
use crate::extractors::Json;
use crate::models::{ActorType, AuditAction, CompanyCreated, CreateCompany};
use crate::util::AuditLogBuilder;

/// Public signup: create a company on the free plan together with its owner
/// seller. The owner's API key is in the response and never retrievable
/// again.
pub async fn create_company(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<CreateCompany>,
) -> Result<Json<CompanyCreated>> {
    input.validate()?;

    let mut conn = state.db.get()?;
    let audit_conn = state.audit.get()?;

    let (company, owner, api_key) = queries::create_company(&mut conn, &input)?;

    AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers)
        .actor(ActorType::Public, None, None)
        .company(&company.id, &company.name)
        .action(AuditAction::CreateCompany)
        .resource("company", &company.id)
        .resource_name(&company.name)
        .details(&serde_json::json!({ "owner_email": owner.email }))
        .save()?;

    tracing::info!(company_id = %company.id, "company created");

    Ok(Json(CompanyCreated {
        company,
        owner,
        api_key,
    }))
}
