use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::db::{AppState, queries};
use crate::error::AppError;
use crate::models::{Company, Seller};
use crate::plans::{Plan, PlanLimits};
use crate::util::extract_bearer_token;

/// Authenticated request context: the seller, their company, and the plan
/// the company can actually use right now.
#[derive(Clone)]
pub struct SellerContext {
    pub seller: Seller,
    pub company: Company,
    pub effective_plan: Plan,
}

impl SellerContext {
    pub fn limits(&self) -> PlanLimits {
        self.effective_plan.limits()
    }

    /// Managers and owners run the team: sellers, metas, the audit trail.
    pub fn require_manager(&self) -> Result<(), AppError> {
        if self.seller.role.can_manage_team() {
            Ok(())
        } else {
            Err(AppError::Forbidden(
                "Requires the manager or owner role".into(),
            ))
        }
    }

    /// Billing belongs to the owner alone.
    pub fn require_owner(&self) -> Result<(), AppError> {
        if self.seller.role.can_manage_billing() {
            Ok(())
        } else {
            Err(AppError::Forbidden("Requires the owner role".into()))
        }
    }

    /// Sellers touch their own records; managers and owners the whole
    /// team's.
    pub fn can_act_for(&self, seller_id: &str) -> bool {
        self.seller.id == seller_id || self.seller.role.can_manage_team()
    }

    pub fn require_rankings(&self) -> Result<(), AppError> {
        if self.limits().rankings {
            Ok(())
        } else {
            Err(AppError::PlanLimit(
                "Rankings require the Starter plan or higher".into(),
            ))
        }
    }

    pub fn require_calendar_sync(&self) -> Result<(), AppError> {
        if self.limits().calendar_sync {
            Ok(())
        } else {
            Err(AppError::PlanLimit(
                "Calendar sync requires the Starter plan or higher".into(),
            ))
        }
    }
}

/// Bearer API key auth for the authenticated API surface.
///
/// Resolves the seller, their company, and the effective plan once per
/// request and stashes the context as an extension for handlers.
pub async fn seller_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let api_key = extract_bearer_token(request.headers()).ok_or(AppError::Unauthorized)?;

    let conn = state.db.get()?;
    let seller = queries::get_seller_by_api_key(&conn, api_key)?.ok_or(AppError::Unauthorized)?;
    let company =
        queries::get_company_by_id(&conn, &seller.company_id)?.ok_or(AppError::Unauthorized)?;
    let effective_plan = queries::company_effective_plan(&conn, &company)?;
    drop(conn);

    request.extensions_mut().insert(SellerContext {
        seller,
        company,
        effective_plan,
    });

    Ok(next.run(request).await)
}
