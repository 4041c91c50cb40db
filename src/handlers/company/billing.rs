use axum::extract::{Extension, State};
use axum::http::HeaderMap;

use crate::db::{AppState, queries};
use crate::error::{AppError, Result, msg};
use crate::extractors::Json;
use crate::middleware::SellerContext;
use crate::models::{
    AuditAction, CheckoutRequest, CheckoutResponse, Subscription, SubscriptionStatus,
    SubscriptionView,
};
use crate::util::AuditLogBuilder;

/// Start a paid-plan checkout. Creates a Mercado Pago preapproval and a
/// `pending` subscription row, and returns the provider's checkout URL.
/// A previous pending checkout is abandoned and replaced; an active or
/// past-due subscription must be cancelled first.
pub async fn create_checkout(
    State(state): State<AppState>,
    Extension(ctx): Extension<SellerContext>,
    headers: HeaderMap,
    Json(input): Json<CheckoutRequest>,
) -> Result<Json<CheckoutResponse>> {
    ctx.require_owner()?;

    let Some(amount_cents) = input.plan.limits().monthly_price_cents else {
        return Err(AppError::BadRequest(
            "The free plan cannot be purchased".into(),
        ));
    };
    let mp = state
        .mercadopago
        .clone()
        .ok_or_else(|| AppError::Unavailable(msg::BILLING_NOT_CONFIGURED.into()))?;

    let existing = {
        let conn = state.db.get()?;
        queries::get_subscription_by_company(&conn, &ctx.company.id)?
    };
    if let Some(sub) = &existing {
        match sub.status {
            SubscriptionStatus::Active | SubscriptionStatus::PastDue => {
                return Err(AppError::Conflict(
                    "The company already has a subscription; cancel it first".into(),
                ));
            }
            SubscriptionStatus::Pending => {
                // Abandoned checkout. Cancel the provider side best-effort;
                // the stale row is dropped below once the new one exists.
                if let Err(e) = mp.cancel_preapproval(&sub.mp_preapproval_id).await {
                    tracing::warn!(
                        preapproval_id = %sub.mp_preapproval_id,
                        error = %e,
                        "could not cancel stale pending preapproval"
                    );
                }
            }
            SubscriptionStatus::Cancelled => {}
        }
    }

    let reason = format!("Game Sales {} plan", input.plan.as_str());
    let preapproval = mp
        .create_preapproval(
            &reason,
            &ctx.company.id,
            &ctx.seller.email,
            amount_cents,
            &state.app_url,
        )
        .await?;
    let init_point = preapproval.init_point.clone().ok_or_else(|| {
        AppError::Upstream("Mercado Pago returned no checkout URL".into())
    })?;

    let conn = state.db.get()?;
    let audit_conn = state.audit.get()?;

    queries::delete_pending_subscriptions(&conn, &ctx.company.id)?;
    let subscription =
        queries::create_subscription(&conn, &ctx.company.id, input.plan, &preapproval.id)?;

    AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers)
        .context(&ctx)
        .action(AuditAction::CreateCheckout)
        .resource("subscription", &subscription.id)
        .resource_name(&reason)
        .details(&serde_json::json!({
            "plan": input.plan.as_str(),
            "preapproval_id": preapproval.id,
        }))
        .save()?;

    tracing::info!(
        company_id = %ctx.company.id,
        plan = input.plan.as_str(),
        preapproval_id = %preapproval.id,
        "checkout created"
    );

    Ok(Json(CheckoutResponse {
        init_point,
        preapproval_id: preapproval.id,
    }))
}

/// The governing subscription plus what the company can use right now.
pub async fn get_subscription(
    State(state): State<AppState>,
    Extension(ctx): Extension<SellerContext>,
) -> Result<Json<SubscriptionView>> {
    ctx.require_owner()?;

    let conn = state.db.get()?;
    let subscription = queries::get_subscription_by_company(&conn, &ctx.company.id)?;

    Ok(Json(SubscriptionView {
        subscription,
        effective_plan: ctx.effective_plan,
    }))
}

/// Cancel the subscription at the provider and locally. Paid time already
/// collected keeps the plan through `paid_through`.
pub async fn cancel_subscription(
    State(state): State<AppState>,
    Extension(ctx): Extension<SellerContext>,
    headers: HeaderMap,
) -> Result<Json<Subscription>> {
    ctx.require_owner()?;

    let mp = state
        .mercadopago
        .clone()
        .ok_or_else(|| AppError::Unavailable(msg::BILLING_NOT_CONFIGURED.into()))?;

    let existing = {
        let conn = state.db.get()?;
        queries::get_subscription_by_company(&conn, &ctx.company.id)?
            .ok_or_else(|| AppError::NotFound(msg::SUBSCRIPTION_NOT_FOUND.into()))?
    };
    if existing.status == SubscriptionStatus::Cancelled {
        return Err(AppError::Conflict(
            "The subscription is already cancelled".into(),
        ));
    }

    // Provider first: if this fails, our row keeps its status and the owner
    // can retry.
    mp.cancel_preapproval(&existing.mp_preapproval_id).await?;

    let conn = state.db.get()?;
    let audit_conn = state.audit.get()?;

    let subscription =
        queries::set_subscription_status(&conn, &existing.id, SubscriptionStatus::Cancelled)?
            .ok_or_else(|| AppError::NotFound(msg::SUBSCRIPTION_NOT_FOUND.into()))?;

    AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers)
        .context(&ctx)
        .action(AuditAction::CancelSubscription)
        .resource("subscription", &subscription.id)
        .details(&serde_json::json!({
            "preapproval_id": subscription.mp_preapproval_id,
            "paid_through": subscription.paid_through,
        }))
        .save()?;

    tracing::info!(
        company_id = %ctx.company.id,
        subscription_id = %subscription.id,
        "subscription cancelled"
    );

    Ok(Json(subscription))
}
