use axum::extract::{Extension, State};

use crate::db::{AppState, queries};
use crate::error::Result;
use crate::extractors::{Json, Query};
use crate::middleware::SellerContext;
use crate::models::{DashboardSummary, current_period, validate_period};

/// One-call overview for the app's landing screen: pipeline totals, the
/// month's won numbers, upcoming calls, company meta progress and a top-3
/// podium. Available on every plan; the podium is empty when the plan has
/// no rankings.
pub async fn get_dashboard(
    State(state): State<AppState>,
    Extension(ctx): Extension<SellerContext>,
    Query(query): Query<super::MetaPeriodQuery>,
) -> Result<Json<DashboardSummary>> {
    let period = match query.period {
        Some(period) => {
            validate_period(&period)?;
            period
        }
        None => current_period(),
    };

    let conn = state.db.get()?;
    let summary = queries::dashboard_summary(&conn, &ctx.company.id, &period, ctx.effective_plan)?;

    Ok(Json(summary))
}
