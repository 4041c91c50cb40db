use axum::extract::{Extension, State};

use crate::db::{AppState, queries};
use crate::error::Result;
use crate::extractors::{Json, Query};
use crate::middleware::SellerContext;
use crate::models::{RankingResponse, current_period, validate_period};

/// The period leaderboard: points from won deals, won value, completed
/// calls and the meta bonus. Starter plan and up.
pub async fn get_rankings(
    State(state): State<AppState>,
    Extension(ctx): Extension<SellerContext>,
    Query(query): Query<super::MetaPeriodQuery>,
) -> Result<Json<RankingResponse>> {
    ctx.require_rankings()?;

    let period = match query.period {
        Some(period) => {
            validate_period(&period)?;
            period
        }
        None => current_period(),
    };

    let conn = state.db.get()?;
    let entries = queries::period_rankings(&conn, &ctx.company.id, &period)?;

    Ok(Json(RankingResponse { period, entries }))
}
