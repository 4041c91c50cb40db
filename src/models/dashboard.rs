use serde::Serialize;

use crate::plans::Plan;

use super::{MetaProgress, PipelineSummary, RankingEntry, SubscriptionStatus};

/// Everything the app's home screen needs in one response.
#[derive(Debug, Serialize)]
pub struct DashboardSummary {
    /// The period the aggregates cover (current month, `YYYY-MM`).
    pub period: String,
    /// What the company can use right now.
    pub effective_plan: Plan,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_status: Option<SubscriptionStatus>,
    pub pipeline: PipelineSummary,
    pub won_deals: i64,
    pub won_value_cents: i64,
    /// Calls still in `scheduled` starting within the next seven days.
    pub upcoming_calls: i64,
    /// Progress on the company-wide meta for the period, if one is set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_meta: Option<MetaProgress>,
    /// Top of the period leaderboard (at most three entries; empty when the
    /// plan has no rankings).
    pub top_sellers: Vec<RankingEntry>,
}
