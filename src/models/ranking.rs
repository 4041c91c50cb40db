use serde::Serialize;

/// Points for a won deal.
pub const POINTS_PER_WON_DEAL: i64 = 50;
/// One point per R$100 of won value.
pub const WON_VALUE_CENTS_PER_POINT: i64 = 10_000;
/// Points for a completed call.
pub const POINTS_PER_COMPLETED_CALL: i64 = 10;
/// One-time bonus when the seller's meta for the period is hit.
pub const META_HIT_BONUS: i64 = 200;

/// Score a seller's period from their aggregates.
pub fn score(won_deals: i64, won_value_cents: i64, completed_calls: i64, meta_hit: bool) -> i64 {
    let mut points = won_deals * POINTS_PER_WON_DEAL
        + won_value_cents / WON_VALUE_CENTS_PER_POINT
        + completed_calls * POINTS_PER_COMPLETED_CALL;
    if meta_hit {
        points += META_HIT_BONUS;
    }
    points
}

/// One seller's row on the period leaderboard.
#[derive(Debug, Clone, Serialize)]
pub struct RankingEntry {
    /// 1-based position after tie-breaking.
    pub rank: i64,
    pub seller_id: String,
    pub seller_name: String,
    pub points: i64,
    pub won_deals: i64,
    pub won_value_cents: i64,
    pub completed_calls: i64,
    pub meta_hit: bool,
}

#[derive(Debug, Serialize)]
pub struct RankingResponse {
    pub period: String,
    pub entries: Vec<RankingEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score() {
        // 2 won deals, R$1.500,00 won, 3 completed calls, no meta
        assert_eq!(score(2, 150_000, 3, false), 100 + 15 + 30);
        // meta hit adds the flat bonus
        assert_eq!(score(2, 150_000, 3, true), 100 + 15 + 30 + 200);
        // value points truncate, they never round up
        assert_eq!(score(0, 9_999, 0, false), 0);
        assert_eq!(score(0, 10_000, 0, false), 1);
    }
}
