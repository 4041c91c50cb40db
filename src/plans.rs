//! Plan catalogue and feature gating.
//!
//! The catalogue is a static lookup table, not a database table: plans
//! change with deployments, not at runtime. Billing stores which plan a
//! company bought; everything else asks `effective_plan` what the company
//! can actually use right now.

use serde::{Deserialize, Serialize};

use crate::models::{Subscription, SubscriptionStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    Free,
    Starter,
    Pro,
}

impl Plan {
    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::Free => "free",
            Plan::Starter => "starter",
            Plan::Pro => "pro",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "free" => Some(Plan::Free),
            "starter" => Some(Plan::Starter),
            "pro" => Some(Plan::Pro),
            _ => None,
        }
    }

    /// The static plan table.
    pub const fn limits(&self) -> PlanLimits {
        match self {
            Plan::Free => PlanLimits {
                max_sellers: Some(3),
                calendar_sync: false,
                rankings: false,
                call_reminders: false,
                monthly_price_cents: None,
            },
            Plan::Starter => PlanLimits {
                max_sellers: Some(10),
                calendar_sync: true,
                rankings: true,
                call_reminders: false,
                monthly_price_cents: Some(9_700),
            },
            Plan::Pro => PlanLimits {
                max_sellers: None,
                calendar_sync: true,
                rankings: true,
                call_reminders: true,
                monthly_price_cents: Some(19_700),
            },
        }
    }

    /// Plans that can be purchased (everything but free).
    pub fn purchasable(&self) -> bool {
        self.limits().monthly_price_cents.is_some()
    }
}

impl std::str::FromStr for Plan {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Plan::from_str(s).ok_or(())
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct PlanLimits {
    /// None = unlimited.
    pub max_sellers: Option<i64>,
    pub calendar_sync: bool,
    pub rankings: bool,
    pub call_reminders: bool,
    /// None = not purchasable (free).
    pub monthly_price_cents: Option<i64>,
}

impl PlanLimits {
    pub fn seller_cap_reached(&self, active_sellers: i64) -> bool {
        match self.max_sellers {
            Some(cap) => active_sellers >= cap,
            None => false,
        }
    }
}

/// Resolve what a company can use right now from its stored plan and the
/// backing subscription. Pure so it can be unit tested against the clock.
///
/// A paid plan holds while the subscription is active, and through the paid
/// period when collection pauses or the subscription is cancelled. A paid
/// plan with no backing subscription (or one never authorized) is free.
pub fn effective_plan(stored: Plan, subscription: Option<&Subscription>, now: i64) -> Plan {
    if stored == Plan::Free {
        return Plan::Free;
    }

    let Some(sub) = subscription else {
        return Plan::Free;
    };

    match sub.status {
        SubscriptionStatus::Active => stored,
        SubscriptionStatus::PastDue | SubscriptionStatus::Cancelled => {
            if sub.paid_through.is_some_and(|t| t > now) {
                stored
            } else {
                Plan::Free
            }
        }
        SubscriptionStatus::Pending => Plan::Free,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sub(status: SubscriptionStatus, paid_through: Option<i64>) -> Subscription {
        Subscription {
            id: "gs_sub_00000000000000000000000000000001".to_string(),
            company_id: "gs_co_00000000000000000000000000000001".to_string(),
            plan: Plan::Pro,
            status,
            mp_preapproval_id: "mp-pre-1".to_string(),
            paid_through,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn test_table_is_monotonic() {
        let free = Plan::Free.limits();
        let starter = Plan::Starter.limits();
        let pro = Plan::Pro.limits();

        assert!(!free.calendar_sync && starter.calendar_sync && pro.calendar_sync);
        assert!(!free.rankings && starter.rankings && pro.rankings);
        assert!(!free.call_reminders && !starter.call_reminders && pro.call_reminders);
        assert_eq!(free.max_sellers, Some(3));
        assert_eq!(starter.max_sellers, Some(10));
        assert_eq!(pro.max_sellers, None);
    }

    #[test]
    fn test_seller_cap() {
        assert!(Plan::Free.limits().seller_cap_reached(3));
        assert!(!Plan::Free.limits().seller_cap_reached(2));
        assert!(!Plan::Pro.limits().seller_cap_reached(10_000));
    }

    #[test]
    fn test_effective_plan_active() {
        let s = sub(SubscriptionStatus::Active, None);
        assert_eq!(effective_plan(Plan::Pro, Some(&s), 1_000), Plan::Pro);
    }

    #[test]
    fn test_effective_plan_no_subscription() {
        assert_eq!(effective_plan(Plan::Pro, None, 1_000), Plan::Free);
        assert_eq!(effective_plan(Plan::Free, None, 1_000), Plan::Free);
    }

    #[test]
    fn test_effective_plan_pending_is_free() {
        let s = sub(SubscriptionStatus::Pending, None);
        assert_eq!(effective_plan(Plan::Starter, Some(&s), 1_000), Plan::Free);
    }

    #[test]
    fn test_effective_plan_cancelled_grace() {
        let s = sub(SubscriptionStatus::Cancelled, Some(2_000));
        assert_eq!(effective_plan(Plan::Pro, Some(&s), 1_999), Plan::Pro);
        assert_eq!(effective_plan(Plan::Pro, Some(&s), 2_000), Plan::Free);
        assert_eq!(effective_plan(Plan::Pro, Some(&s), 2_001), Plan::Free);
    }

    #[test]
    fn test_effective_plan_past_due_without_paid_through() {
        let s = sub(SubscriptionStatus::PastDue, None);
        assert_eq!(effective_plan(Plan::Pro, Some(&s), 1_000), Plan::Free);
    }
}
