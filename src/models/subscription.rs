use serde::{Deserialize, Serialize};

use crate::plans::Plan;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Created at checkout, not yet authorized by the customer.
    Pending,
    Active,
    /// Provider paused collection (failed charges).
    PastDue,
    Cancelled,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Pending => "pending",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(SubscriptionStatus::Pending),
            "active" => Some(SubscriptionStatus::Active),
            "past_due" => Some(SubscriptionStatus::PastDue),
            "cancelled" => Some(SubscriptionStatus::Cancelled),
            _ => None,
        }
    }

    /// Map a Mercado Pago preapproval status onto ours. Unknown statuses
    /// return None; the webhook acknowledges and ignores them.
    pub fn from_provider(status: &str) -> Option<Self> {
        match status {
            "pending" => Some(SubscriptionStatus::Pending),
            "authorized" => Some(SubscriptionStatus::Active),
            "paused" => Some(SubscriptionStatus::PastDue),
            "cancelled" => Some(SubscriptionStatus::Cancelled),
            _ => None,
        }
    }
}

impl std::str::FromStr for SubscriptionStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SubscriptionStatus::from_str(s).ok_or(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub company_id: String,
    pub plan: Plan,
    pub status: SubscriptionStatus,
    /// Mercado Pago preapproval id; unique, the webhook's lookup key.
    pub mp_preapproval_id: String,
    /// End of the last paid period; access degrades past this after a
    /// cancellation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paid_through: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub plan: Plan,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    /// Provider-hosted checkout URL to send the owner to.
    pub init_point: String,
    pub preapproval_id: String,
}

/// `GET /billing/subscription` payload.
#[derive(Debug, Serialize)]
pub struct SubscriptionView {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription: Option<Subscription>,
    /// What the company can actually use right now.
    pub effective_plan: Plan,
}
