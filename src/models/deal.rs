use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result, msg};

use super::validate_non_empty;

/// Pipeline stages. `won`/`lost` are terminal: entering them stamps
/// `closed_at`, leaving them clears it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DealStage {
    Lead,
    Qualified,
    Proposal,
    Negotiation,
    Won,
    Lost,
}

impl DealStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            DealStage::Lead => "lead",
            DealStage::Qualified => "qualified",
            DealStage::Proposal => "proposal",
            DealStage::Negotiation => "negotiation",
            DealStage::Won => "won",
            DealStage::Lost => "lost",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "lead" => Some(DealStage::Lead),
            "qualified" => Some(DealStage::Qualified),
            "proposal" => Some(DealStage::Proposal),
            "negotiation" => Some(DealStage::Negotiation),
            "won" => Some(DealStage::Won),
            "lost" => Some(DealStage::Lost),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DealStage::Won | DealStage::Lost)
    }

    /// All stages in pipeline order, for summaries.
    pub fn all() -> [DealStage; 6] {
        [
            DealStage::Lead,
            DealStage::Qualified,
            DealStage::Proposal,
            DealStage::Negotiation,
            DealStage::Won,
            DealStage::Lost,
        ]
    }
}

impl std::str::FromStr for DealStage {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        DealStage::from_str(s).ok_or(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deal {
    pub id: String,
    pub company_id: String,
    pub seller_id: String,
    pub title: String,
    pub customer_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_phone: Option<String>,
    /// Deal value in centavos (BRL).
    pub value_cents: i64,
    pub stage: DealStage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_close_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Required when the deal is lost.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loss_reason: Option<String>,
    /// Set iff stage is terminal; the month of this timestamp is what metas
    /// and rankings count.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateDeal {
    pub title: String,
    pub customer_name: String,
    #[serde(default)]
    pub customer_email: Option<String>,
    #[serde(default)]
    pub customer_phone: Option<String>,
    pub value_cents: i64,
    /// Managers may create deals on behalf of another seller.
    #[serde(default)]
    pub seller_id: Option<String>,
    #[serde(default)]
    pub expected_close_at: Option<i64>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateDeal {
    pub title: Option<String>,
    pub customer_name: Option<String>,
    #[serde(default, deserialize_with = "super::deserialize_optional_nullable")]
    pub customer_email: Option<Option<String>>,
    #[serde(default, deserialize_with = "super::deserialize_optional_nullable")]
    pub customer_phone: Option<Option<String>>,
    pub value_cents: Option<i64>,
    #[serde(default, deserialize_with = "super::deserialize_optional_nullable")]
    pub expected_close_at: Option<Option<i64>>,
    #[serde(default, deserialize_with = "super::deserialize_optional_nullable")]
    pub notes: Option<Option<String>>,
}

impl CreateDeal {
    pub fn validate(&self) -> Result<()> {
        validate_non_empty(&self.title, "Title cannot be empty")?;
        validate_non_empty(&self.customer_name, msg::NAME_EMPTY)?;
        if self.value_cents < 0 {
            return Err(AppError::BadRequest(msg::VALUE_NEGATIVE.into()));
        }
        Ok(())
    }
}

impl UpdateDeal {
    pub fn validate(&self) -> Result<()> {
        if let Some(ref title) = self.title {
            validate_non_empty(title, "Title cannot be empty")?;
        }
        if let Some(ref name) = self.customer_name {
            validate_non_empty(name, msg::NAME_EMPTY)?;
        }
        if let Some(value_cents) = self.value_cents {
            if value_cents < 0 {
                return Err(AppError::BadRequest(msg::VALUE_NEGATIVE.into()));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct MoveDealStage {
    pub stage: DealStage,
    /// Required when moving to `lost`.
    #[serde(default)]
    pub loss_reason: Option<String>,
}

impl MoveDealStage {
    pub fn validate(&self) -> Result<()> {
        if self.stage == DealStage::Lost {
            let has_reason = self
                .loss_reason
                .as_deref()
                .is_some_and(|r| !r.trim().is_empty());
            if !has_reason {
                return Err(AppError::BadRequest(
                    "A loss reason is required when losing a deal".into(),
                ));
            }
        }
        Ok(())
    }
}

/// One pipeline stage's aggregate for the summary endpoint.
#[derive(Debug, Serialize)]
pub struct StageSummary {
    pub stage: DealStage,
    pub count: i64,
    pub value_cents: i64,
}

#[derive(Debug, Serialize)]
pub struct PipelineSummary {
    pub stages: Vec<StageSummary>,
    /// Open deals only (non-terminal stages).
    pub open_count: i64,
    pub open_value_cents: i64,
}

/// Filters for deal listing.
#[derive(Debug, Deserialize, Default)]
pub struct DealFilter {
    pub stage: Option<DealStage>,
    pub seller_id: Option<String>,
    /// Restrict to deals created in this period (YYYY-MM).
    pub created_in: Option<String>,
    /// Restrict to deals closed in this period (YYYY-MM).
    pub closed_in: Option<String>,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
}

impl DealFilter {
    /// Get the limit, clamped to valid range
    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(50).clamp(1, 200)
    }

    /// Get the offset, minimum 0
    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }
}
