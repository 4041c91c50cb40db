use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result, msg};

use super::validate_non_empty;

/// Call lifecycle. Everything after `scheduled` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgendamentoStatus {
    Scheduled,
    Completed,
    NoShow,
    Cancelled,
}

impl AgendamentoStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgendamentoStatus::Scheduled => "scheduled",
            AgendamentoStatus::Completed => "completed",
            AgendamentoStatus::NoShow => "no_show",
            AgendamentoStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "scheduled" => Some(AgendamentoStatus::Scheduled),
            "completed" => Some(AgendamentoStatus::Completed),
            "no_show" => Some(AgendamentoStatus::NoShow),
            "cancelled" => Some(AgendamentoStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, AgendamentoStatus::Scheduled)
    }
}

impl std::str::FromStr for AgendamentoStatus {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        AgendamentoStatus::from_str(s).ok_or(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agendamento {
    pub id: String,
    pub company_id: String,
    pub seller_id: String,
    /// Optional link to the deal this call is about.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deal_id: Option<String>,
    pub customer_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_phone: Option<String>,
    pub scheduled_at: i64,
    pub duration_min: i64,
    pub status: AgendamentoStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Google Calendar event id once pushed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub google_event_id: Option<String>,
    /// Set when a create/update still needs to reach Google; cleared by a
    /// successful push (inline or by the background sweep).
    pub calendar_pending: bool,
    pub reminder_sent: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateAgendamento {
    #[serde(default)]
    pub deal_id: Option<String>,
    pub customer_name: String,
    #[serde(default)]
    pub customer_phone: Option<String>,
    pub scheduled_at: i64,
    /// Defaults to 30 minutes.
    #[serde(default)]
    pub duration_min: Option<i64>,
    /// Managers may schedule on behalf of another seller.
    #[serde(default)]
    pub seller_id: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateAgendamento {
    pub customer_name: Option<String>,
    #[serde(default, deserialize_with = "super::deserialize_optional_nullable")]
    pub customer_phone: Option<Option<String>>,
    pub scheduled_at: Option<i64>,
    pub duration_min: Option<i64>,
    #[serde(default, deserialize_with = "super::deserialize_optional_nullable")]
    pub deal_id: Option<Option<String>>,
    #[serde(default, deserialize_with = "super::deserialize_optional_nullable")]
    pub notes: Option<Option<String>>,
}

impl CreateAgendamento {
    pub fn validate(&self) -> Result<()> {
        validate_non_empty(&self.customer_name, msg::NAME_EMPTY)?;
        if self.duration_min.is_some_and(|d| d <= 0) {
            return Err(AppError::BadRequest(msg::DURATION_INVALID.into()));
        }
        Ok(())
    }
}

impl UpdateAgendamento {
    pub fn validate(&self) -> Result<()> {
        if let Some(ref name) = self.customer_name {
            validate_non_empty(name, msg::NAME_EMPTY)?;
        }
        if self.duration_min.is_some_and(|d| d <= 0) {
            return Err(AppError::BadRequest(msg::DURATION_INVALID.into()));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateAgendamentoStatus {
    pub status: AgendamentoStatus,
}

/// Filters for call listing.
#[derive(Debug, Deserialize, Default)]
pub struct AgendamentoFilter {
    pub status: Option<AgendamentoStatus>,
    pub seller_id: Option<String>,
    /// Only calls scheduled at/after this unix timestamp.
    pub from: Option<i64>,
    /// Only calls scheduled before this unix timestamp.
    pub to: Option<i64>,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
}

impl AgendamentoFilter {
    /// Get the limit, clamped to valid range
    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(50).clamp(1, 200)
    }

    /// Get the offset, minimum 0
    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }
}
