use serde::{Deserialize, Serialize};

use crate::error::{Result, msg};

use super::{validate_email, validate_non_empty};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SellerRole {
    Owner,
    Manager,
    Seller,
}

impl SellerRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            SellerRole::Owner => "owner",
            SellerRole::Manager => "manager",
            SellerRole::Seller => "seller",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "owner" => Some(SellerRole::Owner),
            "manager" => Some(SellerRole::Manager),
            "seller" => Some(SellerRole::Seller),
            _ => None,
        }
    }

    /// Owners and managers administer the team and everyone's records.
    pub fn can_manage_team(&self) -> bool {
        matches!(self, SellerRole::Owner | SellerRole::Manager)
    }

    /// Billing (checkout, cancel) is owner-only.
    pub fn can_manage_billing(&self) -> bool {
        matches!(self, SellerRole::Owner)
    }
}

impl std::str::FromStr for SellerRole {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        SellerRole::from_str(s).ok_or(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Seller {
    pub id: String,
    pub company_id: String,
    pub name: String,
    /// Normalized (NFC, lowercase, trimmed); unique per company.
    pub email: String,
    /// E.164 number used for call reminders.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub role: SellerRole,
    #[serde(skip_serializing)]
    pub api_key_hash: String,
    pub created_at: i64,
    pub updated_at: i64,
    /// Soft delete timestamp (None = active, Some = deactivated at this time)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CreateSeller {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    pub role: SellerRole,
}

impl CreateSeller {
    pub fn validate(&self) -> Result<()> {
        validate_non_empty(&self.name, msg::NAME_EMPTY)?;
        validate_email(&self.email)?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateSeller {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "super::deserialize_optional_nullable")]
    pub phone: Option<Option<String>>,
    pub role: Option<SellerRole>,
}

impl UpdateSeller {
    pub fn validate(&self) -> Result<()> {
        if let Some(ref name) = self.name {
            validate_non_empty(name, msg::NAME_EMPTY)?;
        }
        Ok(())
    }
}

/// Returned once from seller creation / key rotation: the seller plus the
/// plaintext API key (only its hash is stored).
#[derive(Debug, Serialize)]
pub struct SellerCreated {
    #[serde(flatten)]
    pub seller: Seller,
    pub api_key: String,
}
