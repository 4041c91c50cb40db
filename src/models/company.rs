use serde::{Deserialize, Serialize};

use crate::error::{Result, msg};
use crate::plans::Plan;

use super::{validate_email, validate_non_empty};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Company {
    pub id: String,
    pub name: String,
    /// Plan purchased through billing; the effective plan may be lower when
    /// the backing subscription has lapsed.
    pub plan: Plan,
    pub created_at: i64,
    pub updated_at: i64,
    /// Soft delete timestamp (None = active, Some = deleted at this time)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CreateCompany {
    pub name: String,
    /// The bootstrap owner seller.
    pub owner_name: String,
    pub owner_email: String,
    #[serde(default)]
    pub owner_phone: Option<String>,
}

impl CreateCompany {
    pub fn validate(&self) -> Result<()> {
        validate_non_empty(&self.name, msg::NAME_EMPTY)?;
        validate_non_empty(&self.owner_name, msg::NAME_EMPTY)?;
        validate_email(&self.owner_email)?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateCompany {
    pub name: Option<String>,
}

impl UpdateCompany {
    pub fn validate(&self) -> Result<()> {
        if let Some(ref name) = self.name {
            validate_non_empty(name, msg::NAME_EMPTY)?;
        }
        Ok(())
    }
}

/// Returned once from company creation: the company, its owner, and the
/// owner's API key (never retrievable again).
#[derive(Debug, Serialize)]
pub struct CompanyCreated {
    pub company: Company,
    pub owner: super::Seller,
    pub api_key: String,
}
