//! Prefixed ID generation for Game Sales entities.
//!
//! All IDs use a `gs_` brand prefix to guarantee collision avoidance with
//! provider IDs (Mercado Pago preapproval ids, Google event ids, etc.).
//!
//! Format: `gs_{entity}_{uuid_simple}` (32 hex chars, no hyphens)

use uuid::Uuid;

/// Entity types that have prefixed IDs in Game Sales.
#[derive(Debug, Clone, Copy)]
pub enum EntityType {
    Company,
    Seller,
    Deal,
    Meta,
    Agendamento,
    Subscription,
    CalendarAccount,
    AuditLog,
}

impl EntityType {
    /// Returns the prefix for this entity type.
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Company => "gs_co",
            Self::Seller => "gs_slr",
            Self::Deal => "gs_deal",
            Self::Meta => "gs_meta",
            Self::Agendamento => "gs_call",
            Self::Subscription => "gs_sub",
            Self::CalendarAccount => "gs_cal",
            Self::AuditLog => "gs_aud",
        }
    }

    /// Generates a new prefixed ID for this entity type.
    pub fn gen_id(&self) -> String {
        format!("{}_{}", self.prefix(), Uuid::new_v4().as_simple())
    }
}
