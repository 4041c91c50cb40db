use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ActorType {
    Seller,
    Public,
    System,
}

/// Every action the service audit-logs. Serialized snake_case into the
/// `action` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AuditAction {
    CreateCompany,
    UpdateCompany,
    CreateSeller,
    UpdateSeller,
    DeactivateSeller,
    RotateApiKey,
    CreateDeal,
    UpdateDeal,
    MoveDealStage,
    DeleteDeal,
    UpsertMeta,
    DeleteMeta,
    CreateAgendamento,
    UpdateAgendamento,
    UpdateAgendamentoStatus,
    DeleteAgendamento,
    ConnectCalendar,
    DisconnectCalendar,
    CreateCheckout,
    CancelSubscription,
    ProcessBillingWebhook,
    SendCallReminder,
    PurgeAuditLogs,
    SeedDemoData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLog {
    pub id: String,
    pub timestamp: i64,
    pub actor_type: ActorType,
    pub actor_id: Option<String>,
    /// Name of the actor at the time of the action.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor_name: Option<String>,
    pub action: String,
    pub resource_type: String,
    pub resource_id: String,
    /// Name of the resource being acted upon (deal title, seller name, ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_name: Option<String>,
    pub details: Option<serde_json::Value>,
    pub company_id: Option<String>,
    /// Name of the company at the time of the action.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct AuditLogQuery {
    pub action: Option<String>,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub actor_id: Option<String>,
    pub from_timestamp: Option<i64>,
    pub to_timestamp: Option<i64>,
    /// Maximum number of items to return (default: 50, max: 200)
    pub limit: Option<i64>,
    /// Number of items to skip (default: 0)
    pub offset: Option<i64>,
}

impl AuditLogQuery {
    /// Get the limit, clamped to valid range
    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(50).clamp(1, 200)
    }

    /// Get the offset, minimum 0
    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }
}

impl AuditLog {
    /// Format as a human-readable string for display.
    ///
    /// Format: `[TIMESTAMP] [ActorType] "Actor" VERB RESOURCE in "Company"`
    ///
    /// Examples:
    /// - `[2025-03-15 14:32:05] [Seller] "Ana Lima" created deal "Loja Mar"`
    /// - `[2025-03-15 14:32:05] [System] processed billing webhook gs_sub_...`
    pub fn formatted(&self) -> String {
        use chrono::{TimeZone, Utc};

        let timestamp = Utc
            .timestamp_opt(self.timestamp, 0)
            .single()
            .map(|dt| format!("[{}]", dt.format("%Y-%m-%d %H:%M:%S")))
            .unwrap_or_else(|| format!("[{}]", self.timestamp));

        // Fixed width for alignment ([Seller] is 8, pad to match)
        let actor_type = match self.actor_type {
            ActorType::Seller => "[Seller]",
            ActorType::Public => "[Public]",
            ActorType::System => "[System]",
        };

        // Actor name quoted, or (id) if no name
        let actor_display = self
            .actor_name
            .as_ref()
            .map(|n| format!("\"{}\"", n))
            .or_else(|| self.actor_id.as_ref().map(|id| format!("({})", id)))
            .unwrap_or_default();

        let verb_phrase = Self::action_to_verb_phrase(&self.action, &self.resource_type);

        // Resource: prefer name (quoted), fall back to ID
        let resource_display = self
            .resource_name
            .as_ref()
            .map(|n| format!("\"{}\"", n))
            .unwrap_or_else(|| self.resource_id.clone());

        let company_context = if let Some(ref name) = self.company_name {
            format!(" in \"{}\"", name)
        } else if let Some(ref id) = self.company_id {
            format!(" in ({})", id)
        } else {
            String::new()
        };

        format!(
            "{} {} {} {} {}{}",
            timestamp, actor_type, actor_display, verb_phrase, resource_display, company_context
        )
    }

    /// Convert an action string to a past-tense verb phrase.
    /// e.g., "create_deal" -> "created deal"
    fn action_to_verb_phrase(action: &str, resource_type: &str) -> String {
        let parts: Vec<&str> = action.split('_').collect();
        if parts.is_empty() {
            return action.to_string();
        }

        let verb = Self::to_past_tense(parts[0]);

        if parts.len() > 1 {
            let object = parts[1..].join(" ");
            format!("{} {}", verb, object)
        } else {
            format!("{} {}", verb, resource_type)
        }
    }

    /// Convert a verb to past tense.
    fn to_past_tense(verb: &str) -> &str {
        match verb {
            "create" => "created",
            "update" => "updated",
            "delete" => "deleted",
            "move" => "moved",
            "upsert" => "upserted",
            "deactivate" => "deactivated",
            "rotate" => "rotated",
            "connect" => "connected",
            "disconnect" => "disconnected",
            "cancel" => "cancelled",
            "process" => "processed",
            "send" => "sent",
            "purge" => "purged",
            "seed" => "seeded",
            other => other, // Unknown verbs pass through unchanged
        }
    }
}

/// Wrapper for AuditLog that includes a human-readable `formatted` field,
/// so clients can display readable text without re-deriving it.
#[derive(Debug, Clone, Serialize)]
pub struct AuditLogResponse {
    #[serde(flatten)]
    pub log: AuditLog,
    pub formatted: String,
}

impl From<AuditLog> for AuditLogResponse {
    fn from(log: AuditLog) -> Self {
        let formatted = log.formatted();
        Self { log, formatted }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_log() -> AuditLog {
        AuditLog {
            id: "gs_aud_00000000000000000000000000000001".to_string(),
            timestamp: 1704067200, // 2024-01-01T00:00:00Z
            actor_type: ActorType::Seller,
            actor_id: Some("gs_slr_1".to_string()),
            actor_name: Some("Ana Lima".to_string()),
            action: "create_deal".to_string(),
            resource_type: "deal".to_string(),
            resource_id: "gs_deal_1".to_string(),
            resource_name: Some("Loja Mar".to_string()),
            details: None,
            company_id: Some("gs_co_1".to_string()),
            company_name: Some("Vendas Sul".to_string()),
            ip_address: Some("192.168.1.1".to_string()),
            user_agent: Some("test-agent".to_string()),
        }
    }

    #[test]
    fn test_formatted_basic() {
        let formatted = base_log().formatted();
        assert!(formatted.contains("[2024-01-01 00:00:00]"));
        assert!(formatted.contains("[Seller]"));
        assert!(formatted.contains("\"Ana Lima\""));
        assert!(formatted.contains("created deal"));
        assert!(formatted.contains("\"Loja Mar\""));
        assert!(formatted.contains("in \"Vendas Sul\""));
    }

    #[test]
    fn test_formatted_fallback_to_ids() {
        let mut log = base_log();
        log.actor_name = None;
        log.resource_name = None;
        log.company_name = None;

        let formatted = log.formatted();
        assert!(formatted.contains("(gs_slr_1)"));
        assert!(formatted.contains("gs_deal_1"));
        assert!(formatted.contains("in (gs_co_1)"));
    }

    #[test]
    fn test_formatted_system_actor() {
        let mut log = base_log();
        log.actor_type = ActorType::System;
        log.actor_id = None;
        log.actor_name = None;
        log.action = "process_billing_webhook".to_string();
        log.resource_type = "subscription".to_string();

        let formatted = log.formatted();
        assert!(formatted.contains("[System]"));
        assert!(formatted.contains("processed billing webhook"));
    }

    #[test]
    fn test_action_to_verb_phrase() {
        assert_eq!(
            AuditLog::action_to_verb_phrase("create_deal", "deal"),
            "created deal"
        );
        assert_eq!(
            AuditLog::action_to_verb_phrase("move_deal_stage", "deal"),
            "moved deal stage"
        );
        assert_eq!(
            AuditLog::action_to_verb_phrase("rotate_api_key", "seller"),
            "rotated api key"
        );
        assert_eq!(
            AuditLog::action_to_verb_phrase("deactivate_seller", "seller"),
            "deactivated seller"
        );
    }

    #[test]
    fn test_strum_round_trip() {
        assert_eq!(AuditAction::MoveDealStage.as_ref(), "move_deal_stage");
        assert_eq!(
            "process_billing_webhook".parse::<AuditAction>().ok(),
            Some(AuditAction::ProcessBillingWebhook)
        );
    }
}
