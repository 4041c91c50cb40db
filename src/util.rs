//! Shared utility functions: request metadata extraction and the audit log
//! builder.

use axum::http::HeaderMap;
use rusqlite::Connection;

use crate::db::queries;
use crate::error::Result;
use crate::models::{ActorType, AuditAction, AuditLog};

/// Extract client IP address and user-agent from request headers.
///
/// Tries `x-forwarded-for` first (for proxied requests), then `x-real-ip`,
/// and extracts the `user-agent` header for audit logging.
pub fn extract_request_info(headers: &HeaderMap) -> (Option<String>, Option<String>) {
    let ip = headers
        .get("x-forwarded-for")
        .or_else(|| headers.get("x-real-ip"))
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    let user_agent = headers
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    (ip, user_agent)
}

/// Extract a Bearer token from the Authorization header.
///
/// Returns the token string without the "Bearer " prefix, or None if
/// the header is missing, malformed, or empty after the prefix.
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
}

/// Builder for creating audit log entries.
///
/// Provides a fluent API for constructing audit logs with named methods
/// instead of positional parameters.
///
/// # Example
/// ```ignore
/// AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers)
///     .context(&ctx)
///     .action(AuditAction::CreateDeal)
///     .resource("deal", &deal.id)
///     .resource_name(&deal.title)
///     .details(&serde_json::json!({ "value_cents": deal.value_cents }))
///     .save()?;
/// ```
pub struct AuditLogBuilder<'a> {
    conn: &'a Connection,
    enabled: bool,
    headers: &'a HeaderMap,
    actor_type: ActorType,
    actor_id: Option<&'a str>,
    actor_name: Option<&'a str>,
    action: AuditAction,
    resource_type: &'a str,
    resource_id: &'a str,
    resource_name: Option<&'a str>,
    details: Option<&'a serde_json::Value>,
    company_id: Option<&'a str>,
    company_name: Option<&'a str>,
}

impl<'a> AuditLogBuilder<'a> {
    /// Create a new audit log builder with required parameters.
    pub fn new(conn: &'a Connection, enabled: bool, headers: &'a HeaderMap) -> Self {
        Self {
            conn,
            enabled,
            headers,
            actor_type: ActorType::System,
            actor_id: None,
            actor_name: None,
            action: AuditAction::CreateCompany, // Placeholder, should always be set
            resource_type: "",
            resource_id: "",
            resource_name: None,
            details: None,
            company_id: None,
            company_name: None,
        }
    }

    /// Set the actor explicitly.
    pub fn actor(
        mut self,
        actor_type: ActorType,
        actor_id: Option<&'a str>,
        actor_name: Option<&'a str>,
    ) -> Self {
        self.actor_type = actor_type;
        self.actor_id = actor_id;
        self.actor_name = actor_name;
        self
    }

    /// Set the actor and company from an authenticated seller context.
    pub fn context(self, ctx: &'a crate::middleware::SellerContext) -> Self {
        self.actor(
            ActorType::Seller,
            Some(&ctx.seller.id),
            Some(&ctx.seller.name),
        )
        .company(&ctx.company.id, &ctx.company.name)
    }

    /// Set the action being performed.
    pub fn action(mut self, action: AuditAction) -> Self {
        self.action = action;
        self
    }

    /// Set the resource type and ID being acted upon.
    pub fn resource(mut self, resource_type: &'a str, resource_id: &'a str) -> Self {
        self.resource_type = resource_type;
        self.resource_id = resource_id;
        self
    }

    /// Set a human-readable name for the resource.
    pub fn resource_name(mut self, resource_name: &'a str) -> Self {
        self.resource_name = Some(resource_name);
        self
    }

    /// Set optional details JSON.
    pub fn details(mut self, details: &'a serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Set the company (tenant) context.
    pub fn company(mut self, company_id: &'a str, company_name: &'a str) -> Self {
        self.company_id = Some(company_id);
        self.company_name = Some(company_name);
        self
    }

    /// Save the audit log entry to the database.
    pub fn save(self) -> Result<AuditLog> {
        let (ip, ua) = extract_request_info(self.headers);
        queries::create_audit_log(
            self.conn,
            self.enabled,
            self.actor_type,
            self.actor_id,
            self.actor_name,
            self.action.as_ref(),
            self.resource_type,
            self.resource_id,
            self.resource_name,
            self.details,
            self.company_id,
            self.company_name,
            ip.as_deref(),
            ua.as_deref(),
        )
    }
}
