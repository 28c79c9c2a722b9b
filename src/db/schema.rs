//! Database schema and types

pub use crate::engine::ConversationState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// SQL schema for initialization
pub const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS tenants (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    phone_number_id TEXT UNIQUE,
    access_token TEXT,
    tree TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_tenants_phone_number ON tenants(phone_number_id);

CREATE TABLE IF NOT EXISTS conversations (
    tenant_id TEXT NOT NULL,
    customer TEXT NOT NULL,
    current_node_key TEXT,
    answers TEXT NOT NULL DEFAULT '{}',
    handoff BOOLEAN NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,

    PRIMARY KEY (tenant_id, customer),
    FOREIGN KEY (tenant_id) REFERENCES tenants(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_conversations_updated ON conversations(tenant_id, updated_at DESC);

CREATE TABLE IF NOT EXISTS processed_messages (
    tenant_id TEXT NOT NULL,
    message_id TEXT NOT NULL,
    received_at TEXT NOT NULL,

    PRIMARY KEY (tenant_id, message_id)
);

CREATE INDEX IF NOT EXISTS idx_processed_messages_received ON processed_messages(received_at);
";

/// Tenant record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tenant {
    pub id: String,
    pub name: String,
    pub phone_number_id: Option<String>,
    #[serde(skip)]
    pub access_token: Option<String>,
    /// Whether the tenant has its own tree (otherwise the default applies)
    pub has_tree: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Tenant {
    /// Outbound channel credentials, if the tenant is fully configured
    pub fn channel(&self) -> Option<TenantChannel> {
        match (&self.phone_number_id, &self.access_token) {
            (Some(phone_number_id), Some(access_token)) => Some(TenantChannel {
                phone_number_id: phone_number_id.clone(),
                access_token: access_token.clone(),
            }),
            _ => None,
        }
    }
}

/// Credentials for sending messages on behalf of a tenant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantChannel {
    pub phone_number_id: String,
    pub access_token: String,
}

/// Conversation record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub tenant_id: String,
    pub customer: String,
    #[serde(flatten)]
    pub state: ConversationState,
    /// Set once the conversation reached an end node; automated replies stop
    pub handoff: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
