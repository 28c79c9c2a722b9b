//! Trait abstractions for runtime I/O
//!
//! These traits enable testing the bot runtime with mock implementations.

use crate::db::{Tenant, TenantChannel};
use crate::engine::{ConversationState, ResponseAction};
use crate::tree::Tree;
use crate::whatsapp::{TransportError, WhatsAppClient};
use async_trait::async_trait;

/// A customer's conversation as the runtime sees it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredConversation {
    pub state: ConversationState,
    /// While set, the engine is not invoked for this customer
    pub handoff: bool,
}

/// Lookup of tenants and their trees
#[async_trait]
pub trait TenantStore: Send + Sync {
    /// Find the tenant owning a WhatsApp phone number id
    async fn find_tenant_by_phone_number_id(
        &self,
        phone_number_id: &str,
    ) -> Result<Option<Tenant>, String>;

    /// The tenant's own tree; `None` means the default applies
    async fn get_tenant_tree(&self, tenant_id: &str) -> Result<Option<Tree>, String>;
}

/// Storage for conversation state
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Load a customer's conversation, fresh if none is stored
    async fn load_conversation(
        &self,
        tenant_id: &str,
        customer: &str,
    ) -> Result<StoredConversation, String>;

    /// Persist state and handoff flag after an engine call
    async fn save_conversation(
        &self,
        tenant_id: &str,
        customer: &str,
        conversation: &StoredConversation,
    ) -> Result<(), String>;
}

/// Record of inbound message ids for deduplication
#[async_trait]
pub trait InboundLog: Send + Sync {
    /// Returns `false` if the message id was already recorded
    async fn record_inbound(&self, tenant_id: &str, message_id: &str) -> Result<bool, String>;
}

/// Outbound message delivery
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        channel: &TenantChannel,
        to: &str,
        action: &ResponseAction,
    ) -> Result<(), TransportError>;
}

/// Combined storage trait for convenience
pub trait Storage: TenantStore + ConversationStore + InboundLog {}
impl<T: TenantStore + ConversationStore + InboundLog> Storage for T {}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: TenantStore + ?Sized> TenantStore for Arc<T> {
    async fn find_tenant_by_phone_number_id(
        &self,
        phone_number_id: &str,
    ) -> Result<Option<Tenant>, String> {
        (**self).find_tenant_by_phone_number_id(phone_number_id).await
    }

    async fn get_tenant_tree(&self, tenant_id: &str) -> Result<Option<Tree>, String> {
        (**self).get_tenant_tree(tenant_id).await
    }
}

#[async_trait]
impl<T: ConversationStore + ?Sized> ConversationStore for Arc<T> {
    async fn load_conversation(
        &self,
        tenant_id: &str,
        customer: &str,
    ) -> Result<StoredConversation, String> {
        (**self).load_conversation(tenant_id, customer).await
    }

    async fn save_conversation(
        &self,
        tenant_id: &str,
        customer: &str,
        conversation: &StoredConversation,
    ) -> Result<(), String> {
        (**self)
            .save_conversation(tenant_id, customer, conversation)
            .await
    }
}

#[async_trait]
impl<T: InboundLog + ?Sized> InboundLog for Arc<T> {
    async fn record_inbound(&self, tenant_id: &str, message_id: &str) -> Result<bool, String> {
        (**self).record_inbound(tenant_id, message_id).await
    }
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send(
        &self,
        channel: &TenantChannel,
        to: &str,
        action: &ResponseAction,
    ) -> Result<(), TransportError> {
        (**self).send(channel, to, action).await
    }
}

// ============================================================================
// Production Adapters
// ============================================================================

use crate::db::Database;
use std::sync::Arc;

/// Adapter to use Database as Storage
#[derive(Clone)]
pub struct DatabaseStorage {
    db: Database,
}

impl DatabaseStorage {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl TenantStore for DatabaseStorage {
    async fn find_tenant_by_phone_number_id(
        &self,
        phone_number_id: &str,
    ) -> Result<Option<Tenant>, String> {
        self.db
            .get_tenant_by_phone_number_id(phone_number_id)
            .map_err(|e| e.to_string())
    }

    async fn get_tenant_tree(&self, tenant_id: &str) -> Result<Option<Tree>, String> {
        self.db
            .get_tenant_tree(tenant_id)
            .map_err(|e| e.to_string())
    }
}

#[async_trait]
impl ConversationStore for DatabaseStorage {
    async fn load_conversation(
        &self,
        tenant_id: &str,
        customer: &str,
    ) -> Result<StoredConversation, String> {
        let conv = self
            .db
            .get_conversation(tenant_id, customer)
            .map_err(|e| e.to_string())?;
        Ok(conv
            .map(|conv| StoredConversation {
                state: conv.state,
                handoff: conv.handoff,
            })
            .unwrap_or_default())
    }

    async fn save_conversation(
        &self,
        tenant_id: &str,
        customer: &str,
        conversation: &StoredConversation,
    ) -> Result<(), String> {
        self.db
            .save_conversation(
                tenant_id,
                customer,
                &conversation.state,
                conversation.handoff,
            )
            .map_err(|e| e.to_string())
    }
}

#[async_trait]
impl InboundLog for DatabaseStorage {
    async fn record_inbound(&self, tenant_id: &str, message_id: &str) -> Result<bool, String> {
        self.db
            .record_inbound_message(tenant_id, message_id)
            .map_err(|e| e.to_string())
    }
}

#[async_trait]
impl Transport for WhatsAppClient {
    async fn send(
        &self,
        channel: &TenantChannel,
        to: &str,
        action: &ResponseAction,
    ) -> Result<(), TransportError> {
        WhatsAppClient::send(self, channel, to, action).await
    }
}
