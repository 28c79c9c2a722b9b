//! Per-message bot runtime
//!
//! Wraps the pure engine with storage and transport: deduplicate, serialize
//! per customer, load, process, persist, send.

use super::traits::{Storage, StoredConversation, Transport};
use super::{InboundOutcome, RuntimeError};
use crate::db::Tenant;
use crate::engine::{process_inbound, InboundMessage};
use crate::tree::Tree;
use crate::whatsapp::InboundEnvelope;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

type CustomerKey = (String, String);

/// Processes inbound messages for all tenants
pub struct BotRuntime<S: Storage, T: Transport> {
    storage: S,
    transport: T,
    default_tree: Arc<Tree>,
    /// One lock per (tenant, customer) currently being processed
    customer_locks: Mutex<HashMap<CustomerKey, Arc<tokio::sync::Mutex<()>>>>,
}

impl<S: Storage, T: Transport> BotRuntime<S, T> {
    pub fn new(storage: S, transport: T, default_tree: Arc<Tree>) -> Self {
        Self {
            storage,
            transport,
            default_tree,
            customer_locks: Mutex::new(HashMap::new()),
        }
    }

    /// The tree used for tenants without their own
    pub fn default_tree(&self) -> &Arc<Tree> {
        &self.default_tree
    }

    /// Route a webhook message to the tenant owning its phone number
    pub async fn dispatch(&self, envelope: &InboundEnvelope) -> Result<InboundOutcome, RuntimeError> {
        let tenant = self
            .storage
            .find_tenant_by_phone_number_id(&envelope.phone_number_id)
            .await
            .map_err(RuntimeError::Storage)?
            .ok_or_else(|| RuntimeError::UnknownPhoneNumber(envelope.phone_number_id.clone()))?;

        self.handle_inbound(
            &tenant,
            &envelope.customer,
            &envelope.message_id,
            &envelope.message,
        )
        .await
    }

    /// Process one customer message for a tenant
    pub async fn handle_inbound(
        &self,
        tenant: &Tenant,
        customer: &str,
        message_id: &str,
        message: &InboundMessage,
    ) -> Result<InboundOutcome, RuntimeError> {
        if tenant.channel().is_none() {
            return Err(RuntimeError::ChannelNotConfigured(tenant.id.clone()));
        }

        let is_new = self
            .storage
            .record_inbound(&tenant.id, message_id)
            .await
            .map_err(RuntimeError::Storage)?;
        if !is_new {
            tracing::debug!(tenant_id = %tenant.id, message_id = %message_id, "Duplicate delivery ignored");
            return Ok(InboundOutcome::Duplicate);
        }

        let key = (tenant.id.clone(), customer.to_string());
        let lock = self.customer_lock(&key);
        let result = {
            let _guard = lock.lock().await;
            self.process_locked(tenant, customer, message).await
        };
        self.release_customer_lock(&key, lock);
        result
    }

    async fn process_locked(
        &self,
        tenant: &Tenant,
        customer: &str,
        message: &InboundMessage,
    ) -> Result<InboundOutcome, RuntimeError> {
        let conversation = self
            .storage
            .load_conversation(&tenant.id, customer)
            .await
            .map_err(RuntimeError::Storage)?;

        if conversation.handoff {
            tracing::info!(tenant_id = %tenant.id, customer = %customer, "Conversation handed off, not replying");
            return Ok(InboundOutcome::HandedOff);
        }

        let tenant_tree = self
            .storage
            .get_tenant_tree(&tenant.id)
            .await
            .map_err(RuntimeError::Storage)?;
        let tree = tenant_tree.as_ref().unwrap_or(&*self.default_tree);

        let output = process_inbound(&conversation.state, message, tree);

        tracing::info!(
            tenant_id = %tenant.id,
            customer = %customer,
            message_kind = message.kind(),
            from = conversation.state.current_or_start(),
            to = %output.next_node_key,
            handoff = output.should_handoff,
            "Processed inbound message"
        );

        self.storage
            .save_conversation(
                &tenant.id,
                customer,
                &StoredConversation {
                    state: output.next_state(),
                    handoff: output.should_handoff,
                },
            )
            .await
            .map_err(RuntimeError::Storage)?;

        let channel = tenant
            .channel()
            .ok_or_else(|| RuntimeError::ChannelNotConfigured(tenant.id.clone()))?;
        if let Err(e) = self.transport.send(&channel, customer, &output.response).await {
            tracing::error!(
                tenant_id = %tenant.id,
                customer = %customer,
                error = %e,
                retryable = e.kind.is_retryable(),
                "Failed to send reply"
            );
            return Err(e.into());
        }

        Ok(InboundOutcome::Replied {
            next_node_key: output.next_node_key,
            handoff: output.should_handoff,
        })
    }

    fn customer_lock(&self, key: &CustomerKey) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .customer_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(key.clone()).or_default())
    }

    /// Drop the map entry once no other task holds or waits on it
    fn release_customer_lock(&self, key: &CustomerKey, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self
            .customer_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // One reference in the map, one held here
        if Arc::strong_count(&lock) == 2 {
            locks.remove(key);
        }
    }

    #[cfg(test)]
    pub(crate) fn active_customer_locks(&self) -> usize {
        self.customer_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
