//! Mock implementations for testing
//!
//! These mocks enable integration testing without real I/O.

use super::traits::*;
use crate::db::{Tenant, TenantChannel};
use crate::engine::ResponseAction;
use crate::tree::Tree;
use crate::whatsapp::TransportError;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

// ============================================================================
// In-Memory Storage
// ============================================================================

/// In-memory storage for testing
#[derive(Default)]
pub struct InMemoryStorage {
    tenants: Mutex<HashMap<String, Tenant>>,
    trees: Mutex<HashMap<String, Tree>>,
    conversations: Mutex<HashMap<(String, String), StoredConversation>>,
    seen: Mutex<HashSet<(String, String)>>,
}

#[allow(dead_code)]
impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tenant with a configured channel
    pub fn add_tenant(&self, id: &str, phone_number_id: &str) -> Tenant {
        let tenant = Tenant {
            id: id.to_string(),
            name: format!("Tenant {id}"),
            phone_number_id: Some(phone_number_id.to_string()),
            access_token: Some(format!("token-{id}")),
            has_tree: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        self.tenants
            .lock()
            .unwrap()
            .insert(id.to_string(), tenant.clone());
        tenant
    }

    pub fn set_tree(&self, tenant_id: &str, tree: Tree) {
        self.trees
            .lock()
            .unwrap()
            .insert(tenant_id.to_string(), tree);
    }

    pub fn put_conversation(&self, tenant_id: &str, customer: &str, conversation: StoredConversation) {
        self.conversations
            .lock()
            .unwrap()
            .insert((tenant_id.to_string(), customer.to_string()), conversation);
    }

    pub fn conversation(&self, tenant_id: &str, customer: &str) -> Option<StoredConversation> {
        self.conversations
            .lock()
            .unwrap()
            .get(&(tenant_id.to_string(), customer.to_string()))
            .cloned()
    }
}

#[async_trait]
impl TenantStore for InMemoryStorage {
    async fn find_tenant_by_phone_number_id(
        &self,
        phone_number_id: &str,
    ) -> Result<Option<Tenant>, String> {
        Ok(self
            .tenants
            .lock()
            .unwrap()
            .values()
            .find(|t| t.phone_number_id.as_deref() == Some(phone_number_id))
            .cloned())
    }

    async fn get_tenant_tree(&self, tenant_id: &str) -> Result<Option<Tree>, String> {
        Ok(self.trees.lock().unwrap().get(tenant_id).cloned())
    }
}

#[async_trait]
impl ConversationStore for InMemoryStorage {
    async fn load_conversation(
        &self,
        tenant_id: &str,
        customer: &str,
    ) -> Result<StoredConversation, String> {
        Ok(self.conversation(tenant_id, customer).unwrap_or_default())
    }

    async fn save_conversation(
        &self,
        tenant_id: &str,
        customer: &str,
        conversation: &StoredConversation,
    ) -> Result<(), String> {
        self.put_conversation(tenant_id, customer, conversation.clone());
        Ok(())
    }
}

#[async_trait]
impl InboundLog for InMemoryStorage {
    async fn record_inbound(&self, tenant_id: &str, message_id: &str) -> Result<bool, String> {
        Ok(self
            .seen
            .lock()
            .unwrap()
            .insert((tenant_id.to_string(), message_id.to_string())))
    }
}

// ============================================================================
// Mock Transport
// ============================================================================

/// A message handed to the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub phone_number_id: String,
    pub to: String,
    pub action: ResponseAction,
}

/// Mock transport that records sends and can fail on demand
#[derive(Default)]
pub struct MockTransport {
    sent: Mutex<Vec<SentMessage>>,
    errors: Mutex<VecDeque<TransportError>>,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

#[allow(dead_code)]
impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make each send take `delay`, to expose overlapping sends
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    /// Fail the next send with `error`
    pub fn queue_error(&self, error: TransportError) {
        self.errors.lock().unwrap().push_back(error);
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }

    /// Highest number of sends observed running at once
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(
        &self,
        channel: &TenantChannel,
        to: &str,
        action: &ResponseAction,
    ) -> Result<(), TransportError> {
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some(error) = self.errors.lock().unwrap().pop_front() {
            return Err(error);
        }
        self.sent.lock().unwrap().push(SentMessage {
            phone_number_id: channel.phone_number_id.clone(),
            to: to.to_string(),
            action: action.clone(),
        });
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::InboundMessage;
    use crate::runtime::{BotRuntime, InboundOutcome, RuntimeError};
    use crate::tree::{default_tree, START_NODE};
    use crate::whatsapp::InboundEnvelope;
    use serde_json::json;
    use std::sync::Arc;

    const CUSTOMER: &str = "5215550001";

    fn scenario_tree() -> Tree {
        serde_json::from_value(json!({
            "nodes": {
                "start": {
                    "type": "list",
                    "body": "¿Qué te interesa?",
                    "saveAs": "service",
                    "options": [
                        { "id": "rent", "title": "Renta", "next": "date" },
                        { "id": "buy", "title": "Compra", "next": "date" }
                    ]
                },
                "date": { "type": "text", "body": "¿Fecha?", "saveAs": "date", "next": "done" },
                "done": { "type": "end", "body": "Gracias" }
            }
        }))
        .unwrap()
    }

    type TestBot = BotRuntime<Arc<InMemoryStorage>, Arc<MockTransport>>;

    fn bot_with(transport: MockTransport) -> (TestBot, Arc<InMemoryStorage>, Arc<MockTransport>, Tenant) {
        let storage = Arc::new(InMemoryStorage::new());
        let transport = Arc::new(transport);
        let tenant = storage.add_tenant("tenant-1", "1555");
        storage.set_tree("tenant-1", scenario_tree());
        let bot = BotRuntime::new(
            Arc::clone(&storage),
            Arc::clone(&transport),
            Arc::new(default_tree()),
        );
        (bot, storage, transport, tenant)
    }

    fn bot() -> (TestBot, Arc<InMemoryStorage>, Arc<MockTransport>, Tenant) {
        bot_with(MockTransport::new())
    }

    #[tokio::test]
    async fn test_in_memory_storage() {
        let storage = InMemoryStorage::new();

        assert_eq!(
            storage.load_conversation("t", "c").await.unwrap(),
            StoredConversation::default()
        );
        assert!(storage.record_inbound("t", "m1").await.unwrap());
        assert!(!storage.record_inbound("t", "m1").await.unwrap());

        storage.add_tenant("t", "1555");
        let found = storage.find_tenant_by_phone_number_id("1555").await.unwrap();
        assert_eq!(found.map(|t| t.id).as_deref(), Some("t"));
    }

    #[tokio::test]
    async fn test_scenario_persists_and_sends() {
        let (bot, storage, transport, tenant) = bot();

        let outcome = bot
            .handle_inbound(&tenant, CUSTOMER, "wamid.1", &InboundMessage::list_reply("rent"))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            InboundOutcome::Replied {
                next_node_key: "date".to_string(),
                handoff: false
            }
        );

        let outcome = bot
            .handle_inbound(&tenant, CUSTOMER, "wamid.2", &InboundMessage::text("20 de julio"))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            InboundOutcome::Replied {
                next_node_key: "done".to_string(),
                handoff: true
            }
        );

        let stored = storage.conversation("tenant-1", CUSTOMER).unwrap();
        assert!(stored.handoff);
        assert_eq!(stored.state.current_node_key.as_deref(), Some("done"));
        assert_eq!(stored.state.answers["service"], "rent");
        assert_eq!(stored.state.answers["date"], "20 de julio");

        let sent = transport.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].phone_number_id, "1555");
        assert_eq!(sent[0].to, CUSTOMER);
        assert_eq!(
            sent[0].action,
            ResponseAction::Text {
                body: "¿Fecha?".to_string()
            }
        );
        assert_eq!(
            sent[1].action,
            ResponseAction::End {
                body: "Gracias".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_duplicate_delivery_is_ignored() {
        let (bot, storage, transport, tenant) = bot();
        let message = InboundMessage::list_reply("rent");

        bot.handle_inbound(&tenant, CUSTOMER, "wamid.1", &message)
            .await
            .unwrap();
        let outcome = bot
            .handle_inbound(&tenant, CUSTOMER, "wamid.1", &message)
            .await
            .unwrap();

        assert_eq!(outcome, InboundOutcome::Duplicate);
        assert_eq!(transport.sent().len(), 1);
        let stored = storage.conversation("tenant-1", CUSTOMER).unwrap();
        assert_eq!(stored.state.current_node_key.as_deref(), Some("date"));
    }

    #[tokio::test]
    async fn test_handed_off_conversation_stays_silent() {
        let (bot, storage, transport, tenant) = bot();
        let handed_off = StoredConversation {
            state: crate::engine::ConversationState::at("done", Default::default()),
            handoff: true,
        };
        storage.put_conversation("tenant-1", CUSTOMER, handed_off.clone());

        let outcome = bot
            .handle_inbound(&tenant, CUSTOMER, "wamid.1", &InboundMessage::text("hola?"))
            .await
            .unwrap();

        assert_eq!(outcome, InboundOutcome::HandedOff);
        assert!(transport.sent().is_empty());
        assert_eq!(storage.conversation("tenant-1", CUSTOMER), Some(handed_off));
    }

    #[tokio::test]
    async fn test_released_conversation_restarts() {
        let (bot, storage, transport, tenant) = bot();
        storage.put_conversation(
            "tenant-1",
            CUSTOMER,
            StoredConversation {
                state: crate::engine::ConversationState::at("done", Default::default()),
                handoff: false,
            },
        );

        let outcome = bot
            .handle_inbound(&tenant, CUSTOMER, "wamid.1", &InboundMessage::text("hola"))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            InboundOutcome::Replied {
                next_node_key: START_NODE.to_string(),
                handoff: false
            }
        );
        assert_eq!(transport.sent()[0].action.body(), "¿Qué te interesa?");
    }

    #[tokio::test]
    async fn test_tenant_without_tree_uses_default() {
        let (bot, storage, transport, _) = bot();
        let other = storage.add_tenant("tenant-2", "2555");

        let outcome = bot
            .handle_inbound(&other, CUSTOMER, "wamid.1", &InboundMessage::button_reply("quote"))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            InboundOutcome::Replied {
                next_node_key: "name".to_string(),
                handoff: false
            }
        );
        assert_eq!(
            transport.sent()[0].action,
            crate::engine::ResponseAction::for_node(bot.default_tree().get("name").unwrap())
        );
    }

    #[tokio::test]
    async fn test_dispatch_routes_by_phone_number() {
        let (bot, _, transport, _) = bot();

        let envelope = InboundEnvelope {
            phone_number_id: "1555".to_string(),
            message_id: "wamid.1".to_string(),
            customer: CUSTOMER.to_string(),
            message: InboundMessage::text("buy"),
        };
        let outcome = bot.dispatch(&envelope).await.unwrap();
        assert!(matches!(outcome, InboundOutcome::Replied { .. }));
        assert_eq!(transport.sent().len(), 1);

        let unknown = InboundEnvelope {
            phone_number_id: "9999".to_string(),
            ..envelope
        };
        assert!(matches!(
            bot.dispatch(&unknown).await,
            Err(RuntimeError::UnknownPhoneNumber(id)) if id == "9999"
        ));
    }

    #[tokio::test]
    async fn test_tenant_without_channel_is_rejected() {
        let (bot, storage, transport, mut tenant) = bot();
        tenant.access_token = None;

        let result = bot
            .handle_inbound(&tenant, CUSTOMER, "wamid.1", &InboundMessage::text("rent"))
            .await;

        assert!(matches!(result, Err(RuntimeError::ChannelNotConfigured(_))));
        assert!(transport.sent().is_empty());
        assert!(storage.conversation("tenant-1", CUSTOMER).is_none());
    }

    #[tokio::test]
    async fn test_state_persisted_before_send_failure() {
        let (bot, storage, transport, tenant) = bot();
        transport.queue_error(TransportError::server_error("boom"));

        let result = bot
            .handle_inbound(&tenant, CUSTOMER, "wamid.1", &InboundMessage::list_reply("rent"))
            .await;

        assert!(matches!(result, Err(RuntimeError::Transport(_))));
        let stored = storage.conversation("tenant-1", CUSTOMER).unwrap();
        assert_eq!(stored.state.current_node_key.as_deref(), Some("date"));
    }

    #[tokio::test]
    async fn test_messages_for_same_customer_are_serialized() {
        let (bot, storage, transport, tenant) =
            bot_with(MockTransport::with_delay(Duration::from_millis(20)));

        let first = InboundMessage::list_reply("rent");
        let second = InboundMessage::text("20 de julio");
        let (a, b) = tokio::join!(
            bot.handle_inbound(&tenant, CUSTOMER, "wamid.1", &first),
            bot.handle_inbound(&tenant, CUSTOMER, "wamid.2", &second),
        );

        assert!(matches!(a.unwrap(), InboundOutcome::Replied { .. }));
        assert!(matches!(b.unwrap(), InboundOutcome::Replied { .. }));
        assert_eq!(transport.max_in_flight(), 1);
        // The second message saw the state written by the first
        let stored = storage.conversation("tenant-1", CUSTOMER).unwrap();
        assert_eq!(stored.state.current_node_key.as_deref(), Some("done"));
        assert_eq!(bot.active_customer_locks(), 0);
    }

    #[tokio::test]
    async fn test_different_customers_run_concurrently() {
        let (bot, _, transport, tenant) =
            bot_with(MockTransport::with_delay(Duration::from_millis(20)));

        let message = InboundMessage::list_reply("rent");
        let (a, b) = tokio::join!(
            bot.handle_inbound(&tenant, "5215550001", "wamid.1", &message),
            bot.handle_inbound(&tenant, "5215550002", "wamid.2", &message),
        );

        assert!(a.is_ok() && b.is_ok());
        assert_eq!(transport.max_in_flight(), 2);
        assert_eq!(bot.active_customer_locks(), 0);
    }
}
