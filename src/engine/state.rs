//! Conversation state types

use crate::tree::START_NODE;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Progress of one customer through a tenant's tree
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationState {
    /// Node the customer is currently answering; `None` before the first message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_node_key: Option<String>,
    /// Answers recorded so far, keyed by the nodes' `saveAs`
    #[serde(default)]
    pub answers: BTreeMap<String, String>,
}

impl ConversationState {
    /// State of a conversation positioned at `node_key`
    pub fn at(node_key: impl Into<String>, answers: BTreeMap<String, String>) -> Self {
        Self {
            current_node_key: Some(node_key.into()),
            answers,
        }
    }

    /// Current node key, treating a fresh conversation as being at `start`
    pub fn current_or_start(&self) -> &str {
        self.current_node_key.as_deref().unwrap_or(START_NODE)
    }
}
