//! Pure inbound processing
//!
//! Given the stored state of a conversation, one inbound message and the
//! tree, decide where the conversation goes next and what to say. Stale
//! state and unusable input never fail: they restart at `start` or reprompt
//! in place.

use super::{ConversationState, InboundMessage, ResponseAction};
use crate::tree::{Node, Tree, START_NODE};
use std::collections::BTreeMap;

/// Result of processing one inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOutput {
    pub next_node_key: String,
    pub updated_answers: BTreeMap<String, String>,
    pub response: ResponseAction,
    /// The conversation reached a terminal node and should go to a human
    pub should_handoff: bool,
}

impl EngineOutput {
    /// Stay on `key` and send its prompt again
    fn reprompt(key: &str, node: &Node, answers: BTreeMap<String, String>) -> Self {
        Self {
            next_node_key: key.to_string(),
            updated_answers: answers,
            response: ResponseAction::for_node(node),
            should_handoff: false,
        }
    }

    /// Move to `key` and send its prompt
    fn advance(key: &str, node: &Node, answers: BTreeMap<String, String>) -> Self {
        Self {
            next_node_key: key.to_string(),
            updated_answers: answers,
            response: ResponseAction::for_node(node),
            should_handoff: node.is_end(),
        }
    }

    /// State to persist for the customer's next message
    pub fn next_state(&self) -> ConversationState {
        ConversationState::at(self.next_node_key.clone(), self.updated_answers.clone())
    }
}

/// Process one inbound message against a conversation's state.
///
/// Deterministic and free of side effects.
pub fn process_inbound(
    state: &ConversationState,
    message: &InboundMessage,
    tree: &Tree,
) -> EngineOutput {
    // Unknown keys come from state written against an older tree
    let (current_key, current) = tree.resolve(state.current_or_start());

    // Terminal nodes are soft: the next message starts over
    if current.is_end() {
        return EngineOutput {
            next_node_key: START_NODE.to_string(),
            updated_answers: state.answers.clone(),
            response: ResponseAction::for_node(tree.start()),
            should_handoff: false,
        };
    }

    let Some(answer) = message.answer() else {
        return EngineOutput::reprompt(current_key, current, state.answers.clone());
    };

    let mut answers = state.answers.clone();
    if let Some(save_as) = current.save_as() {
        answers.insert(save_as.to_string(), answer.clone());
    }

    let next_key = match current {
        Node::Text(text) => Some(text.next.as_str()),
        Node::List(choice) | Node::Buttons(choice) => {
            choice.select(&answer).map(|option| option.next.as_str())
        }
        Node::End(_) => None,
    };

    // Unmatched option: the answer stays recorded but the customer is asked again
    let Some(next_key) = next_key else {
        return EngineOutput::reprompt(current_key, current, answers);
    };

    let (next_key, next) = tree.resolve(next_key);
    EngineOutput::advance(next_key, next, answers)
}
