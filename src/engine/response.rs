//! Responses produced by the engine

use crate::tree::{Node, NodeOption};
use serde::{Deserialize, Serialize};

/// A selectable reply shown on a buttons or list message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyOption {
    pub id: String,
    pub title: String,
}

impl From<&NodeOption> for ReplyOption {
    fn from(option: &NodeOption) -> Self {
        Self {
            id: option.id.clone(),
            title: option.title.clone(),
        }
    }
}

/// Outbound message to send, mirroring the node that produced it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ResponseAction {
    Text {
        body: String,
    },
    List {
        body: String,
        options: Vec<ReplyOption>,
    },
    Buttons {
        body: String,
        options: Vec<ReplyOption>,
    },
    End {
        body: String,
    },
}

impl ResponseAction {
    /// The message a node sends when the conversation arrives at it
    pub fn for_node(node: &Node) -> Self {
        match node {
            Node::Text(text) => ResponseAction::Text {
                body: text.body.clone(),
            },
            Node::List(choice) => ResponseAction::List {
                body: choice.body.clone(),
                options: choice.options.iter().map(ReplyOption::from).collect(),
            },
            Node::Buttons(choice) => ResponseAction::Buttons {
                body: choice.body.clone(),
                options: choice.options.iter().map(ReplyOption::from).collect(),
            },
            Node::End(end) => ResponseAction::End {
                body: end.body.clone(),
            },
        }
    }

    pub fn body(&self) -> &str {
        match self {
            ResponseAction::Text { body }
            | ResponseAction::List { body, .. }
            | ResponseAction::Buttons { body, .. }
            | ResponseAction::End { body } => body,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ResponseAction::Text { .. } => "text",
            ResponseAction::List { .. } => "list",
            ResponseAction::Buttons { .. } => "buttons",
            ResponseAction::End { .. } => "end",
        }
    }
}
