//! Tree types

use super::validate::{validate, ValidationErrors};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Key of the node every conversation starts from
pub const START_NODE: &str = "start";

// ============================================================================
// Validated tree
// ============================================================================

/// A selectable choice on a `list` or `buttons` node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeOption {
    pub id: String,
    pub title: String,
    pub next: String,
}

impl NodeOption {
    /// Check whether an inbound answer selects this option.
    ///
    /// The id is tried first, then the title; both comparisons ignore case
    /// and surrounding whitespace.
    pub fn matches(&self, answer: &str) -> bool {
        let answer = answer.trim().to_lowercase();
        self.id.trim().to_lowercase() == answer || self.title.trim().to_lowercase() == answer
    }
}

/// Free-text question that always advances to `next`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TextNode {
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub save_as: Option<String>,
    pub next: String,
}

/// Question answered by picking one of `options`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChoiceNode {
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub save_as: Option<String>,
    pub options: Vec<NodeOption>,
}

impl ChoiceNode {
    /// First option selected by `answer`, in declaration order
    pub fn select(&self, answer: &str) -> Option<&NodeOption> {
        self.options.iter().find(|option| option.matches(answer))
    }
}

/// Terminal node
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndNode {
    pub body: String,
}

/// One step of a conversation tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Node {
    Text(TextNode),
    List(ChoiceNode),
    Buttons(ChoiceNode),
    End(EndNode),
}

impl Node {
    /// Message body shown to the customer
    pub fn body(&self) -> &str {
        match self {
            Node::Text(node) => &node.body,
            Node::List(node) | Node::Buttons(node) => &node.body,
            Node::End(node) => &node.body,
        }
    }

    /// Answer key this node records into, if any
    pub fn save_as(&self) -> Option<&str> {
        match self {
            Node::Text(node) => node.save_as.as_deref(),
            Node::List(node) | Node::Buttons(node) => node.save_as.as_deref(),
            Node::End(_) => None,
        }
    }

    pub fn is_end(&self) -> bool {
        matches!(self, Node::End(_))
    }

    /// Wire name of the node type
    pub fn kind(&self) -> &'static str {
        match self {
            Node::Text(_) => "text",
            Node::List(_) => "list",
            Node::Buttons(_) => "buttons",
            Node::End(_) => "end",
        }
    }
}

/// A validated conversation tree.
///
/// Every `next` reference resolves to a node in the same tree and a `start`
/// node always exists. The only ways to obtain a `Tree` are `validate`,
/// `TryFrom<RawTree>` and deserialization, all of which run the validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawTree")]
pub struct Tree {
    nodes: BTreeMap<String, Node>,
}

impl Tree {
    pub(super) fn from_validated(nodes: BTreeMap<String, Node>) -> Self {
        Self { nodes }
    }

    pub fn nodes(&self) -> &BTreeMap<String, Node> {
        &self.nodes
    }

    pub fn get(&self, key: &str) -> Option<&Node> {
        self.nodes.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.nodes.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// The `start` node
    pub fn start(&self) -> &Node {
        self.start_entry().1
    }

    /// Resolve a node key, falling back to `start` when the key is unknown.
    ///
    /// Returns the key actually resolved alongside its node. Never fails.
    pub fn resolve(&self, key: &str) -> (&str, &Node) {
        self.nodes
            .get_key_value(key)
            .map_or_else(|| self.start_entry(), |(key, node)| (key.as_str(), node))
    }

    fn start_entry(&self) -> (&str, &Node) {
        match self.nodes.get_key_value(START_NODE) {
            Some((key, node)) => (key.as_str(), node),
            None => unreachable!("validated trees always contain a start node"),
        }
    }
}

impl TryFrom<RawTree> for Tree {
    type Error = ValidationErrors;

    fn try_from(raw: RawTree) -> Result<Self, Self::Error> {
        validate(raw)
    }
}

// ============================================================================
// Raw (unvalidated) tree
// ============================================================================

/// Tree definition as submitted by a tenant, before validation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTree {
    #[serde(default)]
    pub nodes: BTreeMap<String, RawField<RawNode>>,
}

/// A submitted value, kept verbatim when it does not have the expected JSON
/// type so the validator can report it alongside every other violation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawField<T> {
    Valid(T),
    WrongType(serde_json::Value),
}

impl<T> From<T> for RawField<T> {
    fn from(value: T) -> Self {
        RawField::Valid(value)
    }
}

/// Node definition with every field optional so the validator can report
/// each missing or misplaced field instead of failing on the first one
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawNode {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<RawField<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<RawField<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub save_as: Option<RawField<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<RawField<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<RawField<Vec<RawOption>>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawOption {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RawField<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<RawField<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<RawField<String>>,
}

impl From<&NodeOption> for RawOption {
    fn from(option: &NodeOption) -> Self {
        Self {
            id: Some(option.id.clone().into()),
            title: Some(option.title.clone().into()),
            next: Some(option.next.clone().into()),
        }
    }
}

impl From<&Node> for RawNode {
    fn from(node: &Node) -> Self {
        let mut raw = RawNode {
            kind: Some(node.kind().to_string().into()),
            body: Some(node.body().to_string().into()),
            save_as: node.save_as().map(|key| key.to_string().into()),
            ..RawNode::default()
        };
        match node {
            Node::Text(text) => raw.next = Some(text.next.clone().into()),
            Node::List(choice) | Node::Buttons(choice) => {
                let options: Vec<RawOption> = choice.options.iter().map(RawOption::from).collect();
                raw.options = Some(options.into());
            }
            Node::End(_) => {}
        }
        raw
    }
}

impl From<&Tree> for RawTree {
    fn from(tree: &Tree) -> Self {
        Self {
            nodes: tree
                .nodes
                .iter()
                .map(|(key, node)| (key.clone(), RawField::Valid(RawNode::from(node))))
                .collect(),
        }
    }
}
