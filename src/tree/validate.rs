//! Tree validation
//!
//! Violations are collected rather than returned on the first failure, so a
//! tenant editing a tree sees every problem at once. A tree is either
//! accepted whole or rejected whole.

use super::types::{
    ChoiceNode, EndNode, Node, NodeOption, RawField, RawNode, RawOption, RawTree, TextNode, Tree,
    START_NODE,
};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;

/// A single structural problem in a tree definition
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("tree has no nodes")]
    EmptyTree,
    #[error("tree has no \"start\" node")]
    MissingStart,
    #[error("node keys must not be empty")]
    EmptyNodeKey,
    #[error("node '{node}': missing field '{field}'")]
    MissingField { node: String, field: &'static str },
    #[error("node '{node}': must be a JSON object")]
    NodeNotObject { node: String },
    #[error("node '{node}': field '{field}' must be {expected}")]
    WrongType {
        node: String,
        field: &'static str,
        expected: &'static str,
    },
    #[error("node '{node}': unknown node type '{kind}'")]
    UnknownType { node: String, kind: String },
    #[error("node '{node}': field '{field}' is not allowed on {kind} nodes")]
    UnexpectedField {
        node: String,
        kind: &'static str,
        field: &'static str,
    },
    #[error("node '{node}': {kind} nodes need at least one option")]
    EmptyOptions { node: String, kind: &'static str },
    #[error("node '{node}', option {index}: missing field '{field}'")]
    OptionMissingField {
        node: String,
        index: usize,
        field: &'static str,
    },
    #[error("node '{node}', option {index}: field '{field}' must be a string")]
    OptionWrongType {
        node: String,
        index: usize,
        field: &'static str,
    },
    #[error("node '{node}': next node '{target}' does not exist")]
    DanglingNext { node: String, target: String },
    #[error("node '{node}', option {index}: next node '{target}' does not exist")]
    DanglingOptionNext {
        node: String,
        index: usize,
        target: String,
    },
}

impl ValidationError {
    /// Key of the offending node, for tree-wide violations `None`
    pub fn node(&self) -> Option<&str> {
        match self {
            ValidationError::EmptyTree
            | ValidationError::MissingStart
            | ValidationError::EmptyNodeKey => None,
            ValidationError::MissingField { node, .. }
            | ValidationError::NodeNotObject { node }
            | ValidationError::WrongType { node, .. }
            | ValidationError::OptionWrongType { node, .. }
            | ValidationError::UnknownType { node, .. }
            | ValidationError::UnexpectedField { node, .. }
            | ValidationError::EmptyOptions { node, .. }
            | ValidationError::OptionMissingField { node, .. }
            | ValidationError::DanglingNext { node, .. }
            | ValidationError::DanglingOptionNext { node, .. } => Some(node),
        }
    }

    /// Index of the offending option, if the violation is option-scoped
    pub fn option_index(&self) -> Option<usize> {
        match self {
            ValidationError::OptionMissingField { index, .. }
            | ValidationError::OptionWrongType { index, .. }
            | ValidationError::DanglingOptionNext { index, .. } => Some(*index),
            _ => None,
        }
    }
}

/// Every violation found in a rejected tree (never empty)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct ValidationErrors(Vec<ValidationError>);

impl ValidationErrors {
    pub fn iter(&self) -> std::slice::Iter<'_, ValidationError> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[allow(dead_code)] // Used in tests
    pub fn into_inner(self) -> Vec<ValidationError> {
        self.0
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid tree: ")?;
        for (i, error) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{error}")?;
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a ValidationErrors {
    type Item = &'a ValidationError;
    type IntoIter = std::slice::Iter<'a, ValidationError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Validate a raw tree definition and compile it into a `Tree`.
pub fn validate(raw: RawTree) -> Result<Tree, ValidationErrors> {
    let mut errors = Vec::new();

    if raw.nodes.is_empty() {
        errors.push(ValidationError::EmptyTree);
    }
    if !raw.nodes.contains_key(START_NODE) {
        errors.push(ValidationError::MissingStart);
    }

    let keys: BTreeSet<String> = raw.nodes.keys().cloned().collect();
    let mut nodes = BTreeMap::new();

    for (key, raw_node) in raw.nodes {
        if key.is_empty() {
            errors.push(ValidationError::EmptyNodeKey);
        }
        if let Some(node) = compile_node(&key, raw_node, &keys, &mut errors) {
            nodes.insert(key, node);
        }
    }

    if errors.is_empty() {
        Ok(Tree::from_validated(nodes))
    } else {
        Err(ValidationErrors(errors))
    }
}

/// A submitted field after its JSON type has been checked
enum Checked<T> {
    Absent,
    Valid(T),
    /// Present with the wrong type; the violation is already recorded
    Reported,
}

impl<T> Checked<T> {
    fn new(
        value: Option<RawField<T>>,
        errors: &mut Vec<ValidationError>,
        wrong_type: impl FnOnce() -> ValidationError,
    ) -> Self {
        match value {
            None => Checked::Absent,
            Some(RawField::Valid(value)) => Checked::Valid(value),
            Some(RawField::WrongType(_)) => {
                errors.push(wrong_type());
                Checked::Reported
            }
        }
    }

    fn is_absent(&self) -> bool {
        matches!(self, Checked::Absent)
    }

    fn valid(self) -> Option<T> {
        match self {
            Checked::Valid(value) => Some(value),
            Checked::Absent | Checked::Reported => None,
        }
    }
}

fn compile_node(
    key: &str,
    raw: RawField<RawNode>,
    keys: &BTreeSet<String>,
    errors: &mut Vec<ValidationError>,
) -> Option<Node> {
    let raw = match raw {
        RawField::Valid(raw) => raw,
        RawField::WrongType(_) => {
            errors.push(ValidationError::NodeNotObject {
                node: key.to_string(),
            });
            return None;
        }
    };

    let kind = match Checked::new(raw.kind, errors, || wrong_type(key, "type", STRING)) {
        Checked::Valid(kind) => kind,
        Checked::Absent => {
            errors.push(missing(key, "type"));
            return None;
        }
        Checked::Reported => return None,
    };

    let kind: &'static str = match kind.as_str() {
        "text" => "text",
        "list" => "list",
        "buttons" => "buttons",
        "end" => "end",
        _ => {
            errors.push(ValidationError::UnknownType {
                node: key.to_string(),
                kind,
            });
            return None;
        }
    };

    let body = Checked::new(raw.body, errors, || wrong_type(key, "body", STRING));
    if body.is_absent() {
        errors.push(missing(key, "body"));
    }

    match kind {
        "text" => {
            if raw.options.is_some() {
                errors.push(unexpected(key, kind, "options"));
            }
            let save_as = Checked::new(raw.save_as, errors, || wrong_type(key, "saveAs", STRING));
            let next = match Checked::new(raw.next, errors, || wrong_type(key, "next", STRING)) {
                Checked::Absent => {
                    errors.push(missing(key, "next"));
                    None
                }
                Checked::Valid(target) if !keys.contains(&target) => {
                    errors.push(ValidationError::DanglingNext {
                        node: key.to_string(),
                        target,
                    });
                    None
                }
                checked => checked.valid(),
            };
            Some(Node::Text(TextNode {
                body: body.valid()?,
                save_as: save_as.valid(),
                next: next?,
            }))
        }
        "list" | "buttons" => {
            if raw.next.is_some() {
                errors.push(unexpected(key, kind, "next"));
            }
            let save_as = Checked::new(raw.save_as, errors, || wrong_type(key, "saveAs", STRING));
            let options = compile_options(key, kind, raw.options, keys, errors);
            let choice = ChoiceNode {
                body: body.valid()?,
                save_as: save_as.valid(),
                options: options?,
            };
            Some(if kind == "list" {
                Node::List(choice)
            } else {
                Node::Buttons(choice)
            })
        }
        _ => {
            if raw.save_as.is_some() {
                errors.push(unexpected(key, kind, "saveAs"));
            }
            if raw.next.is_some() {
                errors.push(unexpected(key, kind, "next"));
            }
            if raw.options.is_some() {
                errors.push(unexpected(key, kind, "options"));
            }
            Some(Node::End(EndNode {
                body: body.valid()?,
            }))
        }
    }
}

fn compile_options(
    key: &str,
    kind: &'static str,
    raw: Option<RawField<Vec<RawOption>>>,
    keys: &BTreeSet<String>,
    errors: &mut Vec<ValidationError>,
) -> Option<Vec<NodeOption>> {
    let raw = match Checked::new(raw, errors, || {
        wrong_type(key, "options", "an array of option objects")
    }) {
        Checked::Valid(raw) => raw,
        Checked::Absent => {
            errors.push(missing(key, "options"));
            return None;
        }
        Checked::Reported => return None,
    };
    if raw.is_empty() {
        errors.push(ValidationError::EmptyOptions {
            node: key.to_string(),
            kind,
        });
        return None;
    }

    let before = errors.len();
    let mut options = Vec::with_capacity(raw.len());

    for (index, option) in raw.into_iter().enumerate() {
        let option_missing = |field| ValidationError::OptionMissingField {
            node: key.to_string(),
            index,
            field,
        };
        let option_wrong_type = |field| ValidationError::OptionWrongType {
            node: key.to_string(),
            index,
            field,
        };

        let id = Checked::new(option.id, errors, || option_wrong_type("id"));
        if id.is_absent() {
            errors.push(option_missing("id"));
        }
        let title = Checked::new(option.title, errors, || option_wrong_type("title"));
        if title.is_absent() {
            errors.push(option_missing("title"));
        }
        let next = match Checked::new(option.next, errors, || option_wrong_type("next")) {
            Checked::Absent => {
                errors.push(option_missing("next"));
                None
            }
            Checked::Valid(target) if !keys.contains(&target) => {
                errors.push(ValidationError::DanglingOptionNext {
                    node: key.to_string(),
                    index,
                    target,
                });
                None
            }
            checked => checked.valid(),
        };

        if let (Some(id), Some(title), Some(next)) = (id.valid(), title.valid(), next) {
            options.push(NodeOption { id, title, next });
        }
    }

    (errors.len() == before).then_some(options)
}

const STRING: &str = "a string";

fn wrong_type(key: &str, field: &'static str, expected: &'static str) -> ValidationError {
    ValidationError::WrongType {
        node: key.to_string(),
        field,
        expected,
    }
}

fn missing(key: &str, field: &'static str) -> ValidationError {
    ValidationError::MissingField {
        node: key.to_string(),
        field,
    }
}

fn unexpected(key: &str, kind: &'static str, field: &'static str) -> ValidationError {
    ValidationError::UnexpectedField {
        node: key.to_string(),
        kind,
        field,
    }
}
