//! Built-in tree used for tenants that have not configured their own

use super::types::{RawField, RawNode, RawOption, RawTree, Tree};
use super::validate::validate;

fn text(body: &str, save_as: &str, next: &str) -> RawNode {
    RawNode {
        kind: Some("text".to_string().into()),
        body: Some(body.to_string().into()),
        save_as: Some(save_as.to_string().into()),
        next: Some(next.to_string().into()),
        options: None,
    }
}

fn end(body: &str) -> RawNode {
    RawNode {
        kind: Some("end".to_string().into()),
        body: Some(body.to_string().into()),
        ..RawNode::default()
    }
}

fn option(id: &str, title: &str, next: &str) -> RawOption {
    RawOption {
        id: Some(id.to_string().into()),
        title: Some(title.to_string().into()),
        next: Some(next.to_string().into()),
    }
}

/// The default lead-capture tree.
///
/// Asks what the customer is interested in, collects a name and a short
/// description, then hands the conversation over to a human.
pub fn default_tree() -> Tree {
    let start = RawNode {
        kind: Some("buttons".to_string().into()),
        body: Some("¡Hola! 👋 Gracias por escribirnos. ¿En qué te podemos ayudar?".to_string().into()),
        save_as: Some("interest".to_string().into()),
        next: None,
        options: Some(RawField::Valid(vec![
            option("quote", "Cotizar", "name"),
            option("info", "Información", "info"),
            option("agent", "Hablar con asesor", "agent"),
        ])),
    };

    let raw = RawTree {
        nodes: [
            ("start", start),
            ("name", text("¿Cuál es tu nombre?", "name", "details")),
            (
                "details",
                text("Cuéntanos brevemente qué necesitas.", "details", "done"),
            ),
            (
                "info",
                end("Un asesor te compartirá toda la información en breve."),
            ),
            (
                "agent",
                end("Te estamos comunicando con un asesor. Espera un momento, por favor."),
            ),
            (
                "done",
                end("¡Gracias! Recibimos tu información y te contactaremos pronto."),
            ),
        ]
        .into_iter()
        .map(|(key, node)| (key.to_string(), RawField::Valid(node)))
        .collect(),
    };

    validate(raw).expect("built-in default tree is valid")
}
