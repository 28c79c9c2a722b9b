//! Inbound messages as seen by the engine

/// A customer message, reduced to what the engine can act on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    /// Free text typed by the customer
    Text { body: String },
    /// Reply to a buttons or list message
    Interactive {
        button_reply_id: Option<String>,
        list_reply_id: Option<String>,
    },
    /// Any other message type (image, audio, location, reaction, ...)
    Other { kind: String },
}

impl InboundMessage {
    pub fn text(body: impl Into<String>) -> Self {
        InboundMessage::Text { body: body.into() }
    }

    pub fn button_reply(id: impl Into<String>) -> Self {
        InboundMessage::Interactive {
            button_reply_id: Some(id.into()),
            list_reply_id: None,
        }
    }

    pub fn list_reply(id: impl Into<String>) -> Self {
        InboundMessage::Interactive {
            button_reply_id: None,
            list_reply_id: Some(id.into()),
        }
    }

    /// Extract the customer's answer.
    ///
    /// Text bodies are trimmed. Interactive replies use the button id when
    /// one is present, otherwise the list id, exactly as received. Blank
    /// answers count as no answer.
    pub fn answer(&self) -> Option<String> {
        let answer = match self {
            InboundMessage::Text { body } => Some(body.trim()),
            InboundMessage::Interactive {
                button_reply_id,
                list_reply_id,
            } => button_reply_id.as_deref().or(list_reply_id.as_deref()),
            InboundMessage::Other { .. } => None,
        };
        answer
            .filter(|s| !s.trim().is_empty())
            .map(String::from)
    }

    /// Wire name of the message type, for logging
    pub fn kind(&self) -> &str {
        match self {
            InboundMessage::Text { .. } => "text",
            InboundMessage::Interactive { .. } => "interactive",
            InboundMessage::Other { kind } => kind,
        }
    }
}
