//! Inbound webhook payloads and signature verification

use crate::engine::InboundMessage;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

/// Header carrying the HMAC-SHA256 of the raw request body
pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";

/// Check `X-Hub-Signature-256` against the raw body.
///
/// An empty app secret disables the check.
pub fn verify_signature(app_secret: &str, signature_header: Option<&str>, body: &[u8]) -> bool {
    if app_secret.is_empty() {
        return true;
    }
    let signature = signature_header.unwrap_or("").trim();
    let signature = signature.strip_prefix("sha256=").unwrap_or(signature).trim();
    if signature.is_empty() {
        return false;
    }
    let Ok(expected) = hex::decode(signature) else {
        return false;
    };
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(app_secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// Top-level webhook notification
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub entry: Vec<WebhookEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookEntry {
    #[serde(default)]
    pub changes: Vec<WebhookChange>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookChange {
    #[serde(default)]
    pub value: ChangeValue,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChangeValue {
    #[serde(default)]
    pub metadata: Option<WebhookMetadata>,
    /// Absent on delivery-status notifications
    #[serde(default)]
    pub messages: Vec<WebhookMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookMetadata {
    pub phone_number_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookMessage {
    pub id: String,
    pub from: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: Option<TextContent>,
    #[serde(default)]
    pub interactive: Option<InteractiveContent>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TextContent {
    #[serde(default)]
    pub body: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InteractiveContent {
    #[serde(default)]
    pub button_reply: Option<InteractiveReply>,
    #[serde(default)]
    pub list_reply: Option<InteractiveReply>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InteractiveReply {
    pub id: String,
}

impl WebhookMessage {
    /// Reduce the wire message to what the engine understands
    pub fn to_inbound(&self) -> InboundMessage {
        match self.kind.as_str() {
            "text" => InboundMessage::text(
                self.text
                    .as_ref()
                    .map(|t| t.body.clone())
                    .unwrap_or_default(),
            ),
            "interactive" => {
                let interactive = self.interactive.as_ref();
                InboundMessage::Interactive {
                    button_reply_id: interactive
                        .and_then(|i| i.button_reply.as_ref())
                        .map(|r| r.id.clone()),
                    list_reply_id: interactive
                        .and_then(|i| i.list_reply.as_ref())
                        .map(|r| r.id.clone()),
                }
            }
            other => InboundMessage::Other {
                kind: other.to_string(),
            },
        }
    }
}

/// One customer message addressed to one of our phone numbers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEnvelope {
    pub phone_number_id: String,
    pub message_id: String,
    pub customer: String,
    pub message: InboundMessage,
}

impl WebhookPayload {
    /// All customer messages in delivery order. Changes without metadata are skipped.
    pub fn inbound_messages(&self) -> Vec<InboundEnvelope> {
        self.entry
            .iter()
            .flat_map(|entry| &entry.changes)
            .filter_map(|change| {
                let metadata = change.value.metadata.as_ref()?;
                Some((metadata, &change.value.messages))
            })
            .flat_map(|(metadata, messages)| {
                messages.iter().map(|message| InboundEnvelope {
                    phone_number_id: metadata.phone_number_id.clone(),
                    message_id: message.id.clone(),
                    customer: message.from.clone(),
                    message: message.to_inbound(),
                })
            })
            .collect()
    }
}
