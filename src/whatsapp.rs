//! WhatsApp Cloud API integration
//!
//! Inbound: webhook payload parsing and signature checks. Outbound: rendering
//! engine responses into Cloud API messages.

mod client;
mod error;
mod webhook;

pub use client::WhatsAppClient;
pub use error::TransportError;
pub use webhook::{verify_signature, InboundEnvelope, WebhookPayload, SIGNATURE_HEADER};
