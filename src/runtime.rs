//! Runtime for handling inbound customer messages
//!
//! The engine decides; the runtime does the I/O around it. Messages for the
//! same (tenant, customer) are processed one at a time, and a conversation
//! that reached an end node stays silent until its handoff is released.

mod bot;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use bot::BotRuntime;
pub use traits::*;

use crate::whatsapp::TransportError;
use std::sync::Arc;
use thiserror::Error;

/// Type alias for production runtime: database storage, any transport
/// (`WhatsAppClient` when serving)
pub type ProductionRuntime = BotRuntime<DatabaseStorage, Arc<dyn Transport>>;

/// What happened to one inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundOutcome {
    /// The message id was already processed
    Duplicate,
    /// A human owns the conversation; the bot stayed quiet
    HandedOff,
    /// The engine ran and its response was sent
    Replied { next_node_key: String, handoff: bool },
}

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Send failed: {0}")]
    Transport(#[from] TransportError),
    #[error("No tenant for phone number id {0}")]
    UnknownPhoneNumber(String),
    #[error("Tenant {0} has no WhatsApp channel configured")]
    ChannelNotConfigured(String),
}
