//! Conversation engine
//!
//! A pure state-transition function over a validated tree: stored state plus
//! one inbound message in, next state plus the reply to send out. Storage,
//! transport and handoff suppression live in the runtime.

mod inbound;
mod process;
mod response;
mod state;

#[cfg(test)]
mod proptests;

pub use inbound::InboundMessage;
pub use process::process_inbound;
pub use response::{ReplyOption, ResponseAction};
pub use state::ConversationState;
