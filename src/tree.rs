//! Conversation trees
//!
//! A tree is the tenant-supplied graph of prompts a customer is walked
//! through. Trees only exist in validated form: `RawTree` is the untrusted
//! wire shape and `validate` is the single gate into `Tree`.

mod default;
mod types;
mod validate;


pub use default::default_tree;
pub use types::{Node, NodeOption, RawTree, Tree, START_NODE};
pub use validate::{validate, ValidationError, ValidationErrors};
