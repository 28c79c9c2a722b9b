//! API request and response types

use crate::db::{Conversation, Tenant};
use crate::tree::{RawTree, Tree, ValidationError, ValidationErrors};
use serde::{Deserialize, Serialize};

/// Query parameters of the webhook subscription handshake
#[derive(Debug, Deserialize)]
pub struct VerifyQuery {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

/// Request to register a tenant
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTenantRequest {
    pub name: String,
    pub phone_number_id: Option<String>,
    pub access_token: Option<String>,
    /// Optional initial tree, validated before the tenant is created
    pub tree: Option<RawTree>,
}

/// Response with a single tenant
#[derive(Debug, Serialize)]
pub struct TenantResponse {
    pub tenant: Tenant,
}

/// Where an effective tree comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TreeSource {
    Tenant,
    Default,
}

/// Response with the tree a tenant's customers walk through
#[derive(Debug, Serialize)]
pub struct TreeResponse {
    pub tree: Tree,
    pub source: TreeSource,
}

/// One violation, located by node and option where applicable
#[derive(Debug, Serialize)]
pub struct Violation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub option: Option<usize>,
    pub message: String,
}

impl From<&ValidationError> for Violation {
    fn from(error: &ValidationError) -> Self {
        Self {
            node: error.node().map(String::from),
            option: error.option_index(),
            message: error.to_string(),
        }
    }
}

pub fn violations(errors: &ValidationErrors) -> Vec<Violation> {
    errors.iter().map(Violation::from).collect()
}

/// Response for a dry-run validation
#[derive(Debug, Serialize)]
pub struct ValidateTreeResponse {
    pub valid: bool,
    pub violations: Vec<Violation>,
}

/// Response with a single conversation
#[derive(Debug, Serialize)]
pub struct ConversationResponse {
    pub conversation: Conversation,
}

/// Generic success response
#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<Violation>,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            violations: Vec::new(),
        }
    }
}
