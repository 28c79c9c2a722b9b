//! HTTP request handlers

use super::types::{
    violations, ConversationResponse, CreateTenantRequest, ErrorResponse, SuccessResponse,
    TenantResponse, TreeResponse, TreeSource, ValidateTreeResponse, VerifyQuery, Violation,
};
use super::AppState;
use crate::db::DbError;
use crate::runtime::InboundOutcome;
use crate::tree::{validate, RawTree, ValidationErrors};
use crate::whatsapp::{verify_signature, WebhookPayload, SIGNATURE_HEADER};
use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // WhatsApp webhook
        .route("/webhook", get(verify_webhook).post(receive_webhook))
        // Tenants
        .route("/api/tenants", post(create_tenant))
        .route("/api/tenants/:id", get(get_tenant))
        .route(
            "/api/tenants/:id/tree",
            get(get_tree).put(put_tree).delete(delete_tree),
        )
        .route("/api/trees/validate", post(validate_tree))
        // Conversations
        .route(
            "/api/tenants/:id/conversations/:customer",
            get(get_conversation),
        )
        .route(
            "/api/tenants/:id/conversations/:customer/release",
            post(release_conversation),
        )
        // Version
        .route("/version", get(get_version))
        .with_state(state)
}

// ============================================================
// Webhook
// ============================================================

async fn verify_webhook(
    State(state): State<AppState>,
    Query(query): Query<VerifyQuery>,
) -> Result<String, AppError> {
    let expected = state.whatsapp.verify_token.as_deref();
    let token_matches = expected.is_some() && query.verify_token.as_deref() == expected;

    if query.mode.as_deref() == Some("subscribe") && token_matches {
        tracing::info!("Webhook subscription verified");
        return Ok(query.challenge.unwrap_or_default());
    }
    Err(AppError::Forbidden("Webhook verification failed".to_string()))
}

async fn receive_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, AppError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());
    if !verify_signature(&state.whatsapp.app_secret, signature, &body) {
        tracing::warn!("Rejected webhook with invalid signature");
        return Err(AppError::Unauthorized("Invalid signature".to_string()));
    }

    let payload: WebhookPayload = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("Invalid webhook payload: {e}")))?;

    // Per-message failures are logged; the batch is still acknowledged
    for envelope in payload.inbound_messages() {
        match state.runtime.dispatch(&envelope).await {
            Ok(InboundOutcome::Replied {
                next_node_key,
                handoff,
            }) => {
                tracing::debug!(message_id = %envelope.message_id, next = %next_node_key, handoff, "Replied");
            }
            Ok(outcome) => {
                tracing::debug!(message_id = %envelope.message_id, ?outcome, "Not replied");
            }
            Err(e) => {
                tracing::warn!(
                    phone_number_id = %envelope.phone_number_id,
                    message_id = %envelope.message_id,
                    error = %e,
                    "Failed to handle inbound message"
                );
            }
        }
    }

    Ok(StatusCode::OK)
}

// ============================================================
// Tenants and Trees
// ============================================================

async fn create_tenant(
    State(state): State<AppState>,
    body: Result<Json<CreateTenantRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<TenantResponse>), AppError> {
    let Json(req) = body?;
    if req.name.trim().is_empty() {
        return Err(AppError::BadRequest("Tenant name must not be empty".to_string()));
    }

    // Validate before creating so a bad tree leaves nothing behind
    let tree = req.tree.map(validate).transpose()?;

    let id = uuid::Uuid::new_v4().to_string();
    let tenant = state.db.create_tenant(
        &id,
        req.name.trim(),
        req.phone_number_id.as_deref(),
        req.access_token.as_deref(),
        tree.as_ref(),
    )?;

    tracing::info!(tenant_id = %id, has_tree = tenant.has_tree, "Created tenant");
    Ok((StatusCode::CREATED, Json(TenantResponse { tenant })))
}

async fn get_tenant(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TenantResponse>, AppError> {
    let tenant = state.db.get_tenant(&id)?;
    Ok(Json(TenantResponse { tenant }))
}

async fn get_tree(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TreeResponse>, AppError> {
    let response = match state.db.get_tenant_tree(&id)? {
        Some(tree) => TreeResponse {
            tree,
            source: TreeSource::Tenant,
        },
        None => TreeResponse {
            tree: state.runtime.default_tree().as_ref().clone(),
            source: TreeSource::Default,
        },
    };
    Ok(Json(response))
}

async fn put_tree(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<RawTree>, JsonRejection>,
) -> Result<Json<TreeResponse>, AppError> {
    let Json(raw) = body?;
    let tree = validate(raw)?;
    state.db.set_tenant_tree(&id, &tree)?;

    tracing::info!(tenant_id = %id, nodes = tree.len(), "Replaced tenant tree");
    Ok(Json(TreeResponse {
        tree,
        source: TreeSource::Tenant,
    }))
}

async fn delete_tree(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.db.clear_tenant_tree(&id)?;
    tracing::info!(tenant_id = %id, "Tenant tree removed, default applies");
    Ok(StatusCode::NO_CONTENT)
}

async fn validate_tree(
    body: Result<Json<RawTree>, JsonRejection>,
) -> Result<Json<ValidateTreeResponse>, AppError> {
    let Json(raw) = body?;
    let response = match validate(raw) {
        Ok(_) => ValidateTreeResponse {
            valid: true,
            violations: Vec::new(),
        },
        Err(errors) => ValidateTreeResponse {
            valid: false,
            violations: violations(&errors),
        },
    };
    Ok(Json(response))
}

// ============================================================
// Conversations
// ============================================================

async fn get_conversation(
    State(state): State<AppState>,
    Path((id, customer)): Path<(String, String)>,
) -> Result<Json<ConversationResponse>, AppError> {
    let conversation = state
        .db
        .get_conversation(&id, &customer)?
        .ok_or_else(|| AppError::NotFound(format!("No conversation for {customer}")))?;
    Ok(Json(ConversationResponse { conversation }))
}

/// Hand a conversation back to the bot after a human took over
async fn release_conversation(
    State(state): State<AppState>,
    Path((id, customer)): Path<(String, String)>,
) -> Result<Json<SuccessResponse>, AppError> {
    state.db.release_handoff(&id, &customer)?;
    tracing::info!(tenant_id = %id, customer = %customer, "Handoff released");
    Ok(Json(SuccessResponse { success: true }))
}

async fn get_version() -> &'static str {
    concat!("leadflow ", env!("CARGO_PKG_VERSION"))
}

// ============================================================
// Error Handling
// ============================================================

#[derive(Debug)]
enum AppError {
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    Conflict(String),
    InvalidTree(Vec<Violation>),
    Internal(String),
}

impl From<DbError> for AppError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::TenantNotFound(_) | DbError::ConversationNotFound { .. } => {
                AppError::NotFound(e.to_string())
            }
            DbError::PhoneNumberInUse(_) => AppError::Conflict(e.to_string()),
            DbError::Sqlite(_) | DbError::Json(_) => {
                tracing::error!(error = %e, "Database error");
                AppError::Internal(e.to_string())
            }
        }
    }
}

/// Bodies that are not JSON, or not shaped like the request at all, get the
/// same JSON error body as every other failure
impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<ValidationErrors> for AppError {
    fn from(errors: ValidationErrors) -> Self {
        AppError::InvalidTree(violations(&errors))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, ErrorResponse::new(msg)),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, ErrorResponse::new(msg)),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, ErrorResponse::new(msg)),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, ErrorResponse::new(msg)),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, ErrorResponse::new(msg)),
            AppError::InvalidTree(violations) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorResponse {
                    error: "Invalid tree".to_string(),
                    violations,
                },
            ),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, ErrorResponse::new(msg)),
        };

        (status, Json(body)).into_response()
    }
}
