//! HTTP API for leadflow
//!
//! The WhatsApp webhook plus tenant, tree and conversation management.

mod handlers;
mod types;


pub use handlers::create_router;

use crate::config::WhatsAppConfig;
use crate::db::Database;
use crate::runtime::ProductionRuntime;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub runtime: Arc<ProductionRuntime>,
    pub whatsapp: Arc<WhatsAppConfig>,
}

impl AppState {
    pub fn new(db: Database, runtime: ProductionRuntime, whatsapp: WhatsAppConfig) -> Self {
        Self {
            db,
            runtime: Arc::new(runtime),
            whatsapp: Arc::new(whatsapp),
        }
    }
}
