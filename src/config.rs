//! Service configuration from environment variables

use crate::tree::{default_tree, Tree};
use std::path::{Path, PathBuf};
use thiserror::Error;

const DEFAULT_PORT: u16 = 8000;
const DEFAULT_GRAPH_URL: &str = "https://graph.facebook.com";
const DEFAULT_API_VERSION: &str = "v21.0";
const DEFAULT_LIST_BUTTON: &str = "Ver opciones";
const DEFAULT_DEDUP_RETENTION_DAYS: u32 = 7;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid {name}: {value:?}")]
    InvalidValue { name: &'static str, value: String },
    #[error("Cannot read default tree {path}: {source}")]
    ReadTree {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Default tree {path} is invalid: {source}")]
    InvalidTree {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// WhatsApp Cloud API settings
#[derive(Debug, Clone)]
pub struct WhatsAppConfig {
    /// Token echoed back during the webhook subscription handshake
    pub verify_token: Option<String>,
    /// Key for `X-Hub-Signature-256`; empty disables signature checks
    pub app_secret: String,
    pub graph_url: String,
    pub api_version: String,
    /// Label of the button that opens a list message
    pub list_button: String,
}

impl Default for WhatsAppConfig {
    fn default() -> Self {
        Self {
            verify_token: None,
            app_secret: String::new(),
            graph_url: DEFAULT_GRAPH_URL.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            list_button: DEFAULT_LIST_BUTTON.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub db_path: PathBuf,
    pub whatsapp: WhatsAppConfig,
    /// JSON tree replacing the built-in default
    pub default_tree_path: Option<PathBuf>,
    /// How long processed message ids are kept for deduplication
    pub dedup_retention_days: u32,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let port = match lookup("LEADFLOW_PORT") {
            Some(value) => value.parse().map_err(|_| ConfigError::InvalidValue {
                name: "LEADFLOW_PORT",
                value,
            })?,
            None => DEFAULT_PORT,
        };

        let db_path = lookup("LEADFLOW_DB_PATH").map_or_else(
            || {
                let home = lookup("HOME").unwrap_or_else(|| "/tmp".to_string());
                PathBuf::from(format!("{home}/.leadflow/leadflow.db"))
            },
            PathBuf::from,
        );

        let whatsapp = WhatsAppConfig {
            verify_token: lookup("WHATSAPP_VERIFY_TOKEN").filter(|t| !t.is_empty()),
            app_secret: lookup("WHATSAPP_APP_SECRET").unwrap_or_default(),
            graph_url: lookup("WHATSAPP_GRAPH_URL").map_or_else(
                || DEFAULT_GRAPH_URL.to_string(),
                |url| url.trim_end_matches('/').to_string(),
            ),
            api_version: lookup("WHATSAPP_API_VERSION")
                .unwrap_or_else(|| DEFAULT_API_VERSION.to_string()),
            list_button: lookup("WHATSAPP_LIST_BUTTON")
                .unwrap_or_else(|| DEFAULT_LIST_BUTTON.to_string()),
        };

        let dedup_retention_days = match lookup("LEADFLOW_DEDUP_RETENTION_DAYS") {
            Some(value) => match value.parse::<u32>() {
                Ok(days) if days > 0 => days,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        name: "LEADFLOW_DEDUP_RETENTION_DAYS",
                        value,
                    })
                }
            },
            None => DEFAULT_DEDUP_RETENTION_DAYS,
        };

        Ok(Self {
            port,
            db_path,
            whatsapp,
            default_tree_path: lookup("LEADFLOW_DEFAULT_TREE").map(PathBuf::from),
            dedup_retention_days,
        })
    }

    /// The tree used for tenants without one of their own
    pub fn load_default_tree(&self) -> Result<Tree, ConfigError> {
        match &self.default_tree_path {
            Some(path) => load_tree(path),
            None => Ok(default_tree()),
        }
    }
}

/// Read and validate a tree from a JSON file
fn load_tree(path: &Path) -> Result<Tree, ConfigError> {
    let json = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadTree {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&json).map_err(|source| ConfigError::InvalidTree {
        path: path.to_path_buf(),
        source,
    })
}
