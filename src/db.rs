//! Database module for leadflow
//!
//! Provides persistence for tenants, their trees, conversation state and the
//! inbound message log used for deduplication.

mod schema;

pub use schema::*;

use crate::tree::Tree;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Stored JSON is invalid: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Tenant not found: {0}")]
    TenantNotFound(String),
    #[error("Conversation not found: {tenant_id}/{customer}")]
    ConversationNotFound { tenant_id: String, customer: String },
    #[error("Phone number id already registered: {0}")]
    PhoneNumberInUse(String),
}

pub type DbResult<T> = Result<T, DbError>;

const TENANT_COLUMNS: &str =
    "id, name, phone_number_id, access_token, tree IS NOT NULL, created_at, updated_at";

/// Thread-safe database handle
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    #[allow(dead_code)] // Used in tests
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn run_migrations(&self) -> DbResult<()> {
        let conn = self.conn();
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    // ==================== Tenant Operations ====================

    /// Register a new tenant, with its initial tree if it has one.
    ///
    /// The tree goes in with the tenant row, so a failed insert stores neither.
    pub fn create_tenant(
        &self,
        id: &str,
        name: &str,
        phone_number_id: Option<&str>,
        access_token: Option<&str>,
        tree: Option<&Tree>,
    ) -> DbResult<Tenant> {
        let tree_json = tree.map(serde_json::to_string).transpose()?;
        let conn = self.conn();
        let now = Utc::now();

        if let Some(phone_number_id) = phone_number_id {
            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM tenants WHERE phone_number_id = ?1)",
                params![phone_number_id],
                |row| row.get(0),
            )?;
            if exists {
                return Err(DbError::PhoneNumberInUse(phone_number_id.to_string()));
            }
        }

        conn.execute(
            "INSERT INTO tenants (id, name, phone_number_id, access_token, tree, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            params![
                id,
                name,
                phone_number_id,
                access_token,
                tree_json,
                now.to_rfc3339()
            ],
        )?;

        Ok(Tenant {
            id: id.to_string(),
            name: name.to_string(),
            phone_number_id: phone_number_id.map(String::from),
            access_token: access_token.map(String::from),
            has_tree: tree.is_some(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Get tenant by ID
    pub fn get_tenant(&self, id: &str) -> DbResult<Tenant> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {TENANT_COLUMNS} FROM tenants WHERE id = ?1"),
            params![id],
            parse_tenant_row,
        )
        .optional()?
        .ok_or_else(|| DbError::TenantNotFound(id.to_string()))
    }

    /// Find the tenant that owns a WhatsApp phone number id
    pub fn get_tenant_by_phone_number_id(&self, phone_number_id: &str) -> DbResult<Option<Tenant>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {TENANT_COLUMNS} FROM tenants WHERE phone_number_id = ?1"),
            params![phone_number_id],
            parse_tenant_row,
        )
        .optional()
        .map_err(DbError::from)
    }

    /// Replace a tenant's tree wholesale. Only validated trees can be stored.
    pub fn set_tenant_tree(&self, id: &str, tree: &Tree) -> DbResult<()> {
        let conn = self.conn();
        let tree_json = serde_json::to_string(tree)?;

        let updated = conn.execute(
            "UPDATE tenants SET tree = ?1, updated_at = ?2 WHERE id = ?3",
            params![tree_json, Utc::now().to_rfc3339(), id],
        )?;

        if updated == 0 {
            return Err(DbError::TenantNotFound(id.to_string()));
        }
        Ok(())
    }

    /// Remove a tenant's tree so the default applies again
    pub fn clear_tenant_tree(&self, id: &str) -> DbResult<()> {
        let conn = self.conn();

        let updated = conn.execute(
            "UPDATE tenants SET tree = NULL, updated_at = ?1 WHERE id = ?2",
            params![Utc::now().to_rfc3339(), id],
        )?;

        if updated == 0 {
            return Err(DbError::TenantNotFound(id.to_string()));
        }
        Ok(())
    }

    /// Get a tenant's own tree; `None` means the default applies
    pub fn get_tenant_tree(&self, id: &str) -> DbResult<Option<Tree>> {
        let conn = self.conn();
        let tree_json: Option<String> = conn
            .query_row(
                "SELECT tree FROM tenants WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| DbError::TenantNotFound(id.to_string()))?;

        // Deserializing a Tree re-runs validation
        tree_json
            .map(|json| serde_json::from_str(&json))
            .transpose()
            .map_err(DbError::from)
    }

    // ==================== Conversation Operations ====================

    /// Get the stored conversation of a customer, if any
    pub fn get_conversation(&self, tenant_id: &str, customer: &str) -> DbResult<Option<Conversation>> {
        let conn = self.conn();
        let row = conn
            .query_row(
                "SELECT current_node_key, answers, handoff, created_at, updated_at
                 FROM conversations WHERE tenant_id = ?1 AND customer = ?2",
                params![tenant_id, customer],
                |row| {
                    Ok((
                        row.get::<_, Option<String>>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, bool>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()?;

        let Some((current_node_key, answers, handoff, created_at, updated_at)) = row else {
            return Ok(None);
        };

        Ok(Some(Conversation {
            tenant_id: tenant_id.to_string(),
            customer: customer.to_string(),
            state: ConversationState {
                current_node_key,
                answers: serde_json::from_str(&answers)?,
            },
            handoff,
            created_at: parse_datetime(&created_at),
            updated_at: parse_datetime(&updated_at),
        }))
    }

    /// Persist a conversation's state and handoff flag, creating it if needed
    pub fn save_conversation(
        &self,
        tenant_id: &str,
        customer: &str,
        state: &ConversationState,
        handoff: bool,
    ) -> DbResult<()> {
        let conn = self.conn();
        let now = Utc::now().to_rfc3339();
        let answers = serde_json::to_string(&state.answers)?;

        conn.execute(
            "INSERT INTO conversations (tenant_id, customer, current_node_key, answers, handoff, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
             ON CONFLICT(tenant_id, customer) DO UPDATE SET
                current_node_key = excluded.current_node_key,
                answers = excluded.answers,
                handoff = excluded.handoff,
                updated_at = excluded.updated_at",
            params![tenant_id, customer, state.current_node_key, answers, handoff, now],
        )?;
        Ok(())
    }

    /// Clear the handoff flag so the bot answers the customer again
    pub fn release_handoff(&self, tenant_id: &str, customer: &str) -> DbResult<()> {
        let conn = self.conn();

        let updated = conn.execute(
            "UPDATE conversations SET handoff = 0, updated_at = ?1
             WHERE tenant_id = ?2 AND customer = ?3",
            params![Utc::now().to_rfc3339(), tenant_id, customer],
        )?;

        if updated == 0 {
            return Err(DbError::ConversationNotFound {
                tenant_id: tenant_id.to_string(),
                customer: customer.to_string(),
            });
        }
        Ok(())
    }

    // ==================== Inbound Log ====================

    /// Record an inbound message id.
    ///
    /// Returns `false` when the id was already recorded, i.e. the webhook
    /// delivered the same message twice.
    pub fn record_inbound_message(&self, tenant_id: &str, message_id: &str) -> DbResult<bool> {
        let conn = self.conn();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO processed_messages (tenant_id, message_id, received_at)
             VALUES (?1, ?2, ?3)",
            params![tenant_id, message_id, log_timestamp(Utc::now())],
        )?;
        Ok(inserted == 1)
    }

    /// Forget processed message ids received before `cutoff`.
    ///
    /// Returns how many were removed. A redelivery older than the cutoff is
    /// processed again.
    pub fn purge_processed_messages(&self, cutoff: DateTime<Utc>) -> DbResult<usize> {
        let conn = self.conn();
        let deleted = conn.execute(
            "DELETE FROM processed_messages WHERE received_at < ?1",
            params![log_timestamp(cutoff)],
        )?;
        Ok(deleted)
    }
}

/// Fixed-width UTC timestamp, so the message log orders correctly as text
fn log_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a tenant row selected with `TENANT_COLUMNS`
fn parse_tenant_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Tenant> {
    Ok(Tenant {
        id: row.get(0)?,
        name: row.get(1)?,
        phone_number_id: row.get(2)?,
        access_token: row.get(3)?,
        has_tree: row.get(4)?,
        created_at: parse_datetime(&row.get::<_, String>(5)?),
        updated_at: parse_datetime(&row.get::<_, String>(6)?),
    })
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}
