//! Audit log entity models.
//!
//! Audit rows are append-only; there is no `updated_at`.

use serde::Serialize;
use sqlx::FromRow;
use towtruck_core::types::{DbId, Timestamp};

/// A single field change recorded in `audit_logs`.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AuditLog {
    pub id: DbId,
    pub event_id: Option<DbId>,
    pub change_type: String,
    pub entity_type: String,
    pub entity_id: DbId,
    pub field: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub integrity_hash: String,
    pub created_at: Timestamp,
}

/// DTO for inserting an audit row.
#[derive(Debug, Clone)]
pub struct CreateAuditLog {
    pub event_id: Option<DbId>,
    pub change_type: String,
    pub entity_type: String,
    pub entity_id: DbId,
    pub field: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub integrity_hash: String,
}
