//! Field-level change records for committed dispatch mutations.
//!
//! Every committed write is described as a list of
//! `(entity, id, field, old, new)` tuples. The records travel on the event
//! bus and are written to `audit_logs` by a background task, so the audit
//! trail never sits inside a station's critical section.

use serde::{Deserialize, Serialize};

use crate::hashing;
use crate::types::DbId;

// ---------------------------------------------------------------------------
// Change kinds
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeKind {
    Create,
    Update,
    Delete,
}

impl ChangeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeKind::Create => "CREATE",
            ChangeKind::Update => "UPDATE",
            ChangeKind::Delete => "DELETE",
        }
    }
}

// ---------------------------------------------------------------------------
// FieldChange
// ---------------------------------------------------------------------------

/// One changed field on one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldChange {
    pub entity: String,
    pub entity_id: DbId,
    pub kind: ChangeKind,
    pub field: String,
    pub old: Option<String>,
    pub new: Option<String>,
}

/// An entity whose writes are recorded field by field.
pub trait Auditable {
    /// Entity kind name stored in `audit_logs.entity_type`.
    const ENTITY: &'static str;

    fn entity_id(&self) -> DbId;

    /// Stringified values of every audited field, in a stable order.
    fn audit_fields(&self) -> Vec<(&'static str, Option<String>)>;
}

/// Compare two versions of the same entity and list the fields that differ.
pub fn diff<T: Auditable>(before: &T, after: &T) -> Vec<FieldChange> {
    before
        .audit_fields()
        .into_iter()
        .zip(after.audit_fields())
        .filter(|((_, old), (_, new))| old != new)
        .map(|((field, old), (_, new))| FieldChange {
            entity: T::ENTITY.to_string(),
            entity_id: after.entity_id(),
            kind: ChangeKind::Update,
            field: field.to_string(),
            old,
            new,
        })
        .collect()
}

/// Record a deletion: every field goes from its last value to `None`.
pub fn deleted<T: Auditable>(before: &T) -> Vec<FieldChange> {
    before
        .audit_fields()
        .into_iter()
        .map(|(field, old)| FieldChange {
            entity: T::ENTITY.to_string(),
            entity_id: before.entity_id(),
            kind: ChangeKind::Delete,
            field: field.to_string(),
            old,
            new: None,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Integrity hash computation
// ---------------------------------------------------------------------------

/// Known seed value for the first entry in the hash chain.
const CHAIN_SEED: &str = "DISPATCH_AUDIT_CHAIN_SEED_V1";

/// Compute the SHA-256 integrity hash for an audit log entry.
///
/// `prev_hash` is the hash of the previous entry, or `None` for the first
/// entry in the chain.
pub fn compute_integrity_hash(prev_hash: Option<&str>, entry_data: &str) -> String {
    let prev = prev_hash.unwrap_or(CHAIN_SEED);
    hashing::sha256_hex(format!("{prev}|{entry_data}").as_bytes())
}

/// Canonical string form of a change, used as hash input.
pub fn canonical_entry(change: &FieldChange) -> String {
    format!(
        "{}|{}|{}|{}|{}|{}",
        change.kind.as_str(),
        change.entity,
        change.entity_id,
        change.field,
        change.old.as_deref().unwrap_or(""),
        change.new.as_deref().unwrap_or(""),
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
