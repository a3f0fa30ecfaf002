//! Repository for the append-only `audit_logs` table.

use sqlx::PgPool;
use towtruck_core::types::DbId;

use crate::models::audit::{AuditLog, CreateAuditLog};

/// Column list for `audit_logs` SELECT queries.
const COLUMNS: &str = "\
    id, event_id, change_type, entity_type, entity_id, field, \
    old_value, new_value, integrity_hash, created_at";

/// Column list for INSERT (excludes auto-generated `id` and `created_at`).
const INSERT_COLUMNS: &str = "\
    event_id, change_type, entity_type, entity_id, field, \
    old_value, new_value, integrity_hash";

/// Number of bound parameters per inserted row.
const PARAMS_PER_ROW: u32 = 8;

/// Provides insert and query operations for audit logs.
pub struct AuditLogRepo;

impl AuditLogRepo {
    /// Batch insert multiple audit log entries in one statement.
    pub async fn batch_insert(
        pool: &PgPool,
        entries: &[CreateAuditLog],
    ) -> Result<Vec<AuditLog>, sqlx::Error> {
        if entries.is_empty() {
            return Ok(Vec::new());
        }

        let mut query = format!("INSERT INTO audit_logs ({INSERT_COLUMNS}) VALUES ");
        let mut param_idx = 1u32;
        for (row, _) in entries.iter().enumerate() {
            if row > 0 {
                query.push_str(", ");
            }
            query.push('(');
            for i in 0..PARAMS_PER_ROW {
                if i > 0 {
                    query.push_str(", ");
                }
                query.push_str(&format!("${param_idx}"));
                param_idx += 1;
            }
            query.push(')');
        }
        query.push_str(&format!(" RETURNING {COLUMNS}"));

        let mut q = sqlx::query_as::<_, AuditLog>(&query);
        for entry in entries {
            q = q
                .bind(entry.event_id)
                .bind(&entry.change_type)
                .bind(&entry.entity_type)
                .bind(entry.entity_id)
                .bind(&entry.field)
                .bind(&entry.old_value)
                .bind(&entry.new_value)
                .bind(&entry.integrity_hash);
        }

        q.fetch_all(pool).await
    }

    /// Find the integrity hash of the most recent audit log entry.
    pub async fn find_last_hash(pool: &PgPool) -> Result<Option<String>, sqlx::Error> {
        sqlx::query_scalar::<_, String>(
            "SELECT integrity_hash FROM audit_logs ORDER BY id DESC LIMIT 1",
        )
        .fetch_optional(pool)
        .await
    }

    /// Change history of one entity, oldest first.
    pub async fn list_for_entity(
        pool: &PgPool,
        entity_type: &str,
        entity_id: DbId,
    ) -> Result<Vec<AuditLog>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM audit_logs \
             WHERE entity_type = $1 AND entity_id = $2 \
             ORDER BY id ASC"
        );
        sqlx::query_as::<_, AuditLog>(&query)
            .bind(entity_type)
            .bind(entity_id)
            .fetch_all(pool)
            .await
    }
}
