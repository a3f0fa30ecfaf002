//! Durable event and audit persistence service.
//!
//! [`EventPersistence`] subscribes to the [`EventBus`](crate::bus::EventBus)
//! and writes every [`DispatchEvent`] to `dispatch_events`, then its field
//! changes to `audit_logs` as a SHA-256 hash chain. It runs as a long-lived
//! background task and shuts down when the bus sender is dropped.

use tokio::sync::broadcast;
use towtruck_core::audit::{canonical_entry, compute_integrity_hash, FieldChange};
use towtruck_core::types::DbId;
use towtruck_db::models::audit::CreateAuditLog;
use towtruck_db::repositories::{AuditLogRepo, EventRepo};
use towtruck_db::DbPool;

use crate::bus::DispatchEvent;

/// Background service that persists dispatch events to the database.
pub struct EventPersistence;

impl EventPersistence {
    /// Run the persistence loop until the channel is closed.
    pub async fn run(pool: DbPool, mut receiver: broadcast::Receiver<DispatchEvent>) {
        // The chain tail is cached; this task is the only audit writer.
        let mut last_hash = match AuditLogRepo::find_last_hash(&pool).await {
            Ok(hash) => hash,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load audit chain tail, starting fresh");
                None
            }
        };

        loop {
            match receiver.recv().await {
                Ok(event) => match Self::persist(&pool, &event, last_hash.as_deref()).await {
                    Ok(Some(hash)) => last_hash = Some(hash),
                    Ok(None) => {}
                    Err(e) => {
                        tracing::error!(
                            error = %e,
                            event_type = %event.event_type,
                            "Failed to persist dispatch event"
                        );
                    }
                },
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(
                        skipped = n,
                        "Event persistence lagged, some events were not persisted"
                    );
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Event bus closed, persistence shutting down");
                    break;
                }
            }
        }
    }

    /// Write one event and its audit rows. Returns the new chain tail, if
    /// any audit rows were written.
    async fn persist(
        pool: &DbPool,
        event: &DispatchEvent,
        prev_hash: Option<&str>,
    ) -> Result<Option<String>, sqlx::Error> {
        let event_type = EventRepo::get_event_type_by_name(pool, &event.event_type)
            .await?
            .ok_or(sqlx::Error::RowNotFound)?;

        let event_id = EventRepo::insert(
            pool,
            event_type.id,
            event.station_id,
            event.accident_id,
            event.driver_id,
            &event.payload,
        )
        .await?;

        let (rows, tail) = build_audit_rows(Some(event_id), &event.changes, prev_hash);
        AuditLogRepo::batch_insert(pool, &rows).await?;
        Ok(tail)
    }
}

/// Turn field changes into chained audit rows.
///
/// Each row's hash covers the previous row's hash, starting from
/// `prev_hash`. Returns the rows and the hash of the last one.
pub fn build_audit_rows(
    event_id: Option<DbId>,
    changes: &[FieldChange],
    prev_hash: Option<&str>,
) -> (Vec<CreateAuditLog>, Option<String>) {
    let mut tail = prev_hash.map(str::to_string);
    let rows = changes
        .iter()
        .map(|change| {
            let hash = compute_integrity_hash(tail.as_deref(), &canonical_entry(change));
            tail = Some(hash.clone());
            CreateAuditLog {
                event_id,
                change_type: change.kind.as_str().to_string(),
                entity_type: change.entity.clone(),
                entity_id: change.entity_id,
                field: change.field.clone(),
                old_value: change.old.clone(),
                new_value: change.new.clone(),
                integrity_hash: hash,
            }
        })
        .collect::<Vec<_>>();

    if rows.is_empty() {
        (rows, None)
    } else {
        (rows, tail)
    }
}
