//! Event and event-type entity models.

use serde::Serialize;
use sqlx::FromRow;
use towtruck_core::types::{DbId, Timestamp};

/// A row from the `event_types` lookup table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct EventType {
    pub id: DbId,
    pub name: String,
    pub description: Option<String>,
    pub created_at: Timestamp,
}

/// A row from the `dispatch_events` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct DispatchEventRow {
    pub id: DbId,
    pub event_type_id: DbId,
    pub station_id: Option<DbId>,
    pub accident_id: Option<DbId>,
    pub driver_id: Option<DbId>,
    pub payload: serde_json::Value,
    pub created_at: Timestamp,
}
