//! Repository for the `dispatch_events` and `event_types` tables.

use sqlx::PgPool;
use towtruck_core::types::DbId;

use crate::models::event::EventType;

/// Column list for `event_types` queries.
const EVENT_TYPE_COLUMNS: &str = "id, name, description, created_at";

/// Provides read/write operations for dispatch events.
pub struct EventRepo;

impl EventRepo {
    /// Find an event type by its dot-separated name (e.g. `"accident.assigned"`).
    pub async fn get_event_type_by_name(
        pool: &PgPool,
        name: &str,
    ) -> Result<Option<EventType>, sqlx::Error> {
        let query = format!("SELECT {EVENT_TYPE_COLUMNS} FROM event_types WHERE name = $1");
        sqlx::query_as::<_, EventType>(&query)
            .bind(name)
            .fetch_optional(pool)
            .await
    }

    /// Insert a new event row, returning the generated ID.
    pub async fn insert(
        pool: &PgPool,
        event_type_id: DbId,
        station_id: Option<DbId>,
        accident_id: Option<DbId>,
        driver_id: Option<DbId>,
        payload: &serde_json::Value,
    ) -> Result<DbId, sqlx::Error> {
        sqlx::query_scalar(
            "INSERT INTO dispatch_events \
                 (event_type_id, station_id, accident_id, driver_id, payload) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING id",
        )
        .bind(event_type_id)
        .bind(station_id)
        .bind(accident_id)
        .bind(driver_id)
        .bind(payload)
        .fetch_one(pool)
        .await
    }
}
