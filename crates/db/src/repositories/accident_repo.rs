//! Repository for the `accidents` table.

use sqlx::PgPool;
use towtruck_core::accident::{Accident, AccidentStatus};
use towtruck_core::types::DbId;

use crate::models::accident::AccidentRow;

/// Column list for `accidents` queries.
const COLUMNS: &str = "\
    id, reported_by, assigned_to, station_id, description, location, \
    status_id, date_reported, date_assigned, updated_at";

/// Provides read/write operations for accidents.
pub struct AccidentRepo;

impl AccidentRepo {
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<AccidentRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM accidents WHERE id = $1");
        sqlx::query_as::<_, AccidentRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Overwrite the mutable columns of an existing accident.
    ///
    /// Returns `None` if the row no longer exists.
    pub async fn update(
        pool: &PgPool,
        accident: &Accident,
    ) -> Result<Option<AccidentRow>, sqlx::Error> {
        let query = format!(
            "UPDATE accidents SET \
                 assigned_to = $2, station_id = $3, description = $4, location = $5, \
                 status_id = $6, date_assigned = $7, updated_at = NOW() \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, AccidentRow>(&query)
            .bind(accident.id)
            .bind(accident.assigned_to)
            .bind(accident.station_id)
            .bind(&accident.description)
            .bind(&accident.location)
            .bind(accident.status.id())
            .bind(accident.date_assigned)
            .fetch_optional(pool)
            .await
    }

    /// Unassigned `REPORTED` accidents for a station, oldest first.
    ///
    /// This is the order the station queue is rebuilt in on startup.
    pub async fn list_backlog(
        pool: &PgPool,
        station_id: DbId,
    ) -> Result<Vec<AccidentRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM accidents \
             WHERE station_id = $1 AND assigned_to IS NULL AND status_id = $2 \
             ORDER BY date_reported ASC, id ASC"
        );
        sqlx::query_as::<_, AccidentRow>(&query)
            .bind(station_id)
            .bind(AccidentStatus::Reported.id())
            .fetch_all(pool)
            .await
    }

    /// Returns `true` if a row was deleted.
    pub async fn delete(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM accidents WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
