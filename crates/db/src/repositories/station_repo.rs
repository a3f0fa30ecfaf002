//! Repository for the `stations` table.

use sqlx::PgPool;
use towtruck_core::types::DbId;

use crate::models::station::StationRow;

/// Column list for `stations` queries.
const COLUMNS: &str = "id, name, location, created_at, updated_at";

/// Provides read/delete operations for stations.
pub struct StationRepo;

impl StationRepo {
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<StationRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM stations WHERE id = $1");
        sqlx::query_as::<_, StationRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn list(pool: &PgPool) -> Result<Vec<StationRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM stations ORDER BY id ASC");
        sqlx::query_as::<_, StationRow>(&query).fetch_all(pool).await
    }

    /// Returns `true` if a row was deleted.
    pub async fn delete(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM stations WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
