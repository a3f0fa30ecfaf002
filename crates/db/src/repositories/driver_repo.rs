//! Repository for the dispatch columns of `user_accounts`.

use sqlx::PgPool;
use towtruck_core::driver::{Driver, UserKind};
use towtruck_core::types::DbId;

use crate::models::driver::DriverRow;

/// Column list for `user_accounts` queries.
const COLUMNS: &str = "id, username, kind, station_id, is_on_duty, updated_at";

/// Provides read/write operations for driver accounts.
pub struct DriverRepo;

impl DriverRepo {
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<DriverRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM user_accounts WHERE id = $1");
        sqlx::query_as::<_, DriverRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Persist station affiliation and duty flag.
    ///
    /// Returns `None` if the account no longer exists.
    pub async fn update(pool: &PgPool, driver: &Driver) -> Result<Option<DriverRow>, sqlx::Error> {
        let query = format!(
            "UPDATE user_accounts SET station_id = $2, is_on_duty = $3, updated_at = NOW() \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, DriverRow>(&query)
            .bind(driver.id)
            .bind(driver.station_id)
            .bind(driver.on_duty)
            .fetch_optional(pool)
            .await
    }

    /// All driver accounts attached to a station, lowest id first.
    pub async fn list_by_station(
        pool: &PgPool,
        station_id: DbId,
    ) -> Result<Vec<DriverRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM user_accounts \
             WHERE station_id = $1 AND kind = $2 \
             ORDER BY id ASC"
        );
        sqlx::query_as::<_, DriverRow>(&query)
            .bind(station_id)
            .bind(UserKind::Driver.as_str())
            .fetch_all(pool)
            .await
    }
}
