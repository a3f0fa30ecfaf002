//! User account row model, seen through its dispatch-relevant columns.

use serde::Serialize;
use sqlx::FromRow;
use towtruck_core::driver::{Driver, UserKind};
use towtruck_core::error::CoreError;
use towtruck_core::types::{DbId, Timestamp};

/// A row from the `user_accounts` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct DriverRow {
    pub id: DbId,
    pub username: String,
    pub kind: String,
    pub station_id: Option<DbId>,
    pub is_on_duty: bool,
    pub updated_at: Timestamp,
}

impl DriverRow {
    pub fn into_domain(self) -> Result<Driver, CoreError> {
        let kind: UserKind = self.kind.parse().map_err(|_| {
            CoreError::Internal(format!(
                "user account {} has unknown kind '{}'",
                self.id, self.kind
            ))
        })?;

        Ok(Driver {
            id: self.id,
            username: self.username,
            kind,
            station_id: self.station_id,
            on_duty: self.is_on_duty,
        })
    }
}
