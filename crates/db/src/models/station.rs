//! Station row model.

use serde::Serialize;
use sqlx::FromRow;
use towtruck_core::station::Station;
use towtruck_core::types::{DbId, Timestamp};

/// A row from the `stations` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct StationRow {
    pub id: DbId,
    pub name: String,
    pub location: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl From<StationRow> for Station {
    fn from(row: StationRow) -> Self {
        Station {
            id: row.id,
            name: row.name,
            location: row.location,
        }
    }
}
