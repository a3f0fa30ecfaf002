//! Accident row model.

use serde::Serialize;
use sqlx::FromRow;
use towtruck_core::accident::{Accident, AccidentStatus, StatusId};
use towtruck_core::error::CoreError;
use towtruck_core::types::{DbId, Timestamp};

/// A row from the `accidents` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AccidentRow {
    pub id: DbId,
    pub reported_by: DbId,
    pub assigned_to: Option<DbId>,
    pub station_id: DbId,
    pub description: String,
    pub location: String,
    pub status_id: StatusId,
    pub date_reported: Timestamp,
    pub date_assigned: Option<Timestamp>,
    pub updated_at: Timestamp,
}

impl AccidentRow {
    /// Convert into the dispatch record, resolving the status lookup id.
    pub fn into_domain(self) -> Result<Accident, CoreError> {
        let status = AccidentStatus::from_id(self.status_id).ok_or_else(|| {
            CoreError::Internal(format!(
                "accident {} has unknown status id {}",
                self.id, self.status_id
            ))
        })?;

        Ok(Accident {
            id: self.id,
            reported_by: self.reported_by,
            description: self.description,
            location: self.location,
            station_id: self.station_id,
            assigned_to: self.assigned_to,
            date_reported: self.date_reported,
            date_assigned: self.date_assigned,
            status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(status_id: StatusId) -> AccidentRow {
        let now = chrono::Utc::now();
        AccidentRow {
            id: 4,
            reported_by: 1,
            assigned_to: Some(9),
            station_id: 2,
            description: "Rollover".into(),
            location: "Exit 12".into(),
            status_id,
            date_reported: now,
            date_assigned: Some(now),
            updated_at: now,
        }
    }

    #[test]
    fn converts_known_status() {
        let accident = row(2).into_domain().unwrap();
        assert_eq!(accident.status, AccidentStatus::OnTheWay);
        assert_eq!(accident.assigned_to, Some(9));
        assert_eq!(accident.station_id, 2);
    }

    #[test]
    fn unknown_status_is_an_internal_error() {
        assert!(matches!(row(42).into_domain(), Err(CoreError::Internal(_))));
    }
}
