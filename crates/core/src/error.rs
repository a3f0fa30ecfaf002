use crate::accident::AccidentStatus;
use crate::types::DbId;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: DbId },

    #[error("Accident {accident_id} is already queued")]
    DuplicateEntry { accident_id: DbId },

    #[error("Driver {driver_id} is already on duty")]
    AlreadyOnDuty { driver_id: DbId },

    #[error("Driver {driver_id} is not registered to station {station_id}")]
    NotRegistered { driver_id: DbId, station_id: DbId },

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition {
        from: AccidentStatus,
        to: AccidentStatus,
    },

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Whether the caller may retry the same operation unchanged.
    ///
    /// Only infrastructure failures qualify; every other variant describes a
    /// request that will fail the same way again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::Persistence(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_persistence_errors_are_retryable() {
        assert!(CoreError::Persistence("timeout".into()).is_retryable());
        assert!(!CoreError::DuplicateEntry { accident_id: 1 }.is_retryable());
        assert!(!CoreError::NotFound { entity: "Station", id: 3 }.is_retryable());
    }

    #[test]
    fn messages_name_the_offending_ids() {
        let err = CoreError::NotRegistered {
            driver_id: 4,
            station_id: 9,
        };
        assert_eq!(err.to_string(), "Driver 4 is not registered to station 9");

        let err = CoreError::InvalidTransition {
            from: AccidentStatus::PickedUp,
            to: AccidentStatus::Reported,
        };
        assert_eq!(
            err.to_string(),
            "Invalid status transition: PICKED_UP -> REPORTED"
        );
    }
}
