//! Accident record and its status state machine.
//!
//! Status ids match the `accident_statuses` seed data (1-based SMALLINT).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::audit::Auditable;
use crate::error::CoreError;
use crate::types::{DbId, Timestamp};

/// Status ID type matching SMALLINT in the database.
pub type StatusId = i16;

// ---------------------------------------------------------------------------
// AccidentStatus
// ---------------------------------------------------------------------------

/// Lifecycle status of a reported accident.
#[repr(i16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccidentStatus {
    Reported = 1,
    OnTheWay = 2,
    PickedUp = 3,
    Completed = 4,
}

impl AccidentStatus {
    pub const ALL: [AccidentStatus; 4] = [
        AccidentStatus::Reported,
        AccidentStatus::OnTheWay,
        AccidentStatus::PickedUp,
        AccidentStatus::Completed,
    ];

    /// Return the database status ID.
    pub fn id(self) -> StatusId {
        self as StatusId
    }

    /// Resolve a database status ID.
    pub fn from_id(id: StatusId) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.id() == id)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AccidentStatus::Reported => "REPORTED",
            AccidentStatus::OnTheWay => "ON_THE_WAY",
            AccidentStatus::PickedUp => "PICKED_UP",
            AccidentStatus::Completed => "COMPLETED",
        }
    }

    pub fn is_terminal(self) -> bool {
        self == AccidentStatus::Completed
    }

    /// The single forward step from this status, if any.
    pub fn next(self) -> Option<Self> {
        match self {
            AccidentStatus::Reported => Some(AccidentStatus::OnTheWay),
            AccidentStatus::OnTheWay => Some(AccidentStatus::PickedUp),
            AccidentStatus::PickedUp => Some(AccidentStatus::Completed),
            AccidentStatus::Completed => None,
        }
    }
}

impl From<AccidentStatus> for StatusId {
    fn from(value: AccidentStatus) -> Self {
        value as StatusId
    }
}

impl fmt::Display for AccidentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccidentStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| CoreError::Validation(format!("Unknown accident status '{s}'")))
    }
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

pub mod state_machine {
    use super::AccidentStatus;
    use crate::error::CoreError;

    /// Statuses reachable from `from`.
    ///
    /// One step forward, plus the cancellation jump to `Completed` from any
    /// non-terminal status. `Completed` has no outgoing transitions.
    pub fn valid_transitions(from: AccidentStatus) -> &'static [AccidentStatus] {
        match from {
            AccidentStatus::Reported => &[AccidentStatus::OnTheWay, AccidentStatus::Completed],
            AccidentStatus::OnTheWay => &[AccidentStatus::PickedUp, AccidentStatus::Completed],
            AccidentStatus::PickedUp => &[AccidentStatus::Completed],
            AccidentStatus::Completed => &[],
        }
    }

    pub fn can_transition(from: AccidentStatus, to: AccidentStatus) -> bool {
        valid_transitions(from).contains(&to)
    }

    /// Validate a status update.
    ///
    /// Returns `Ok(false)` for a same-status update (an idempotent no-op),
    /// `Ok(true)` for a real transition.
    pub fn validate_transition(from: AccidentStatus, to: AccidentStatus) -> Result<bool, CoreError> {
        if from == to {
            return Ok(false);
        }
        if can_transition(from, to) {
            Ok(true)
        } else {
            Err(CoreError::InvalidTransition { from, to })
        }
    }

    /// Whether entering `to` needs a driver already bound to the accident.
    pub fn requires_driver(to: AccidentStatus) -> bool {
        matches!(to, AccidentStatus::OnTheWay | AccidentStatus::PickedUp)
    }
}

// ---------------------------------------------------------------------------
// Accident
// ---------------------------------------------------------------------------

/// A reported accident as seen by the dispatch subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Accident {
    pub id: DbId,
    pub reported_by: DbId,
    pub description: String,
    pub location: String,
    pub station_id: DbId,
    pub assigned_to: Option<DbId>,
    pub date_reported: Timestamp,
    pub date_assigned: Option<Timestamp>,
    pub status: AccidentStatus,
}

impl Accident {
    /// An accident may wait in a station queue only while it is unassigned
    /// and still `Reported`.
    pub fn is_queueable(&self) -> bool {
        self.assigned_to.is_none() && self.status == AccidentStatus::Reported
    }

    /// Whether this accident currently holds its driver on duty.
    pub fn holds_driver(&self) -> bool {
        self.assigned_to.is_some() && !self.status.is_terminal()
    }

    /// Bind a driver. Status is left untouched; it only moves through
    /// explicit status updates.
    pub fn assign(&mut self, driver_id: DbId, at: Timestamp) {
        self.assigned_to = Some(driver_id);
        self.date_assigned = Some(at);
    }
}

impl Auditable for Accident {
    const ENTITY: &'static str = "accident";

    fn entity_id(&self) -> DbId {
        self.id
    }

    fn audit_fields(&self) -> Vec<(&'static str, Option<String>)> {
        vec![
            ("description", Some(self.description.clone())),
            ("location", Some(self.location.clone())),
            ("station_id", Some(self.station_id.to_string())),
            ("assigned_to", self.assigned_to.map(|d| d.to_string())),
            ("date_assigned", self.date_assigned.map(|t| t.to_rfc3339())),
            ("status", Some(self.status.to_string())),
        ]
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
