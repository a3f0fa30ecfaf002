//! Driver accounts as seen by the dispatch subsystem.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::audit::Auditable;
use crate::error::CoreError;
use crate::types::DbId;

/// Kind of user account. Only drivers can be attached to a station.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserKind {
    HqEmployee,
    Driver,
}

impl UserKind {
    pub fn as_str(self) -> &'static str {
        match self {
            UserKind::HqEmployee => "HQ_EMPLOYEE",
            UserKind::Driver => "DRIVER",
        }
    }
}

impl fmt::Display for UserKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "HQ_EMPLOYEE" => Ok(UserKind::HqEmployee),
            "DRIVER" => Ok(UserKind::Driver),
            other => Err(CoreError::Validation(format!("Unknown user kind '{other}'"))),
        }
    }
}

/// A user account that can be dispatched to accidents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Driver {
    pub id: DbId,
    pub username: String,
    pub kind: UserKind,
    pub station_id: Option<DbId>,
    pub on_duty: bool,
}

impl Driver {
    /// Eligible for a new assignment: attached to a station and off duty.
    pub fn is_assignable(&self) -> bool {
        self.station_id.is_some() && !self.on_duty
    }

    /// Check that this account may be attached to a station at all.
    pub fn ensure_dispatchable(&self) -> Result<(), CoreError> {
        if self.kind != UserKind::Driver {
            return Err(CoreError::Validation(format!(
                "User {} is a {} account and cannot be dispatched",
                self.id, self.kind
            )));
        }
        Ok(())
    }
}

impl Auditable for Driver {
    const ENTITY: &'static str = "driver";

    fn entity_id(&self) -> DbId {
        self.id
    }

    fn audit_fields(&self) -> Vec<(&'static str, Option<String>)> {
        vec![
            ("station_id", self.station_id.map(|s| s.to_string())),
            ("on_duty", Some(self.on_duty.to_string())),
        ]
    }
}
