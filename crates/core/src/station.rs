use serde::{Deserialize, Serialize};

use crate::types::DbId;

/// A physical dispatch point owning a driver pool and an accident backlog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Station {
    pub id: DbId,
    pub name: String,
    pub location: String,
}
