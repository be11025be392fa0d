//! Append-only audit trail of sync cycles

use crate::types::{EntityType, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Direction of a logged sync phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncDirection {
    Push,
    Pull,
}

impl SyncDirection {
    /// Storage representation
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncDirection::Push => "push",
            SyncDirection::Pull => "pull",
        }
    }
}

impl fmt::Display for SyncDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "push" => Ok(SyncDirection::Push),
            "pull" => Ok(SyncDirection::Pull),
            other => Err(format!("unknown sync direction '{}'", other)),
        }
    }
}

/// One logged push or pull phase for a single entity type
///
/// For pulls, `timestamp` is the moment the request was issued; the latest
/// pull entry without failures is the next checkpoint for its entity type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncLogEntry {
    /// Auto-increment id assigned by the durable store (0 before insertion)
    pub id: i64,
    pub timestamp: Timestamp,
    pub direction: SyncDirection,
    pub entity_type: EntityType,
    pub records_processed: i64,
    pub records_failed: i64,
    pub errors: Vec<String>,
    pub duration_ms: i64,
}

impl SyncLogEntry {
    /// Creates an entry that has not been stored yet
    pub fn new(direction: SyncDirection, entity_type: EntityType, started_at: Timestamp) -> Self {
        Self {
            id: 0,
            timestamp: started_at,
            direction,
            entity_type,
            records_processed: 0,
            records_failed: 0,
            errors: Vec::new(),
            duration_ms: 0,
        }
    }

    /// Returns true if nothing in this phase failed
    pub fn is_clean(&self) -> bool {
        self.records_failed == 0 && self.errors.is_empty()
    }
}
