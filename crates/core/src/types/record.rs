//! Local replica records and their sync metadata

use crate::types::{EntityType, RemoteChange, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Synchronization state of a replica record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// Local copy matches what the remote store last confirmed
    Synced,
    /// At least one queued operation references the record
    Pending,
    /// Local and remote diverged under the manual strategy
    Conflict,
    /// The record could not be synchronized
    Error,
}

impl SyncStatus {
    /// Storage representation
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Synced => "synced",
            SyncStatus::Pending => "pending",
            SyncStatus::Conflict => "conflict",
            SyncStatus::Error => "error",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "synced" => Ok(SyncStatus::Synced),
            "pending" => Ok(SyncStatus::Pending),
            "conflict" => Ok(SyncStatus::Conflict),
            "error" => Ok(SyncStatus::Error),
            other => Err(format!("unknown sync status '{}'", other)),
        }
    }
}

/// The best local view of one domain entity
///
/// Domain fields are carried opaquely in `data`; the sync engine only
/// interprets the metadata around them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncableRecord {
    pub id: String,
    pub entity_type: EntityType,
    /// Incremented on every local write
    pub sync_version: i64,
    pub sync_status: SyncStatus,
    /// Set only when a remote change is applied
    pub server_version: Option<i64>,
    pub last_sync_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    /// Tombstone for a local delete that has not been confirmed yet
    pub deleted: bool,
    /// Remote side retained while the record is in conflict
    pub conflict_remote: Option<RemoteChange>,
    pub data: serde_json::Value,
}

impl SyncableRecord {
    /// Returns true if the record awaits a manual resolution
    pub fn is_conflicted(&self) -> bool {
        self.sync_status == SyncStatus::Conflict
    }

    /// Reads a top-level domain field
    pub fn field(&self, name: &str) -> Option<&serde_json::Value> {
        self.data.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            SyncStatus::Synced,
            SyncStatus::Pending,
            SyncStatus::Conflict,
            SyncStatus::Error,
        ] {
            assert_eq!(status.as_str().parse::<SyncStatus>().unwrap(), status);
        }
        assert!("stale".parse::<SyncStatus>().is_err());
    }

    #[test]
    fn test_field_access() {
        let now = Timestamp::now();
        let record = SyncableRecord {
            id: "g1".to_string(),
            entity_type: EntityType::Germplasm,
            sync_version: 1,
            sync_status: SyncStatus::Pending,
            server_version: None,
            last_sync_at: None,
            created_at: now,
            updated_at: now,
            deleted: false,
            conflict_remote: None,
            data: serde_json::json!({"name": "IR64"}),
        };

        assert_eq!(record.field("name"), Some(&serde_json::json!("IR64")));
        assert!(!record.is_conflicted());
    }
}
