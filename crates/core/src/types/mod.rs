//! Domain types for fieldsync
//!
//! This module contains the sync data model organized by responsibility:
//! - `entity`: the closed registry of syncable entity types
//! - `record`: the local replica of one entity with its sync metadata
//! - `operation`: queued local mutations awaiting remote confirmation
//! - `sync_log`: the append-only audit trail of sync cycles
//! - `remote`: changes reported by the remote store during a pull
//! - `common`: shared utilities

mod common;
mod entity;
mod operation;
mod record;
mod remote;
mod sync_log;

pub use common::{new_record_id, Timestamp};
pub use entity::EntityType;
pub use operation::{OperationKind, PendingOperation};
pub use record::{SyncStatus, SyncableRecord};
pub use remote::{RemoteAction, RemoteChange};
pub use sync_log::{SyncDirection, SyncLogEntry};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_ordering() {
        let t1 = Timestamp::now();
        std::thread::sleep(std::time::Duration::from_millis(10));
        let t2 = Timestamp::now();
        assert!(t2 > t1);
    }

    #[test]
    fn test_every_entity_type_round_trips_its_tag() {
        for entity_type in EntityType::ALL {
            let parsed: EntityType = entity_type.as_str().parse().unwrap();
            assert_eq!(parsed, entity_type);
        }
    }
}
