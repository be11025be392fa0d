//! Conflict detection and resolution
//!
//! The resolver is a pure function of the local record, whether it has
//! queued operations, and the configured strategy. It never touches the
//! store; the orchestrator applies its verdict.

use fieldsync_core::{RemoteChange, SyncableRecord};
use fieldsync_database::RemoteApply;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Strategy applied when a remote change meets a locally diverged record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictStrategy {
    /// Remote data overwrites local data and local operations are dropped
    #[default]
    ServerWins,
    /// The remote change is ignored; local operations are pushed later
    ClientWins,
    /// Both sides are kept and the record is flagged for a later resolution
    Manual,
}

impl ConflictStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictStrategy::ServerWins => "server-wins",
            ConflictStrategy::ClientWins => "client-wins",
            ConflictStrategy::Manual => "manual",
        }
    }
}

impl fmt::Display for ConflictStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConflictStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "server-wins" => Ok(ConflictStrategy::ServerWins),
            "client-wins" => Ok(ConflictStrategy::ClientWins),
            "manual" => Ok(ConflictStrategy::Manual),
            other => Err(format!(
                "unknown conflict strategy '{}' (expected server-wins, client-wins or manual)",
                other
            )),
        }
    }
}

/// Explicit resolution of a record left in conflict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictResolution {
    ServerWins,
    ClientWins,
    Merge,
}

impl ConflictResolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictResolution::ServerWins => "server-wins",
            ConflictResolution::ClientWins => "client-wins",
            ConflictResolution::Merge => "merge",
        }
    }
}

impl fmt::Display for ConflictResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConflictResolution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "server-wins" => Ok(ConflictResolution::ServerWins),
            "client-wins" => Ok(ConflictResolution::ClientWins),
            "merge" => Ok(ConflictResolution::Merge),
            other => Err(format!(
                "unknown resolution '{}' (expected server-wins, client-wins or merge)",
                other
            )),
        }
    }
}

/// Per-change outcome, aggregated into the cycle counts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOutcome {
    Applied,
    Conflict,
    Skipped,
}

/// What to do with one incoming remote change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Write the remote change; with `discard_pending` local operations go too
    Apply { discard_pending: bool },
    /// Keep local data and retain the remote side
    Conflict,
    /// Leave everything as it is
    Skip,
}

impl From<RemoteApply> for ChangeOutcome {
    fn from(verdict: RemoteApply) -> Self {
        match verdict {
            RemoteApply::Overwrite { .. } => ChangeOutcome::Applied,
            RemoteApply::MarkConflict => ChangeOutcome::Conflict,
            RemoteApply::Ignore => ChangeOutcome::Skipped,
        }
    }
}

impl From<Decision> for RemoteApply {
    fn from(decision: Decision) -> Self {
        match decision {
            Decision::Apply { discard_pending } => RemoteApply::Overwrite { discard_pending },
            Decision::Conflict => RemoteApply::MarkConflict,
            Decision::Skip => RemoteApply::Ignore,
        }
    }
}

/// Decides how remote changes interact with local state
#[derive(Debug, Clone, Copy, Default)]
pub struct ConflictResolver {
    strategy: ConflictStrategy,
}

impl ConflictResolver {
    /// Creates a resolver for the given strategy
    pub fn new(strategy: ConflictStrategy) -> Self {
        Self { strategy }
    }

    /// Returns the configured strategy
    pub fn strategy(&self) -> ConflictStrategy {
        self.strategy
    }

    /// Decides what to do with `change` given the local record
    ///
    /// A record has diverged when it has queued operations or is already
    /// waiting for a resolution. Remote deletes follow the same rules as
    /// upserts.
    pub fn decide(
        &self,
        local: Option<&SyncableRecord>,
        has_pending: bool,
        _change: &RemoteChange,
    ) -> Decision {
        let diverged = match local {
            Some(record) => has_pending || record.is_conflicted(),
            None => false,
        };

        if !diverged {
            return Decision::Apply {
                discard_pending: false,
            };
        }

        match self.strategy {
            ConflictStrategy::ServerWins => Decision::Apply {
                discard_pending: true,
            },
            ConflictStrategy::ClientWins => Decision::Skip,
            ConflictStrategy::Manual => Decision::Conflict,
        }
    }
}

/// Deep-merges `local` over `remote`
///
/// Nested objects are merged key by key; for any other value the local
/// side wins. Keys only present remotely are kept.
pub fn deep_merge(remote: &Value, local: &Value) -> Value {
    match (remote, local) {
        (Value::Object(remote), Value::Object(local)) => {
            let mut merged = remote.clone();
            for (key, local_value) in local {
                let value = match remote.get(key) {
                    Some(remote_value) => deep_merge(remote_value, local_value),
                    None => local_value.clone(),
                };
                merged.insert(key.clone(), value);
            }
            Value::Object(merged)
        }
        (_, local) => local.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldsync_core::{EntityType, SyncStatus, Timestamp};
    use serde_json::json;

    fn record(status: SyncStatus) -> SyncableRecord {
        let now = Timestamp::now();
        SyncableRecord {
            id: "t1".to_string(),
            entity_type: EntityType::Trial,
            sync_version: 2,
            sync_status: status,
            server_version: Some(1),
            last_sync_at: None,
            created_at: now,
            updated_at: now,
            deleted: false,
            conflict_remote: None,
            data: json!({"status": "active"}),
        }
    }

    #[test]
    fn test_every_strategy_applies_when_not_diverged() {
        let synced = record(SyncStatus::Synced);
        let change = RemoteChange::upsert("t1", json!({"status": "closed"}));

        for strategy in [
            ConflictStrategy::ServerWins,
            ConflictStrategy::ClientWins,
            ConflictStrategy::Manual,
        ] {
            let resolver = ConflictResolver::new(strategy);
            assert_eq!(
                resolver.decide(Some(&synced), false, &change),
                Decision::Apply {
                    discard_pending: false
                }
            );
            assert_eq!(
                resolver.decide(None, false, &RemoteChange::delete("t1")),
                Decision::Apply {
                    discard_pending: false
                }
            );
        }
    }

    #[test]
    fn test_pending_record_by_strategy() {
        let pending = record(SyncStatus::Pending);
        let change = RemoteChange::delete("t1");

        let decide =
            |strategy| ConflictResolver::new(strategy).decide(Some(&pending), true, &change);

        assert_eq!(
            decide(ConflictStrategy::ServerWins),
            Decision::Apply {
                discard_pending: true
            }
        );
        assert_eq!(decide(ConflictStrategy::ClientWins), Decision::Skip);
        assert_eq!(decide(ConflictStrategy::Manual), Decision::Conflict);
    }

    #[test]
    fn test_conflicted_record_counts_as_diverged() {
        let conflicted = record(SyncStatus::Conflict);
        let change = RemoteChange::upsert("t1", json!({"status": "closed"}));

        let resolver = ConflictResolver::new(ConflictStrategy::Manual);
        assert_eq!(
            resolver.decide(Some(&conflicted), false, &change),
            Decision::Conflict
        );
    }

    #[test]
    fn test_decision_maps_to_store_verdict() {
        assert_eq!(
            RemoteApply::from(Decision::Apply {
                discard_pending: true
            }),
            RemoteApply::Overwrite {
                discard_pending: true
            }
        );
        assert_eq!(RemoteApply::from(Decision::Conflict), RemoteApply::MarkConflict);
        assert_eq!(RemoteApply::from(Decision::Skip), RemoteApply::Ignore);
    }

    #[test]
    fn test_store_verdict_maps_to_outcome() {
        assert_eq!(
            ChangeOutcome::from(RemoteApply::Overwrite {
                discard_pending: false
            }),
            ChangeOutcome::Applied
        );
        assert_eq!(
            ChangeOutcome::from(RemoteApply::MarkConflict),
            ChangeOutcome::Conflict
        );
        assert_eq!(ChangeOutcome::from(RemoteApply::Ignore), ChangeOutcome::Skipped);
    }

    #[test]
    fn test_strategy_parsing() {
        assert_eq!(
            "client-wins".parse::<ConflictStrategy>().unwrap(),
            ConflictStrategy::ClientWins
        );
        assert_eq!(ConflictStrategy::default(), ConflictStrategy::ServerWins);
        assert!("newest".parse::<ConflictStrategy>().is_err());
        assert_eq!(
            "merge".parse::<ConflictResolution>().unwrap(),
            ConflictResolution::Merge
        );
    }

    #[test]
    fn test_deep_merge_prefers_local_scalars() {
        let remote = json!({
            "status": "closed",
            "location": {"site": "Los Banos", "plot": 4},
            "season": "dry"
        });
        let local = json!({
            "status": "active",
            "location": {"plot": 7},
            "notes": "replanted"
        });

        assert_eq!(
            deep_merge(&remote, &local),
            json!({
                "status": "active",
                "location": {"site": "Los Banos", "plot": 7},
                "season": "dry",
                "notes": "replanted"
            })
        );
    }

    #[test]
    fn test_deep_merge_replaces_mismatched_shapes() {
        assert_eq!(deep_merge(&json!({"a": 1}), &json!([1, 2])), json!([1, 2]));
        assert_eq!(deep_merge(&json!({"a": {"b": 1}}), &json!({"a": 3})), json!({"a": 3}));
    }
}
