//! Queued local mutations

use crate::types::{EntityType, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of local mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    /// Entity was created locally
    Create,
    /// Entity was updated locally
    Update,
    /// Entity was deleted locally
    Delete,
}

impl OperationKind {
    /// Storage representation
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Create => "create",
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(OperationKind::Create),
            "update" => Ok(OperationKind::Update),
            "delete" => Ok(OperationKind::Delete),
            other => Err(format!("unknown operation '{}'", other)),
        }
    }
}

/// A local mutation that the remote store has not confirmed yet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingOperation {
    /// Auto-increment id assigned by the durable store
    pub id: i64,
    pub entity_type: EntityType,
    pub entity_id: String,
    pub operation: OperationKind,
    /// Request body for create/update, `null` for delete
    pub payload: serde_json::Value,
    pub created_at: Timestamp,
    pub retry_count: i64,
    pub last_error: Option<String>,
}

impl PendingOperation {
    /// Returns true if at least one push attempt failed
    pub fn has_failed(&self) -> bool {
        self.retry_count > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_kind_round_trip() {
        for kind in [OperationKind::Create, OperationKind::Update, OperationKind::Delete] {
            assert_eq!(kind.as_str().parse::<OperationKind>().unwrap(), kind);
        }
        assert!("upsert".parse::<OperationKind>().is_err());
    }

    #[test]
    fn test_has_failed() {
        let mut op = PendingOperation {
            id: 1,
            entity_type: EntityType::Trial,
            entity_id: "t1".to_string(),
            operation: OperationKind::Update,
            payload: serde_json::json!({"status": "active"}),
            created_at: Timestamp::now(),
            retry_count: 0,
            last_error: None,
        };
        assert!(!op.has_failed());

        op.retry_count = 2;
        assert!(op.has_failed());
    }
}
