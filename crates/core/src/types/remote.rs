//! Changes reported by the remote store

use serde::{Deserialize, Serialize};

/// What the remote store did to an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteAction {
    Upsert,
    Delete,
}

/// One entry of a pull response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteChange {
    pub id: String,
    pub action: RemoteAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// Remote revision, when the server reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<i64>,
}

impl RemoteChange {
    /// Creates an upsert change
    pub fn upsert(id: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            action: RemoteAction::Upsert,
            data: Some(data),
            version: None,
        }
    }

    /// Creates a delete change
    pub fn delete(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            action: RemoteAction::Delete,
            data: None,
            version: None,
        }
    }

    /// Sets the remote revision
    pub fn with_version(mut self, version: i64) -> Self {
        self.version = Some(version);
        self
    }

    /// Returns true if this is a deletion
    pub fn is_delete(&self) -> bool {
        self.action == RemoteAction::Delete
    }
}
