//! Status projection for display

use serde::{Deserialize, Serialize};
use std::fmt;

/// One-word status shown to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineStatus {
    Syncing,
    Offline,
    Pending,
    Synced,
}

impl EngineStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineStatus::Syncing => "syncing",
            EngineStatus::Offline => "offline",
            EngineStatus::Pending => "pending",
            EngineStatus::Synced => "synced",
        }
    }
}

impl fmt::Display for EngineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derives the status word; earlier conditions take precedence
pub fn derive_status(syncing: bool, online: bool, pending_count: i64) -> EngineStatus {
    if syncing {
        EngineStatus::Syncing
    } else if !online {
        EngineStatus::Offline
    } else if pending_count > 0 {
        EngineStatus::Pending
    } else {
        EngineStatus::Synced
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precedence() {
        assert_eq!(derive_status(true, false, 3), EngineStatus::Syncing);
        assert_eq!(derive_status(false, false, 3), EngineStatus::Offline);
        assert_eq!(derive_status(false, true, 3), EngineStatus::Pending);
        assert_eq!(derive_status(false, true, 0), EngineStatus::Synced);
        assert_eq!(derive_status(false, false, 0), EngineStatus::Offline);
    }

    #[test]
    fn test_display() {
        assert_eq!(EngineStatus::Pending.to_string(), "pending");
    }
}
