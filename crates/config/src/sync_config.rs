//! `[sync]` section: remote store, conflict policy and connectivity probing

use crate::validation::{ConfigSection, ValidationError, Validator};
use fieldsync_core::EntityType;
use serde::{Deserialize, Serialize};

/// Accepted values of `sync.conflict_strategy`
pub const CONFLICT_STRATEGIES: [&str; 3] = ["server-wins", "client-wins", "manual"];

/// Synchronization settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SyncSettings {
    /// Base URL of the REST API
    pub base_url: String,

    /// One of `server-wins`, `client-wins`, `manual`
    pub conflict_strategy: String,

    /// Entity types pulled each cycle, in order
    pub entity_types: Vec<EntityType>,

    /// Sync automatically when connectivity comes back
    pub auto_sync_on_reconnect: bool,

    /// Per-request timeout
    pub request_timeout_secs: u64,

    /// URL probed to decide online/offline; the base URL when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connectivity_probe_url: Option<String>,

    /// Seconds between probes
    pub connectivity_probe_interval_secs: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/api".to_string(),
            conflict_strategy: "server-wins".to_string(),
            entity_types: EntityType::ALL.to_vec(),
            auto_sync_on_reconnect: true,
            request_timeout_secs: 30,
            connectivity_probe_url: None,
            connectivity_probe_interval_secs: 15,
        }
    }
}

impl SyncSettings {
    /// URL the connectivity probe should hit
    pub fn probe_url(&self) -> &str {
        self.connectivity_probe_url
            .as_deref()
            .unwrap_or(&self.base_url)
    }
}

impl ConfigSection for SyncSettings {
    fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut results = vec![
            Validator::http_url(&self.base_url, "sync.base_url"),
            Validator::one_of(
                &self.conflict_strategy.as_str(),
                &CONFLICT_STRATEGIES,
                "sync.conflict_strategy",
            ),
            Validator::in_range(self.request_timeout_secs, 1, 300, "sync.request_timeout_secs"),
            Validator::in_range(
                self.connectivity_probe_interval_secs,
                1,
                3600,
                "sync.connectivity_probe_interval_secs",
            ),
        ];

        if self.entity_types.is_empty() {
            results.push(Err(ValidationError::new(
                "sync.entity_types",
                "must list at least one entity type",
            )));
        }

        if let Some(url) = &self.connectivity_probe_url {
            results.push(Validator::http_url(url, "sync.connectivity_probe_url"));
        }

        Validator::collect_errors(results)
    }

    fn merge(&mut self, other: Self) {
        self.base_url = other.base_url;
        self.conflict_strategy = other.conflict_strategy;
        self.entity_types = other.entity_types;
        self.auto_sync_on_reconnect = other.auto_sync_on_reconnect;
        self.request_timeout_secs = other.request_timeout_secs;
        if other.connectivity_probe_url.is_some() {
            self.connectivity_probe_url = other.connectivity_probe_url;
        }
        self.connectivity_probe_interval_secs = other.connectivity_probe_interval_secs;
    }

    fn section_name(&self) -> &'static str {
        "sync"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let settings = SyncSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.entity_types.len(), EntityType::ALL.len());
        assert_eq!(settings.probe_url(), "http://localhost:8000/api");
    }

    #[test]
    fn test_collects_every_problem() {
        let settings = SyncSettings {
            base_url: "localhost".to_string(),
            conflict_strategy: "newest-wins".to_string(),
            entity_types: Vec::new(),
            request_timeout_secs: 0,
            ..SyncSettings::default()
        };

        let errors = settings.validate().unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "sync.base_url",
                "sync.conflict_strategy",
                "sync.request_timeout_secs",
                "sync.entity_types"
            ]
        );
    }

    #[test]
    fn test_probe_url_override() {
        let settings = SyncSettings {
            connectivity_probe_url: Some("https://sync.example.org/health".to_string()),
            ..SyncSettings::default()
        };
        assert!(settings.validate().is_ok());
        assert_eq!(settings.probe_url(), "https://sync.example.org/health");
    }

    #[test]
    fn test_merge_keeps_probe_url_when_unset() {
        let mut base = SyncSettings {
            connectivity_probe_url: Some("https://sync.example.org/health".to_string()),
            ..SyncSettings::default()
        };
        base.merge(SyncSettings {
            conflict_strategy: "manual".to_string(),
            ..SyncSettings::default()
        });

        assert_eq!(base.conflict_strategy, "manual");
        assert!(base.connectivity_probe_url.is_some());
    }
}
