//! Registry of syncable entity types

use crate::error::AppError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Entity types kept in a local replica and synchronized with the remote store
///
/// The tag (`as_str`) doubles as the REST resource segment, and every
/// variant owns exactly one replica table. Both mappings are static, so a
/// table handle is resolved once from the variant rather than looked up by
/// name on each call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    /// Breeding program
    Program,
    /// Field trial
    Trial,
    /// Study within a trial
    Study,
    /// Germplasm accession
    Germplasm,
    /// Planned or performed cross
    Cross,
    /// Phenotypic observation
    Observation,
    /// Field location
    Location,
}

impl EntityType {
    /// Every registered entity type, in pull order
    pub const ALL: [EntityType; 7] = [
        EntityType::Program,
        EntityType::Location,
        EntityType::Trial,
        EntityType::Study,
        EntityType::Germplasm,
        EntityType::Cross,
        EntityType::Observation,
    ];

    /// Wire tag and REST path segment
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Program => "program",
            EntityType::Trial => "trial",
            EntityType::Study => "study",
            EntityType::Germplasm => "germplasm",
            EntityType::Cross => "cross",
            EntityType::Observation => "observation",
            EntityType::Location => "location",
        }
    }

    /// Name of the local replica table for this entity type
    pub fn replica_table(&self) -> &'static str {
        match self {
            EntityType::Program => "replica_program",
            EntityType::Trial => "replica_trial",
            EntityType::Study => "replica_study",
            EntityType::Germplasm => "replica_germplasm",
            EntityType::Cross => "replica_cross",
            EntityType::Observation => "replica_observation",
            EntityType::Location => "replica_location",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityType::ALL
            .into_iter()
            .find(|entity_type| entity_type.as_str() == s.trim().to_ascii_lowercase())
            .ok_or_else(|| AppError::InvalidArgument {
                argument: "entity_type".to_string(),
                reason: format!("unknown entity type '{}'", s),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_tags() {
        assert_eq!("germplasm".parse::<EntityType>().unwrap(), EntityType::Germplasm);
        assert_eq!("Trial".parse::<EntityType>().unwrap(), EntityType::Trial);
    }

    #[test]
    fn test_parse_unknown_tag() {
        let err = "plot".parse::<EntityType>().unwrap_err();
        assert!(err.to_string().contains("plot"));
    }

    #[test]
    fn test_replica_tables_are_distinct() {
        let mut tables: Vec<_> = EntityType::ALL.iter().map(|t| t.replica_table()).collect();
        tables.sort();
        tables.dedup();
        assert_eq!(tables.len(), EntityType::ALL.len());
    }

    #[test]
    fn test_serde_uses_tag() {
        let json = serde_json::to_string(&EntityType::Observation).unwrap();
        assert_eq!(json, "\"observation\"");
    }
}
