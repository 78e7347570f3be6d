//! Model version records.

use crate::{ModelName, Stage, VersionNumber};
use serde::{Deserialize, Serialize};

/// An immutable registry snapshot of one trained model.
///
/// Only `stage` changes over a version's life; the registry owns that field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelVersion {
    /// Model family this version belongs to.
    pub name: ModelName,
    /// Registry-assigned version number.
    pub version: VersionNumber,
    /// Opaque reference to the training run that produced the artifacts.
    pub run_id: String,
    /// Current lifecycle stage.
    pub stage: Stage,
}

impl ModelVersion {
    /// Create a version record.
    #[must_use]
    pub fn new(name: ModelName, version: VersionNumber, run_id: impl Into<String>, stage: Stage) -> Self {
        Self {
            name,
            version,
            run_id: run_id.into(),
            stage,
        }
    }

    /// URI a serving process loads this version from: `runs:/<run_id>/<name>`.
    #[must_use]
    pub fn model_uri(&self) -> String {
        format!("runs:/{}/{}", self.run_id, self.name)
    }
}

/// Pick the highest-numbered version from a registry listing.
///
/// Registries return "latest per stage" lists in no guaranteed order.
#[must_use]
pub fn latest(versions: Vec<ModelVersion>) -> Option<ModelVersion> {
    versions.into_iter().max_by_key(|v| v.version)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn name() -> ModelName {
        ModelName::new("Best Model").unwrap()
    }

    #[test]
    fn model_uri_uses_run_and_name() {
        let mv = ModelVersion::new(name(), VersionNumber(4), "abc123", Stage::Production);
        assert_eq!(mv.model_uri(), "runs:/abc123/Best Model");
    }

    #[test]
    fn latest_picks_highest_version() {
        let versions = vec![
            ModelVersion::new(name(), VersionNumber(3), "r3", Stage::Staging),
            ModelVersion::new(name(), VersionNumber(11), "r11", Stage::Staging),
            ModelVersion::new(name(), VersionNumber(7), "r7", Stage::Staging),
        ];
        assert_eq!(latest(versions).map(|v| v.version), Some(VersionNumber(11)));
    }

    #[test]
    fn latest_of_empty_is_none() {
        assert!(latest(Vec::new()).is_none());
    }
}
