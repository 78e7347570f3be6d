//! Read-only view of where a model's active versions stand.

use crate::registry::latest_in_stage;
use crate::retry::{RetryExhausted, RetryPolicy, Sleeper};
use crate::{ModelName, ModelRegistry, ModelVersion, RegistryError, Stage};
use serde::Serialize;

/// Newest Staging and Production versions of one model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageSnapshot {
    /// Model name.
    pub model: ModelName,
    /// Newest version in Staging.
    pub staging: Option<ModelVersion>,
    /// Newest version in Production.
    pub production: Option<ModelVersion>,
}

impl StageSnapshot {
    /// Query both active stages, each lookup retried per `policy`.
    pub fn capture<R, S>(
        registry: &R,
        model: &ModelName,
        policy: &RetryPolicy,
        sleeper: &S,
    ) -> Result<Self, RetryExhausted<RegistryError>>
    where
        R: ModelRegistry + ?Sized,
        S: Sleeper + ?Sized,
    {
        let staging = latest_in_stage(registry, model, Stage::Staging, policy, sleeper)?;
        let production = latest_in_stage(registry, model, Stage::Production, policy, sleeper)?;

        Ok(Self {
            model: model.clone(),
            staging,
            production,
        })
    }

    /// Version for `stage`, if the snapshot tracks it.
    #[must_use]
    pub fn get(&self, stage: Stage) -> Option<&ModelVersion> {
        match stage {
            Stage::Staging => self.staging.as_ref(),
            Stage::Production => self.production.as_ref(),
            Stage::None | Stage::Archived => None,
        }
    }

    /// Plain-text rendering for the CLI.
    #[must_use]
    pub fn to_text(&self) -> String {
        let mut output = format!("Model: {}\n", self.model);
        for (label, slot) in [("Staging", &self.staging), ("Production", &self.production)] {
            match slot {
                Some(mv) => output.push_str(&format!(
                    "  {:<11} v{} ({})\n",
                    label,
                    mv.version,
                    mv.model_uri()
                )),
                None => output.push_str(&format!("  {:<11} -\n", label)),
            }
        }
        output
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::retry::RecordingSleeper;
    use crate::InMemoryRegistry;

    #[test]
    fn capture_reports_both_stages() {
        let name = ModelName::new("Best Model").unwrap();
        let registry = InMemoryRegistry::new();
        registry.with_version(&name, "old", Stage::Production);
        registry.with_version(&name, "new", Stage::Staging);

        let snapshot =
            StageSnapshot::capture(&registry, &name, &RetryPolicy::default(), &RecordingSleeper::new())
                .unwrap();

        assert_eq!(snapshot.get(Stage::Staging).map(|v| v.run_id.as_str()), Some("new"));
        assert_eq!(snapshot.get(Stage::Production).map(|v| v.run_id.as_str()), Some("old"));
        assert!(snapshot.get(Stage::Archived).is_none());

        let text = snapshot.to_text();
        assert!(text.contains("runs:/new/Best Model"));
        assert!(text.contains("runs:/old/Best Model"));
    }

    #[test]
    fn capture_renders_empty_slots() {
        let name = ModelName::new("m").unwrap();
        let registry = InMemoryRegistry::new();
        registry.register(&name, "r");

        let snapshot =
            StageSnapshot::capture(&registry, &name, &RetryPolicy::default(), &RecordingSleeper::new())
                .unwrap();
        assert!(snapshot.staging.is_none());
        assert!(snapshot.to_text().contains("Production  -"));
    }
}
