//! # In-Memory Registry
//!
//! A [`ModelRegistry`] held in process memory.
//!
//! Uses `BTreeMap` so listings come back in a stable order. Every transition
//! call is journaled (including the ones that fail), and faults can be
//! injected per call kind, which is what the promotion tests lean on.

use crate::registry::apply_transition;
use crate::{ModelName, ModelRegistry, ModelVersion, RegistryError, Stage, VersionNumber};
use std::cell::RefCell;
use std::collections::BTreeMap;

/// One `transition_stage` call as the registry saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionRecord {
    /// Model name.
    pub name: ModelName,
    /// Version the call targeted.
    pub version: VersionNumber,
    /// Stage requested.
    pub to: Stage,
    /// Value of the `archive_existing` flag.
    pub archive_existing: bool,
    /// Whether the call changed the registry.
    pub applied: bool,
}

#[derive(Debug, Default)]
struct Faults {
    /// Remaining failures for any transition.
    transitions: u32,
    /// Remaining failures for transitions into a specific stage.
    transitions_to: BTreeMap<Stage, u32>,
    /// Remaining failures for lookups.
    lookups: u32,
}

impl Faults {
    fn take_transition(&mut self, target: Stage) -> bool {
        if let Some(remaining) = self.transitions_to.get_mut(&target) {
            if *remaining > 0 {
                *remaining -= 1;
                return true;
            }
        }
        take(&mut self.transitions)
    }
}

fn take(counter: &mut u32) -> bool {
    if *counter > 0 {
        *counter -= 1;
        true
    } else {
        false
    }
}

/// Process-local model registry.
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    models: RefCell<BTreeMap<ModelName, Vec<ModelVersion>>>,
    journal: RefCell<Vec<TransitionRecord>>,
    faults: RefCell<Faults>,
    lookups: RefCell<u32>,
}

impl InMemoryRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new version of `name` at stage None.
    ///
    /// Version numbers start at 1 and increase by one per registration.
    pub fn register(&self, name: &ModelName, run_id: &str) -> ModelVersion {
        let mut models = self.models.borrow_mut();
        let versions = models.entry(name.clone()).or_default();
        let next = versions.iter().map(|v| v.version.0).max().unwrap_or(0) + 1;
        let mv = ModelVersion::new(name.clone(), VersionNumber(next), run_id, Stage::None);
        versions.push(mv.clone());
        mv
    }

    /// Register a version and place it directly in `stage` (fixture helper,
    /// not journaled).
    pub fn with_version(&self, name: &ModelName, run_id: &str, stage: Stage) -> ModelVersion {
        let mut mv = self.register(name, run_id);
        self.set_stage(name, mv.version, stage);
        mv.stage = stage;
        mv
    }

    /// Overwrite the stage of a version without journaling. Returns `false`
    /// when the version does not exist.
    pub fn set_stage(&self, name: &ModelName, version: VersionNumber, stage: Stage) -> bool {
        let mut models = self.models.borrow_mut();
        match models
            .get_mut(name)
            .and_then(|versions| versions.iter_mut().find(|v| v.version == version))
        {
            Some(mv) => {
                mv.stage = stage;
                true
            }
            None => false,
        }
    }

    /// Current stage of a version.
    #[must_use]
    pub fn stage_of(&self, name: &ModelName, version: VersionNumber) -> Option<Stage> {
        self.models
            .borrow()
            .get(name)
            .and_then(|versions| versions.iter().find(|v| v.version == version))
            .map(|v| v.stage)
    }

    /// All versions of a model, oldest first.
    #[must_use]
    pub fn versions(&self, name: &ModelName) -> Vec<ModelVersion> {
        self.models.borrow().get(name).cloned().unwrap_or_default()
    }

    /// Every transition call received so far, in order.
    #[must_use]
    pub fn transitions(&self) -> Vec<TransitionRecord> {
        self.journal.borrow().clone()
    }

    /// Number of `latest_versions` calls received so far.
    #[must_use]
    pub fn lookup_count(&self) -> u32 {
        *self.lookups.borrow()
    }

    /// Fail the next `count` transition calls, whatever their target.
    pub fn fail_transitions(&self, count: u32) {
        self.faults.borrow_mut().transitions = count;
    }

    /// Fail the next `count` transition calls into `stage`.
    pub fn fail_transitions_to(&self, stage: Stage, count: u32) {
        self.faults.borrow_mut().transitions_to.insert(stage, count);
    }

    /// Fail the next `count` lookups.
    pub fn fail_lookups(&self, count: u32) {
        self.faults.borrow_mut().lookups = count;
    }
}

impl ModelRegistry for InMemoryRegistry {
    fn latest_versions(
        &self,
        name: &ModelName,
        stage: Stage,
    ) -> Result<Vec<ModelVersion>, RegistryError> {
        *self.lookups.borrow_mut() += 1;
        if take(&mut self.faults.borrow_mut().lookups) {
            return Err(RegistryError::Unavailable("injected lookup fault".to_string()));
        }

        let models = self.models.borrow();
        let versions = models
            .get(name)
            .ok_or_else(|| RegistryError::ModelNotFound(name.to_string()))?;

        Ok(versions
            .iter()
            .filter(|v| v.stage == stage)
            .max_by_key(|v| v.version)
            .cloned()
            .into_iter()
            .collect())
    }

    fn transition_stage(
        &self,
        name: &ModelName,
        version: VersionNumber,
        stage: Stage,
        archive_existing: bool,
    ) -> Result<ModelVersion, RegistryError> {
        let mut record = TransitionRecord {
            name: name.clone(),
            version,
            to: stage,
            archive_existing,
            applied: false,
        };

        if self.faults.borrow_mut().take_transition(stage) {
            self.journal.borrow_mut().push(record);
            return Err(RegistryError::Unavailable(
                "injected transition fault".to_string(),
            ));
        }

        let result = {
            let mut models = self.models.borrow_mut();
            match models.get_mut(name) {
                Some(versions) => apply_transition(versions, name, version, stage, archive_existing),
                None => Err(RegistryError::ModelNotFound(name.to_string())),
            }
        };

        record.applied = result.is_ok();
        self.journal.borrow_mut().push(record);
        result
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn name() -> ModelName {
        ModelName::new("Best Model").unwrap()
    }

    #[test]
    fn register_assigns_increasing_versions() {
        let registry = InMemoryRegistry::new();
        let v1 = registry.register(&name(), "run-a");
        let v2 = registry.register(&name(), "run-b");
        assert_eq!(v1.version, VersionNumber(1));
        assert_eq!(v2.version, VersionNumber(2));
        assert_eq!(v2.stage, Stage::None);
    }

    #[test]
    fn latest_versions_returns_highest_in_stage() {
        let registry = InMemoryRegistry::new();
        registry.with_version(&name(), "a", Stage::Staging);
        registry.with_version(&name(), "b", Stage::Staging);
        registry.with_version(&name(), "c", Stage::Production);

        let staging = registry.latest_versions(&name(), Stage::Staging).unwrap();
        assert_eq!(staging.len(), 1);
        assert_eq!(staging[0].version, VersionNumber(2));
    }

    #[test]
    fn unknown_model_is_not_found() {
        let registry = InMemoryRegistry::new();
        let err = registry.latest_versions(&name(), Stage::Staging).unwrap_err();
        assert_eq!(err, RegistryError::ModelNotFound("Best Model".to_string()));
    }

    #[test]
    fn injected_fault_is_journaled_but_not_applied() {
        let registry = InMemoryRegistry::new();
        let mv = registry.with_version(&name(), "a", Stage::Staging);
        registry.fail_transitions(1);

        assert!(registry
            .transition_stage(&name(), mv.version, Stage::Production, false)
            .is_err());
        assert_eq!(registry.stage_of(&name(), mv.version), Some(Stage::Staging));

        registry
            .transition_stage(&name(), mv.version, Stage::Production, false)
            .unwrap();
        let journal = registry.transitions();
        assert_eq!(journal.len(), 2);
        assert!(!journal[0].applied);
        assert!(journal[1].applied);
    }

    #[test]
    fn targeted_fault_only_hits_that_stage() {
        let registry = InMemoryRegistry::new();
        let prod = registry.with_version(&name(), "a", Stage::Production);
        registry.fail_transitions_to(Stage::Production, 5);

        let archived = registry
            .transition_stage(&name(), prod.version, Stage::Archived, true)
            .unwrap();
        assert_eq!(archived.stage, Stage::Archived);
        assert!(registry
            .transition_stage(&name(), prod.version, Stage::Production, false)
            .is_err());
    }
}
