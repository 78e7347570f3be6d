//! # Registry Module
//!
//! The seam between the promotion workflow and a model registry.
//!
//! Implementations:
//! - `InMemoryRegistry` (this crate): fixtures and fault injection
//! - `RedbRegistry` (this crate): file-backed local registry
//! - `MlflowClient` (app crate): MLflow REST API, e.g. DagsHub

use crate::retry::{RetryExhausted, RetryPolicy, Sleeper};
use crate::version::latest;
use crate::{ModelName, ModelVersion, Stage, VersionNumber};
use thiserror::Error;

// =============================================================================
// ERRORS
// =============================================================================

/// Failures a registry call can report.
///
/// Inside the promotion workflow every variant is treated as transient and
/// retried; the distinction matters for logs and direct CLI commands.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The registry could not be reached (network, timeout, injected fault).
    #[error("registry unavailable: {0}")]
    Unavailable(String),

    /// The registry answered with a non-success status.
    #[error("registry returned status {status}: {message}")]
    Status {
        /// HTTP-like status code.
        status: u16,
        /// Message from the registry, if it sent one.
        message: String,
    },

    /// No registered model with that name.
    #[error("model not found: {0}")]
    ModelNotFound(String),

    /// The model exists but the version does not.
    #[error("version not found: {name} v{version}")]
    VersionNotFound {
        /// Model name.
        name: String,
        /// Missing version.
        version: VersionNumber,
    },

    /// The response could not be decoded.
    #[error("malformed registry response: {0}")]
    Malformed(String),

    /// Local storage failure (redb/postcard).
    #[error("registry storage error: {0}")]
    Storage(String),
}

// =============================================================================
// REGISTRY TRAIT
// =============================================================================

/// Operations the promotion workflow consumes from a model registry.
///
/// Calls are synchronous and blocking. Implementations take `&self`;
/// local registries use interior mutability.
pub trait ModelRegistry {
    /// Latest versions of `name` currently in `stage`.
    ///
    /// An empty list is a normal answer. Callers pick the highest version
    /// when more than one is returned.
    fn latest_versions(
        &self,
        name: &ModelName,
        stage: Stage,
    ) -> Result<Vec<ModelVersion>, RegistryError>;

    /// Move `version` of `name` to `stage`.
    ///
    /// With `archive_existing` and an active target stage, every other
    /// version already in that stage moves to Archived as part of the call.
    /// Archiving a version with `archive_existing` retires the rest of the
    /// active stage it leaves.
    fn transition_stage(
        &self,
        name: &ModelName,
        version: VersionNumber,
        stage: Stage,
        archive_existing: bool,
    ) -> Result<ModelVersion, RegistryError>;
}

impl<R: ModelRegistry + ?Sized> ModelRegistry for &R {
    fn latest_versions(
        &self,
        name: &ModelName,
        stage: Stage,
    ) -> Result<Vec<ModelVersion>, RegistryError> {
        (**self).latest_versions(name, stage)
    }

    fn transition_stage(
        &self,
        name: &ModelName,
        version: VersionNumber,
        stage: Stage,
        archive_existing: bool,
    ) -> Result<ModelVersion, RegistryError> {
        (**self).transition_stage(name, version, stage, archive_existing)
    }
}

impl<R: ModelRegistry + ?Sized> ModelRegistry for Box<R> {
    fn latest_versions(
        &self,
        name: &ModelName,
        stage: Stage,
    ) -> Result<Vec<ModelVersion>, RegistryError> {
        (**self).latest_versions(name, stage)
    }

    fn transition_stage(
        &self,
        name: &ModelName,
        version: VersionNumber,
        stage: Stage,
        archive_existing: bool,
    ) -> Result<ModelVersion, RegistryError> {
        (**self).transition_stage(name, version, stage, archive_existing)
    }
}

/// Newest version of `name` in `stage`, retried per `policy`.
///
/// A model the registry has never heard of has no version in any stage:
/// `ModelNotFound` answers `Ok(None)` at once and is not retried.
pub fn latest_in_stage<R, S>(
    registry: &R,
    name: &ModelName,
    stage: Stage,
    policy: &RetryPolicy,
    sleeper: &S,
) -> Result<Option<ModelVersion>, RetryExhausted<RegistryError>>
where
    R: ModelRegistry + ?Sized,
    S: Sleeper + ?Sized,
{
    let label = format!("lookup {stage}");
    policy
        .run(sleeper, &label, |_| match registry.latest_versions(name, stage) {
            Err(RegistryError::ModelNotFound(_)) => Ok(Vec::new()),
            other => other,
        })
        .map(latest)
}

/// Apply a stage transition to an in-memory list of one model's versions.
///
/// Shared by the local registries so they agree on `archive_existing`
/// semantics. Returns the updated record of `version`.
pub(crate) fn apply_transition(
    versions: &mut [ModelVersion],
    name: &ModelName,
    version: VersionNumber,
    stage: Stage,
    archive_existing: bool,
) -> Result<ModelVersion, RegistryError> {
    let Some(previous) = versions
        .iter()
        .find(|v| v.version == version)
        .map(|v| v.stage)
    else {
        return Err(RegistryError::VersionNotFound {
            name: name.to_string(),
            version,
        });
    };

    // Active target: clear it. Archive: clear the active stage being left.
    let sweep = match stage {
        _ if !archive_existing => None,
        Stage::Staging | Stage::Production => Some(stage),
        Stage::Archived if previous.is_active() => Some(previous),
        Stage::Archived | Stage::None => None,
    };

    let mut updated = None;
    for mv in versions.iter_mut() {
        if mv.version == version {
            mv.stage = stage;
            updated = Some(mv.clone());
        } else if Some(mv.stage) == sweep {
            mv.stage = Stage::Archived;
        }
    }

    updated.ok_or_else(|| RegistryError::VersionNotFound {
        name: name.to_string(),
        version,
    })
}

// =============================================================================
// TESTS
// =============================================================================
