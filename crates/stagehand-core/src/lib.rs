//! # Stagehand Core
//!
//! The promotion workflow for a staged model registry.
//!
//! A model family has many versions; each version sits in exactly one
//! [`Stage`]. This crate moves the newest Staging version into Production,
//! retiring the current Production version to Archived first.
//!
//! ## Layout
//!
//! - [`stage`] / [`version`]: the registry data model
//! - [`registry`]: the [`ModelRegistry`] seam remote and local backends implement
//! - [`retry`]: bounded retry with an injectable [`Sleeper`]
//! - [`promoter`]: [`StagePromoter`] and its typed [`PromotionOutcome`]
//! - [`memory`] / [`storage`]: local registries for tests and offline runs
//!
//! No async, no network. The MLflow client lives in the app crate.

pub mod memory;
pub mod promoter;
pub mod registry;
pub mod retry;
pub mod snapshot;
pub mod stage;
pub mod storage;
pub mod version;

pub use memory::{InMemoryRegistry, TransitionRecord};
pub use promoter::{PromotionOutcome, StagePromoter};
pub use registry::{ModelRegistry, RegistryError, latest_in_stage};
pub use retry::{Backoff, RetryExhausted, RetryPolicy, Sleeper, ThreadSleeper};
pub use snapshot::StageSnapshot;
pub use stage::Stage;
pub use storage::{RedbRegistry, StorageError};
pub use version::ModelVersion;

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// =============================================================================
// MODEL NAME
// =============================================================================

/// Name of a registered model family (e.g. `"Best Model"`).
///
/// Always non-empty and trimmed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ModelName(String);

/// Returned when a model name is blank.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("model name must not be empty")]
pub struct InvalidModelName;

impl ModelName {
    /// Create a model name, rejecting blank input.
    pub fn new(name: impl Into<String>) -> Result<Self, InvalidModelName> {
        let name = name.into();
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(InvalidModelName);
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Borrow the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ModelName {
    type Error = InvalidModelName;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ModelName> for String {
    fn from(name: ModelName) -> Self {
        name.0
    }
}

impl std::str::FromStr for ModelName {
    type Err = InvalidModelName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

// =============================================================================
// VERSION NUMBER
// =============================================================================

/// Registry-assigned version number. Monotonic per model name.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct VersionNumber(pub u64);

impl fmt::Display for VersionNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// TESTS
// =============================================================================
