//! # Promoter Module
//!
//! Moves the newest Staging version of a model into Production.
//!
//! The workflow is two registry mutations, not a transaction:
//!
//! ```text
//!   1. latest Staging      ──none──► NoStagingCandidate
//!   2. latest Production   ──some──► archive it (retried) ──exhausted──► ArchiveFailed
//!   3. promote Staging     (retried) ──exhausted──► PromotionFailed
//!   4.                     ──────────► Promoted
//! ```
//!
//! The archive call sets `archive_existing`, so the registry also retires
//! any older version still holding Production.
//!
//! If step 2 archived a version and step 3 then fails, the model is left
//! with no Production version. [`PromotionOutcome::left_without_production`]
//! reports that state; nothing rolls it back.

use crate::retry::{RetryExhausted, RetryPolicy, Sleeper, ThreadSleeper};
use crate::registry::latest_in_stage;
use crate::{ModelName, ModelRegistry, ModelVersion, RegistryError, Stage, VersionNumber};
use serde::Serialize;
use std::fmt;
use tracing::{info, warn};

// =============================================================================
// OUTCOME
// =============================================================================

/// Result of one promotion run.
///
/// Failures are outcomes, not errors: the promoter itself never fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PromotionOutcome {
    /// No version is in Staging. Nothing was changed.
    NoStagingCandidate {
        /// Model name.
        model: ModelName,
    },

    /// The Staging version now holds Production.
    Promoted {
        /// Model name.
        model: ModelName,
        /// Version now in Production.
        version: VersionNumber,
        /// Former Production version, now Archived.
        archived: Option<VersionNumber>,
    },

    /// Archiving the current Production version never succeeded.
    /// Production is untouched and the Staging version was not promoted.
    ArchiveFailed {
        /// Model name.
        model: ModelName,
        /// Candidate that would have been promoted.
        staging_version: VersionNumber,
        /// Version still holding Production.
        production_version: VersionNumber,
        /// Attempts made on the archive call.
        attempts: u32,
        /// Last registry error.
        error: String,
    },

    /// Promoting the Staging version never succeeded.
    PromotionFailed {
        /// Model name.
        model: ModelName,
        /// Candidate that stayed in Staging.
        version: VersionNumber,
        /// Version archived earlier in this run, if any. When set, the model
        /// currently has no Production version.
        archived: Option<VersionNumber>,
        /// Attempts made on the promote call.
        attempts: u32,
        /// Last registry error.
        error: String,
    },

    /// A stage lookup never succeeded. Nothing was changed.
    LookupFailed {
        /// Model name.
        model: ModelName,
        /// Stage being looked up.
        stage: Stage,
        /// Attempts made on the lookup.
        attempts: u32,
        /// Last registry error.
        error: String,
    },
}

impl PromotionOutcome {
    /// Short snake_case label, matching the serialized `outcome` tag.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            PromotionOutcome::NoStagingCandidate { .. } => "no_staging_candidate",
            PromotionOutcome::Promoted { .. } => "promoted",
            PromotionOutcome::ArchiveFailed { .. } => "archive_failed",
            PromotionOutcome::PromotionFailed { .. } => "promotion_failed",
            PromotionOutcome::LookupFailed { .. } => "lookup_failed",
        }
    }

    /// True for `Promoted` and `NoStagingCandidate`: the run did what it could.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            PromotionOutcome::Promoted { .. } | PromotionOutcome::NoStagingCandidate { .. }
        )
    }

    /// Whether any stage assignment changed during the run.
    #[must_use]
    pub fn mutated_registry(&self) -> bool {
        match self {
            PromotionOutcome::Promoted { .. } => true,
            PromotionOutcome::PromotionFailed { archived, .. } => archived.is_some(),
            _ => false,
        }
    }

    /// The partial-failure state: a Production version was archived and its
    /// replacement was never promoted.
    #[must_use]
    pub fn left_without_production(&self) -> bool {
        matches!(
            self,
            PromotionOutcome::PromotionFailed {
                archived: Some(_),
                ..
            }
        )
    }

    /// Model the run was about.
    #[must_use]
    pub fn model(&self) -> &ModelName {
        match self {
            PromotionOutcome::NoStagingCandidate { model }
            | PromotionOutcome::Promoted { model, .. }
            | PromotionOutcome::ArchiveFailed { model, .. }
            | PromotionOutcome::PromotionFailed { model, .. }
            | PromotionOutcome::LookupFailed { model, .. } => model,
        }
    }
}

impl fmt::Display for PromotionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PromotionOutcome::NoStagingCandidate { model } => {
                write!(f, "No version of '{model}' found in Staging; nothing to promote")
            }
            PromotionOutcome::Promoted {
                model,
                version,
                archived,
            } => {
                write!(f, "Model '{model}' version {version} is now in Production")?;
                if let Some(old) = archived {
                    write!(f, " (version {old} archived)")?;
                }
                Ok(())
            }
            PromotionOutcome::ArchiveFailed {
                model,
                staging_version,
                production_version,
                attempts,
                error,
            } => write!(
                f,
                "Archiving '{model}' version {production_version} failed after {attempts} attempt(s): {error}; \
                 version {staging_version} was not promoted"
            ),
            PromotionOutcome::PromotionFailed {
                model,
                version,
                archived,
                attempts,
                error,
            } => {
                write!(
                    f,
                    "Promoting '{model}' version {version} failed after {attempts} attempt(s): {error}"
                )?;
                if let Some(old) = archived {
                    write!(
                        f,
                        "; version {old} was already archived, '{model}' has no Production version"
                    )?;
                }
                Ok(())
            }
            PromotionOutcome::LookupFailed {
                model,
                stage,
                attempts,
                error,
            } => write!(
                f,
                "Looking up '{model}' in {stage} failed after {attempts} attempt(s): {error}"
            ),
        }
    }
}

// =============================================================================
// PROMOTER
// =============================================================================

/// Runs the Staging -> Production promotion against a registry.
#[derive(Debug)]
pub struct StagePromoter<R, S = ThreadSleeper> {
    registry: R,
    policy: RetryPolicy,
    sleeper: S,
}

impl<R: ModelRegistry> StagePromoter<R, ThreadSleeper> {
    /// Promoter with the default policy (3 attempts, 5 s apart) and a real sleep.
    pub fn new(registry: R) -> Self {
        Self::with_sleeper(registry, RetryPolicy::default(), ThreadSleeper)
    }
}

impl<R: ModelRegistry, S: Sleeper> StagePromoter<R, S> {
    /// Promoter with an explicit policy and sleeper.
    pub fn with_sleeper(registry: R, policy: RetryPolicy, sleeper: S) -> Self {
        Self {
            registry,
            policy,
            sleeper,
        }
    }

    /// Replace the retry policy.
    #[must_use]
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// The registry this promoter drives.
    pub fn registry(&self) -> &R {
        &self.registry
    }

    /// The retry policy in effect.
    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Promote the newest Staging version of `model` to Production.
    pub fn promote(&self, model: &ModelName) -> PromotionOutcome {
        info!(model = %model, "starting promotion");

        let candidate = match self.latest_in(model, Stage::Staging) {
            Ok(Some(candidate)) => candidate,
            Ok(None) => {
                info!(model = %model, "no model version found in Staging");
                return PromotionOutcome::NoStagingCandidate {
                    model: model.clone(),
                };
            }
            Err(exhausted) => return lookup_failed(model, Stage::Staging, exhausted),
        };
        info!(model = %model, version = %candidate.version, run_id = %candidate.run_id, "found Staging candidate");

        let current = match self.latest_in(model, Stage::Production) {
            Ok(current) => current,
            Err(exhausted) => return lookup_failed(model, Stage::Production, exhausted),
        };

        let archived = match current {
            Some(current) => {
                let archive = self.transition(model, current.version, Stage::Archived, true, "archive");
                if let Err(exhausted) = archive {
                    warn!(
                        model = %model,
                        version = %current.version,
                        "could not archive current Production version; leaving Production untouched"
                    );
                    return PromotionOutcome::ArchiveFailed {
                        model: model.clone(),
                        staging_version: candidate.version,
                        production_version: current.version,
                        attempts: exhausted.attempts,
                        error: exhausted.last_error.to_string(),
                    };
                }
                info!(model = %model, version = %current.version, "archived current Production version");
                Some(current.version)
            }
            None => {
                info!(model = %model, "no model currently in Production");
                None
            }
        };

        match self.transition(model, candidate.version, Stage::Production, false, "promote") {
            Ok(_) => {
                info!(model = %model, version = %candidate.version, "promoted to Production");
                PromotionOutcome::Promoted {
                    model: model.clone(),
                    version: candidate.version,
                    archived,
                }
            }
            Err(exhausted) => {
                if let Some(old) = archived {
                    warn!(
                        model = %model,
                        archived = %old,
                        "promotion failed after archiving; model has no Production version"
                    );
                }
                PromotionOutcome::PromotionFailed {
                    model: model.clone(),
                    version: candidate.version,
                    archived,
                    attempts: exhausted.attempts,
                    error: exhausted.last_error.to_string(),
                }
            }
        }
    }

    /// Newest version of `model` in `stage`, retried per policy.
    pub fn latest_in(
        &self,
        model: &ModelName,
        stage: Stage,
    ) -> Result<Option<ModelVersion>, RetryExhausted<RegistryError>> {
        latest_in_stage(&self.registry, model, stage, &self.policy, &self.sleeper)
    }

    fn transition(
        &self,
        model: &ModelName,
        version: VersionNumber,
        stage: Stage,
        archive_existing: bool,
        label: &str,
    ) -> Result<ModelVersion, RetryExhausted<RegistryError>> {
        self.policy.run(&self.sleeper, label, |attempt| {
            info!(model = %model, version = %version, to = %stage, attempt, "transitioning stage");
            self.registry
                .transition_stage(model, version, stage, archive_existing)
        })
    }
}

fn lookup_failed(
    model: &ModelName,
    stage: Stage,
    exhausted: RetryExhausted<RegistryError>,
) -> PromotionOutcome {
    warn!(model = %model, stage = %stage, "stage lookup failed; nothing changed");
    PromotionOutcome::LookupFailed {
        model: model.clone(),
        stage,
        attempts: exhausted.attempts,
        error: exhausted.last_error.to_string(),
    }
}

// =============================================================================
// TESTS
// =============================================================================
