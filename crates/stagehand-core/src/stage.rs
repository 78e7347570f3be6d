//! # Stage Module
//!
//! Lifecycle stages a model version can occupy in the registry.
//!
//! A version holds exactly one stage at a time. The promotion workflow only
//! ever performs two moves: Staging -> Production and Production -> Archived.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Model lifecycle stage, using the registry's canonical names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Stage {
    /// Registered, not assigned to any stage
    None,
    /// Candidate under validation
    Staging,
    /// Serving traffic
    Production,
    /// Retired
    Archived,
}

/// Returned when a stage string is not one of the four known names.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown stage '{0}' (expected None, Staging, Production or Archived)")]
pub struct UnknownStage(pub String);

impl Stage {
    /// All stages in lifecycle order.
    pub const ALL: [Stage; 4] = [Stage::None, Stage::Staging, Stage::Production, Stage::Archived];

    /// Canonical display name, as the registry spells it on the wire.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::None => "None",
            Stage::Staging => "Staging",
            Stage::Production => "Production",
            Stage::Archived => "Archived",
        }
    }

    /// Staging and Production are "active": at most one promotion target
    /// lives there and `archive_existing` only applies to them.
    #[must_use]
    pub fn is_active(self) -> bool {
        matches!(self, Stage::Staging | Stage::Production)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = UnknownStage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "" => Ok(Stage::None),
            "staging" => Ok(Stage::Staging),
            "production" => Ok(Stage::Production),
            "archived" => Ok(Stage::Archived),
            _ => Err(UnknownStage(s.to_string())),
        }
    }
}
