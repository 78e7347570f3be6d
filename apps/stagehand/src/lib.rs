//! # Stagehand Library
//!
//! This library exposes the Stagehand modules for testing and integration.
//!
//! The main binary uses these modules through the `main.rs` entry point.

pub mod cli;
pub mod config;
pub mod logging;
pub mod mlflow;

// Re-export stagehand_core for convenience
pub use stagehand_core;
