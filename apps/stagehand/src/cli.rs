//! # CLI Module
//!
//! Command-line interface for Stagehand.
//!
//! Each `cmd_*` function takes an already-open registry and a writer, so
//! the integration tests drive them with a local registry and a buffer.
//! [`run`] is the single dispatch point `main` calls.

use crate::config::{ConfigError, DEFAULT_MODEL_NAME, RegistryConfig, RetrySettings};
use crate::mlflow::{MlflowClient, MlflowError};
use clap::{Args, Parser, Subcommand, ValueEnum};
use stagehand_core::retry::{DEFAULT_MAX_ATTEMPTS, RetryExhausted};
use stagehand_core::{
    InvalidModelName, ModelName, ModelRegistry, ModelVersion, PromotionOutcome, RedbRegistry,
    RegistryError, RetryPolicy, Sleeper, Stage, StagePromoter, StageSnapshot, StorageError,
    ThreadSleeper, VersionNumber, latest_in_stage,
};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

// =============================================================================
// EXIT CODES
// =============================================================================

/// Every promotion outcome, unless `--strict` says otherwise.
pub const EXIT_OK: u8 = 0;

/// Startup, configuration and command errors.
pub const EXIT_ERROR: u8 = 1;

/// `promote --strict` when the outcome is a failure.
pub const EXIT_PROMOTION_FAILED: u8 = 2;

// =============================================================================
// ARGUMENTS
// =============================================================================

/// Promote the newest Staging model version to Production.
#[derive(Debug, Parser)]
#[command(name = "stagehand", version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Command to run (defaults to `promote`)
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Registry backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// Remote MLflow registry (DagsHub)
    Mlflow,
    /// Local redb file
    Local,
}

/// Flags shared by every command.
#[derive(Debug, Clone, Args)]
pub struct GlobalArgs {
    /// Registry backend
    #[arg(long, global = true, value_enum, default_value_t = Backend::Mlflow)]
    pub backend: Backend,

    /// Database file for the local backend
    #[arg(long, global = true, default_value = "stagehand.redb")]
    pub db: PathBuf,

    /// MLflow tracking URI (overrides MLFLOW_TRACKING_URI and the DagsHub repository variables)
    #[arg(long, global = true)]
    pub tracking_uri: Option<String>,

    /// Registered model name
    #[arg(short, long, global = true, default_value = DEFAULT_MODEL_NAME)]
    pub model: String,

    /// Attempts per registry call
    #[arg(long, global = true, default_value_t = DEFAULT_MAX_ATTEMPTS)]
    pub max_attempts: u32,

    /// Seconds between attempts
    #[arg(long, global = true, default_value_t = 5)]
    pub retry_delay_secs: u64,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

impl GlobalArgs {
    /// Retry settings described by the flags.
    pub fn retry(&self) -> RetrySettings {
        RetrySettings {
            max_attempts: self.max_attempts,
            delay: Duration::from_secs(self.retry_delay_secs),
        }
    }
}

/// Subcommands.
#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Archive the current Production version and promote the newest Staging one
    Promote {
        /// Exit with code 2 when the promotion did not complete
        #[arg(long)]
        strict: bool,
    },

    /// Show the newest Staging and Production versions
    Status,

    /// Fail unless a version is in the given stage
    Check {
        /// Stage to require
        #[arg(long, default_value = "Staging")]
        stage: Stage,
    },

    /// Register a new version (local backend only)
    Register {
        /// Training run that produced the model
        #[arg(long)]
        run_id: String,

        /// Stage to place the new version in
        #[arg(long)]
        stage: Option<Stage>,
    },

    /// Move a version to another stage (local backend only)
    Transition {
        /// Version number
        #[arg(long)]
        version: u64,

        /// Target stage
        #[arg(long)]
        stage: Stage,

        /// Archive other versions already in the target stage
        #[arg(long)]
        archive_existing: bool,
    },
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Promote { .. } => "promote",
            Commands::Status => "status",
            Commands::Check { .. } => "check",
            Commands::Register { .. } => "register",
            Commands::Transition { .. } => "transition",
        }
    }
}

// =============================================================================
// ERRORS
// =============================================================================

/// Errors surfaced by CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    /// Missing credential or unusable tracking URI.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// `--model` was blank.
    #[error(transparent)]
    InvalidModel(#[from] InvalidModelName),

    /// The HTTP client could not be built.
    #[error(transparent)]
    Client(#[from] MlflowError),

    /// The local redb registry failed to open or read.
    #[error("local registry: {0}")]
    Storage(#[from] StorageError),

    /// A single, unretried registry call failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// A retried registry call failed on every attempt.
    #[error("registry call {0}")]
    Exhausted(#[from] RetryExhausted<RegistryError>),

    /// `check` found no version in the required stage.
    #[error("no version of '{model}' in {stage}")]
    NotInStage {
        /// Model name.
        model: ModelName,
        /// Stage that was required.
        stage: Stage,
    },

    /// The command needs `--backend local`.
    #[error("'{0}' is only available with --backend local")]
    LocalOnly(&'static str),

    /// Encoding `--json` output failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Writing output failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// =============================================================================
// COMMANDS
// =============================================================================

/// Run the promotion workflow and print its outcome.
pub fn cmd_promote<R, S, W>(
    registry: &R,
    model: &ModelName,
    policy: RetryPolicy,
    sleeper: &S,
    json: bool,
    out: &mut W,
) -> Result<PromotionOutcome, CliError>
where
    R: ModelRegistry + ?Sized,
    S: Sleeper + ?Sized,
    W: Write + ?Sized,
{
    let outcome = StagePromoter::with_sleeper(registry, policy, sleeper).promote(model);

    if json {
        writeln!(out, "{}", serde_json::to_string_pretty(&outcome)?)?;
    } else {
        writeln!(out, "{outcome}")?;
    }
    Ok(outcome)
}

/// Show the newest Staging and Production versions with their model URIs.
pub fn cmd_status<R, S, W>(
    registry: &R,
    model: &ModelName,
    policy: RetryPolicy,
    sleeper: &S,
    json: bool,
    out: &mut W,
) -> Result<StageSnapshot, CliError>
where
    R: ModelRegistry + ?Sized,
    S: Sleeper + ?Sized,
    W: Write + ?Sized,
{
    let snapshot = StageSnapshot::capture(registry, model, &policy, sleeper)?;

    if json {
        writeln!(out, "{}", serde_json::to_string_pretty(&snapshot)?)?;
    } else {
        write!(out, "{}", snapshot.to_text())?;
    }
    Ok(snapshot)
}

/// Require a version in `stage`. Used as a pipeline gate before promotion.
pub fn cmd_check<R, S, W>(
    registry: &R,
    model: &ModelName,
    stage: Stage,
    policy: RetryPolicy,
    sleeper: &S,
    json: bool,
    out: &mut W,
) -> Result<ModelVersion, CliError>
where
    R: ModelRegistry + ?Sized,
    S: Sleeper + ?Sized,
    W: Write + ?Sized,
{
    let found = latest_in_stage(registry, model, stage, &policy, sleeper)?;

    let Some(mv) = found else {
        return Err(CliError::NotInStage {
            model: model.clone(),
            stage,
        });
    };

    if json {
        writeln!(out, "{}", serde_json::to_string_pretty(&mv)?)?;
    } else {
        writeln!(
            out,
            "Model '{}' version {} is in {} ({})",
            mv.name,
            mv.version,
            mv.stage,
            mv.model_uri()
        )?;
    }
    Ok(mv)
}

/// Register a version in the local registry, optionally placing it in a stage.
pub fn cmd_register<W: Write + ?Sized>(
    registry: &RedbRegistry,
    model: &ModelName,
    run_id: &str,
    stage: Option<Stage>,
    json: bool,
    out: &mut W,
) -> Result<ModelVersion, CliError> {
    let mut mv = registry.register(model, run_id)?;
    if let Some(stage) = stage.filter(|s| *s != Stage::None) {
        mv = registry.transition_stage(model, mv.version, stage, false)?;
    }

    if json {
        writeln!(out, "{}", serde_json::to_string_pretty(&mv)?)?;
    } else {
        writeln!(
            out,
            "Registered '{}' version {} (run {}) in {}",
            mv.name, mv.version, mv.run_id, mv.stage
        )?;
    }
    Ok(mv)
}

/// Move a version of a local registry model to `stage`.
pub fn cmd_transition<W: Write + ?Sized>(
    registry: &RedbRegistry,
    model: &ModelName,
    version: VersionNumber,
    stage: Stage,
    archive_existing: bool,
    json: bool,
    out: &mut W,
) -> Result<ModelVersion, CliError> {
    let mv = registry.transition_stage(model, version, stage, archive_existing)?;

    if json {
        writeln!(out, "{}", serde_json::to_string_pretty(&mv)?)?;
    } else {
        writeln!(out, "Model '{}' version {} is now in {}", mv.name, mv.version, mv.stage)?;
    }
    Ok(mv)
}

/// Process exit code for a promotion outcome.
pub fn exit_code(outcome: &PromotionOutcome, strict: bool) -> u8 {
    if strict && !outcome.is_success() {
        EXIT_PROMOTION_FAILED
    } else {
        EXIT_OK
    }
}

// =============================================================================
// DISPATCH
// =============================================================================

/// Parse-free entry point: resolve configuration, open the registry, run
/// the command. Returns the process exit code.
///
/// `lookup` supplies environment variables; configuration errors surface
/// here, before any registry call.
pub fn run<F, W>(cli: Cli, lookup: F, out: &mut W) -> Result<u8, CliError>
where
    F: Fn(&str) -> Option<String>,
    W: Write + ?Sized,
{
    let model = ModelName::new(cli.global.model.as_str())?;
    let policy = cli.global.retry().policy();
    let json = cli.global.json;
    let command = cli.command.unwrap_or(Commands::Promote { strict: false });

    match cli.global.backend {
        Backend::Mlflow => {
            if matches!(command, Commands::Register { .. } | Commands::Transition { .. }) {
                return Err(CliError::LocalOnly(command.name()));
            }
            let config = RegistryConfig::from_lookup(lookup, cli.global.tracking_uri.as_deref())?;
            info!(tracking_uri = %config.tracking_uri, model = %model, "using MLflow registry");
            let client = MlflowClient::new(&config)?;
            dispatch(&client, None, &model, command, policy, json, out)
        }
        Backend::Local => {
            let registry = RedbRegistry::open(&cli.global.db)?;
            info!(db = %cli.global.db.display(), model = %model, "using local registry");
            dispatch(&registry, Some(&registry), &model, command, policy, json, out)
        }
    }
}

fn dispatch<R, W>(
    registry: &R,
    local: Option<&RedbRegistry>,
    model: &ModelName,
    command: Commands,
    policy: RetryPolicy,
    json: bool,
    out: &mut W,
) -> Result<u8, CliError>
where
    R: ModelRegistry + ?Sized,
    W: Write + ?Sized,
{
    let sleeper = ThreadSleeper;
    let name = command.name();

    match command {
        Commands::Promote { strict } => {
            let outcome = cmd_promote(registry, model, policy, &sleeper, json, out)?;
            Ok(exit_code(&outcome, strict))
        }
        Commands::Status => {
            cmd_status(registry, model, policy, &sleeper, json, out)?;
            Ok(EXIT_OK)
        }
        Commands::Check { stage } => {
            cmd_check(registry, model, stage, policy, &sleeper, json, out)?;
            Ok(EXIT_OK)
        }
        Commands::Register { run_id, stage } => {
            let local = local.ok_or(CliError::LocalOnly(name))?;
            cmd_register(local, model, &run_id, stage, json, out)?;
            Ok(EXIT_OK)
        }
        Commands::Transition {
            version,
            stage,
            archive_existing,
        } => {
            let local = local.ok_or(CliError::LocalOnly(name))?;
            cmd_transition(local, model, VersionNumber(version), stage, archive_existing, json, out)?;
            Ok(EXIT_OK)
        }
    }
}
