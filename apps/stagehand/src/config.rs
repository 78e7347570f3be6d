//! # Configuration
//!
//! Registry connection and retry settings as explicit structs.
//!
//! The environment is read exactly once, at startup, through a lookup
//! closure. Nothing here writes to the process environment; the credential
//! travels inside [`RegistryConfig`] into the client constructor.

use stagehand_core::retry::{DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY};
use stagehand_core::RetryPolicy;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

// =============================================================================
// CONSTANTS
// =============================================================================

/// Token used as both basic-auth username and password.
pub const DAGSHUB_TOKEN_ENV: &str = "DAGSHUB_TOKEN";

/// Full tracking URI; wins over the DagsHub owner/repo pair.
pub const TRACKING_URI_ENV: &str = "MLFLOW_TRACKING_URI";

/// DagsHub repository owner, used to derive the tracking URI.
pub const DAGSHUB_OWNER_ENV: &str = "DAGSHUB_REPO_OWNER";

/// DagsHub repository name, used to derive the tracking URI.
pub const DAGSHUB_REPO_ENV: &str = "DAGSHUB_REPO_NAME";

/// DagsHub host.
pub const DAGSHUB_URL: &str = "https://dagshub.com";

/// Repository owner used when `DAGSHUB_REPO_OWNER` is unset.
pub const DEFAULT_DAGSHUB_OWNER: &str = "irfanshaikh911";

/// Repository name used when `DAGSHUB_REPO_NAME` is unset.
pub const DEFAULT_DAGSHUB_REPO: &str = "CI_MLOPS";

/// Model family promoted when `--model` is not given.
pub const DEFAULT_MODEL_NAME: &str = "Best Model";

/// Per-request HTTP timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// =============================================================================
// ERRORS
// =============================================================================

/// Startup configuration problems. All are fatal before any registry call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A required credential variable is unset or empty.
    #[error("{0} environment variable not set")]
    MissingCredential(&'static str),

    /// The tracking URI is not an http(s) URL.
    #[error("invalid tracking URI '{0}': expected http:// or https://")]
    InvalidTrackingUri(String),
}

// =============================================================================
// CREDENTIALS
// =============================================================================

/// Basic-auth credentials for the registry.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    /// Explicit username/password pair.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// DagsHub authenticates MLflow calls with the token in both fields.
    pub fn dagshub_token(token: impl Into<String>) -> Self {
        let token = token.into();
        Self {
            username: token.clone(),
            password: token,
        }
    }

    /// Basic-auth username.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Basic-auth password.
    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &"<redacted>")
            .field("password", &"<redacted>")
            .finish()
    }
}

// =============================================================================
// REGISTRY CONFIG
// =============================================================================

/// Everything the MLflow client needs to connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Base tracking URI, without trailing slash.
    pub tracking_uri: String,
    /// Basic-auth credentials.
    pub credentials: Credentials,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl RegistryConfig {
    /// Build from explicit parts, validating the URI.
    pub fn new(tracking_uri: &str, credentials: Credentials) -> Result<Self, ConfigError> {
        Ok(Self {
            tracking_uri: normalize_uri(tracking_uri)?,
            credentials,
            timeout: DEFAULT_REQUEST_TIMEOUT,
        })
    }

    /// Override the request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Load from variables supplied by `lookup`.
    ///
    /// The token is checked first and is the only required variable.
    /// `tracking_uri` (from the command line) beats every variable; with
    /// neither it nor `MLFLOW_TRACKING_URI`, the DagsHub owner and repo
    /// variables fall back to [`DEFAULT_DAGSHUB_OWNER`]/[`DEFAULT_DAGSHUB_REPO`].
    pub fn from_lookup<F>(lookup: F, tracking_uri: Option<&str>) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let token =
            non_empty(DAGSHUB_TOKEN_ENV).ok_or(ConfigError::MissingCredential(DAGSHUB_TOKEN_ENV))?;

        let uri = match tracking_uri {
            Some(uri) => uri.to_string(),
            None => match non_empty(TRACKING_URI_ENV) {
                Some(uri) => uri,
                None => {
                    let owner = non_empty(DAGSHUB_OWNER_ENV)
                        .unwrap_or_else(|| DEFAULT_DAGSHUB_OWNER.to_string());
                    let repo = non_empty(DAGSHUB_REPO_ENV)
                        .unwrap_or_else(|| DEFAULT_DAGSHUB_REPO.to_string());
                    dagshub_tracking_uri(&owner, &repo)
                }
            },
        };

        Self::new(&uri, Credentials::dagshub_token(token))
    }

    /// Load from the process environment.
    pub fn from_env(tracking_uri: Option<&str>) -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok(), tracking_uri)
    }
}

/// MLflow tracking URI of a DagsHub repository.
pub fn dagshub_tracking_uri(owner: &str, repo: &str) -> String {
    format!("{DAGSHUB_URL}/{owner}/{repo}.mlflow")
}

fn normalize_uri(uri: &str) -> Result<String, ConfigError> {
    let trimmed = uri.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        Ok(trimmed.to_string())
    } else {
        Err(ConfigError::InvalidTrackingUri(uri.to_string()))
    }
}

// =============================================================================
// RETRY SETTINGS
// =============================================================================

/// Retry knobs exposed on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrySettings {
    /// Attempts per registry call, including the first.
    pub max_attempts: u32,
    /// Fixed wait between attempts.
    pub delay: Duration,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl RetrySettings {
    /// The policy these settings describe.
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(self.max_attempts, self.delay)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: BTreeMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn missing_token_is_fatal() {
        let result = RegistryConfig::from_lookup(env(&[]), Some("https://example.com"));
        assert_eq!(result, Err(ConfigError::MissingCredential(DAGSHUB_TOKEN_ENV)));
    }

    #[test]
    fn empty_token_counts_as_missing() {
        let result = RegistryConfig::from_lookup(
            env(&[(DAGSHUB_TOKEN_ENV, "  ")]),
            Some("https://example.com"),
        );
        assert_eq!(result, Err(ConfigError::MissingCredential(DAGSHUB_TOKEN_ENV)));
    }

    #[test]
    fn token_fills_both_credential_fields() {
        let config = RegistryConfig::from_lookup(
            env(&[(DAGSHUB_TOKEN_ENV, "secret")]),
            Some("https://example.com/"),
        );
        let config = config.unwrap();
        assert_eq!(config.tracking_uri, "https://example.com");
        assert_eq!(config.credentials.username(), "secret");
        assert_eq!(config.credentials.password(), "secret");
        assert_eq!(config.timeout, DEFAULT_REQUEST_TIMEOUT);
    }

    #[test]
    fn tracking_uri_precedence() {
        let vars = env(&[
            (DAGSHUB_TOKEN_ENV, "t"),
            (TRACKING_URI_ENV, "https://env.example/mlflow"),
            (DAGSHUB_OWNER_ENV, "acme"),
            (DAGSHUB_REPO_ENV, "models"),
        ]);
        let from_flag = RegistryConfig::from_lookup(&vars, Some("http://flag.example"))
            .map(|c| c.tracking_uri);
        assert_eq!(from_flag, Ok("http://flag.example".to_string()));

        let from_env = RegistryConfig::from_lookup(&vars, None).map(|c| c.tracking_uri);
        assert_eq!(from_env, Ok("https://env.example/mlflow".to_string()));
    }

    #[test]
    fn dagshub_pair_derives_uri() {
        let vars = env(&[
            (DAGSHUB_TOKEN_ENV, "t"),
            (DAGSHUB_OWNER_ENV, "acme"),
            (DAGSHUB_REPO_ENV, "models"),
        ]);
        let uri = RegistryConfig::from_lookup(vars, None).map(|c| c.tracking_uri);
        assert_eq!(uri, Ok("https://dagshub.com/acme/models.mlflow".to_string()));
    }

    #[test]
    fn token_alone_targets_default_dagshub_repo() {
        let vars = env(&[(DAGSHUB_TOKEN_ENV, "t")]);
        let uri = RegistryConfig::from_lookup(&vars, None).map(|c| c.tracking_uri);
        assert_eq!(
            uri,
            Ok("https://dagshub.com/irfanshaikh911/CI_MLOPS.mlflow".to_string())
        );

        let owner_only = env(&[(DAGSHUB_TOKEN_ENV, "t"), (DAGSHUB_OWNER_ENV, "acme")]);
        let uri = RegistryConfig::from_lookup(&owner_only, None).map(|c| c.tracking_uri);
        assert_eq!(uri, Ok("https://dagshub.com/acme/CI_MLOPS.mlflow".to_string()));
    }

    #[test]
    fn bad_scheme_is_rejected() {
        let vars = env(&[(DAGSHUB_TOKEN_ENV, "t")]);
        assert_eq!(
            RegistryConfig::from_lookup(&vars, Some("ftp://nope")),
            Err(ConfigError::InvalidTrackingUri("ftp://nope".to_string()))
        );
    }

    #[test]
    fn debug_redacts_credentials() {
        let debug = format!("{:?}", Credentials::dagshub_token("hunter2"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn retry_settings_default_to_three_attempts_five_seconds() {
        let policy = RetrySettings::default().policy();
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(
            policy.backoff(),
            stagehand_core::Backoff::Fixed(Duration::from_secs(5))
        );
    }
}
