//! # MLflow Registry Client
//!
//! Blocking client for the MLflow model registry REST API.
//!
//! ```text
//! ┌─────────────────────┐        HTTPS + basic auth       ┌─────────────────────┐
//! │  stagehand          │ ◄──────────────────────────────► │  MLflow registry    │
//! │                     │  POST .../get-latest-versions   │  (e.g. DagsHub)     │
//! │  StagePromoter      │  POST .../transition-stage      │                     │
//! └─────────────────────┘                                 └─────────────────────┘
//! ```
//!
//! Only the two endpoints the promotion workflow needs are wrapped.

use crate::config::{Credentials, RegistryConfig};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use stagehand_core::{ModelName, ModelRegistry, ModelVersion, RegistryError, Stage, VersionNumber};
use thiserror::Error;
use tracing::debug;

// =============================================================================
// ERROR TYPE
// =============================================================================

/// Failure to construct the HTTP client.
#[derive(Debug, Error)]
pub enum MlflowError {
    /// reqwest could not build a client (TLS backend, bad settings).
    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),
}

// =============================================================================
// WIRE TYPES
// =============================================================================

#[derive(Debug, Serialize)]
struct GetLatestVersionsRequest<'a> {
    name: &'a str,
    stages: [&'a str; 1],
}

#[derive(Debug, Deserialize)]
struct GetLatestVersionsResponse {
    #[serde(default)]
    model_versions: Vec<WireModelVersion>,
}

#[derive(Debug, Serialize)]
struct TransitionStageRequest<'a> {
    name: &'a str,
    version: String,
    stage: &'a str,
    archive_existing_versions: bool,
}

#[derive(Debug, Deserialize)]
struct TransitionStageResponse {
    model_version: WireModelVersion,
}

/// MLflow's `ModelVersion` message. Version numbers arrive as strings.
#[derive(Debug, Deserialize)]
struct WireModelVersion {
    name: String,
    version: String,
    #[serde(default)]
    current_stage: Option<String>,
    #[serde(default)]
    run_id: Option<String>,
}

impl TryFrom<WireModelVersion> for ModelVersion {
    type Error = RegistryError;

    fn try_from(wire: WireModelVersion) -> Result<Self, Self::Error> {
        let name = ModelName::new(wire.name)
            .map_err(|e| RegistryError::Malformed(e.to_string()))?;
        let version = wire
            .version
            .trim()
            .parse::<u64>()
            .map_err(|_| RegistryError::Malformed(format!("version '{}' is not a number", wire.version)))?;
        let stage = match wire.current_stage.as_deref() {
            Some(raw) => raw
                .parse::<Stage>()
                .map_err(|e| RegistryError::Malformed(e.to_string()))?,
            None => Stage::None,
        };
        Ok(ModelVersion::new(
            name,
            VersionNumber(version),
            wire.run_id.unwrap_or_default(),
            stage,
        ))
    }
}

/// MLflow error body: `{"error_code": "...", "message": "..."}`.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

const RESOURCE_DOES_NOT_EXIST: &str = "RESOURCE_DOES_NOT_EXIST";

// =============================================================================
// CLIENT
// =============================================================================

/// MLflow registry client.
///
/// Credentials come from [`RegistryConfig`]; nothing is read from the
/// environment here.
#[derive(Debug, Clone)]
pub struct MlflowClient {
    base_url: String,
    credentials: Credentials,
    http: reqwest::blocking::Client,
}

impl MlflowClient {
    /// Build a client for `config.tracking_uri`.
    pub fn new(config: &RegistryConfig) -> Result<Self, MlflowError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("stagehand/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            base_url: config.tracking_uri.clone(),
            credentials: config.credentials.clone(),
            http,
        })
    }

    /// Base tracking URI.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/api/2.0/mlflow/{}", self.base_url, path)
    }

    /// POST a JSON body and decode a JSON answer.
    fn post<B, T>(&self, path: &str, body: &B) -> Result<T, RegistryError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.endpoint(path);
        debug!(%url, "registry request");

        let response = self
            .http
            .post(&url)
            .basic_auth(self.credentials.username(), Some(self.credentials.password()))
            .json(body)
            .send()
            .map_err(|e| RegistryError::Unavailable(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .map_err(|e| RegistryError::Unavailable(e.to_string()))?;

        if !status.is_success() {
            return Err(status_error(status.as_u16(), &text));
        }

        serde_json::from_str(&text).map_err(|e| RegistryError::Malformed(e.to_string()))
    }
}

fn status_error(status: u16, text: &str) -> RegistryError {
    let body: ErrorBody = serde_json::from_str(text).unwrap_or_default();
    let message = match (body.error_code, body.message) {
        (Some(code), Some(message)) => format!("{code}: {message}"),
        (None, Some(message)) => message,
        (Some(code), None) => code,
        (None, None) => text.trim().to_string(),
    };
    RegistryError::Status { status, message }
}

impl ModelRegistry for MlflowClient {
    fn latest_versions(
        &self,
        name: &ModelName,
        stage: Stage,
    ) -> Result<Vec<ModelVersion>, RegistryError> {
        let request = GetLatestVersionsRequest {
            name: name.as_str(),
            stages: [stage.as_str()],
        };
        let response: GetLatestVersionsResponse =
            match self.post("registered-models/get-latest-versions", &request) {
                Ok(response) => response,
                Err(RegistryError::Status { message, .. })
                    if message.starts_with(RESOURCE_DOES_NOT_EXIST) =>
                {
                    return Err(RegistryError::ModelNotFound(name.to_string()));
                }
                Err(err) => return Err(err),
            };

        response
            .model_versions
            .into_iter()
            .map(ModelVersion::try_from)
            .collect()
    }

    fn transition_stage(
        &self,
        name: &ModelName,
        version: VersionNumber,
        stage: Stage,
        archive_existing: bool,
    ) -> Result<ModelVersion, RegistryError> {
        let request = TransitionStageRequest {
            name: name.as_str(),
            version: version.to_string(),
            stage: stage.as_str(),
            archive_existing_versions: archive_existing,
        };
        let response: TransitionStageResponse =
            self.post("model-versions/transition-stage", &request)?;
        ModelVersion::try_from(response.model_version)
    }
}

// =============================================================================
// TESTS
// =============================================================================
