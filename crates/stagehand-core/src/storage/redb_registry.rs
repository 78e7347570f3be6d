//! redb-backed [`ModelRegistry`].
//!
//! One row per model name in the `model_versions` table; the value is the
//! postcard-encoded `Vec<ModelVersion>` for that model, oldest first.

use crate::registry::apply_transition;
use crate::{ModelName, ModelRegistry, ModelVersion, RegistryError, Stage, VersionNumber};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Model versions keyed by model name.
const MODEL_VERSIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("model_versions");

// =============================================================================
// ERRORS
// =============================================================================

/// Failures from the local registry database.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Opening or creating the database file failed.
    #[error("database error: {0}")]
    Database(#[from] redb::DatabaseError),

    /// Beginning a transaction failed.
    #[error("transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    /// Opening a table failed.
    #[error("table error: {0}")]
    Table(#[from] redb::TableError),

    /// Reading or writing a row failed.
    #[error("storage error: {0}")]
    Storage(#[from] redb::StorageError),

    /// Committing failed.
    #[error("commit error: {0}")]
    Commit(#[from] redb::CommitError),

    /// A stored row could not be encoded or decoded.
    #[error("encoding error: {0}")]
    Encoding(#[from] postcard::Error),
}

impl From<StorageError> for RegistryError {
    fn from(err: StorageError) -> Self {
        RegistryError::Storage(err.to_string())
    }
}

// =============================================================================
// REGISTRY
// =============================================================================

/// Local model registry persisted in a single redb file.
pub struct RedbRegistry {
    db: Database,
    path: PathBuf,
}

impl std::fmt::Debug for RedbRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbRegistry").field("path", &self.path).finish()
    }
}

impl RedbRegistry {
    /// Open the registry at `path`, creating the file if needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let db = Database::create(&path)?;

        // Create the table up front so read transactions never see it missing.
        let txn = db.begin_write()?;
        {
            txn.open_table(MODEL_VERSIONS)?;
        }
        txn.commit()?;

        Ok(Self { db, path })
    }

    /// Path of the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Register a new version of `name` at stage None.
    pub fn register(&self, name: &ModelName, run_id: &str) -> Result<ModelVersion, StorageError> {
        let txn = self.db.begin_write()?;
        let mv = {
            let mut table = txn.open_table(MODEL_VERSIONS)?;
            let mut versions = load(&table, name.as_str())?;
            let next = versions.iter().map(|v| v.version.0).max().unwrap_or(0) + 1;
            let mv = ModelVersion::new(name.clone(), VersionNumber(next), run_id, Stage::None);
            versions.push(mv.clone());
            let bytes = postcard::to_allocvec(&versions)?;
            table.insert(name.as_str(), bytes.as_slice())?;
            mv
        };
        txn.commit()?;
        Ok(mv)
    }

    /// All versions of `name`, oldest first. Empty for unknown models.
    pub fn versions(&self, name: &ModelName) -> Result<Vec<ModelVersion>, StorageError> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(MODEL_VERSIONS)?;
        load(&table, name.as_str())
    }

    /// Names of every registered model, sorted.
    pub fn model_names(&self) -> Result<Vec<String>, StorageError> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(MODEL_VERSIONS)?;
        let mut names = Vec::new();
        for entry in table.iter()? {
            let (key, _) = entry?;
            names.push(key.value().to_string());
        }
        Ok(names)
    }
}

fn load<T>(table: &T, name: &str) -> Result<Vec<ModelVersion>, StorageError>
where
    T: ReadableTable<&'static str, &'static [u8]>,
{
    match table.get(name)? {
        Some(row) => Ok(postcard::from_bytes(row.value())?),
        None => Ok(Vec::new()),
    }
}

impl ModelRegistry for RedbRegistry {
    fn latest_versions(
        &self,
        name: &ModelName,
        stage: Stage,
    ) -> Result<Vec<ModelVersion>, RegistryError> {
        let versions = self.versions(name)?;
        if versions.is_empty() {
            return Err(RegistryError::ModelNotFound(name.to_string()));
        }
        Ok(versions
            .into_iter()
            .filter(|v| v.stage == stage)
            .max_by_key(|v| v.version)
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
        let txn = self.db.begin_write().map_err(StorageError::from)?;
        let result = {
            let mut table = txn.open_table(MODEL_VERSIONS).map_err(StorageError::from)?;
            let mut versions = load(&table, name.as_str())?;
            if versions.is_empty() {
                Err(RegistryError::ModelNotFound(name.to_string()))
            } else {
                match apply_transition(&mut versions, name, version, stage, archive_existing) {
                    Ok(mv) => {
                        let bytes = postcard::to_allocvec(&versions).map_err(StorageError::from)?;
                        table
                            .insert(name.as_str(), bytes.as_slice())
                            .map_err(StorageError::from)?;
                        Ok(mv)
                    }
                    Err(err) => Err(err),
                }
            }
        };

        match result {
            Ok(mv) => {
                txn.commit().map_err(StorageError::from)?;
                Ok(mv)
            }
            Err(err) => {
                txn.abort().map_err(StorageError::from)?;
                Err(err)
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
