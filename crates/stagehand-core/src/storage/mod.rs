//! # Storage Module
//!
//! File-backed local model registry using redb.
//!
//! Uses redb embedded database for:
//! - ACID transactions (archive-existing and the target move commit together)
//! - Crash safety (copy-on-write B-trees)
//! - A registry the CLI can rehearse promotions against without a server

mod redb_registry;

pub use redb_registry::{RedbRegistry, StorageError};
