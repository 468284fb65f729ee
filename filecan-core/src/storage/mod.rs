//! Storage engine - coordinates all storage components

mod async_engine;
mod catalog;
mod collection;
mod engine;
mod envelope;

pub use async_engine::AsyncStorageEngine;
pub use catalog::{Area, CollectionCatalog};
pub use collection::{Collection, CollectionState};
pub use engine::{SharedEngine, StorageEngine};
pub use envelope::ObjectEnvelope;

use crate::{FileCanError, Result};
use std::path::PathBuf;

/// Storage engine configuration
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Data directory
    pub data_dir: PathBuf,
    /// fsync object and snapshot files before renaming them into place
    pub sync_writes: bool,
    /// lz4-compress payloads before (optional) encryption
    pub compress_payloads: bool,
    /// Payloads smaller than this are stored uncompressed
    pub compression_threshold: usize,
    /// Persist keyword index snapshots on flush
    pub persist_index: bool,
    /// PBKDF2 rounds used by the default cipher
    pub kdf_iterations: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            sync_writes: true,
            compress_payloads: true,
            compression_threshold: crate::config::COMPRESSION_THRESHOLD,
            persist_index: true,
            kdf_iterations: crate::config::KDF_ITERATIONS,
        }
    }
}

impl StorageConfig {
    /// Configuration rooted at `data_dir`, defaults elsewhere
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Default::default()
        }
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.kdf_iterations == 0 {
            return Err(FileCanError::Config("kdf_iterations must be positive".into()));
        }
        if self.data_dir.as_os_str().is_empty() {
            return Err(FileCanError::Config("data_dir must not be empty".into()));
        }
        Ok(())
    }
}

/// Per-collection settings derived from [`StorageConfig`]
#[derive(Debug, Clone, Copy)]
pub(crate) struct CollectionOptions {
    pub sync_writes: bool,
    pub persist_index: bool,
}

impl From<&StorageConfig> for CollectionOptions {
    fn from(config: &StorageConfig) -> Self {
        Self {
            sync_writes: config.sync_writes,
            persist_index: config.persist_index,
        }
    }
}
