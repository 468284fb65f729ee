//! FileCan Core - File-Backed Document Store
//!
//! A lightweight object database on top of a plain filesystem:
//! - Objects grouped into collections, collections grouped into areas
//! - Optional per-object encryption with a caller-supplied password
//! - Stable paginated listing
//! - Keyword search with AND semantics
//!
//! # Architecture
//!
//! - **PathResolver**: maps areas, collections and objects to files
//! - **Codec / CipherProvider**: pluggable serialization and encryption
//! - **StorageEngine**: object CRUD, one atomic file write per object
//! - **KeywordIndex**: per-collection inverted index, derived from the
//!   keywords stored in each object file
//! - **CollectionCatalog**: counts and cascading deletes, read from the
//!   directory tree

pub mod codec;
pub mod crypto;
pub mod id;
pub mod index;
pub mod path;
pub mod storage;

mod error;
mod types;

pub use codec::{BincodeCodec, Codec, JsonCodec};
pub use crypto::{AesGcmCipher, CipherProvider};
pub use error::{FileCanError, Result};
pub use id::generate_file_name;
pub use index::KeywordIndex;
pub use storage::{AsyncStorageEngine, StorageConfig, StorageEngine};
pub use types::*;

/// FileCan version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration values
pub mod config {
    /// Payloads below this size (bytes) are not compressed
    pub const COMPRESSION_THRESHOLD: usize = 512;

    /// PBKDF2 rounds for password-derived keys
    pub const KDF_ITERATIONS: u32 = 100_000;

    /// Default page size used by the CLI
    pub const DEFAULT_PAGE_SIZE: i64 = 50;
}
