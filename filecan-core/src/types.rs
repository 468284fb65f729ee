//! Core types for FileCan

use crate::{FileCanError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Timestamp in milliseconds since Unix epoch
pub type Timestamp = i64;

/// How an object's payload is kept on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum StorageMethod {
    /// Codec output stored as-is (possibly compressed)
    Plain = 0,
    /// Codec output encrypted with a caller-supplied password
    Encrypted = 1,
}

impl StorageMethod {
    /// Storage method implied by a password: empty means plain
    pub fn for_password(password: &str) -> Self {
        if password.is_empty() {
            StorageMethod::Plain
        } else {
            StorageMethod::Encrypted
        }
    }
}

impl TryFrom<u8> for StorageMethod {
    type Error = FileCanError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(StorageMethod::Plain),
            1 => Ok(StorageMethod::Encrypted),
            _ => Err(FileCanError::Corruption(format!(
                "Invalid storage method: {}",
                value
            ))),
        }
    }
}

impl fmt::Display for StorageMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageMethod::Plain => write!(f, "plain"),
            StorageMethod::Encrypted => write!(f, "encrypted"),
        }
    }
}

/// Optional parameters of insert and update.
///
/// Defaults: no file name (an id is generated), no password (plain storage),
/// no keywords.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteOptions {
    /// Caller-chosen object id; empty means generate one. Ignored by update.
    pub file_name: String,
    /// Encryption password; empty means plain storage
    pub password: String,
    /// Keywords to index the object under
    pub keywords: Vec<String>,
}

impl WriteOptions {
    /// Create default options
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a caller-chosen object id
    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = file_name.into();
        self
    }

    /// Encrypt the payload with this password
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    /// Index the object under these keywords
    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    /// Storage method these options produce
    pub fn storage_method(&self) -> StorageMethod {
        StorageMethod::for_password(&self.password)
    }
}

/// Validated skip/take window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub skip: usize,
    pub take: usize,
}

impl Page {
    /// Validate a skip/take pair coming from the public API
    pub fn new(skip: i64, take: i64) -> Result<Self> {
        if skip < 0 {
            return Err(FileCanError::InvalidArgument(format!(
                "skip must not be negative (got {})",
                skip
            )));
        }
        if take < 0 {
            return Err(FileCanError::InvalidArgument(format!(
                "take must not be negative (got {})",
                take
            )));
        }
        Ok(Self {
            skip: usize::try_from(skip).unwrap_or(usize::MAX),
            take: usize::try_from(take).unwrap_or(usize::MAX),
        })
    }

    /// Window covering everything
    pub fn all() -> Self {
        Self {
            skip: 0,
            take: usize::MAX,
        }
    }

    /// Apply the window to an ordered iterator
    pub fn apply<I: Iterator>(&self, iter: I) -> std::iter::Take<std::iter::Skip<I>> {
        iter.skip(self.skip).take(self.take)
    }
}

/// Metadata of a stored object, readable without the password
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectInfo {
    pub id: String,
    pub storage_method: StorageMethod,
    /// Normalized keywords, sorted
    pub keywords: Vec<String>,
    pub compressed: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    /// Size of the object file in bytes
    pub stored_size: u64,
}
