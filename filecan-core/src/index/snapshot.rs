//! Persisted copy of a collection's keyword index
//!
//! Format:
//! - 4 bytes: magic `FCIX`
//! - 1 byte: format version
//! - 4 bytes: payload length
//! - N bytes: bincode-encoded entries (`id -> keywords`)
//! - 4 bytes: CRC32 over everything before it
//!
//! A snapshot is only a cache. The object files stay the source of truth and
//! the index can always be rebuilt from them.

use super::KeywordIndex;
use crate::codec::frame_len;
use crate::path::temp_path;
use crate::{FileCanError, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::Path;

const MAGIC: &[u8; 4] = b"FCIX";
const VERSION: u8 = 1;
const HEADER_LEN: usize = 4 + 1 + 4;

/// Serializable form of a [`KeywordIndex`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexSnapshot {
    /// Object id to its normalized keywords
    pub entries: BTreeMap<String, Vec<String>>,
}

impl IndexSnapshot {
    /// Capture the current state of an index
    pub fn from_index(index: &KeywordIndex) -> Self {
        let entries = index
            .entries()
            .map(|(id, keywords)| (id.clone(), keywords.iter().cloned().collect()))
            .collect();
        Self { entries }
    }

    /// Rebuild the in-memory index
    pub fn into_index(self) -> KeywordIndex {
        let mut index = KeywordIndex::new();
        for (id, keywords) in self.entries {
            index.add(&id, keywords);
        }
        index
    }

    /// Object ids covered by the snapshot, ascending
    pub fn ids(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }

    /// Encode with header and checksum
    pub fn encode(&self) -> Result<Bytes> {
        let payload = bincode::serialize(&self.entries)
            .map_err(|e| FileCanError::SerializationFailed(e.to_string()))?;

        let mut buf = BytesMut::with_capacity(HEADER_LEN + payload.len() + 4);
        buf.put_slice(MAGIC);
        buf.put_u8(VERSION);
        buf.put_u32_le(frame_len("index snapshot", payload.len())?);
        buf.put_slice(&payload);

        let checksum = crc32fast::hash(&buf);
        buf.put_u32_le(checksum);

        Ok(buf.freeze())
    }

    /// Decode, validating magic, version and checksum
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_LEN + 4 {
            return Err(FileCanError::Corruption("Index snapshot too short".into()));
        }

        let (body, mut trailer) = data.split_at(data.len() - 4);
        let expected = trailer.get_u32_le();
        let actual = crc32fast::hash(body);
        if expected != actual {
            return Err(FileCanError::ChecksumMismatch { expected, actual });
        }

        let mut cursor = body;
        if &cursor[..4] != MAGIC {
            return Err(FileCanError::Corruption("Bad index snapshot magic".into()));
        }
        cursor.advance(4);

        let version = cursor.get_u8();
        if version != VERSION {
            return Err(FileCanError::Corruption(format!(
                "Unsupported index snapshot version: {}",
                version
            )));
        }

        let len = cursor.get_u32_le() as usize;
        if cursor.remaining() != len {
            return Err(FileCanError::Corruption("Index snapshot length mismatch".into()));
        }

        let entries = bincode::deserialize(cursor)
            .map_err(|e| FileCanError::Corruption(e.to_string()))?;
        Ok(Self { entries })
    }

    /// Load a snapshot file; `None` if there is none
    pub fn load(path: &Path) -> Result<Option<Self>> {
        match fs::read(path) {
            Ok(data) => Self::decode(&data).map(Some),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Write the snapshot atomically (temp file + rename)
    pub fn save(&self, path: &Path, sync: bool) -> Result<()> {
        let encoded = self.encode()?;
        let tmp = temp_path(path);
        {
            let mut file = File::create(&tmp)?;
            file.write_all(&encoded)?;
            if sync {
                file.sync_all()?;
            }
        }
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Delete a snapshot file if present
    pub fn discard(path: &Path) -> Result<bool> {
        match fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
