//! On-disk object record

use crate::codec::frame_len;
use crate::path::temp_path;
use crate::{FileCanError, Result, StorageMethod, Timestamp};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::Path;

const MAGIC: &[u8; 4] = b"FCAN";
const VERSION: u8 = 1;

/// Flag bit: payload is lz4-compressed (applied before encryption)
const FLAG_LZ4: u8 = 0b0000_0001;

/// One stored object: metadata in clear, payload possibly encrypted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectEnvelope {
    pub storage_method: StorageMethod,
    pub compressed: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    /// Normalized keywords, kept in clear so the index can be rebuilt
    pub keywords: Vec<String>,
    pub payload: Vec<u8>,
}

impl ObjectEnvelope {
    /// Serialize the record with a trailing CRC checksum
    ///
    /// Format:
    /// - 4 bytes: magic `FCAN`
    /// - 1 byte: format version
    /// - 1 byte: storage method
    /// - 1 byte: flags
    /// - 8 bytes: created_at (ms)
    /// - 8 bytes: updated_at (ms)
    /// - 4 bytes: keyword count, then per keyword 4 bytes length + UTF-8 bytes
    /// - 4 bytes: payload length
    /// - N bytes: payload
    /// - 4 bytes: CRC32 over everything before it
    ///
    /// Fails with `SerializationFailed` if a field does not fit its length prefix.
    pub fn serialize_with_checksum(&self) -> Result<Bytes> {
        let keywords_len: usize = self.keywords.iter().map(|k| 4 + k.len()).sum();
        let mut buf = BytesMut::with_capacity(27 + keywords_len + self.payload.len() + 4);

        buf.put_slice(MAGIC);
        buf.put_u8(VERSION);
        buf.put_u8(self.storage_method as u8);
        buf.put_u8(if self.compressed { FLAG_LZ4 } else { 0 });
        buf.put_i64_le(self.created_at);
        buf.put_i64_le(self.updated_at);

        buf.put_u32_le(frame_len("keyword list", self.keywords.len())?);
        for keyword in &self.keywords {
            buf.put_u32_le(frame_len("keyword", keyword.len())?);
            buf.put_slice(keyword.as_bytes());
        }

        buf.put_u32_le(frame_len("payload", self.payload.len())?);
        buf.put_slice(&self.payload);

        let checksum = crc32fast::hash(&buf);
        buf.put_u32_le(checksum);

        Ok(buf.freeze())
    }

    /// Deserialize a record, validating checksum and framing
    pub fn deserialize_with_checksum(data: &[u8]) -> Result<Self> {
        if data.len() < MAGIC.len() + 4 {
            return Err(FileCanError::Corruption("Object record too short".into()));
        }

        let (body, mut trailer) = data.split_at(data.len() - 4);
        let expected = trailer.get_u32_le();
        let actual = crc32fast::hash(body);
        if expected != actual {
            return Err(FileCanError::ChecksumMismatch { expected, actual });
        }

        let mut cursor = body;
        need(&cursor, 4 + 3 + 16 + 4)?;

        if &cursor[..4] != MAGIC {
            return Err(FileCanError::Corruption("Bad object magic".into()));
        }
        cursor.advance(4);

        let version = cursor.get_u8();
        if version != VERSION {
            return Err(FileCanError::Corruption(format!(
                "Unsupported object format version: {}",
                version
            )));
        }

        let storage_method = StorageMethod::try_from(cursor.get_u8())?;
        let flags = cursor.get_u8();
        let created_at = cursor.get_i64_le();
        let updated_at = cursor.get_i64_le();

        let keyword_count = cursor.get_u32_le() as usize;
        let mut keywords = Vec::with_capacity(keyword_count.min(1024));
        for _ in 0..keyword_count {
            let bytes = take_chunk(&mut cursor)?;
            let keyword = String::from_utf8(bytes.to_vec())
                .map_err(|e| FileCanError::Corruption(e.to_string()))?;
            keywords.push(keyword);
        }

        let payload = take_chunk(&mut cursor)?.to_vec();
        if cursor.has_remaining() {
            return Err(FileCanError::Corruption("Trailing bytes in object record".into()));
        }

        Ok(Self {
            storage_method,
            compressed: flags & FLAG_LZ4 != 0,
            created_at,
            updated_at,
            keywords,
            payload,
        })
    }

    /// Read a record from disk; `None` if the file does not exist
    pub fn read(path: &Path) -> Result<Option<Self>> {
        match fs::read(path) {
            Ok(data) => Self::deserialize_with_checksum(&data).map(Some),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Write the record atomically (temp file + rename); returns bytes written
    pub fn write(&self, path: &Path, sync: bool) -> Result<u64> {
        let encoded = self.serialize_with_checksum()?;
        let tmp = temp_path(path);
        {
            let mut file = File::create(&tmp)?;
            file.write_all(&encoded)?;
            if sync {
                file.sync_all()?;
            }
        }
        if let Err(e) = fs::rename(&tmp, path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(encoded.len() as u64)
    }
}

fn need(cursor: &&[u8], n: usize) -> Result<()> {
    if cursor.remaining() < n {
        return Err(FileCanError::Corruption("Truncated object record".into()));
    }
    Ok(())
}

fn take_chunk<'a>(cursor: &mut &'a [u8]) -> Result<&'a [u8]> {
    need(cursor, 4)?;
    let len = cursor.get_u32_le() as usize;
    need(cursor, len)?;
    let slice: &'a [u8] = *cursor;
    let (chunk, rest) = slice.split_at(len);
    *cursor = rest;
    Ok(chunk)
}
