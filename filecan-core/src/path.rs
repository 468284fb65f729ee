//! Filesystem layout
//!
//! ```text
//! <root>/<area>/<collection>/objects/<id>.obj       object file
//! <root>/<area>/<collection>/objects/<id>.obj.tmp   write in flight
//! <root>/<area>/<collection>/keywords.idx           index snapshot
//! ```
//!
//! Identifiers are validated, never rewritten: two distinct caller
//! identifiers always map to two distinct locations.

use crate::{FileCanError, Result};
use regex::Regex;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Extension of object files
pub const OBJECT_EXT: &str = "obj";

/// Suffix appended to object files while they are being written
pub const TEMP_SUFFIX: &str = ".tmp";

/// Sub-directory of a collection holding the object files
pub const OBJECTS_DIR: &str = "objects";

/// File name of a collection's index snapshot
pub const INDEX_FILE: &str = "keywords.idx";

/// Maximum identifier length in bytes
pub const MAX_IDENTIFIER_LEN: usize = 128;

const RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

fn identifier_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9_\-][A-Za-z0-9_.\-]*$").expect("identifier pattern is valid")
    })
}

/// Check that `value` is a safe area, collection or object identifier
pub fn validate_identifier(kind: &'static str, value: &str) -> Result<()> {
    let reject = |reason: &str| {
        Err(FileCanError::InvalidIdentifier {
            kind,
            value: value.to_string(),
            reason: reason.to_string(),
        })
    };

    if value.is_empty() {
        return reject("must not be empty");
    }
    if value.len() > MAX_IDENTIFIER_LEN {
        return reject("too long");
    }
    if value.contains('/') || value.contains('\\') {
        return reject("contains path separator");
    }
    if value.starts_with('.') {
        return reject("must not start with '.'");
    }
    if !identifier_pattern().is_match(value) {
        return reject("only ASCII letters, digits, '_', '-' and '.' are allowed");
    }

    let stem = value.split('.').next().unwrap_or(value).to_ascii_uppercase();
    if RESERVED_NAMES.contains(&stem.as_str()) {
        return reject("reserved device name");
    }

    Ok(())
}

/// Maps areas, collections and objects to filesystem locations
#[derive(Debug, Clone)]
pub struct PathResolver {
    root: PathBuf,
}

impl PathResolver {
    /// Create a resolver rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Data root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of an area
    pub fn area_dir(&self, area: &str) -> Result<PathBuf> {
        validate_identifier("area", area)?;
        Ok(self.root.join(area))
    }

    /// Directory of a collection
    pub fn collection_dir(&self, area: &str, collection: &str) -> Result<PathBuf> {
        validate_identifier("collection", collection)?;
        Ok(self.area_dir(area)?.join(collection))
    }

    /// Directory holding a collection's object files
    pub fn objects_dir(&self, area: &str, collection: &str) -> Result<PathBuf> {
        Ok(self.collection_dir(area, collection)?.join(OBJECTS_DIR))
    }

    /// File holding a single object
    pub fn object_path(&self, area: &str, collection: &str, id: &str) -> Result<PathBuf> {
        validate_identifier("object", id)?;
        Ok(self
            .objects_dir(area, collection)?
            .join(format!("{}.{}", id, OBJECT_EXT)))
    }

    /// Index snapshot of a collection
    pub fn index_path(&self, area: &str, collection: &str) -> Result<PathBuf> {
        Ok(self.collection_dir(area, collection)?.join(INDEX_FILE))
    }

    /// List area names present under the root
    pub fn enumerate_areas(&self) -> Result<Vec<String>> {
        list_dirs(&self.root)
    }

    /// List collection names present under an area
    pub fn enumerate_collections(&self, area: &str) -> Result<Vec<String>> {
        list_dirs(&self.area_dir(area)?)
    }

    /// List object ids of a collection, ascending
    pub fn enumerate_object_ids(&self, area: &str, collection: &str) -> Result<Vec<String>> {
        enumerate_object_ids_in(&self.objects_dir(area, collection)?)
    }
}

/// Path of the temporary file used while writing `path`
pub fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(TEMP_SUFFIX);
    PathBuf::from(name)
}

/// List object ids stored in an objects directory, ascending
pub fn enumerate_object_ids_in(dir: &Path) -> Result<Vec<String>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut ids = Vec::new();
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some(OBJECT_EXT) {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            if validate_identifier("object", stem).is_ok() {
                ids.push(stem.to_string());
            }
        }
    }

    ids.sort();
    Ok(ids)
}

fn list_dirs(dir: &Path) -> Result<Vec<String>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();

        // Skip hidden directories and anything we could not have created
        if validate_identifier("directory", &name).is_err() {
            continue;
        }
        names.push(name);
    }

    names.sort();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_validate_identifier() {
        for ok in ["users", "my-area_01", "v1.2", "20240101-abc"] {
            assert!(validate_identifier("area", ok).is_ok(), "{}", ok);
        }

        for bad in ["", ".", "..", "../etc", "a/b", "a\\b", ".hidden", "sp ace", "naïve", "CON", "nul.txt"] {
            assert!(
                matches!(
                    validate_identifier("area", bad),
                    Err(FileCanError::InvalidIdentifier { .. })
                ),
                "{}",
                bad
            );
        }

        let long = "a".repeat(MAX_IDENTIFIER_LEN + 1);
        assert!(validate_identifier("object", &long).is_err());
    }

    #[test]
    fn test_layout() {
        let resolver = PathResolver::new("/data");
        assert_eq!(
            resolver.object_path("shop", "orders", "o1").unwrap(),
            PathBuf::from("/data/shop/orders/objects/o1.obj")
        );
        assert_eq!(
            resolver.index_path("shop", "orders").unwrap(),
            PathBuf::from("/data/shop/orders/keywords.idx")
        );
        assert_eq!(
            temp_path(&PathBuf::from("/data/x.obj")),
            PathBuf::from("/data/x.obj.tmp")
        );
        assert!(resolver.collection_dir("shop", "..").is_err());
    }

    #[test]
    fn test_enumerate_object_ids() {
        let temp_dir = TempDir::new().unwrap();
        let resolver = PathResolver::new(temp_dir.path());

        // Missing directory is just empty
        assert!(resolver.enumerate_object_ids("a", "c").unwrap().is_empty());

        let dir = resolver.objects_dir("a", "c").unwrap();
        fs::create_dir_all(&dir).unwrap();
        for name in ["b.obj", "a.obj", "c.obj.tmp", "notes.txt"] {
            fs::write(dir.join(name), b"x").unwrap();
        }

        assert_eq!(
            resolver.enumerate_object_ids("a", "c").unwrap(),
            vec!["a".to_string(), "b".to_string()]
        );
        assert_eq!(resolver.enumerate_collections("a").unwrap(), vec!["c".to_string()]);
        assert_eq!(resolver.enumerate_areas().unwrap(), vec!["a".to_string()]);
    }
}
