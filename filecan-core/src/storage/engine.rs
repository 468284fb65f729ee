//! Storage engine - top-level coordinator

use super::catalog::CollectionCatalog;
use super::collection::Collection;
use super::envelope::ObjectEnvelope;
use super::{CollectionOptions, StorageConfig};
use crate::codec::{BincodeCodec, Codec};
use crate::crypto::{AesGcmCipher, CipherProvider};
use crate::index::normalize_keywords;
use crate::path::{validate_identifier, PathResolver};
use crate::{
    id, FileCanError, ObjectInfo, Page, Result, StorageMethod, Timestamp, WriteOptions,
};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::ErrorKind;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// FileCan storage engine
pub struct StorageEngine<C: Codec = BincodeCodec> {
    config: StorageConfig,
    catalog: CollectionCatalog,
    codec: C,
    cipher: Box<dyn CipherProvider>,
}

impl StorageEngine<BincodeCodec> {
    /// Create a new storage engine with the default codec
    pub fn new(config: StorageConfig) -> Result<Self> {
        Self::with_codec(config, BincodeCodec)
    }
}

impl<C: Codec> StorageEngine<C> {
    /// Create a new storage engine using `codec` for payloads
    pub fn with_codec(config: StorageConfig, codec: C) -> Result<Self> {
        config.validate()?;
        fs::create_dir_all(&config.data_dir)?;

        let cipher = AesGcmCipher::new(config.kdf_iterations)?;
        let catalog = CollectionCatalog::new(
            PathResolver::new(config.data_dir.clone()),
            CollectionOptions::from(&config),
        );

        info!(
            "Opened FileCan store at {:?} (codec: {})",
            config.data_dir,
            codec.name()
        );

        Ok(Self {
            config,
            catalog,
            codec,
            cipher: Box::new(cipher),
        })
    }

    /// Replace the cipher used for password-protected objects
    pub fn with_cipher(mut self, cipher: impl CipherProvider + 'static) -> Self {
        self.cipher = Box::new(cipher);
        self
    }

    /// Engine configuration
    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Catalog of areas and collections
    pub fn catalog(&self) -> &CollectionCatalog {
        &self.catalog
    }

    /// Generate a fresh object id
    pub fn generate_file_name(&self) -> String {
        id::generate_file_name()
    }

    /// Insert an object and return its id.
    ///
    /// An empty `opts.file_name` generates an id; a file name that is
    /// already taken fails with `DuplicateId`.
    pub fn insert_object<T: Serialize>(
        &self,
        data: &T,
        area: &str,
        collection: &str,
        opts: &WriteOptions,
    ) -> Result<String> {
        validate_identifier("area", area)?;
        validate_identifier("collection", collection)?;
        if !opts.file_name.is_empty() {
            validate_identifier("object", &opts.file_name)?;
        }

        let mut envelope = self.seal(data, opts)?;

        loop {
            let coll = self.catalog.get_or_create(area, collection)?;
            let mut state = coll.write();
            if state.is_dropped() {
                // Deleted between lookup and lock; resolve again
                continue;
            }

            let id = if opts.file_name.is_empty() {
                self.unused_id(&coll)
            } else if coll.object_path(&opts.file_name).exists() {
                return Err(FileCanError::DuplicateId {
                    area: area.to_string(),
                    collection: collection.to_string(),
                    id: opts.file_name.clone(),
                });
            } else {
                opts.file_name.clone()
            };

            let now = now_millis();
            envelope.created_at = now;
            envelope.updated_at = now;

            coll.prepare_mutation(&mut state)?;
            envelope.write(&coll.object_path(&id), self.config.sync_writes)?;
            coll.index_put(&mut state, &id, &envelope.keywords);

            debug!(
                "Inserted {}/{}/{} ({}, {} keywords)",
                area,
                collection,
                id,
                envelope.storage_method,
                envelope.keywords.len()
            );
            return Ok(id);
        }
    }

    /// Replace an object's payload and keywords.
    ///
    /// Returns `false` if the object does not exist. `opts.file_name` is
    /// ignored.
    pub fn update_object<T: Serialize>(
        &self,
        id: &str,
        data: &T,
        area: &str,
        collection: &str,
        opts: &WriteOptions,
    ) -> Result<bool> {
        self.validate_object(area, collection, id)?;
        let mut envelope = self.seal(data, opts)?;

        let Some(coll) = self.catalog.collection(area, collection)? else {
            return Ok(false);
        };
        let mut state = coll.write();
        if state.is_dropped() {
            return Ok(false);
        }

        let path = coll.object_path(id);
        let created_at = match ObjectEnvelope::read(&path) {
            Ok(Some(previous)) => previous.created_at,
            Ok(None) => return Ok(false),
            Err(e) if e.is_corruption() => {
                warn!(
                    "Overwriting unreadable object {}/{}/{}: {}",
                    area, collection, id, e
                );
                now_millis()
            }
            Err(e) => return Err(e),
        };

        envelope.created_at = created_at;
        envelope.updated_at = now_millis();

        coll.prepare_mutation(&mut state)?;
        envelope.write(&path, self.config.sync_writes)?;
        coll.index_put(&mut state, id, &envelope.keywords);

        debug!(
            "Updated {}/{}/{} ({})",
            area, collection, id, envelope.storage_method
        );
        Ok(true)
    }

    /// Delete an object. Returns `false` if it did not exist.
    pub fn delete_object(&self, id: &str, area: &str, collection: &str) -> Result<bool> {
        self.validate_object(area, collection, id)?;

        let Some(coll) = self.catalog.collection(area, collection)? else {
            return Ok(false);
        };
        let mut state = coll.write();
        if state.is_dropped() {
            return Ok(false);
        }

        let path = coll.object_path(id);
        if !path.exists() {
            return Ok(false);
        }

        coll.prepare_mutation(&mut state)?;
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        }
        coll.index_remove(&mut state, id);

        debug!("Deleted {}/{}/{}", area, collection, id);
        Ok(true)
    }

    /// Read and decode an object.
    ///
    /// `password` must be the one used on write (empty for plain objects).
    pub fn get_object<T: DeserializeOwned>(
        &self,
        id: &str,
        area: &str,
        collection: &str,
        password: &str,
    ) -> Result<T> {
        self.validate_object(area, collection, id)?;

        let Some(coll) = self.catalog.collection(area, collection)? else {
            return Err(not_found(area, collection, id));
        };
        let envelope = {
            let state = coll.read();
            if state.is_dropped() {
                None
            } else {
                coll.read_object(id)?
            }
        };

        let envelope = envelope.ok_or_else(|| not_found(area, collection, id))?;
        self.open(envelope, password)
    }

    /// Read and decode a page of objects, ascending by id.
    ///
    /// The first object that fails to decrypt or decode fails the call.
    pub fn get_objects<T: DeserializeOwned>(
        &self,
        area: &str,
        collection: &str,
        skip: i64,
        take: i64,
        password: &str,
    ) -> Result<Vec<T>> {
        let page = Page::new(skip, take)?;
        validate_identifier("area", area)?;
        validate_identifier("collection", collection)?;

        let Some(coll) = self.catalog.collection(area, collection)? else {
            return Ok(Vec::new());
        };
        let state = coll.read();
        if state.is_dropped() {
            return Ok(Vec::new());
        }

        let mut objects = Vec::new();
        for id in page.apply(coll.object_ids()?.into_iter()) {
            let Some(envelope) = coll.read_object(&id)? else {
                continue;
            };
            let object = self.open(envelope, password).map_err(|e| {
                warn!("Failed to read {}/{}/{}: {}", area, collection, id, e);
                e
            })?;
            objects.push(object);
        }
        Ok(objects)
    }

    /// Page of object ids, ascending, without reading payloads
    pub fn list_objects(
        &self,
        area: &str,
        collection: &str,
        skip: i64,
        take: i64,
    ) -> Result<impl Iterator<Item = String>> {
        let page = Page::new(skip, take)?;
        validate_identifier("area", area)?;
        validate_identifier("collection", collection)?;

        let Some(coll) = self.catalog.collection(area, collection)? else {
            return Ok(page.apply(Vec::<String>::new().into_iter()));
        };
        let ids = {
            let state = coll.read();
            if state.is_dropped() {
                Vec::new()
            } else {
                coll.object_ids()?
            }
        };
        Ok(page.apply(ids.into_iter()))
    }

    /// Ids of objects carrying every whitespace-separated keyword of `query`
    pub fn find_objects_using_keywords(
        &self,
        query: &str,
        area: &str,
        collection: &str,
        skip: i64,
        take: i64,
    ) -> Result<Vec<String>> {
        let page = Page::new(skip, take)?;
        validate_identifier("area", area)?;
        validate_identifier("collection", collection)?;

        match self.catalog.collection(area, collection)? {
            Some(coll) if coll.exists() => coll.find(query, page),
            _ => Ok(Vec::new()),
        }
    }

    /// Metadata of an object, readable without its password
    pub fn object_info(&self, id: &str, area: &str, collection: &str) -> Result<ObjectInfo> {
        self.validate_object(area, collection, id)?;

        let Some(coll) = self.catalog.collection(area, collection)? else {
            return Err(not_found(area, collection, id));
        };
        let state = coll.read();
        if state.is_dropped() {
            return Err(not_found(area, collection, id));
        }

        let path = coll.object_path(id);
        let envelope = ObjectEnvelope::read(&path)?.ok_or_else(|| not_found(area, collection, id))?;
        let stored_size = fs::metadata(&path)?.len();

        Ok(ObjectInfo {
            id: id.to_string(),
            storage_method: envelope.storage_method,
            keywords: envelope.keywords,
            compressed: envelope.compressed,
            created_at: envelope.created_at,
            updated_at: envelope.updated_at,
            stored_size,
        })
    }

    /// Whether an object exists
    pub fn contains_object(&self, id: &str, area: &str, collection: &str) -> Result<bool> {
        self.validate_object(area, collection, id)?;
        let Some(coll) = self.catalog.collection(area, collection)? else {
            return Ok(false);
        };
        let state = coll.read();
        Ok(!state.is_dropped() && coll.object_path(id).is_file())
    }

    /// Rebuild a collection's keyword index from its object files
    pub fn rebuild_index(&self, area: &str, collection: &str) -> Result<usize> {
        validate_identifier("area", area)?;
        validate_identifier("collection", collection)?;

        let missing = || FileCanError::NotFound(format!("collection {}/{}", area, collection));
        let coll = self.catalog.collection(area, collection)?.ok_or_else(missing)?;
        let mut state = coll.write();
        if state.is_dropped() || !coll.exists() {
            return Err(missing());
        }
        coll.rebuild_index(&mut state)
    }

    /// Delete a whole area. Returns `false` if it did not exist.
    pub fn delete_database(&self, area: &str) -> Result<bool> {
        self.catalog.delete_database(area)
    }

    /// Delete a whole collection. Returns `false` if it did not exist.
    pub fn delete_collection(&self, area: &str, collection: &str) -> Result<bool> {
        self.catalog.delete_collection(area, collection)
    }

    /// Collection names of an area
    pub fn get_collections(&self, area: &str) -> Result<Vec<String>> {
        self.catalog.get_collections(area)
    }

    /// Area names
    pub fn list_areas(&self) -> Result<Vec<String>> {
        self.catalog.list_areas()
    }

    /// Number of collections in an area
    pub fn database_collections_count(&self, area: &str) -> Result<usize> {
        self.catalog.database_collections_count(area)
    }

    /// Number of objects in a collection
    pub fn collection_objects_count(&self, area: &str, collection: &str) -> Result<usize> {
        self.catalog.collection_objects_count(area, collection)
    }

    /// Persist index snapshots of collections changed since the last flush
    pub fn flush(&self) -> Result<usize> {
        let mut written = 0;
        for coll in self.catalog.loaded_collections() {
            let mut state = coll.write();
            if coll.flush(&mut state)? {
                written += 1;
            }
        }
        if written > 0 {
            info!("Flushed {} index snapshots", written);
        }
        Ok(written)
    }

    fn validate_object(&self, area: &str, collection: &str, id: &str) -> Result<()> {
        validate_identifier("area", area)?;
        validate_identifier("collection", collection)?;
        validate_identifier("object", id)
    }

    fn unused_id(&self, coll: &Collection) -> String {
        loop {
            let id = id::generate_file_name();
            if !coll.object_path(&id).exists() {
                return id;
            }
            debug!("Generated id {} already taken, regenerating", id);
        }
    }

    /// Encode, compress and encrypt a value into a record
    fn seal<T: Serialize>(&self, data: &T, opts: &WriteOptions) -> Result<ObjectEnvelope> {
        let mut payload = self.codec.encode(data)?;

        let compressed =
            self.config.compress_payloads && payload.len() >= self.config.compression_threshold;
        if compressed {
            payload = lz4_flex::compress_prepend_size(&payload);
        }

        let storage_method = opts.storage_method();
        if storage_method == StorageMethod::Encrypted {
            payload = self.cipher.encrypt(&payload, &opts.password)?;
        }

        Ok(ObjectEnvelope {
            storage_method,
            compressed,
            created_at: 0,
            updated_at: 0,
            keywords: normalize_keywords(&opts.keywords).into_iter().collect(),
            payload,
        })
    }

    /// Decrypt, decompress and decode a record
    fn open<T: DeserializeOwned>(&self, envelope: ObjectEnvelope, password: &str) -> Result<T> {
        let mut payload = match (envelope.storage_method, password.is_empty()) {
            (StorageMethod::Encrypted, false) => {
                self.cipher.decrypt(&envelope.payload, password)?
            }
            (StorageMethod::Encrypted, true) => {
                return Err(FileCanError::DecryptionFailed(
                    "object is encrypted but no password was supplied".into(),
                ))
            }
            (StorageMethod::Plain, true) => envelope.payload,
            (StorageMethod::Plain, false) => {
                return Err(FileCanError::DecryptionFailed(
                    "object is stored plain but a password was supplied".into(),
                ))
            }
        };

        if envelope.compressed {
            payload = lz4_flex::decompress_size_prepended(&payload)
                .map_err(|e| FileCanError::Corruption(format!("lz4: {}", e)))?;
        }

        self.codec.decode(&payload)
    }
}

impl<C: Codec> Drop for StorageEngine<C> {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            warn!("Failed to flush index snapshots on close: {}", e);
        }
    }
}

/// Shared engine handle
pub type SharedEngine<C = BincodeCodec> = Arc<StorageEngine<C>>;

fn not_found(area: &str, collection: &str, id: &str) -> FileCanError {
    FileCanError::NotFound(format!("object {}/{}/{}", area, collection, id))
}

fn now_millis() -> Timestamp {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Note {
        title: String,
        body: String,
        stars: u32,
    }

    fn note(title: &str) -> Note {
        Note {
            title: title.to_string(),
            body: format!("body of {}", title),
            stars: 3,
        }
    }

    fn engine(dir: &TempDir) -> StorageEngine {
        let config = StorageConfig {
            data_dir: dir.path().to_path_buf(),
            sync_writes: false,
            kdf_iterations: 1_000,
            ..Default::default()
        };
        StorageEngine::new(config).unwrap()
    }

    fn kw(keywords: &[&str]) -> WriteOptions {
        WriteOptions::new().with_keywords(keywords.iter().copied())
    }

    #[test]
    fn test_insert_get_plain() {
        let temp_dir = TempDir::new().unwrap();
        let engine = engine(&temp_dir);

        let original = note("hello");
        let id = engine
            .insert_object(&original, "notes", "personal", &kw(&["greeting"]))
            .unwrap();

        let loaded: Note = engine.get_object(&id, "notes", "personal", "").unwrap();
        assert_eq!(loaded, original);
        assert_eq!(engine.collection_objects_count("notes", "personal").unwrap(), 1);
        assert_eq!(engine.database_collections_count("notes").unwrap(), 1);
    }

    #[test]
    fn test_large_payload_is_compressed() {
        let temp_dir = TempDir::new().unwrap();
        let engine = engine(&temp_dir);

        let mut big = note("big");
        big.body = "lorem ipsum ".repeat(500);
        let id = engine
            .insert_object(&big, "notes", "big", &WriteOptions::new())
            .unwrap();

        let info = engine.object_info(&id, "notes", "big").unwrap();
        assert!(info.compressed);
        assert!(info.stored_size < big.body.len() as u64);
        let loaded: Note = engine.get_object(&id, "notes", "big", "").unwrap();
        assert_eq!(loaded, big);
    }

    #[test]
    fn test_encrypted_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let engine = engine(&temp_dir);

        let secret = note("diary");
        let opts = WriteOptions::new().with_password("hunter2");
        let id = engine.insert_object(&secret, "notes", "vault", &opts).unwrap();

        let loaded: Note = engine.get_object(&id, "notes", "vault", "hunter2").unwrap();
        assert_eq!(loaded, secret);

        let info = engine.object_info(&id, "notes", "vault").unwrap();
        assert_eq!(info.storage_method, StorageMethod::Encrypted);

        // Payload is not readable on disk
        let raw = fs::read(temp_dir.path().join(format!("notes/vault/objects/{}.obj", id))).unwrap();
        assert!(!raw.windows(5).any(|w| w == b"diary"));
    }

    #[test]
    fn test_wrong_or_missing_password() {
        let temp_dir = TempDir::new().unwrap();
        let engine = engine(&temp_dir);

        let id = engine
            .insert_object(&note("diary"), "notes", "vault", &WriteOptions::new().with_password("right"))
            .unwrap();

        let wrong = engine.get_object::<Note>(&id, "notes", "vault", "wrong");
        assert!(matches!(wrong, Err(FileCanError::DecryptionFailed(_))));

        let missing = engine.get_object::<Note>(&id, "notes", "vault", "");
        assert!(matches!(missing, Err(FileCanError::DecryptionFailed(_))));

        // Password on a plain object is a mismatch as well
        let plain = engine
            .insert_object(&note("open"), "notes", "vault", &WriteOptions::new())
            .unwrap();
        let mismatch = engine.get_object::<Note>(&plain, "notes", "vault", "right");
        assert!(matches!(mismatch, Err(FileCanError::DecryptionFailed(_))));
    }

    #[test]
    fn test_get_missing_and_wrong_type() {
        let temp_dir = TempDir::new().unwrap();
        let engine = engine(&temp_dir);

        let err = engine.get_object::<Note>("nope", "notes", "personal", "").unwrap_err();
        assert!(err.is_not_found());

        let id = engine
            .insert_object(&7u8, "notes", "personal", &WriteOptions::new())
            .unwrap();
        let err = engine.get_object::<Note>(&id, "notes", "personal", "").unwrap_err();
        assert!(matches!(err, FileCanError::DeserializationFailed(_)));
    }

    #[test]
    fn test_file_name_and_duplicates() {
        let temp_dir = TempDir::new().unwrap();
        let engine = engine(&temp_dir);

        let opts = WriteOptions::new().with_file_name("readme");
        let id = engine.insert_object(&note("a"), "docs", "main", &opts).unwrap();
        assert_eq!(id, "readme");

        let dup = engine.insert_object(&note("b"), "docs", "main", &opts);
        assert!(matches!(dup, Err(FileCanError::DuplicateId { .. })));

        // The original is untouched
        let loaded: Note = engine.get_object("readme", "docs", "main", "").unwrap();
        assert_eq!(loaded.title, "a");
        assert_eq!(engine.collection_objects_count("docs", "main").unwrap(), 1);
    }

    #[test]
    fn test_invalid_identifiers() {
        let temp_dir = TempDir::new().unwrap();
        let engine = engine(&temp_dir);

        let err = engine
            .insert_object(&note("x"), "../escape", "c", &WriteOptions::new())
            .unwrap_err();
        assert!(matches!(err, FileCanError::InvalidIdentifier { .. }));

        let err = engine
            .insert_object(&note("x"), "a", "c", &WriteOptions::new().with_file_name("x/y"))
            .unwrap_err();
        assert!(matches!(err, FileCanError::InvalidIdentifier { .. }));

        // Distinguishable from "not found"
        let err = engine.delete_object("..", "a", "c").unwrap_err();
        assert!(matches!(err, FileCanError::InvalidIdentifier { .. }));
        assert!(!temp_dir.path().join("a").exists());
    }

    #[test]
    fn test_idempotent_delete() {
        let temp_dir = TempDir::new().unwrap();
        let engine = engine(&temp_dir);

        let id = engine
            .insert_object(&note("x"), "a", "c", &WriteOptions::new())
            .unwrap();
        assert!(!engine.delete_object("missing", "a", "c").unwrap());
        assert_eq!(engine.collection_objects_count("a", "c").unwrap(), 1);

        assert!(engine.delete_object(&id, "a", "c").unwrap());
        assert!(!engine.delete_object(&id, "a", "c").unwrap());
        assert_eq!(engine.collection_objects_count("a", "c").unwrap(), 0);

        // Unknown area and collection are not errors either
        assert!(!engine.delete_object(&id, "nowhere", "c").unwrap());
    }

    #[test]
    fn test_count_invariant() {
        let temp_dir = TempDir::new().unwrap();
        let engine = engine(&temp_dir);

        let ids: Vec<String> = (0..12)
            .map(|i| {
                engine
                    .insert_object(&note(&i.to_string()), "a", "c", &WriteOptions::new())
                    .unwrap()
            })
            .collect();
        for id in &ids[..5] {
            assert!(engine.delete_object(id, "a", "c").unwrap());
        }
        assert_eq!(engine.collection_objects_count("a", "c").unwrap(), 7);
        assert_eq!(engine.collection_objects_count("a", "other").unwrap(), 0);
        assert_eq!(engine.database_collections_count("nowhere").unwrap(), 0);
    }

    #[test]
    fn test_keyword_and_semantics() {
        let temp_dir = TempDir::new().unwrap();
        let engine = engine(&temp_dir);

        let first = engine.insert_object(&note("1"), "a", "c", &kw(&["a", "b"])).unwrap();
        let second = engine.insert_object(&note("2"), "a", "c", &kw(&["a"])).unwrap();
        engine.insert_object(&note("3"), "a", "c", &kw(&["b"])).unwrap();

        assert_eq!(
            engine.find_objects_using_keywords("a b", "a", "c", 0, 10).unwrap(),
            vec![first.clone()]
        );

        let mut expected = vec![first, second];
        expected.sort();
        assert_eq!(
            engine.find_objects_using_keywords("a", "a", "c", 0, 10).unwrap(),
            expected
        );

        assert!(engine.find_objects_using_keywords("", "a", "c", 0, 10).unwrap().is_empty());
        assert!(engine
            .find_objects_using_keywords("a", "a", "missing", 0, 10)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_find_pagination() {
        let temp_dir = TempDir::new().unwrap();
        let engine = engine(&temp_dir);

        for i in 0..6 {
            let opts = kw(&["tag"]).with_file_name(format!("n{}", i));
            engine.insert_object(&note("x"), "a", "c", &opts).unwrap();
        }

        assert_eq!(
            engine.find_objects_using_keywords("TAG", "a", "c", 2, 3).unwrap(),
            vec!["n2", "n3", "n4"]
        );
        assert!(engine
            .find_objects_using_keywords("tag", "a", "c", 10, 3)
            .unwrap()
            .is_empty());
        assert!(matches!(
            engine.find_objects_using_keywords("tag", "a", "c", -1, 3),
            Err(FileCanError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_pagination_stability() {
        let temp_dir = TempDir::new().unwrap();
        let engine = engine(&temp_dir);

        for i in 0..5 {
            engine
                .insert_object(&note(&i.to_string()), "a", "c", &WriteOptions::new())
                .unwrap();
        }

        let first: Vec<String> = engine.list_objects("a", "c", 0, 2).unwrap().collect();
        let second: Vec<String> = engine.list_objects("a", "c", 2, 2).unwrap().collect();
        assert_eq!(first.len(), 2);
        assert_eq!(second.len(), 2);

        let distinct: HashSet<_> = first.iter().chain(second.iter()).collect();
        assert_eq!(distinct.len(), 4);

        let again: Vec<String> = engine.list_objects("a", "c", 0, 2).unwrap().collect();
        assert_eq!(first, again);

        let tail: Vec<String> = engine.list_objects("a", "c", 4, 10).unwrap().collect();
        assert_eq!(tail.len(), 1);
        assert_eq!(engine.list_objects("a", "c", 9, 2).unwrap().count(), 0);
    }

    #[test]
    fn test_negative_skip_take() {
        let temp_dir = TempDir::new().unwrap();
        let engine = engine(&temp_dir);

        assert!(matches!(
            engine.list_objects("a", "c", -1, 2).err(),
            Some(FileCanError::InvalidArgument(_))
        ));
        assert!(matches!(
            engine.get_objects::<Note>("a", "c", 0, -2, ""),
            Err(FileCanError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_get_objects_in_id_order() {
        let temp_dir = TempDir::new().unwrap();
        let engine = engine(&temp_dir);

        for name in ["c", "a", "b"] {
            let opts = WriteOptions::new().with_file_name(name);
            engine.insert_object(&note(name), "a", "c", &opts).unwrap();
        }

        let notes: Vec<Note> = engine.get_objects("a", "c", 1, 5, "").unwrap();
        let titles: Vec<_> = notes.iter().map(|n| n.title.as_str()).collect();
        assert_eq!(titles, vec!["b", "c"]);
    }

    #[test]
    fn test_get_objects_fails_on_undecryptable_object() {
        let temp_dir = TempDir::new().unwrap();
        let engine = engine(&temp_dir);

        engine
            .insert_object(&note("open"), "a", "c", &WriteOptions::new().with_file_name("1"))
            .unwrap();
        engine
            .insert_object(
                &note("locked"),
                "a",
                "c",
                &WriteOptions::new().with_file_name("2").with_password("pw"),
            )
            .unwrap();

        let result = engine.get_objects::<Note>("a", "c", 0, 10, "");
        assert!(matches!(result, Err(FileCanError::DecryptionFailed(_))));

        let first_only: Vec<Note> = engine.get_objects("a", "c", 0, 1, "").unwrap();
        assert_eq!(first_only.len(), 1);
    }

    #[test]
    fn test_update_replaces_keywords_and_payload() {
        let temp_dir = TempDir::new().unwrap();
        let engine = engine(&temp_dir);

        let id = engine.insert_object(&note("v1"), "a", "c", &kw(&["x", "y"])).unwrap();
        assert_eq!(engine.find_objects_using_keywords("x", "a", "c", 0, 10).unwrap(), vec![id.clone()]);
        let created = engine.object_info(&id, "a", "c").unwrap().created_at;

        assert!(engine.update_object(&id, &note("v2"), "a", "c", &kw(&["y", "z"])).unwrap());

        assert!(engine.find_objects_using_keywords("x", "a", "c", 0, 10).unwrap().is_empty());
        assert_eq!(engine.find_objects_using_keywords("y z", "a", "c", 0, 10).unwrap(), vec![id.clone()]);

        let loaded: Note = engine.get_object(&id, "a", "c", "").unwrap();
        assert_eq!(loaded.title, "v2");
        assert_eq!(engine.object_info(&id, "a", "c").unwrap().created_at, created);
        assert_eq!(engine.collection_objects_count("a", "c").unwrap(), 1);
    }

    #[test]
    fn test_update_changes_storage_method() {
        let temp_dir = TempDir::new().unwrap();
        let engine = engine(&temp_dir);

        let id = engine.insert_object(&note("v1"), "a", "c", &WriteOptions::new()).unwrap();
        assert!(engine
            .update_object(&id, &note("v2"), "a", "c", &WriteOptions::new().with_password("pw"))
            .unwrap());
        assert_eq!(
            engine.object_info(&id, "a", "c").unwrap().storage_method,
            StorageMethod::Encrypted
        );
        let loaded: Note = engine.get_object(&id, "a", "c", "pw").unwrap();
        assert_eq!(loaded.title, "v2");

        assert!(engine.update_object(&id, &note("v3"), "a", "c", &WriteOptions::new()).unwrap());
        let loaded: Note = engine.get_object(&id, "a", "c", "").unwrap();
        assert_eq!(loaded.title, "v3");
    }

    #[test]
    fn test_update_missing_returns_false() {
        let temp_dir = TempDir::new().unwrap();
        let engine = engine(&temp_dir);

        assert!(!engine.update_object("ghost", &note("x"), "a", "c", &WriteOptions::new()).unwrap());
        // Nothing was created as a side effect
        assert_eq!(engine.collection_objects_count("a", "c").unwrap(), 0);
        assert!(!temp_dir.path().join("a").exists());
    }

    #[test]
    fn test_delete_removes_postings() {
        let temp_dir = TempDir::new().unwrap();
        let engine = engine(&temp_dir);

        let id = engine.insert_object(&note("x"), "a", "c", &kw(&["gone"])).unwrap();
        assert_eq!(engine.find_objects_using_keywords("gone", "a", "c", 0, 10).unwrap().len(), 1);
        engine.delete_object(&id, "a", "c").unwrap();
        assert!(engine.find_objects_using_keywords("gone", "a", "c", 0, 10).unwrap().is_empty());
    }

    #[test]
    fn test_cascading_delete_collection() {
        let temp_dir = TempDir::new().unwrap();
        let engine = engine(&temp_dir);

        for i in 0..3 {
            engine.insert_object(&note(&i.to_string()), "a", "c", &kw(&["shared"])).unwrap();
        }
        engine.insert_object(&note("keep"), "a", "other", &kw(&["shared"])).unwrap();

        assert!(engine.delete_collection("a", "c").unwrap());
        assert_eq!(engine.collection_objects_count("a", "c").unwrap(), 0);
        assert!(engine.find_objects_using_keywords("shared", "a", "c", 0, 10).unwrap().is_empty());
        assert_eq!(engine.get_collections("a").unwrap(), vec!["other".to_string()]);
        assert!(!engine.delete_collection("a", "c").unwrap());

        // Re-created lazily with a clean index
        engine.insert_object(&note("new"), "a", "c", &kw(&["fresh"])).unwrap();
        assert!(engine.find_objects_using_keywords("shared", "a", "c", 0, 10).unwrap().is_empty());
        assert_eq!(engine.find_objects_using_keywords("fresh", "a", "c", 0, 10).unwrap().len(), 1);
    }

    #[test]
    fn test_cascading_delete_database() {
        let temp_dir = TempDir::new().unwrap();
        let engine = engine(&temp_dir);

        engine.insert_object(&note("1"), "shop", "orders", &kw(&["k"])).unwrap();
        engine.insert_object(&note("2"), "shop", "users", &kw(&["k"])).unwrap();
        engine.insert_object(&note("3"), "blog", "posts", &kw(&["k"])).unwrap();
        assert_eq!(engine.database_collections_count("shop").unwrap(), 2);

        assert!(engine.delete_database("shop").unwrap());
        assert_eq!(engine.database_collections_count("shop").unwrap(), 0);
        assert!(engine.get_collections("shop").unwrap().is_empty());
        assert_eq!(engine.collection_objects_count("shop", "orders").unwrap(), 0);
        assert!(engine.find_objects_using_keywords("k", "shop", "users", 0, 10).unwrap().is_empty());
        assert_eq!(engine.list_areas().unwrap(), vec!["blog".to_string()]);
        assert!(!engine.delete_database("shop").unwrap());
    }

    #[test]
    fn test_index_survives_restart() {
        let temp_dir = TempDir::new().unwrap();
        let id;
        {
            let engine = engine(&temp_dir);
            id = engine.insert_object(&note("x"), "a", "c", &kw(&["persist"])).unwrap();
            assert_eq!(engine.find_objects_using_keywords("persist", "a", "c", 0, 10).unwrap().len(), 1);
            // Dropping the engine flushes the snapshot
        }
        assert!(temp_dir.path().join("a/c/keywords.idx").exists());

        let engine = engine(&temp_dir);
        assert_eq!(
            engine.find_objects_using_keywords("persist", "a", "c", 0, 10).unwrap(),
            vec![id]
        );
    }

    #[test]
    fn test_index_rebuilt_after_unclean_shutdown() {
        let temp_dir = TempDir::new().unwrap();
        {
            let engine = engine(&temp_dir);
            engine.insert_object(&note("x"), "a", "c", &kw(&["old"])).unwrap();
            engine.find_objects_using_keywords("old", "a", "c", 0, 10).unwrap();
            engine.flush().unwrap();

            // Mutation after the flush discards the snapshot, then "crash"
            engine.insert_object(&note("y"), "a", "c", &kw(&["new"])).unwrap();
            assert!(!temp_dir.path().join("a/c/keywords.idx").exists());
            std::mem::forget(engine);
        }

        let engine = engine(&temp_dir);
        assert_eq!(engine.find_objects_using_keywords("new", "a", "c", 0, 10).unwrap().len(), 1);
        assert_eq!(engine.find_objects_using_keywords("old", "a", "c", 0, 10).unwrap().len(), 1);
    }

    #[test]
    fn test_corrupt_snapshot_is_rebuilt() {
        let temp_dir = TempDir::new().unwrap();
        {
            let engine = engine(&temp_dir);
            engine.insert_object(&note("x"), "a", "c", &kw(&["alpha"])).unwrap();
            engine.find_objects_using_keywords("alpha", "a", "c", 0, 10).unwrap();
        }
        let snapshot = temp_dir.path().join("a/c/keywords.idx");
        fs::write(&snapshot, b"garbage").unwrap();

        let engine = engine(&temp_dir);
        assert_eq!(engine.find_objects_using_keywords("alpha", "a", "c", 0, 10).unwrap().len(), 1);
    }

    #[test]
    fn test_rebuild_index() {
        let temp_dir = TempDir::new().unwrap();
        let engine = engine(&temp_dir);

        engine.insert_object(&note("x"), "a", "c", &kw(&["k"])).unwrap();
        engine.insert_object(&note("y"), "a", "c", &WriteOptions::new()).unwrap();
        assert_eq!(engine.rebuild_index("a", "c").unwrap(), 2);
        assert_eq!(engine.find_objects_using_keywords("k", "a", "c", 0, 10).unwrap().len(), 1);
        assert!(engine.rebuild_index("a", "missing").unwrap_err().is_not_found());
    }

    #[test]
    fn test_contains_and_generate() {
        let temp_dir = TempDir::new().unwrap();
        let engine = engine(&temp_dir);

        let name = engine.generate_file_name();
        assert!(!engine.contains_object(&name, "a", "c").unwrap());
        engine
            .insert_object(&note("x"), "a", "c", &WriteOptions::new().with_file_name(name.clone()))
            .unwrap();
        assert!(engine.contains_object(&name, "a", "c").unwrap());
    }

    #[test]
    fn test_concurrent_inserts_same_collection() {
        let temp_dir = TempDir::new().unwrap();
        let engine = Arc::new(engine(&temp_dir));

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let engine = engine.clone();
                std::thread::spawn(move || {
                    for i in 0..25 {
                        let opts = WriteOptions::new().with_keywords([format!("t{}", t), "all".to_string()]);
                        engine
                            .insert_object(&note(&format!("{}-{}", t, i)), "a", "c", &opts)
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(engine.collection_objects_count("a", "c").unwrap(), 100);
        assert_eq!(engine.find_objects_using_keywords("all", "a", "c", 0, 1000).unwrap().len(), 100);
        assert_eq!(engine.find_objects_using_keywords("t2 all", "a", "c", 0, 1000).unwrap().len(), 25);
    }

    #[test]
    fn test_readers_see_whole_updates_only() {
        let temp_dir = TempDir::new().unwrap();
        let engine = Arc::new(engine(&temp_dir));
        let id = engine.insert_object(&note("v0"), "a", "c", &kw(&["x", "p"])).unwrap();
        let done = Arc::new(AtomicBool::new(false));

        let writer = {
            let (engine, done, id) = (engine.clone(), done.clone(), id.clone());
            thread::spawn(move || {
                for i in 0..200 {
                    let keywords = if i % 2 == 0 { kw(&["y", "q"]) } else { kw(&["x", "p"]) };
                    let updated = engine.update_object(&id, &note(&format!("v{}", i)), "a", "c", &keywords);
                    assert!(updated.unwrap());
                }
                assert!(engine.delete_object(&id, "a", "c").unwrap());
                done.store(true, Ordering::Release);
            })
        };

        let readers: Vec<_> = (0..3)
            .map(|_| {
                let (engine, done, id) = (engine.clone(), done.clone(), id.clone());
                thread::spawn(move || {
                    let mut rounds = 0;
                    while !done.load(Ordering::Acquire) && rounds < 20_000 {
                        // Keyword sets are only ever {x, p} or {y, q}
                        assert!(engine.find_objects_using_keywords("x q", "a", "c", 0, 10).unwrap().is_empty());
                        assert!(engine.find_objects_using_keywords("p y", "a", "c", 0, 10).unwrap().is_empty());

                        let hits = engine.find_objects_using_keywords("x p", "a", "c", 0, 10).unwrap();
                        assert!(hits.is_empty() || hits == vec![id.clone()]);

                        match engine.get_object::<Note>(&id, "a", "c", "") {
                            Ok(loaded) => assert!(loaded.title.starts_with('v')),
                            Err(e) => assert!(e.is_not_found(), "unexpected error: {}", e),
                        }
                        rounds += 1;
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }

        assert_eq!(engine.collection_objects_count("a", "c").unwrap(), 0);
        assert!(engine.find_objects_using_keywords("x", "a", "c", 0, 10).unwrap().is_empty());
    }

    #[test]
    fn test_inserts_racing_drops_stay_consistent() {
        let temp_dir = TempDir::new().unwrap();
        let engine = Arc::new(engine(&temp_dir));

        let inserters: Vec<_> = (0..4)
            .map(|t| {
                let engine = engine.clone();
                thread::spawn(move || {
                    let mut ids = Vec::new();
                    for i in 0..30 {
                        let value = note(&format!("{}-{}", t, i));
                        ids.push(engine.insert_object(&value, "a", "c", &kw(&["race"])).unwrap());
                    }
                    ids.len()
                })
            })
            .collect();

        let dropper = {
            let engine = engine.clone();
            thread::spawn(move || {
                for i in 0..20 {
                    if i % 2 == 0 {
                        engine.delete_collection("a", "c").unwrap();
                    } else {
                        engine.delete_database("a").unwrap();
                    }
                    thread::yield_now();
                }
            })
        };

        let inserted: usize = inserters.into_iter().map(|h| h.join().unwrap()).sum();
        dropper.join().unwrap();
        assert_eq!(inserted, 120);

        let count = engine.collection_objects_count("a", "c").unwrap();
        let indexed = engine.find_objects_using_keywords("race", "a", "c", 0, 1000).unwrap();
        let listed: Vec<String> = engine.list_objects("a", "c", 0, 1000).unwrap().collect();
        assert!(count <= inserted);
        assert_eq!(indexed.len(), count);
        assert_eq!(indexed, listed);

        // The surviving handle still accepts writes
        engine.insert_object(&note("after"), "a", "c", &kw(&["race"])).unwrap();
        assert_eq!(engine.collection_objects_count("a", "c").unwrap(), count + 1);
    }

    #[test]
    fn test_reads_of_absent_names_register_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let engine = engine(&temp_dir);

        for i in 0..50 {
            let collection = format!("ghost{}", i);
            let area = format!("area{}", i);
            assert_eq!(engine.collection_objects_count(&area, &collection).unwrap(), 0);
            assert_eq!(engine.database_collections_count(&area).unwrap(), 0);
            assert_eq!(engine.list_objects(&area, &collection, 0, 10).unwrap().count(), 0);
            assert!(engine.find_objects_using_keywords("k", &area, &collection, 0, 10).unwrap().is_empty());
            assert!(engine.get_objects::<Note>(&area, &collection, 0, 10, "").unwrap().is_empty());
            assert!(engine.get_object::<Note>("x", &area, &collection, "").unwrap_err().is_not_found());
            assert!(engine.object_info("x", &area, &collection).unwrap_err().is_not_found());
            assert!(!engine.contains_object("x", &area, &collection).unwrap());
            assert!(!engine.delete_object("x", &area, &collection).unwrap());
            assert!(!engine.update_object("x", &note("x"), &area, &collection, &WriteOptions::new()).unwrap());
        }

        assert!(engine.catalog().loaded_collections().is_empty());
        assert!(engine.list_areas().unwrap().is_empty());
        assert_eq!(engine.flush().unwrap(), 0);
    }
}
