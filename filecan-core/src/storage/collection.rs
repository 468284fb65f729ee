//! Collection handle - one per (area, collection)
//!
//! Every operation on a collection goes through its `RwLock<CollectionState>`:
//! mutations hold it exclusively for the file write and the posting update,
//! readers share it. The keyword index is loaded on first use.

use super::envelope::ObjectEnvelope;
use super::CollectionOptions;
use crate::index::{IndexSnapshot, KeywordIndex};
use crate::path::{enumerate_object_ids_in, PathResolver, OBJECT_EXT, TEMP_SUFFIX};
use crate::{FileCanError, Page, Result};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Whether a snapshot file may exist for the collection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SnapshotState {
    /// Not checked since the handle was created
    Unknown,
    /// On disk and matching the in-memory index
    OnDisk,
    /// Known to be absent
    Absent,
}

/// Mutable state guarded by the collection lock
#[derive(Debug)]
pub struct CollectionState {
    index: Option<KeywordIndex>,
    snapshot: SnapshotState,
    /// Index changed since the last snapshot was written
    dirty: bool,
    dropped: bool,
}

impl CollectionState {
    /// Collection was deleted; the handle must not be used for writes
    pub fn is_dropped(&self) -> bool {
        self.dropped
    }

    pub(crate) fn mark_dropped(&mut self) {
        self.dropped = true;
        self.index = None;
        self.dirty = false;
    }
}

/// Handle to a single collection
#[derive(Debug)]
pub struct Collection {
    area: String,
    name: String,
    dir: PathBuf,
    objects_dir: PathBuf,
    index_path: PathBuf,
    options: CollectionOptions,
    state: RwLock<CollectionState>,
}

impl Collection {
    pub(crate) fn new(
        resolver: &PathResolver,
        area: &str,
        name: &str,
        options: CollectionOptions,
    ) -> Result<Self> {
        Ok(Self {
            area: area.to_string(),
            name: name.to_string(),
            dir: resolver.collection_dir(area, name)?,
            objects_dir: resolver.objects_dir(area, name)?,
            index_path: resolver.index_path(area, name)?,
            options,
            state: RwLock::new(CollectionState {
                index: None,
                snapshot: SnapshotState::Unknown,
                dirty: false,
                dropped: false,
            }),
        })
    }

    /// Collection directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Whether the collection exists on disk
    pub fn exists(&self) -> bool {
        self.objects_dir.is_dir()
    }

    /// Shared access
    pub fn read(&self) -> RwLockReadGuard<'_, CollectionState> {
        self.state.read()
    }

    /// Exclusive access
    pub fn write(&self) -> RwLockWriteGuard<'_, CollectionState> {
        self.state.write()
    }

    /// File of object `id` (already validated by the caller)
    pub fn object_path(&self, id: &str) -> PathBuf {
        self.objects_dir.join(format!("{}.{}", id, OBJECT_EXT))
    }

    /// Create the collection directories
    pub(crate) fn create_dirs(&self) -> Result<bool> {
        if self.exists() {
            return Ok(false);
        }
        fs::create_dir_all(&self.objects_dir)?;
        info!("Created collection: {}/{}", self.area, self.name);
        Ok(true)
    }

    /// Object ids, ascending
    pub fn object_ids(&self) -> Result<Vec<String>> {
        enumerate_object_ids_in(&self.objects_dir)
    }

    /// Number of stored objects, counted from the directory
    pub fn object_count(&self) -> Result<usize> {
        Ok(self.object_ids()?.len())
    }

    /// Read an object record
    pub fn read_object(&self, id: &str) -> Result<Option<ObjectEnvelope>> {
        ObjectEnvelope::read(&self.object_path(id))
    }

    /// Make sure the index is loaded
    pub(crate) fn ensure_index(&self, state: &mut CollectionState) -> Result<()> {
        if state.index.is_some() || state.dropped {
            return Ok(());
        }

        self.remove_temp_files()?;

        let ids = self.object_ids()?;
        if self.options.persist_index {
            match IndexSnapshot::load(&self.index_path) {
                Ok(Some(snapshot)) if snapshot.ids().eq(ids.iter()) => {
                    debug!(
                        "Loaded index snapshot for {}/{} ({} objects)",
                        self.area,
                        self.name,
                        ids.len()
                    );
                    state.index = Some(snapshot.into_index());
                    state.snapshot = SnapshotState::OnDisk;
                    state.dirty = false;
                    return Ok(());
                }
                Ok(Some(_)) => {
                    let err = FileCanError::IndexCorrupt(format!(
                        "snapshot of {}/{} does not match stored objects",
                        self.area, self.name
                    ));
                    warn!("{}; rebuilding", err);
                }
                Ok(None) => {}
                Err(e) => warn!(
                    "Unreadable index snapshot for {}/{}: {}; rebuilding",
                    self.area, self.name, e
                ),
            }
        }

        IndexSnapshot::discard(&self.index_path)?;
        state.snapshot = SnapshotState::Absent;
        state.index = Some(self.build_index(&ids));
        state.dirty = true;
        Ok(())
    }

    /// Rebuild the index from the object files, returning the object count
    pub(crate) fn rebuild_index(&self, state: &mut CollectionState) -> Result<usize> {
        self.discard_snapshot(state)?;
        let ids = self.object_ids()?;
        state.index = Some(self.build_index(&ids));
        state.dirty = true;
        Ok(ids.len())
    }

    fn build_index(&self, ids: &[String]) -> KeywordIndex {
        let mut index = KeywordIndex::new();
        for id in ids {
            match self.read_object(id) {
                Ok(Some(envelope)) => index.add(id, &envelope.keywords),
                Ok(None) => continue,
                Err(e) => {
                    // Still counted and listed; it just cannot match a query
                    warn!(
                        "Unreadable object {}/{}/{} while indexing: {}",
                        self.area, self.name, id, e
                    );
                    index.add(id, Vec::<String>::new());
                }
            }
        }
        info!(
            "Rebuilt keyword index for {}/{}: {} objects, {} keywords",
            self.area,
            self.name,
            index.object_count(),
            index.keyword_count()
        );
        index
    }

    /// Must run before any object file of the collection changes
    pub(crate) fn prepare_mutation(&self, state: &mut CollectionState) -> Result<()> {
        self.discard_snapshot(state)
    }

    fn discard_snapshot(&self, state: &mut CollectionState) -> Result<()> {
        if state.snapshot != SnapshotState::Absent {
            IndexSnapshot::discard(&self.index_path)?;
            state.snapshot = SnapshotState::Absent;
        }
        Ok(())
    }

    /// Record new keywords of `id` in the loaded index
    pub(crate) fn index_put(&self, state: &mut CollectionState, id: &str, keywords: &[String]) {
        if let Some(index) = state.index.as_mut() {
            index.replace(id, keywords);
            state.dirty = true;
        }
    }

    /// Drop `id` from the loaded index
    pub(crate) fn index_remove(&self, state: &mut CollectionState, id: &str) {
        if let Some(index) = state.index.as_mut() {
            index.remove(id);
            state.dirty = true;
        }
    }

    /// Run a keyword query, rebuilding the index once if it points at
    /// objects that no longer exist
    pub fn find(&self, query: &str, page: Page) -> Result<Vec<String>> {
        let state = self.index_read()?;
        let Some(index) = state.index.as_ref() else {
            return Ok(Vec::new());
        };

        let hits = index.find(query, page);
        if hits.iter().all(|id| self.object_path(id).is_file()) {
            return Ok(hits);
        }
        drop(state);

        let mut state = self.write();
        if state.dropped {
            return Ok(Vec::new());
        }
        warn!(
            "{}; rebuilding",
            FileCanError::IndexCorrupt(format!(
                "index of {}/{} references missing objects",
                self.area, self.name
            ))
        );
        self.rebuild_index(&mut state)?;
        Ok(state
            .index
            .as_ref()
            .map(|index| index.find(query, page))
            .unwrap_or_default())
    }

    /// Shared access with the index loaded
    fn index_read(&self) -> Result<RwLockReadGuard<'_, CollectionState>> {
        let state = self.read();
        if state.index.is_some() || state.dropped {
            return Ok(state);
        }
        drop(state);

        let mut state = self.write();
        self.ensure_index(&mut state)?;
        Ok(RwLockWriteGuard::downgrade(state))
    }

    /// Write the index snapshot if it changed
    pub(crate) fn flush(&self, state: &mut CollectionState) -> Result<bool> {
        if !self.options.persist_index || state.dropped || !state.dirty || !self.exists() {
            return Ok(false);
        }
        let Some(index) = state.index.as_ref() else {
            return Ok(false);
        };

        IndexSnapshot::from_index(index).save(&self.index_path, self.options.sync_writes)?;
        state.snapshot = SnapshotState::OnDisk;
        state.dirty = false;
        debug!("Wrote index snapshot for {}/{}", self.area, self.name);
        Ok(true)
    }

    fn remove_temp_files(&self) -> Result<()> {
        let entries = match fs::read_dir(&self.objects_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        for entry in entries {
            let path = entry?.path();
            let is_temp = path
                .file_name()
                .and_then(|n| n.to_str())
                .map_or(false, |n| n.ends_with(TEMP_SUFFIX));
            if is_temp {
                warn!("Removing interrupted write {:?}", path);
                fs::remove_file(&path)?;
            }
        }
        Ok(())
    }
}
