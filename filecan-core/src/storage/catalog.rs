//! Collection catalog - which areas and collections exist
//!
//! Counts and listings are always read from the directory tree, so they can
//! never drift from what is stored. The in-memory maps only hand out one
//! lock-carrying handle per area and per collection, and only for names
//! that exist on disk or are being created.

use super::collection::Collection;
use super::CollectionOptions;
use crate::path::{validate_identifier, PathResolver};
use crate::Result;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

/// Handle to an area and its collection handles
#[derive(Debug)]
pub struct Area {
    name: String,
    dir: PathBuf,
    collections: RwLock<HashMap<String, Arc<Collection>>>,
    dropped: AtomicBool,
}

impl Area {
    fn new(name: &str, dir: PathBuf) -> Self {
        Self {
            name: name.to_string(),
            dir,
            collections: RwLock::new(HashMap::new()),
            dropped: AtomicBool::new(false),
        }
    }

    /// Whether the area exists on disk
    pub fn exists(&self) -> bool {
        self.dir.is_dir()
    }

    fn is_dropped(&self) -> bool {
        self.dropped.load(Ordering::Acquire)
    }

    /// Collection handles created so far
    pub fn loaded_collections(&self) -> Vec<Arc<Collection>> {
        self.collections.read().values().cloned().collect()
    }
}

/// Tracks areas and collections and deletes them
pub struct CollectionCatalog {
    resolver: PathResolver,
    options: CollectionOptions,
    areas: RwLock<HashMap<String, Arc<Area>>>,
}

impl CollectionCatalog {
    pub(crate) fn new(resolver: PathResolver, options: CollectionOptions) -> Self {
        Self {
            resolver,
            options,
            areas: RwLock::new(HashMap::new()),
        }
    }

    /// Handle for an existing area; `None` if it is neither loaded nor on disk
    pub fn area(&self, name: &str) -> Result<Option<Arc<Area>>> {
        validate_identifier("area", name)?;

        if let Some(area) = self.areas.read().get(name) {
            return Ok(Some(area.clone()));
        }

        let dir = self.resolver.area_dir(name)?;
        let mut areas = self.areas.write();
        if let Some(area) = areas.get(name) {
            return Ok(Some(area.clone()));
        }
        if !dir.is_dir() {
            return Ok(None);
        }

        let area = Arc::new(Area::new(name, dir));
        areas.insert(name.to_string(), area.clone());
        Ok(Some(area))
    }

    fn area_or_register(&self, name: &str) -> Result<Arc<Area>> {
        validate_identifier("area", name)?;

        if let Some(area) = self.areas.read().get(name) {
            return Ok(area.clone());
        }

        let dir = self.resolver.area_dir(name)?;
        let mut areas = self.areas.write();
        let area = areas
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Area::new(name, dir)));
        Ok(area.clone())
    }

    /// Handle for an existing collection; never creates anything.
    ///
    /// `None` if the collection is neither loaded nor on disk.
    pub fn collection(&self, area: &str, collection: &str) -> Result<Option<Arc<Collection>>> {
        validate_identifier("collection", collection)?;

        loop {
            let Some(handle) = self.area(area)? else {
                return Ok(None);
            };
            if let Some(coll) = handle.collections.read().get(collection) {
                if !handle.is_dropped() {
                    return Ok(Some(coll.clone()));
                }
                continue;
            }

            let mut collections = handle.collections.write();
            if handle.is_dropped() {
                continue;
            }
            if let Some(coll) = collections.get(collection) {
                return Ok(Some(coll.clone()));
            }

            // Creators register before making directories, so an absent
            // directory here means the collection does not exist
            let coll = Collection::new(&self.resolver, area, collection, self.options)?;
            if !coll.exists() {
                return Ok(None);
            }
            let coll = Arc::new(coll);
            collections.insert(collection.to_string(), coll.clone());
            return Ok(Some(coll));
        }
    }

    /// Handle for a collection, creating its area and directories if needed
    pub fn get_or_create(&self, area: &str, collection: &str) -> Result<Arc<Collection>> {
        validate_identifier("collection", collection)?;

        loop {
            let handle = self.area_or_register(area)?;
            let mut collections = handle.collections.write();
            if handle.is_dropped() {
                continue;
            }

            if !handle.exists() {
                fs::create_dir_all(&handle.dir)?;
                info!("Created area: {}", area);
            }

            let coll = match collections.get(collection) {
                Some(coll) => coll.clone(),
                None => {
                    let coll = Arc::new(Collection::new(
                        &self.resolver,
                        &handle.name,
                        collection,
                        self.options,
                    )?);
                    collections.insert(collection.to_string(), coll.clone());
                    coll
                }
            };
            coll.create_dirs()?;
            return Ok(coll);
        }
    }

    /// Area names present on disk
    pub fn list_areas(&self) -> Result<Vec<String>> {
        let _areas = self.areas.read();
        self.resolver.enumerate_areas()
    }

    /// Collection names of an area; empty for an unknown area
    pub fn get_collections(&self, area: &str) -> Result<Vec<String>> {
        let Some(handle) = self.area(area)? else {
            return Ok(Vec::new());
        };
        let _collections = handle.collections.read();
        if handle.is_dropped() {
            return Ok(Vec::new());
        }
        self.resolver.enumerate_collections(area)
    }

    /// Number of collections in an area; 0 for an unknown area
    pub fn database_collections_count(&self, area: &str) -> Result<usize> {
        Ok(self.get_collections(area)?.len())
    }

    /// Number of objects in a collection; 0 for an unknown collection
    pub fn collection_objects_count(&self, area: &str, collection: &str) -> Result<usize> {
        let Some(coll) = self.collection(area, collection)? else {
            return Ok(0);
        };
        let state = coll.read();
        if state.is_dropped() {
            return Ok(0);
        }
        coll.object_count()
    }

    /// Delete a collection with all its objects and index state
    pub fn delete_collection(&self, area: &str, collection: &str) -> Result<bool> {
        validate_identifier("collection", collection)?;

        loop {
            let Some(handle) = self.area(area)? else {
                return Ok(false);
            };
            let mut collections = handle.collections.write();
            if handle.is_dropped() {
                continue;
            }

            // An unloaded collection gets a transient handle that is never registered
            let coll = match collections.remove(collection) {
                Some(coll) => coll,
                None => Arc::new(Collection::new(
                    &self.resolver,
                    area,
                    collection,
                    self.options,
                )?),
            };

            coll.write().mark_dropped();
            let existed = remove_dir_if_exists(coll.dir())?;
            if existed {
                info!("Deleted collection: {}/{}", area, collection);
            }
            return Ok(existed);
        }
    }

    /// Delete an area with every collection in it
    pub fn delete_database(&self, area: &str) -> Result<bool> {
        validate_identifier("area", area)?;

        let mut areas = self.areas.write();
        let handle = areas.remove(area);

        let mut removed_collections = 0;
        if let Some(handle) = &handle {
            let mut collections = handle.collections.write();
            handle.dropped.store(true, Ordering::Release);
            for (_, coll) in collections.drain() {
                coll.write().mark_dropped();
                removed_collections += 1;
            }
        }

        let dir = self.resolver.area_dir(area)?;
        let existed = remove_dir_if_exists(&dir)?;
        drop(areas);

        if existed {
            info!(
                "Deleted area: {} ({} open collections released)",
                area, removed_collections
            );
        }
        Ok(existed)
    }

    /// Every collection handle created so far
    pub(crate) fn loaded_collections(&self) -> Vec<Arc<Collection>> {
        self.areas
            .read()
            .values()
            .flat_map(|area| area.loaded_collections())
            .collect()
    }
}

fn remove_dir_if_exists(dir: &Path) -> Result<bool> {
    match fs::remove_dir_all(dir) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}
