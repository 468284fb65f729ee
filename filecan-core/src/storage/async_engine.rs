//! Async facade over [`StorageEngine`] for tokio callers
//!
//! Every call runs on the blocking thread pool, so file I/O never stalls
//! the async executor.

use super::engine::{SharedEngine, StorageEngine};
use crate::codec::{BincodeCodec, Codec};
use crate::{FileCanError, ObjectInfo, Result, WriteOptions};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

/// Cloneable async handle to a storage engine
pub struct AsyncStorageEngine<C: Codec = BincodeCodec> {
    inner: SharedEngine<C>,
}

impl<C: Codec> Clone for AsyncStorageEngine<C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<C: Codec> AsyncStorageEngine<C> {
    /// Wrap an engine
    pub fn new(engine: StorageEngine<C>) -> Self {
        Self {
            inner: Arc::new(engine),
        }
    }

    /// Wrap an engine that is also used synchronously
    pub fn from_shared(engine: SharedEngine<C>) -> Self {
        Self { inner: engine }
    }

    /// Underlying synchronous engine
    pub fn engine(&self) -> &SharedEngine<C> {
        &self.inner
    }

    async fn run<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&StorageEngine<C>) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let engine = self.inner.clone();
        tokio::task::spawn_blocking(move || f(&engine))
            .await
            .map_err(|e| FileCanError::Internal(format!("blocking task failed: {}", e)))?
    }

    /// Generate a fresh object id
    pub fn generate_file_name(&self) -> String {
        self.inner.generate_file_name()
    }

    /// Insert an object and return its id
    pub async fn insert_object<T>(
        &self,
        data: T,
        area: &str,
        collection: &str,
        opts: WriteOptions,
    ) -> Result<String>
    where
        T: Serialize + Send + 'static,
    {
        let (area, collection) = (area.to_string(), collection.to_string());
        self.run(move |e| e.insert_object(&data, &area, &collection, &opts))
            .await
    }

    /// Replace an object's payload and keywords; `false` if it does not exist
    pub async fn update_object<T>(
        &self,
        id: &str,
        data: T,
        area: &str,
        collection: &str,
        opts: WriteOptions,
    ) -> Result<bool>
    where
        T: Serialize + Send + 'static,
    {
        let (id, area, collection) = (id.to_string(), area.to_string(), collection.to_string());
        self.run(move |e| e.update_object(&id, &data, &area, &collection, &opts))
            .await
    }

    /// Delete an object; `false` if it did not exist
    pub async fn delete_object(&self, id: &str, area: &str, collection: &str) -> Result<bool> {
        let (id, area, collection) = (id.to_string(), area.to_string(), collection.to_string());
        self.run(move |e| e.delete_object(&id, &area, &collection))
            .await
    }

    /// Read and decode an object
    pub async fn get_object<T>(
        &self,
        id: &str,
        area: &str,
        collection: &str,
        password: &str,
    ) -> Result<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let (id, area, collection, password) = (
            id.to_string(),
            area.to_string(),
            collection.to_string(),
            password.to_string(),
        );
        self.run(move |e| e.get_object(&id, &area, &collection, &password))
            .await
    }

    /// Read and decode a page of objects, ascending by id
    pub async fn get_objects<T>(
        &self,
        area: &str,
        collection: &str,
        skip: i64,
        take: i64,
        password: &str,
    ) -> Result<Vec<T>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let (area, collection, password) =
            (area.to_string(), collection.to_string(), password.to_string());
        self.run(move |e| e.get_objects(&area, &collection, skip, take, &password))
            .await
    }

    /// Page of object ids, ascending
    pub async fn list_objects(
        &self,
        area: &str,
        collection: &str,
        skip: i64,
        take: i64,
    ) -> Result<Vec<String>> {
        let (area, collection) = (area.to_string(), collection.to_string());
        self.run(move |e| Ok(e.list_objects(&area, &collection, skip, take)?.collect()))
            .await
    }

    /// Ids of objects carrying every keyword of `query`
    pub async fn find_objects_using_keywords(
        &self,
        query: &str,
        area: &str,
        collection: &str,
        skip: i64,
        take: i64,
    ) -> Result<Vec<String>> {
        let (query, area, collection) =
            (query.to_string(), area.to_string(), collection.to_string());
        self.run(move |e| e.find_objects_using_keywords(&query, &area, &collection, skip, take))
            .await
    }

    /// Metadata of an object, readable without its password
    pub async fn object_info(&self, id: &str, area: &str, collection: &str) -> Result<ObjectInfo> {
        let (id, area, collection) = (id.to_string(), area.to_string(), collection.to_string());
        self.run(move |e| e.object_info(&id, &area, &collection))
            .await
    }

    /// Whether an object exists
    pub async fn contains_object(&self, id: &str, area: &str, collection: &str) -> Result<bool> {
        let (id, area, collection) = (id.to_string(), area.to_string(), collection.to_string());
        self.run(move |e| e.contains_object(&id, &area, &collection))
            .await
    }

    /// Rebuild a collection's keyword index, returning the object count
    pub async fn rebuild_index(&self, area: &str, collection: &str) -> Result<usize> {
        let (area, collection) = (area.to_string(), collection.to_string());
        self.run(move |e| e.rebuild_index(&area, &collection))
            .await
    }

    /// Delete a whole collection; `false` if it did not exist
    pub async fn delete_collection(&self, area: &str, collection: &str) -> Result<bool> {
        let (area, collection) = (area.to_string(), collection.to_string());
        self.run(move |e| e.delete_collection(&area, &collection))
            .await
    }

    /// Delete a whole area; `false` if it did not exist
    pub async fn delete_database(&self, area: &str) -> Result<bool> {
        let area = area.to_string();
        self.run(move |e| e.delete_database(&area)).await
    }

    /// Area names
    pub async fn list_areas(&self) -> Result<Vec<String>> {
        self.run(|e| e.list_areas()).await
    }

    /// Collection names of an area
    pub async fn get_collections(&self, area: &str) -> Result<Vec<String>> {
        let area = area.to_string();
        self.run(move |e| e.get_collections(&area)).await
    }

    /// Number of collections in an area
    pub async fn database_collections_count(&self, area: &str) -> Result<usize> {
        let area = area.to_string();
        self.run(move |e| e.database_collections_count(&area)).await
    }

    /// Number of objects in a collection
    pub async fn collection_objects_count(&self, area: &str, collection: &str) -> Result<usize> {
        let (area, collection) = (area.to_string(), collection.to_string());
        self.run(move |e| e.collection_objects_count(&area, &collection))
            .await
    }

    /// Persist dirty index snapshots
    pub async fn flush(&self) -> Result<usize> {
        self.run(|e| e.flush()).await
    }
}
