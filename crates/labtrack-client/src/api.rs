//! Transport seam between the sync store and the record store service
//!
//! [`RecordApi`] is the four-operation contract of the `/data` endpoint.
//! [`HttpApi`](crate::HttpApi) speaks it over HTTP; [`LocalApi`] calls an
//! in-process [`RecordStore`] directly.

use std::future::Future;
use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::RwLock;

use labtrack_core::{ErrorCategory, RecordKind, RecordStore, StoreError};

use crate::error::SyncError;

/// CRUD over the four collections
pub trait RecordApi: Send + Sync + 'static {
    /// Every record of a collection
    fn list(&self, kind: RecordKind) -> impl Future<Output = Result<Vec<Value>, SyncError>> + Send;

    /// Create a record; returns the stored record
    fn create(
        &self,
        kind: RecordKind,
        payload: Map<String, Value>,
    ) -> impl Future<Output = Result<Value, SyncError>> + Send;

    /// Shallow-merge `payload` into an existing record; returns the merged record
    fn update(
        &self,
        kind: RecordKind,
        id: &str,
        payload: Map<String, Value>,
    ) -> impl Future<Output = Result<Value, SyncError>> + Send;

    fn delete(&self, kind: RecordKind, id: &str)
        -> impl Future<Output = Result<(), SyncError>> + Send;
}

/// In-process access to a [`RecordStore`]
#[derive(Clone)]
pub struct LocalApi {
    store: Arc<RwLock<RecordStore>>,
}

impl LocalApi {
    pub fn new(store: RecordStore) -> Self {
        Self {
            store: Arc::new(RwLock::new(store)),
        }
    }

    /// Share a store that something else (e.g. a server) also writes to
    pub fn shared(store: Arc<RwLock<RecordStore>>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<RwLock<RecordStore>> {
        &self.store
    }
}

impl Default for LocalApi {
    fn default() -> Self {
        Self::new(RecordStore::in_memory())
    }
}

/// Same status codes the service would answer with
fn status_error(err: StoreError) -> SyncError {
    let status = match err.category() {
        ErrorCategory::BadRequest => 400,
        ErrorCategory::NotFound => 404,
        ErrorCategory::InternalError => 500,
    };
    SyncError::Status {
        status,
        message: err.to_string(),
    }
}

impl RecordApi for LocalApi {
    async fn list(&self, kind: RecordKind) -> Result<Vec<Value>, SyncError> {
        let store = self.store.read().await;
        Ok(store.list(kind).iter().cloned().map(Value::Object).collect())
    }

    async fn create(&self, kind: RecordKind, payload: Map<String, Value>) -> Result<Value, SyncError> {
        let mut store = self.store.write().await;
        store
            .create(kind, Value::Object(payload))
            .map(Value::Object)
            .map_err(status_error)
    }

    async fn update(
        &self,
        kind: RecordKind,
        id: &str,
        payload: Map<String, Value>,
    ) -> Result<Value, SyncError> {
        let mut store = self.store.write().await;
        store
            .update(kind, Some(id), Value::Object(payload))
            .map(Value::Object)
            .map_err(status_error)
    }

    async fn delete(&self, kind: RecordKind, id: &str) -> Result<(), SyncError> {
        let mut store = self.store.write().await;
        store.delete(kind, Some(id)).map_err(status_error)
    }
}
