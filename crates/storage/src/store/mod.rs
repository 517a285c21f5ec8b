#![forbid(unsafe_code)]

mod auth;
mod clock;
mod document;
mod error;
mod listeners;
mod memory;
mod sqlite;

pub use auth::{AuthProvider, AuthState, LocalAuth};
pub use clock::{MonotonicClock, now_ms};
pub use document::{
    CREATED_AT_FIELD, CollectionQuery, Direction, Document, Fields, sort_documents,
};
pub use error::StoreError;
pub use listeners::{EventSink, SnapshotEvent, StoreEvent, Subscription, SubscriptionId};
pub use memory::{MemoryStore, Operation};
pub use sqlite::SqliteStore;

use boost_core::paths::CollectionPath;
use sha2::{Digest, Sha256};
use std::fmt::Write as _;

/// Live-queryable document database.
///
/// Every successful write re-delivers a full snapshot to each subscription on the
/// written path. Subscribing delivers the current snapshot immediately.
pub trait DocumentStore {
    fn subscribe_collection(
        &self,
        query: CollectionQuery,
        sink: EventSink,
    ) -> Result<Subscription, StoreError>;

    fn fetch_collection(&self, query: &CollectionQuery) -> Result<Vec<Document>, StoreError>;

    /// Returns the store-generated id.
    fn create_document(&self, path: &CollectionPath, fields: Fields) -> Result<String, StoreError>;

    /// Merges top-level `fields` into the existing document.
    fn update_document(
        &self,
        path: &CollectionPath,
        id: &str,
        fields: Fields,
    ) -> Result<(), StoreError>;

    fn delete_document(&self, path: &CollectionPath, id: &str) -> Result<(), StoreError>;
}

pub trait BlobStore {
    /// Returns the access URL of the stored object.
    fn upload_blob(&self, path: &str, bytes: &[u8]) -> Result<String, StoreError>;

    fn delete_blob(&self, path: &str) -> Result<(), StoreError>;
}

pub(crate) fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(64);
    for b in digest {
        let _ = write!(&mut out, "{b:02x}");
    }
    out
}

pub(crate) fn blob_url(scheme: &str, path: &str, bytes: &[u8]) -> String {
    format!("{scheme}://{path}?sha256={}", sha256_hex(bytes))
}

pub(crate) fn validate_blob_path(path: &str) -> Result<(), StoreError> {
    if path.trim().is_empty() {
        return Err(StoreError::InvalidInput("blob path must not be empty"));
    }
    if path.split('/').any(|segment| segment.is_empty() || segment == "..") {
        return Err(StoreError::InvalidInput("blob path has an empty or parent segment"));
    }
    Ok(())
}

pub(crate) fn generate_document_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..20].to_string()
}
