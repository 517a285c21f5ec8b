#![forbid(unsafe_code)]

use super::clock::MonotonicClock;
use super::document::{CollectionQuery, Document, Fields, sort_documents};
use super::error::StoreError;
use super::listeners::{EventSink, Listeners, SnapshotEvent, StoreEvent, Subscription, send};
use super::{BlobStore, DocumentStore, blob_url, generate_document_id, validate_blob_path};
use boost_core::paths::CollectionPath;
use std::cell::RefCell;
use std::collections::BTreeMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Operation {
    Subscribe,
    Fetch,
    Create,
    Update,
    Delete,
    Upload,
    DeleteBlob,
}

#[derive(Default)]
struct Faults {
    denied_prefixes: Vec<String>,
    fail_next: BTreeMap<Operation, usize>,
}

#[derive(Default)]
struct MemoryState {
    collections: BTreeMap<CollectionPath, Vec<Document>>,
    blobs: BTreeMap<String, Vec<u8>>,
    writes: usize,
}

/// Process-local document and blob store with fault injection.
pub struct MemoryStore {
    state: RefCell<MemoryState>,
    faults: RefCell<Faults>,
    listeners: Listeners<CollectionQuery>,
    clock: MonotonicClock,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_clock(MonotonicClock::system())
    }

    pub fn with_clock(clock: MonotonicClock) -> Self {
        Self {
            state: RefCell::new(MemoryState::default()),
            faults: RefCell::new(Faults::default()),
            listeners: Listeners::default(),
            clock,
        }
    }

    /// Every operation on a path starting with `prefix` fails with `PermissionDenied`.
    pub fn deny_prefix(&self, prefix: impl Into<String>) {
        self.faults.borrow_mut().denied_prefixes.push(prefix.into());
    }

    pub fn allow_all(&self) {
        self.faults.borrow_mut().denied_prefixes.clear();
    }

    /// The next `count` calls of `op` fail with `Unavailable`.
    pub fn fail_next(&self, op: Operation, count: usize) {
        *self.faults.borrow_mut().fail_next.entry(op).or_default() += count;
    }

    /// Pushes an error snapshot to every live subscription on `path`.
    pub fn break_subscriptions(&self, path: &CollectionPath, reason: &str) {
        for (id, query, sink) in self.listeners.matching(|q| &q.path == path) {
            send(
                &sink,
                StoreEvent::Snapshot(SnapshotEvent {
                    subscription: id,
                    path: query.path,
                    result: Err(StoreError::Unavailable(reason.to_string())),
                }),
            );
        }
    }

    pub fn live_subscriptions(&self) -> usize {
        self.listeners.len()
    }

    pub fn documents(&self, path: &CollectionPath) -> Vec<Document> {
        self.state
            .borrow()
            .collections
            .get(path)
            .cloned()
            .unwrap_or_default()
    }

    pub fn blob(&self, path: &str) -> Option<Vec<u8>> {
        self.state.borrow().blobs.get(path).cloned()
    }

    /// Successful document writes so far.
    pub fn write_count(&self) -> usize {
        self.state.borrow().writes
    }

    fn check(&self, op: Operation, path: &str) -> Result<(), StoreError> {
        let mut faults = self.faults.borrow_mut();
        if faults
            .denied_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
        {
            return Err(StoreError::PermissionDenied {
                path: path.to_string(),
            });
        }
        if let Some(remaining) = faults.fail_next.get_mut(&op)
            && *remaining > 0
        {
            *remaining -= 1;
            return Err(StoreError::Unavailable(format!("injected {op:?} failure")));
        }
        Ok(())
    }

    fn read(&self, query: &CollectionQuery) -> Vec<Document> {
        let mut docs = self.documents(&query.path);
        sort_documents(&mut docs, &query.order_by, query.direction);
        docs
    }

    fn notify(&self, path: &CollectionPath) {
        for (id, query, sink) in self.listeners.matching(|q| &q.path == path) {
            let docs = self.read(&query);
            send(
                &sink,
                StoreEvent::Snapshot(SnapshotEvent {
                    subscription: id,
                    path: query.path,
                    result: Ok(docs),
                }),
            );
        }
    }
}

impl DocumentStore for MemoryStore {
    fn subscribe_collection(
        &self,
        query: CollectionQuery,
        sink: EventSink,
    ) -> Result<Subscription, StoreError> {
        self.check(Operation::Subscribe, query.path.as_str())?;
        let docs = self.read(&query);
        let path = query.path.clone();
        let subscription = self.listeners.add(query, sink.clone());
        send(
            &sink,
            StoreEvent::Snapshot(SnapshotEvent {
                subscription: subscription.id(),
                path,
                result: Ok(docs),
            }),
        );
        Ok(subscription)
    }

    fn fetch_collection(&self, query: &CollectionQuery) -> Result<Vec<Document>, StoreError> {
        self.check(Operation::Fetch, query.path.as_str())?;
        Ok(self.read(query))
    }

    fn create_document(&self, path: &CollectionPath, fields: Fields) -> Result<String, StoreError> {
        self.check(Operation::Create, path.as_str())?;
        let id = generate_document_id();
        let created_at_ms = self.clock.tick();
        {
            let mut state = self.state.borrow_mut();
            state
                .collections
                .entry(path.clone())
                .or_default()
                .push(Document {
                    id: id.clone(),
                    fields,
                    created_at_ms,
                });
            state.writes += 1;
        }
        self.notify(path);
        Ok(id)
    }

    fn update_document(
        &self,
        path: &CollectionPath,
        id: &str,
        fields: Fields,
    ) -> Result<(), StoreError> {
        self.check(Operation::Update, path.as_str())?;
        {
            let mut state = self.state.borrow_mut();
            let doc = state
                .collections
                .get_mut(path)
                .and_then(|docs| docs.iter_mut().find(|doc| doc.id == id))
                .ok_or_else(|| StoreError::NotFound {
                    path: path.to_string(),
                    id: id.to_string(),
                })?;
            doc.fields.extend(fields);
            state.writes += 1;
        }
        self.notify(path);
        Ok(())
    }

    fn delete_document(&self, path: &CollectionPath, id: &str) -> Result<(), StoreError> {
        self.check(Operation::Delete, path.as_str())?;
        {
            let mut state = self.state.borrow_mut();
            let docs = state.collections.get_mut(path);
            let Some(docs) = docs else {
                return Err(StoreError::NotFound {
                    path: path.to_string(),
                    id: id.to_string(),
                });
            };
            let before = docs.len();
            docs.retain(|doc| doc.id != id);
            if docs.len() == before {
                return Err(StoreError::NotFound {
                    path: path.to_string(),
                    id: id.to_string(),
                });
            }
            state.writes += 1;
        }
        self.notify(path);
        Ok(())
    }
}

impl BlobStore for MemoryStore {
    fn upload_blob(&self, path: &str, bytes: &[u8]) -> Result<String, StoreError> {
        validate_blob_path(path)?;
        self.check(Operation::Upload, path)?;
        self.state
            .borrow_mut()
            .blobs
            .insert(path.to_string(), bytes.to_vec());
        Ok(blob_url("mem", path, bytes))
    }

    fn delete_blob(&self, path: &str) -> Result<(), StoreError> {
        self.check(Operation::DeleteBlob, path)?;
        match self.state.borrow_mut().blobs.remove(path) {
            Some(_) => Ok(()),
            None => Err(StoreError::BlobNotFound {
                path: path.to_string(),
            }),
        }
    }
}
