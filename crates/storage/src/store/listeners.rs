#![forbid(unsafe_code)]

use super::auth::AuthState;
use super::document::Document;
use super::error::StoreError;
use boost_core::paths::CollectionPath;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::Sender;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Full ordered materialization of one subscribed collection.
#[derive(Debug)]
pub struct SnapshotEvent {
    pub subscription: SubscriptionId,
    pub path: CollectionPath,
    pub result: Result<Vec<Document>, StoreError>,
}

#[derive(Debug)]
pub enum StoreEvent {
    Snapshot(SnapshotEvent),
    Auth(AuthState),
}

pub type EventSink = Sender<StoreEvent>;

/// Live registration; dropping it releases the listener.
pub struct Subscription {
    id: SubscriptionId,
    release: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Releases now instead of at drop.
    pub fn close(mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("live", &self.release.is_some())
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

struct Listener<Q> {
    query: Q,
    sink: EventSink,
}

type ListenerTable<Q> = BTreeMap<SubscriptionId, Listener<Q>>;

/// Listener bookkeeping shared by the backends.
pub(crate) struct Listeners<Q> {
    table: Rc<RefCell<ListenerTable<Q>>>,
}

impl<Q> Default for Listeners<Q> {
    fn default() -> Self {
        Self {
            table: Rc::new(RefCell::new(BTreeMap::new())),
        }
    }
}

impl<Q: Clone + 'static> Listeners<Q> {
    pub(crate) fn add(&self, query: Q, sink: EventSink) -> Subscription {
        let id = SubscriptionId::next();
        self.table
            .borrow_mut()
            .insert(id, Listener { query, sink });

        let weak: Weak<RefCell<ListenerTable<Q>>> = Rc::downgrade(&self.table);
        Subscription {
            id,
            release: Some(Box::new(move || {
                if let Some(table) = weak.upgrade() {
                    table.borrow_mut().remove(&id);
                    tracing::trace!(subscription = %id, "listener released");
                }
            })),
        }
    }

    /// Copies out matching listeners so no borrow is held while events are sent.
    pub(crate) fn matching(&self, filter: impl Fn(&Q) -> bool) -> Vec<(SubscriptionId, Q, EventSink)> {
        self.table
            .borrow()
            .iter()
            .filter(|(_, listener)| filter(&listener.query))
            .map(|(id, listener)| (*id, listener.query.clone(), listener.sink.clone()))
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.table.borrow().len()
    }
}

pub(crate) fn send(sink: &EventSink, event: StoreEvent) {
    if sink.send(event).is_err() {
        tracing::trace!("event receiver dropped; discarding event");
    }
}
