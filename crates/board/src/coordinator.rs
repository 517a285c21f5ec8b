#![forbid(unsafe_code)]

use crate::error::BoardError;
use crate::registry::NodeType;
use boost_core::paths::CollectionPath;
use boost_core::{CollectionKey, Node, NodeDocument, NodeId, NodePayload, UserId};
use boost_storage::{
    CollectionQuery, Document, DocumentStore, EventSink, SnapshotEvent, Subscription,
    SubscriptionId,
};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColumnPhase {
    Unsubscribed,
    Subscribing,
    Live,
}

/// View state of one active type.
pub(crate) struct Column {
    pub(crate) key: CollectionKey,
    pub(crate) display_name: String,
    pub(crate) entry: Node,
    /// Merged list shown on the board, newest first.
    pub(crate) submitted: Vec<Node>,
    snapshot: Vec<Node>,
    /// Written but not yet seen in a snapshot, newest first.
    pending_creates: Vec<Node>,
    /// Deleted locally; confirmed once a snapshot no longer lists the id.
    pending_deletes: BTreeSet<NodeId>,
    /// Edited locally; confirmed once a snapshot carries the new payload.
    pending_updates: BTreeMap<NodeId, NodePayload>,
    phase: ColumnPhase,
    subscription: Option<Subscription>,
}

impl Column {
    fn new(node_type: &NodeType) -> Self {
        Self {
            key: node_type.key.clone(),
            display_name: node_type.display_name.clone(),
            entry: Node::entry(node_type.key.clone(), node_type.display_name.clone()),
            submitted: Vec::new(),
            snapshot: Vec::new(),
            pending_creates: Vec::new(),
            pending_deletes: BTreeSet::new(),
            pending_updates: BTreeMap::new(),
            phase: ColumnPhase::Unsubscribed,
            subscription: None,
        }
    }

    pub(crate) fn phase(&self) -> ColumnPhase {
        self.phase
    }

    pub(crate) fn fresh_entry(&mut self) {
        self.entry = Node::entry(self.key.clone(), self.display_name.clone());
    }

    pub(crate) fn node(&self, id: &NodeId) -> Option<&Node> {
        if &self.entry.id == id {
            return Some(&self.entry);
        }
        self.submitted.iter().find(|node| &node.id == id)
    }

    /// `submitted = pending_creates ++ snapshot - pending_deletes`, with pending updates
    /// laid over the result.
    fn rebuild(&mut self) {
        let pending_deletes = &self.pending_deletes;
        let pending_updates = &self.pending_updates;
        self.submitted = self
            .pending_creates
            .iter()
            .chain(self.snapshot.iter())
            .filter(|node| !pending_deletes.contains(&node.id))
            .map(|node| {
                let mut node = node.clone();
                if let Some(payload) = pending_updates.get(&node.id) {
                    node.payload = payload.clone();
                }
                node
            })
            .collect();
    }

    fn clear(&mut self) {
        self.subscription = None;
        self.snapshot.clear();
        self.pending_creates.clear();
        self.pending_deletes.clear();
        self.pending_updates.clear();
        self.phase = ColumnPhase::Unsubscribed;
        self.rebuild();
    }
}

/// One live subscription per active type, merged by type key only.
pub(crate) struct Coordinator {
    store: Rc<dyn DocumentStore>,
    sink: EventSink,
    columns: Vec<Column>,
    routes: BTreeMap<SubscriptionId, CollectionKey>,
    focus: Option<CollectionKey>,
}

impl Coordinator {
    pub(crate) fn new(store: Rc<dyn DocumentStore>, sink: EventSink) -> Self {
        Self {
            store,
            sink,
            columns: Vec::new(),
            routes: BTreeMap::new(),
            focus: None,
        }
    }

    pub(crate) fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub(crate) fn column(&self, key: &CollectionKey) -> Option<&Column> {
        self.columns.iter().find(|column| &column.key == key)
    }

    pub(crate) fn column_mut(&mut self, key: &CollectionKey) -> Option<&mut Column> {
        self.columns.iter_mut().find(|column| &column.key == key)
    }

    pub(crate) fn focus(&self) -> Option<&CollectionKey> {
        self.focus.as_ref()
    }

    pub(crate) fn set_focus(&mut self, focus: Option<CollectionKey>) {
        self.focus = focus;
    }

    /// Key of the column holding `id`, and whether `id` is its entry node.
    pub(crate) fn locate(&self, id: &NodeId) -> Option<(CollectionKey, bool)> {
        self.columns.iter().find_map(|column| {
            if &column.entry.id == id {
                Some((column.key.clone(), true))
            } else if column.submitted.iter().any(|node| &node.id == id) {
                Some((column.key.clone(), false))
            } else {
                None
            }
        })
    }

    /// Returns false when the type was already active.
    pub(crate) fn activate(&mut self, node_type: &NodeType, user: Option<&UserId>) -> bool {
        if let Some(column) = self.column_mut(&node_type.key) {
            column.display_name = node_type.display_name.clone();
            column.entry.type_name = node_type.display_name.clone();
            return false;
        }

        let column = Column::new(node_type);
        if node_type.key.is_default() {
            self.columns.insert(0, column);
        } else {
            self.columns.push(column);
        }
        tracing::info!(type_key = %node_type.key, "type activated");
        if let Some(user) = user {
            self.subscribe(&node_type.key, user);
        }
        true
    }

    pub(crate) fn deactivate(&mut self, key: &CollectionKey) -> bool {
        let Some(index) = self.columns.iter().position(|column| &column.key == key) else {
            return false;
        };
        let column = self.columns.remove(index);
        if let Some(subscription) = &column.subscription {
            self.routes.remove(&subscription.id());
        }
        if self.focus.as_ref() == Some(key) {
            self.focus = None;
        }
        tracing::info!(type_key = %key, "type deactivated");
        true
    }

    /// Releases every subscription and drops all persisted view state; resubscribes when
    /// `user` is given.
    pub(crate) fn reset(&mut self, user: Option<&UserId>) {
        self.routes.clear();
        for column in &mut self.columns {
            column.clear();
        }
        if let Some(user) = user {
            let keys: Vec<CollectionKey> = self.columns.iter().map(|c| c.key.clone()).collect();
            for key in keys {
                self.subscribe(&key, user);
            }
        }
    }

    pub(crate) fn retain(&mut self, keep: impl Fn(&CollectionKey) -> bool) {
        let dropped: Vec<CollectionKey> = self
            .columns
            .iter()
            .filter(|column| !keep(&column.key))
            .map(|column| column.key.clone())
            .collect();
        for key in dropped {
            self.deactivate(&key);
        }
    }

    pub(crate) fn shutdown(&mut self) {
        self.routes.clear();
        for column in &mut self.columns {
            if let Some(subscription) = column.subscription.take() {
                subscription.close();
            }
            column.phase = ColumnPhase::Unsubscribed;
        }
    }

    fn subscribe(&mut self, key: &CollectionKey, user: &UserId) {
        let query = CollectionQuery::newest_first(CollectionPath::nodes(user, key));
        let result = self.store.subscribe_collection(query, self.sink.clone());
        let Some(column) = self.columns.iter_mut().find(|column| &column.key == key) else {
            return;
        };
        match result {
            Ok(subscription) => {
                tracing::debug!(type_key = %key, subscription = %subscription.id(), "subscribing");
                self.routes.insert(subscription.id(), key.clone());
                column.subscription = Some(subscription);
                column.phase = ColumnPhase::Subscribing;
            }
            Err(source) => {
                let err = BoardError::Subscription {
                    type_key: key.clone(),
                    source,
                };
                tracing::error!(type_key = %key, error = %err, "subscribe failed");
                column.clear();
            }
        }
    }

    /// Merges one snapshot into its type. Returns the key, or `None` for a stale event.
    pub(crate) fn apply_snapshot(&mut self, event: SnapshotEvent) -> Option<CollectionKey> {
        let Some(key) = self.routes.get(&event.subscription).cloned() else {
            tracing::debug!(subscription = %event.subscription, path = %event.path, "stale snapshot ignored");
            return None;
        };
        let focused = self.focus.as_ref() == Some(&key);
        let Some(column) = self.columns.iter_mut().find(|column| column.key == key) else {
            self.routes.remove(&event.subscription);
            return None;
        };

        match event.result {
            Ok(docs) => {
                column.snapshot = docs
                    .iter()
                    .filter_map(|doc| node_from_document(&key, doc))
                    .collect();
                let ids: BTreeSet<&NodeId> = column.snapshot.iter().map(|node| &node.id).collect();
                column.pending_creates.retain(|node| !ids.contains(&node.id));
                column.pending_deletes.retain(|id| ids.contains(id));
                let snapshot = &column.snapshot;
                let pending_creates = &column.pending_creates;
                column.pending_updates.retain(|id, payload| {
                    match snapshot.iter().find(|node| &node.id == id) {
                        Some(node) => &node.payload != payload,
                        None => pending_creates.iter().any(|node| &node.id == id),
                    }
                });
                column.phase = ColumnPhase::Live;
                if focused {
                    column.fresh_entry();
                }
                column.rebuild();
                tracing::debug!(
                    type_key = %key,
                    snapshot = column.snapshot.len(),
                    pending_creates = column.pending_creates.len(),
                    pending_deletes = column.pending_deletes.len(),
                    pending_updates = column.pending_updates.len(),
                    "snapshot merged"
                );
            }
            Err(source) => {
                let err = BoardError::Subscription {
                    type_key: key.clone(),
                    source,
                };
                tracing::error!(type_key = %key, error = %err, "subscription broke; releasing");
                self.routes.remove(&event.subscription);
                column.clear();
            }
        }
        Some(key)
    }

    /// Shows a written node before its snapshot arrives.
    pub(crate) fn record_create(&mut self, key: &CollectionKey, node: Node) {
        if let Some(column) = self.column_mut(key) {
            column.pending_creates.insert(0, node);
            column.rebuild();
        }
    }

    /// Hides a deleted node until a snapshot stops listing it. Snapshots already in
    /// flight may still list it, including the one confirming its create.
    pub(crate) fn record_delete(&mut self, key: &CollectionKey, id: &NodeId) {
        if let Some(column) = self.column_mut(key) {
            column.pending_creates.retain(|node| &node.id != id);
            column.pending_updates.remove(id);
            column.pending_deletes.insert(id.clone());
            column.rebuild();
        }
    }

    /// Shows the new payload until a snapshot carries it.
    pub(crate) fn record_update(&mut self, key: &CollectionKey, id: &NodeId, payload: &NodePayload) {
        if let Some(column) = self.column_mut(key) {
            column.pending_updates.insert(id.clone(), payload.clone());
            column.rebuild();
        }
    }

    /// Replaces a column's content with locally owned nodes (signed-out mode).
    pub(crate) fn set_local(&mut self, key: &CollectionKey, nodes: Vec<Node>) {
        if let Some(column) = self.column_mut(key) {
            column.snapshot = nodes;
            column.pending_creates.clear();
            column.pending_deletes.clear();
            column.pending_updates.clear();
            column.rebuild();
        }
    }
}

fn node_from_document(key: &CollectionKey, doc: &Document) -> Option<Node> {
    let document: NodeDocument = match serde_json::from_value(Value::Object(doc.fields.clone())) {
        Ok(document) => document,
        Err(err) => {
            tracing::warn!(type_key = %key, doc_id = %doc.id, error = %err, "skipping malformed node");
            return None;
        }
    };
    let id = match NodeId::try_new(doc.id.clone()) {
        Ok(id) => id,
        Err(err) => {
            tracing::warn!(type_key = %key, doc_id = %doc.id, error = %err, "skipping node with bad id");
            return None;
        }
    };
    Some(Node::from_document(id, key.clone(), doc.created_at_ms, &document))
}
