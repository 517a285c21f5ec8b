#![forbid(unsafe_code)]

use crate::coordinator::{Column, ColumnPhase, Coordinator};
use crate::error::BoardError;
use crate::events::EventLog;
use crate::gateway::{CreateOutcome, LOGIN_NOTICE, MutationGateway};
use crate::registry::{NodeType, TypeRegistry, name_matches};
use crate::staging::StagingBuffer;
use boost_core::analytics::EventKind;
use boost_core::layout::{self, ColumnSlots, LayoutConfig, Position};
use boost_core::{CollectionKey, Node, NodeId, TransformEndpoint, TransformSet, UserId};
use boost_storage::{
    AuthProvider, AuthState, BlobStore, DocumentStore, StoreEvent, Subscription,
};
use serde_json::json;
use std::collections::BTreeMap;
use std::iter;
use std::rc::Rc;
use std::sync::mpsc::{Receiver, channel};

const DEFAULT_VIEWPORT_WIDTH: f64 = 1280.0;

/// Collaborators handed to a board at construction.
#[derive(Clone)]
pub struct BoardContext {
    pub store: Rc<dyn DocumentStore>,
    pub blobs: Rc<dyn BlobStore>,
    pub auth: Rc<dyn AuthProvider>,
    pub layout: LayoutConfig,
    pub transforms: TransformSet,
    pub endpoint: Option<Rc<dyn TransformEndpoint>>,
    pub viewport_width: f64,
    pub record_events: bool,
}

impl BoardContext {
    pub fn new(
        store: Rc<dyn DocumentStore>,
        blobs: Rc<dyn BlobStore>,
        auth: Rc<dyn AuthProvider>,
    ) -> Self {
        Self {
            store,
            blobs,
            auth,
            layout: LayoutConfig::default(),
            transforms: TransformSet::default(),
            endpoint: None,
            viewport_width: DEFAULT_VIEWPORT_WIDTH,
            record_events: true,
        }
    }

    pub fn with_layout(mut self, layout: LayoutConfig) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_transforms(mut self, transforms: TransformSet) -> Self {
        self.transforms = transforms;
        self
    }

    pub fn with_endpoint(mut self, endpoint: Rc<dyn TransformEndpoint>) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    pub fn with_viewport_width(mut self, width: f64) -> Self {
        self.viewport_width = width;
        self
    }

    pub fn without_events(mut self) -> Self {
        self.record_events = false;
        self
    }
}

/// Transient user-visible message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Notice {
    LoginToSave,
    StagedSaved { count: usize },
    StagedKept { count: usize },
}

impl Notice {
    pub fn message(&self) -> String {
        match self {
            Self::LoginToSave => LOGIN_NOTICE.to_string(),
            Self::StagedSaved { count } => format!("Saved {count} staged node(s)"),
            Self::StagedKept { count } => {
                format!("{count} staged node(s) could not be saved; they will be retried at next login")
            }
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct PlacedNode<'a> {
    pub node: &'a Node,
    pub position: Position,
    /// Position comes from a manual move rather than the layout.
    pub moved: bool,
}

/// The canvas: active type columns, their nodes and where they go.
pub struct Board {
    auth: Rc<dyn AuthProvider>,
    layout: LayoutConfig,
    viewport_width: f64,
    registry: TypeRegistry,
    gateway: MutationGateway,
    events: EventLog,
    coordinator: Coordinator,
    staging: StagingBuffer,
    auth_state: AuthState,
    receiver: Receiver<StoreEvent>,
    overrides: BTreeMap<NodeId, Position>,
    notices: Vec<Notice>,
    _auth_subscription: Subscription,
}

impl Board {
    pub fn new(context: BoardContext) -> Self {
        Self::with_staging(context, StagingBuffer::new())
    }

    /// Starts from a previously saved staging buffer.
    pub fn with_staging(context: BoardContext, staging: StagingBuffer) -> Self {
        let (sender, receiver) = channel();
        let auth_subscription = context.auth.subscribe(sender.clone());
        let auth_state = context.auth.state();
        let events = if context.record_events {
            EventLog::new(context.store.clone())
        } else {
            EventLog::disabled(context.store.clone())
        };

        let mut board = Self {
            auth: context.auth.clone(),
            layout: context.layout,
            viewport_width: context.viewport_width,
            registry: TypeRegistry::new(context.store.clone()),
            gateway: MutationGateway::new(
                context.store.clone(),
                context.blobs.clone(),
                context.transforms,
                context.endpoint,
            ),
            events,
            coordinator: Coordinator::new(context.store, sender),
            staging,
            auth_state,
            receiver,
            overrides: BTreeMap::new(),
            notices: Vec::new(),
            _auth_subscription: auth_subscription,
        };
        board.load_types();
        board.sync_staged();
        board.events.record(
            board.auth_state.user(),
            EventKind::SessionStart,
            json!({}),
        );
        tracing::info!(
            session_id = board.events.session_id(),
            authenticated = board.auth_state.is_authenticated(),
            staged = board.staging.len(),
            "board opened"
        );
        board
    }

    pub fn auth_state(&self) -> &AuthState {
        &self.auth_state
    }

    pub fn staging(&self) -> &StagingBuffer {
        &self.staging
    }

    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    /// Handles every queued store and auth event. Returns how many were handled.
    pub fn pump(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.receiver.try_recv() {
            handled += 1;
            match event {
                StoreEvent::Snapshot(snapshot) => {
                    self.coordinator.apply_snapshot(snapshot);
                }
                StoreEvent::Auth(state) => self.on_auth_change(state),
            }
        }
        handled
    }

    /// Re-reads the provider's state; useful when the provider was changed without
    /// events reaching this board.
    pub fn refresh_auth(&mut self) {
        let state = self.auth.state();
        self.on_auth_change(state);
    }

    fn on_auth_change(&mut self, state: AuthState) {
        if state == self.auth_state {
            return;
        }
        let previous = std::mem::replace(&mut self.auth_state, state.clone());
        match (previous.user(), state.user()) {
            (None, Some(user)) => self.on_login(user.clone()),
            (Some(user), None) => self.on_logout(user.clone()),
            (Some(_), Some(user)) => {
                tracing::info!(user_id = %user, "account switched");
                self.coordinator.retain(CollectionKey::is_default);
                self.coordinator.reset(Some(user));
                self.load_types();
            }
            (None, None) => {}
        }
    }

    fn on_login(&mut self, user: UserId) {
        tracing::info!(user_id = %user, staged = self.staging.len(), "login transition");
        self.events
            .record(Some(&user), EventKind::LoginSuccess, json!({}));

        let transient: Vec<String> = self
            .coordinator
            .columns()
            .iter()
            .filter(|column| !column.key.is_default())
            .map(|column| column.display_name.clone())
            .collect();
        for type_name in transient {
            if let Err(err) = self.registry.register(Some(&user), &type_name) {
                tracing::warn!(user_id = %user, type_name = %type_name, error = %err, "transient type not registered");
            }
        }

        self.coordinator.reset(Some(&user));
        self.load_types();
        self.drain_staging(&user);
    }

    fn on_logout(&mut self, user: UserId) {
        tracing::info!(user_id = %user, "logout transition");
        self.events
            .record(Some(&user), EventKind::LogoutSuccess, json!({}));
        self.coordinator.retain(CollectionKey::is_default);
        self.coordinator.reset(None);
        self.sync_staged();
    }

    /// Runs once per signed-out to signed-in transition.
    fn drain_staging(&mut self, user: &UserId) {
        if self.staging.is_empty() {
            return;
        }
        let gateway = &self.gateway;
        let report = self.staging.drain_with(|entry| {
            gateway.persist(user, &entry.type_key, &entry.type_name, &entry.payload)
        });

        let saved = report.persisted.len();
        for (entry, store_id) in report.persisted {
            let id = match NodeId::try_new(store_id) {
                Ok(id) => id,
                Err(err) => {
                    tracing::warn!(node_id = %entry.id, error = %err, "drained node has unusable id");
                    continue;
                }
            };
            if let Some(position) = self.overrides.remove(&entry.id) {
                self.overrides.insert(id.clone(), position);
            }
            self.coordinator.record_create(
                &entry.type_key,
                Node::submitted(id, entry.type_key.clone(), entry.type_name, entry.payload, None),
            );
        }
        tracing::info!(user_id = %user, saved, failed = report.failed, "staging drained");
        if saved > 0 {
            self.notices.push(Notice::StagedSaved { count: saved });
        }
        if report.failed > 0 {
            self.notices.push(Notice::StagedKept {
                count: report.failed,
            });
        }
    }

    fn load_types(&mut self) {
        let user = self.auth_state.user();
        let types = match self.registry.list(user) {
            Ok(types) => types,
            Err(err) => {
                tracing::error!(error = %err, "type registry unavailable; showing the default type");
                vec![NodeType::goals()]
            }
        };
        for node_type in &types {
            self.coordinator.activate(node_type, user);
        }
    }

    /// Mirrors the staging buffer into the columns while signed out.
    fn sync_staged(&mut self) {
        if self.auth_state.is_authenticated() {
            return;
        }
        for entry in self.staging.entries() {
            if self.coordinator.column(&entry.type_key).is_none() {
                let node_type = NodeType {
                    key: entry.type_key.clone(),
                    display_name: entry.type_name.clone(),
                    registry_id: None,
                };
                self.coordinator.activate(&node_type, None);
            }
        }

        let keys: Vec<CollectionKey> = self
            .coordinator
            .columns()
            .iter()
            .map(|column| column.key.clone())
            .collect();
        for key in keys {
            let nodes: Vec<Node> = self
                .staging
                .for_key(&key)
                .rev()
                .map(|entry| {
                    Node::submitted(
                        entry.id.clone(),
                        key.clone(),
                        entry.type_name.clone(),
                        entry.payload.clone(),
                        Some(entry.staged_at_ms),
                    )
                })
                .collect();
            self.coordinator.set_local(&key, nodes);
        }
    }

    /// Active types in column order.
    pub fn active_types(&self) -> Vec<NodeType> {
        self.coordinator
            .columns()
            .iter()
            .map(|column| NodeType {
                key: column.key.clone(),
                display_name: column.display_name.clone(),
                registry_id: None,
            })
            .collect()
    }

    /// Registered types of the current user (default type only when signed out).
    pub fn registered_types(&self) -> Result<Vec<NodeType>, BoardError> {
        self.registry.list(self.auth_state.user())
    }

    /// Key of the active type named `name` (display name, key, or a name deriving to it).
    pub fn resolve_type(&self, name: &str) -> Result<CollectionKey, BoardError> {
        self.coordinator
            .columns()
            .iter()
            .find(|column| name_matches(&column.key, &column.display_name, name))
            .map(|column| column.key.clone())
            .ok_or_else(|| BoardError::UnknownType {
                name: name.to_string(),
            })
    }

    pub fn column_phase(&self, key: &CollectionKey) -> Option<ColumnPhase> {
        self.coordinator.column(key).map(Column::phase)
    }

    pub fn entry_node(&self, key: &CollectionKey) -> Option<&Node> {
        self.coordinator.column(key).map(|column| &column.entry)
    }

    /// Submitted nodes of one type, newest first.
    pub fn submitted_nodes(&self, key: &CollectionKey) -> Option<&[Node]> {
        self.coordinator
            .column(key)
            .map(|column| column.submitted.as_slice())
    }

    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        let (key, _) = self.coordinator.locate(id)?;
        self.coordinator.column(&key)?.node(id)
    }

    pub fn activate_type(&mut self, name: &str) -> Result<CollectionKey, BoardError> {
        if let Ok(key) = self.resolve_type(name) {
            return Ok(key);
        }
        let node_type = self.registry.resolve(self.auth_state.user(), name)?;
        self.coordinator
            .activate(&node_type, self.auth_state.user());
        self.sync_staged();
        Ok(node_type.key)
    }

    /// Closes the type's subscription and drops its column.
    pub fn deactivate_type(&mut self, key: &CollectionKey) -> bool {
        let removed = self.coordinator.deactivate(key);
        if removed {
            self.prune_overrides();
        }
        removed
    }

    /// Restricts the board to one type; `None` shows every active type.
    pub fn set_filter(&mut self, name: Option<&str>) -> Result<(), BoardError> {
        let focus = name.map(|name| self.resolve_type(name)).transpose()?;
        self.coordinator.set_focus(focus);
        Ok(())
    }

    pub fn filter(&self) -> Option<&CollectionKey> {
        self.coordinator.focus()
    }

    pub fn resize(&mut self, viewport_width: f64) {
        self.viewport_width = viewport_width;
    }

    pub fn set_draft(&mut self, key: &CollectionKey, text: &str) -> Result<(), BoardError> {
        let column = self
            .coordinator
            .column_mut(key)
            .ok_or_else(|| unknown_type(key))?;
        column.entry.draft = text.to_string();
        Ok(())
    }

    /// Submits the entry node's draft.
    pub fn submit_draft(&mut self, key: &CollectionKey) -> Result<NodeId, BoardError> {
        let draft = self
            .entry_node(key)
            .map(|entry| entry.draft.clone())
            .ok_or_else(|| unknown_type(key))?;
        self.submit(key, &draft)
    }

    pub fn submit(&mut self, key: &CollectionKey, text: &str) -> Result<NodeId, BoardError> {
        let type_name = self
            .coordinator
            .column(key)
            .map(|column| column.display_name.clone())
            .ok_or_else(|| unknown_type(key))?;

        let payload = self.gateway.prepare_text(key, &type_name, text)?;
        let outcome = self
            .gateway
            .create(&self.auth_state, &mut self.staging, key, &type_name, payload)
            .inspect_err(|err| {
                tracing::error!(type_key = %key, error = %err, "submit failed");
            })?;

        let id = match outcome {
            CreateOutcome::Persisted { id, payload } => {
                self.coordinator.record_create(
                    key,
                    Node::submitted(id.clone(), key.clone(), type_name, payload, None),
                );
                id
            }
            CreateOutcome::Staged(staged) => {
                self.notices.push(Notice::LoginToSave);
                self.sync_staged();
                staged.id
            }
        };
        if let Some(column) = self.coordinator.column_mut(key) {
            column.fresh_entry();
        }
        self.events.record(
            self.auth_state.user(),
            EventKind::NodeSubmit,
            json!({"type": key.as_str(), "nodeId": id.as_str(), "isFile": false}),
        );
        Ok(id)
    }

    /// Uploads `bytes` for the type's entry node and submits it as a file node.
    pub fn submit_file(
        &mut self,
        key: &CollectionKey,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<NodeId, BoardError> {
        let (type_name, entry_id) = self
            .coordinator
            .column(key)
            .map(|column| (column.display_name.clone(), column.entry.id.clone()))
            .ok_or_else(|| unknown_type(key))?;

        let (id, payload) = self
            .gateway
            .upload_file(&self.auth_state, key, &type_name, &entry_id, file_name, bytes)
            .inspect_err(|err| {
                tracing::error!(type_key = %key, error = %err, "file submit failed");
            })?;
        self.coordinator.record_create(
            key,
            Node::submitted(id.clone(), key.clone(), type_name, payload, None),
        );
        if let Some(column) = self.coordinator.column_mut(key) {
            column.fresh_entry();
        }
        self.events.record(
            self.auth_state.user(),
            EventKind::NodeSubmit,
            json!({"type": key.as_str(), "nodeId": id.as_str(), "isFile": true}),
        );
        Ok(id)
    }

    /// Deletes a submitted node. A node the store no longer has counts as deleted.
    pub fn delete_node(&mut self, id: &NodeId) -> Result<(), BoardError> {
        let (key, payload) = self.submitted_node(id)?;

        match self.gateway.delete(
            &self.auth_state,
            &mut self.staging,
            &key,
            id,
            Some(&payload),
        ) {
            Ok(()) => {}
            Err(BoardError::NotFound { .. }) => {
                tracing::debug!(type_key = %key, node_id = %id, "node already gone");
            }
            Err(err) => {
                tracing::error!(type_key = %key, node_id = %id, error = %err, "delete failed");
                return Err(err);
            }
        }

        if self.auth_state.is_authenticated() {
            self.coordinator.record_delete(&key, id);
        } else {
            self.sync_staged();
        }
        self.overrides.remove(id);
        self.events.record(
            self.auth_state.user(),
            EventKind::NodeDelete,
            json!({"type": key.as_str(), "nodeId": id.as_str()}),
        );
        Ok(())
    }

    /// Replaces the text of a submitted text node.
    pub fn edit_node(&mut self, id: &NodeId, text: &str) -> Result<(), BoardError> {
        let (key, current) = self.submitted_node(id)?;
        if current.is_file() {
            return Err(BoardError::ReadOnlyNode { node_id: id.clone() });
        }
        let type_name = self
            .node(id)
            .map(|node| node.type_name.clone())
            .unwrap_or_default();

        let payload = self.gateway.prepare_text(&key, &type_name, text)?;
        self.gateway
            .update(
                &self.auth_state,
                &mut self.staging,
                &key,
                &type_name,
                id,
                payload.clone(),
            )
            .inspect_err(|err| {
                tracing::error!(type_key = %key, node_id = %id, error = %err, "edit failed");
            })?;

        if self.auth_state.is_authenticated() {
            self.coordinator.record_update(&key, id, &payload);
        } else {
            self.sync_staged();
        }
        Ok(())
    }

    /// Pins a node at `position` until the board is rebuilt.
    pub fn move_node(&mut self, id: &NodeId, position: Position) -> Result<(), BoardError> {
        let (key, _) = self
            .coordinator
            .locate(id)
            .ok_or_else(|| BoardError::NotFound { node_id: id.clone() })?;
        self.overrides.insert(id.clone(), position);
        self.events.record(
            self.auth_state.user(),
            EventKind::NodeMove,
            json!({"type": key.as_str(), "nodeId": id.as_str(), "x": position.x, "y": position.y}),
        );
        Ok(())
    }

    /// Registers (or, signed out, transiently adds) a type and activates it.
    pub fn define_type(&mut self, type_name: &str) -> Result<CollectionKey, BoardError> {
        let node_type = self
            .registry
            .register(self.auth_state.user(), type_name)
            .inspect_err(|err| {
                tracing::warn!(type_name, error = %err, "type not defined");
            })?;
        self.coordinator
            .activate(&node_type, self.auth_state.user());
        self.sync_staged();
        self.events.record(
            self.auth_state.user(),
            EventKind::TypeCreated,
            json!({"type": node_type.key.as_str(), "name": node_type.display_name}),
        );
        Ok(node_type.key)
    }

    /// Refused for the default type and for types that still hold nodes.
    pub fn delete_type(&mut self, type_name: &str) -> Result<(), BoardError> {
        let key = match self.auth_state.user().cloned() {
            Some(user) => self.registry.delete(Some(&user), type_name)?.key,
            None => {
                let key = self.resolve_type(type_name)?;
                if key.is_default() {
                    return Err(BoardError::ProtectedType);
                }
                if self.staging.for_key(&key).next().is_some() {
                    return Err(BoardError::NonEmptyCollection { key });
                }
                key
            }
        };
        self.deactivate_type(&key);
        self.events.record(
            self.auth_state.user(),
            EventKind::TypeDeleted,
            json!({"type": key.as_str()}),
        );
        Ok(())
    }

    /// Changes a type's display name; its key and nodes stay.
    pub fn rename_type(&mut self, key: &CollectionKey, display_name: &str) -> Result<(), BoardError> {
        let node_type = self
            .registry
            .rename(self.auth_state.user(), key, display_name)?;
        if self.coordinator.column(key).is_some() {
            self.coordinator
                .activate(&node_type, self.auth_state.user());
        }
        Ok(())
    }

    /// Every visible node with its canvas position, column by column, entry first.
    pub fn nodes(&self) -> Vec<PlacedNode<'_>> {
        let focus = self.coordinator.focus();
        let visible: Vec<&Column> = self
            .coordinator
            .columns()
            .iter()
            .filter(|column| focus.is_none_or(|key| key == &column.key))
            .collect();
        let slots: Vec<ColumnSlots<'_>> = visible
            .iter()
            .map(|column| ColumnSlots {
                entry: &column.entry.id,
                submitted: column.submitted.iter().map(|node| &node.id).collect(),
            })
            .collect();
        let positions = layout::compute(&self.layout, self.viewport_width, &slots);

        visible
            .iter()
            .flat_map(|column| iter::once(&column.entry).chain(column.submitted.iter()))
            .zip(positions)
            .map(|(node, (_, computed))| match self.overrides.get(&node.id) {
                Some(position) => PlacedNode {
                    node,
                    position: *position,
                    moved: true,
                },
                None => PlacedNode {
                    node,
                    position: computed,
                    moved: false,
                },
            })
            .collect()
    }

    /// Releases every subscription. The board stays usable but receives no snapshots.
    pub fn shutdown(&mut self) {
        self.coordinator.shutdown();
    }

    fn submitted_node(&self, id: &NodeId) -> Result<(CollectionKey, boost_core::NodePayload), BoardError> {
        let not_found = || BoardError::NotFound { node_id: id.clone() };
        let (key, is_entry) = self.coordinator.locate(id).ok_or_else(not_found)?;
        if is_entry {
            return Err(BoardError::ReadOnlyNode { node_id: id.clone() });
        }
        let payload = self
            .coordinator
            .column(&key)
            .and_then(|column| column.node(id))
            .map(|node| node.payload.clone())
            .ok_or_else(not_found)?;
        Ok((key, payload))
    }

    fn prune_overrides(&mut self) {
        let coordinator = &self.coordinator;
        self.overrides.retain(|id, _| coordinator.locate(id).is_some());
    }
}

impl Drop for Board {
    fn drop(&mut self) {
        self.coordinator.shutdown();
        self.events
            .record(self.auth_state.user(), EventKind::SessionEnd, json!({}));
        tracing::debug!(session_id = self.events.session_id(), "board closed");
    }
}

fn unknown_type(key: &CollectionKey) -> BoardError {
    BoardError::UnknownType {
        name: key.as_str().to_string(),
    }
}
