#![forbid(unsafe_code)]

use crate::error::BoardError;
use boost_core::paths::CollectionPath;
use boost_core::{CollectionKey, DEFAULT_TYPE_NAME, UserId};
use boost_storage::{CollectionQuery, Document, DocumentStore, Fields};
use serde_json::Value;
use std::rc::Rc;

const KEY_FIELD: &str = "key";
const DISPLAY_NAME_FIELD: &str = "displayName";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeType {
    pub key: CollectionKey,
    pub display_name: String,
    /// Registry document backing this type; `None` for the implicit default type and
    /// for transient types of signed-out users.
    pub registry_id: Option<String>,
}

impl NodeType {
    pub fn goals() -> Self {
        Self {
            key: CollectionKey::goals(),
            display_name: DEFAULT_TYPE_NAME.to_string(),
            registry_id: None,
        }
    }

    fn from_document(doc: &Document) -> Option<Self> {
        let key = doc.fields.get(KEY_FIELD).and_then(Value::as_str)?;
        let key = match CollectionKey::try_new(key) {
            Ok(key) => key,
            Err(err) => {
                tracing::warn!(doc_id = %doc.id, error = %err, "skipping malformed type entry");
                return None;
            }
        };
        let display_name = doc
            .fields
            .get(DISPLAY_NAME_FIELD)
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| key.as_str().to_string());
        Some(Self {
            key,
            display_name,
            registry_id: Some(doc.id.clone()),
        })
    }

    /// True when `name` is this type's display name or normalizes to its key.
    pub fn matches(&self, name: &str) -> bool {
        name_matches(&self.key, &self.display_name, name)
    }
}

pub(crate) fn name_matches(key: &CollectionKey, display_name: &str, name: &str) -> bool {
    let name = name.trim();
    if display_name.eq_ignore_ascii_case(name) || key.as_str() == name {
        return true;
    }
    CollectionKey::from_type_name(name).is_ok_and(|derived| &derived == key)
}

/// Per-user set of node types, stored under `users/{uid}/node_types`.
pub struct TypeRegistry {
    store: Rc<dyn DocumentStore>,
}

impl TypeRegistry {
    pub fn new(store: Rc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Default type first, then registration order. Signed-out users only have the default.
    pub fn list(&self, user: Option<&UserId>) -> Result<Vec<NodeType>, BoardError> {
        let mut types = vec![NodeType::goals()];
        let Some(user) = user else {
            return Ok(types);
        };

        let docs = self
            .store
            .fetch_collection(&CollectionQuery::oldest_first(CollectionPath::type_registry(user)))
            .map_err(BoardError::Read)?;
        for node_type in docs.iter().filter_map(NodeType::from_document) {
            if node_type.key.is_default() {
                types[0] = node_type;
            } else if !types.iter().any(|known| known.key == node_type.key) {
                types.push(node_type);
            }
        }
        Ok(types)
    }

    pub fn resolve(&self, user: Option<&UserId>, name: &str) -> Result<NodeType, BoardError> {
        self.list(user)?
            .into_iter()
            .find(|node_type| node_type.matches(name))
            .ok_or_else(|| BoardError::UnknownType {
                name: name.to_string(),
            })
    }

    /// Idempotent on the derived key. Signed-out callers get a transient type that is
    /// not written anywhere.
    pub fn register(&self, user: Option<&UserId>, type_name: &str) -> Result<NodeType, BoardError> {
        let key = CollectionKey::from_type_name(type_name)?;
        let display_name = type_name.trim().to_string();

        let Some(user) = user else {
            if key.is_default() {
                return Ok(NodeType::goals());
            }
            return Ok(NodeType {
                key,
                display_name,
                registry_id: None,
            });
        };

        if let Some(existing) = self
            .list(Some(user))?
            .into_iter()
            .find(|node_type| node_type.key == key)
        {
            return Ok(existing);
        }

        let id = self
            .store
            .create_document(&CollectionPath::type_registry(user), entry_fields(&key, &display_name))
            .map_err(BoardError::Write)?;
        tracing::info!(user_id = %user, type_key = %key, "type registered");
        Ok(NodeType {
            key,
            display_name,
            registry_id: Some(id),
        })
    }

    /// Removes a type whose collection holds no persisted nodes.
    pub fn delete(&self, user: Option<&UserId>, type_name: &str) -> Result<NodeType, BoardError> {
        let Some(user) = user else {
            return Err(BoardError::Unauthenticated);
        };
        let node_type = self.resolve(Some(user), type_name)?;
        if node_type.key.is_default() {
            return Err(BoardError::ProtectedType);
        }

        let nodes = self
            .store
            .fetch_collection(&CollectionQuery::newest_first(CollectionPath::nodes(
                user,
                &node_type.key,
            )))
            .map_err(BoardError::Read)?;
        if !nodes.is_empty() {
            return Err(BoardError::NonEmptyCollection {
                key: node_type.key,
            });
        }

        if let Some(id) = &node_type.registry_id {
            self.store
                .delete_document(&CollectionPath::type_registry(user), id)
                .map_err(BoardError::Write)?;
        }
        tracing::info!(user_id = %user, type_key = %node_type.key, "type deleted");
        Ok(node_type)
    }

    /// Changes the display name only; the collection key stays.
    pub fn rename(
        &self,
        user: Option<&UserId>,
        key: &CollectionKey,
        display_name: &str,
    ) -> Result<NodeType, BoardError> {
        let Some(user) = user else {
            return Err(BoardError::Unauthenticated);
        };
        let display_name = display_name.trim();
        if display_name.is_empty() {
            return Err(BoardError::InvalidTypeName(
                boost_core::CollectionKeyError::Empty,
            ));
        }

        let mut node_type = self
            .list(Some(user))?
            .into_iter()
            .find(|node_type| &node_type.key == key)
            .ok_or_else(|| BoardError::UnknownType {
                name: key.as_str().to_string(),
            })?;

        let path = CollectionPath::type_registry(user);
        match node_type.registry_id.clone() {
            Some(id) => {
                let mut fields = Fields::new();
                fields.insert(
                    DISPLAY_NAME_FIELD.to_string(),
                    Value::String(display_name.to_string()),
                );
                self.store
                    .update_document(&path, &id, fields)
                    .map_err(BoardError::Write)?;
            }
            None => {
                let id = self
                    .store
                    .create_document(&path, entry_fields(key, display_name))
                    .map_err(BoardError::Write)?;
                node_type.registry_id = Some(id);
            }
        }
        tracing::info!(user_id = %user, type_key = %key, display_name, "type renamed");
        node_type.display_name = display_name.to_string();
        Ok(node_type)
    }
}

fn entry_fields(key: &CollectionKey, display_name: &str) -> Fields {
    let mut fields = Fields::new();
    fields.insert(KEY_FIELD.to_string(), Value::String(key.as_str().to_string()));
    fields.insert(
        DISPLAY_NAME_FIELD.to_string(),
        Value::String(display_name.to_string()),
    );
    fields
}
