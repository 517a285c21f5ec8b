#![forbid(unsafe_code)]

use crate::ids::{CollectionKey, NodeId, UserId};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const EVENTS_COLLECTION: &str = "events";
pub const TYPE_REGISTRY_COLLECTION: &str = "node_types";

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CollectionPath(String);

impl CollectionPath {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn nodes(user: &UserId, key: &CollectionKey) -> Self {
        Self(format!("users/{}/{}", user.as_str(), key.as_str()))
    }

    pub fn type_registry(user: &UserId) -> Self {
        Self(format!(
            "users/{}/{TYPE_REGISTRY_COLLECTION}",
            user.as_str()
        ))
    }

    pub fn events() -> Self {
        Self(EVENTS_COLLECTION.to_string())
    }

    pub fn starts_with(&self, prefix: &str) -> bool {
        self.0.starts_with(prefix)
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Object-storage location of an uploaded node file.
pub fn blob_path(user: &UserId, key: &CollectionKey, node: &NodeId, file_name: &str) -> String {
    let file_name = sanitize_file_name(file_name);
    format!(
        "users/{}/{}/{}/{file_name}",
        user.as_str(),
        key.as_str(),
        node.as_str()
    )
}

fn sanitize_file_name(raw: &str) -> String {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or(raw).trim();
    let cleaned: String = base
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-') {
                ch
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_matches('.');
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned.to_string()
    }
}
