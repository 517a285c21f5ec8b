#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use std::fmt;

const MAX_NODE_ID_LEN: usize = 256;
const MAX_USER_ID_LEN: usize = 128;
const MAX_COLLECTION_KEY_LEN: usize = 64;

/// Collection names that live beside node collections under `users/{uid}/`.
pub const RESERVED_COLLECTION_KEYS: &[&str] = &["node_types"];

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodeId(String);

impl NodeId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    pub fn try_new(value: impl Into<String>) -> Result<Self, NodeIdError> {
        let value = value.into();
        validate_node_id(&value)?;
        Ok(Self(value))
    }

    /// Client-side id for nodes that have not been persisted yet.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for NodeId {
    type Error = NodeIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::try_new(value)
    }
}

impl From<NodeId> for String {
    fn from(value: NodeId) -> Self {
        value.0
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeIdError {
    Empty,
    TooLong,
    ContainsSlash,
    ContainsControl,
}

impl NodeIdError {
    pub fn message(&self) -> &'static str {
        match self {
            Self::Empty => "node id must not be empty",
            Self::TooLong => "node id is too long",
            Self::ContainsSlash => "node id must not contain '/'",
            Self::ContainsControl => "node id contains control characters",
        }
    }
}

impl fmt::Display for NodeIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

impl std::error::Error for NodeIdError {}

fn validate_node_id(value: &str) -> Result<(), NodeIdError> {
    if value.trim().is_empty() {
        return Err(NodeIdError::Empty);
    }
    if value.len() > MAX_NODE_ID_LEN {
        return Err(NodeIdError::TooLong);
    }
    if value.contains('/') {
        return Err(NodeIdError::ContainsSlash);
    }
    if value.chars().any(|c| c.is_control()) {
        return Err(NodeIdError::ContainsControl);
    }
    Ok(())
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(String);

impl UserId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn try_new(value: impl Into<String>) -> Result<Self, UserIdError> {
        let value = value.into();
        validate_user_id(&value)?;
        Ok(Self(value))
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for UserId {
    type Error = UserIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::try_new(value)
    }
}

impl From<UserId> for String {
    fn from(value: UserId) -> Self {
        value.0
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UserIdError {
    Empty,
    TooLong,
    Reserved,
    InvalidChar { ch: char, index: usize },
}

impl UserIdError {
    pub fn message(&self) -> &'static str {
        match self {
            Self::Empty => "user id must not be empty",
            Self::TooLong => "user id is too long",
            Self::Reserved => "user id 'anonymous' is reserved",
            Self::InvalidChar { .. } => "user id contains an invalid character",
        }
    }
}

impl fmt::Display for UserIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidChar { ch, index } => {
                write!(f, "{} ({ch:?} at {index})", self.message())
            }
            _ => f.write_str(self.message()),
        }
    }
}

impl std::error::Error for UserIdError {}

fn validate_user_id(value: &str) -> Result<(), UserIdError> {
    if value.is_empty() {
        return Err(UserIdError::Empty);
    }
    if value.len() > MAX_USER_ID_LEN {
        return Err(UserIdError::TooLong);
    }
    if value == crate::analytics::ANONYMOUS_USER {
        return Err(UserIdError::Reserved);
    }
    for (index, ch) in value.chars().enumerate() {
        if ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-' | '.') {
            continue;
        }
        return Err(UserIdError::InvalidChar { ch, index });
    }
    Ok(())
}

/// Storage partition for one node type.
///
/// A key is derived from a display name once, when the type is registered, and is stored
/// next to that name from then on. Renaming a type never changes its key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CollectionKey(String);

impl CollectionKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    pub fn goals() -> Self {
        Self(crate::DEFAULT_TYPE_KEY.to_string())
    }

    pub fn is_default(&self) -> bool {
        self.0 == crate::DEFAULT_TYPE_KEY
    }

    /// Accepts an already-normalized key (as read back from storage).
    pub fn try_new(value: impl Into<String>) -> Result<Self, CollectionKeyError> {
        let value = value.into();
        validate_collection_key(&value)?;
        Ok(Self(value))
    }

    /// Lowercase, whitespace and dashes folded to `_`, other symbols dropped, pluralized.
    pub fn from_type_name(type_name: &str) -> Result<Self, CollectionKeyError> {
        if type_name.chars().any(|c| c.is_control()) {
            return Err(CollectionKeyError::ContainsControl);
        }

        let mut stem = String::with_capacity(type_name.len());
        let mut pending_sep = false;
        for ch in type_name.trim().chars().flat_map(char::to_lowercase) {
            if ch.is_ascii_alphanumeric() {
                if pending_sep && !stem.is_empty() {
                    stem.push('_');
                }
                pending_sep = false;
                stem.push(ch);
            } else if ch.is_whitespace() || matches!(ch, '_' | '-') {
                pending_sep = true;
            }
        }

        if stem.is_empty() {
            return Err(CollectionKeyError::Empty);
        }

        let key = pluralize(&stem);
        validate_collection_key(&key)?;
        Ok(Self(key))
    }
}

impl fmt::Display for CollectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for CollectionKey {
    type Error = CollectionKeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::try_new(value)
    }
}

impl From<CollectionKey> for String {
    fn from(value: CollectionKey) -> Self {
        value.0
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CollectionKeyError {
    Empty,
    TooLong,
    ContainsControl,
    InvalidChar { ch: char, index: usize },
    Reserved,
}

impl CollectionKeyError {
    pub fn message(&self) -> &'static str {
        match self {
            Self::Empty => "type name must contain at least one letter or digit",
            Self::TooLong => "type name is too long",
            Self::ContainsControl => "type name contains control characters",
            Self::InvalidChar { .. } => "collection key must match [a-z0-9_]+",
            Self::Reserved => "type name maps to a reserved collection",
        }
    }
}

impl fmt::Display for CollectionKeyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

impl std::error::Error for CollectionKeyError {}

fn validate_collection_key(value: &str) -> Result<(), CollectionKeyError> {
    if value.is_empty() {
        return Err(CollectionKeyError::Empty);
    }
    if value.len() > MAX_COLLECTION_KEY_LEN {
        return Err(CollectionKeyError::TooLong);
    }
    for (index, ch) in value.chars().enumerate() {
        if !(ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '_') {
            return Err(CollectionKeyError::InvalidChar { ch, index });
        }
    }
    if RESERVED_COLLECTION_KEYS.contains(&value) {
        return Err(CollectionKeyError::Reserved);
    }
    Ok(())
}

fn pluralize(stem: &str) -> String {
    let Some(last) = stem.chars().last() else {
        return String::new();
    };
    if !last.is_ascii_alphabetic() || last == 's' {
        return stem.to_string();
    }
    if let Some(head) = stem.strip_suffix('y')
        && head
            .chars()
            .last()
            .is_some_and(|c| c.is_ascii_alphabetic() && !matches!(c, 'a' | 'e' | 'i' | 'o' | 'u'))
    {
        return format!("{head}ies");
    }
    if stem.ends_with('x') || stem.ends_with('z') || stem.ends_with("ch") || stem.ends_with("sh") {
        return format!("{stem}es");
    }
    format!("{stem}s")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(name: &str) -> String {
        CollectionKey::from_type_name(name)
            .expect("collection key")
            .into_string()
    }

    #[test]
    fn collection_keys_are_lowercased_and_pluralized() {
        assert_eq!(key("Goal"), "goals");
        assert_eq!(key("Goals"), "goals");
        assert_eq!(key("Workout"), "workouts");
        assert_eq!(key("  Body   Weight "), "body_weights");
        assert_eq!(key("Daily-Entry"), "daily_entries");
        assert_eq!(key("Day"), "days");
        assert_eq!(key("Box"), "boxes");
        assert_eq!(key("Sketch"), "sketches");
        assert_eq!(key("Run 5k"), "run_5ks");
        assert_eq!(key("Level 2"), "level_2");
        assert_eq!(key("Café!"), "cafs");
    }

    #[test]
    fn collection_key_rejects_unusable_names() {
        assert_eq!(
            CollectionKey::from_type_name("  ").unwrap_err(),
            CollectionKeyError::Empty
        );
        assert_eq!(
            CollectionKey::from_type_name("!!!").unwrap_err(),
            CollectionKeyError::Empty
        );
        assert_eq!(
            CollectionKey::from_type_name("bad\u{0007}").unwrap_err(),
            CollectionKeyError::ContainsControl
        );
        assert_eq!(
            CollectionKey::from_type_name("Node Type").unwrap_err(),
            CollectionKeyError::Reserved
        );
        assert_eq!(
            CollectionKey::from_type_name(&"x".repeat(80)).unwrap_err(),
            CollectionKeyError::TooLong
        );
    }

    #[test]
    fn stored_keys_are_validated_without_renormalizing() {
        assert!(CollectionKey::try_new("bench_press").is_ok());
        assert!(CollectionKey::goals().is_default());
        assert_eq!(
            CollectionKey::try_new("Goals").unwrap_err(),
            CollectionKeyError::InvalidChar { ch: 'G', index: 0 }
        );
    }

    #[test]
    fn node_and_user_id_validation() {
        assert_eq!(NodeId::try_new("").unwrap_err(), NodeIdError::Empty);
        assert_eq!(
            NodeId::try_new("a/b").unwrap_err(),
            NodeIdError::ContainsSlash
        );
        assert!(NodeId::try_new("Xy12abc").is_ok());
        assert_ne!(NodeId::generate(), NodeId::generate());

        assert_eq!(UserId::try_new("").unwrap_err(), UserIdError::Empty);
        assert_eq!(
            UserId::try_new("anonymous").unwrap_err(),
            UserIdError::Reserved
        );
        assert_eq!(
            UserId::try_new("a b").unwrap_err(),
            UserIdError::InvalidChar { ch: ' ', index: 1 }
        );
        assert!(UserId::try_new("uid_42").is_ok());
    }
}
