#![forbid(unsafe_code)]

use boost_core::{CollectionKey, CollectionKeyError, NodeId, PayloadError, TransformError};
use boost_storage::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum BoardError {
    #[error("subscription to {type_key} failed: {source}")]
    Subscription {
        type_key: CollectionKey,
        #[source]
        source: StoreError,
    },
    #[error("read failed: {0}")]
    Read(#[source] StoreError),
    #[error("write failed: {0}")]
    Write(#[source] StoreError),
    #[error("upload failed: {0}")]
    Upload(#[source] StoreError),
    #[error("type {key} still has persisted nodes")]
    NonEmptyCollection { key: CollectionKey },
    #[error("the default type cannot be deleted")]
    ProtectedType,
    #[error("unknown type {name:?}")]
    UnknownType { name: String },
    #[error("node {node_id} not found")]
    NotFound { node_id: NodeId },
    #[error("node {node_id} cannot be edited")]
    ReadOnlyNode { node_id: NodeId },
    #[error("invalid type name: {0}")]
    InvalidTypeName(#[from] CollectionKeyError),
    #[error("sign in required")]
    Unauthenticated,
    #[error("invalid payload: {0}")]
    InvalidPayload(#[from] PayloadError),
    #[error("transform failed: {0}")]
    Transform(#[from] TransformError),
}

impl BoardError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Subscription { .. } => "SUBSCRIPTION",
            Self::Read(_) => "READ",
            Self::Write(_) => "WRITE",
            Self::Upload(_) => "UPLOAD",
            Self::NonEmptyCollection { .. } => "NON_EMPTY_COLLECTION",
            Self::ProtectedType => "PROTECTED_TYPE",
            Self::UnknownType { .. } => "UNKNOWN_TYPE",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::ReadOnlyNode { .. } => "READ_ONLY_NODE",
            Self::InvalidTypeName(_) => "INVALID_TYPE_NAME",
            Self::Unauthenticated => "UNAUTHENTICATED",
            Self::InvalidPayload(_) => "INVALID_PAYLOAD",
            Self::Transform(_) => "TRANSFORM",
        }
    }
}
