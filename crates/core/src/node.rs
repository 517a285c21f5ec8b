#![forbid(unsafe_code)]

use crate::ids::{CollectionKey, NodeId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Longest message a text node accepts; longer input is cut, not rejected.
pub const MAX_MESSAGE_CHARS: usize = 160;

/// Value of the `type` field on every persisted node document.
pub const NODE_DOCUMENT_KIND: &str = "field";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    pub url: String,
    pub blob_path: Option<String>,
}

impl FileRef {
    pub fn file_name(&self) -> &str {
        let source = self.blob_path.as_deref().unwrap_or(&self.url);
        let source = source.split(['?', '#']).next().unwrap_or(source);
        source.rsplit('/').next().unwrap_or(source)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum NodePayload {
    Text(String),
    File(FileRef),
}

impl NodePayload {
    pub fn empty() -> Self {
        Self::Text(String::new())
    }

    pub fn is_file(&self) -> bool {
        matches!(self, Self::File(_))
    }

    /// `message` as stored: the text itself, or the file's access URL.
    pub fn message(&self) -> &str {
        match self {
            Self::Text(text) => text,
            Self::File(file) => &file.url,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PayloadError {
    EmptyText,
    EmptyUrl,
}

impl PayloadError {
    pub fn message(&self) -> &'static str {
        match self {
            Self::EmptyText => "text must not be empty",
            Self::EmptyUrl => "file url must not be empty",
        }
    }
}

impl fmt::Display for PayloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

impl std::error::Error for PayloadError {}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RenderedBody {
    Input { draft: String },
    Text(String),
    Link { url: String, file_name: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderedNode {
    pub label: String,
    pub body: RenderedBody,
    pub deletable: bool,
}

/// Cleanup a front end must perform after a node is removed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeleteEffect {
    None,
    ReleaseBlob(String),
}

/// Per-kind behavior of a node payload.
pub trait NodeBehavior {
    fn render(&self, label: &str) -> RenderedNode;

    /// Normalizes the payload that is about to become submitted content.
    fn on_submit(&self) -> Result<NodePayload, PayloadError>;

    fn on_delete(&self) -> DeleteEffect;
}

impl NodeBehavior for NodePayload {
    fn render(&self, label: &str) -> RenderedNode {
        let body = match self {
            Self::Text(text) => RenderedBody::Text(text.clone()),
            Self::File(file) => RenderedBody::Link {
                url: file.url.clone(),
                file_name: file.file_name().to_string(),
            },
        };
        RenderedNode {
            label: label.to_string(),
            body,
            deletable: true,
        }
    }

    fn on_submit(&self) -> Result<NodePayload, PayloadError> {
        match self {
            Self::Text(text) => {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    return Err(PayloadError::EmptyText);
                }
                Ok(Self::Text(trimmed.chars().take(MAX_MESSAGE_CHARS).collect()))
            }
            Self::File(file) => {
                if file.url.trim().is_empty() {
                    return Err(PayloadError::EmptyUrl);
                }
                Ok(Self::File(file.clone()))
            }
        }
    }

    fn on_delete(&self) -> DeleteEffect {
        match self {
            Self::Text(_) => DeleteEffect::None,
            Self::File(file) => match &file.blob_path {
                Some(path) => DeleteEffect::ReleaseBlob(path.clone()),
                None => DeleteEffect::None,
            },
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub type_key: CollectionKey,
    pub type_name: String,
    pub payload: NodePayload,
    pub submitted: bool,
    pub created_at_ms: Option<i64>,
    /// Unsubmitted text typed into an entry node.
    pub draft: String,
}

impl Node {
    pub fn entry(type_key: CollectionKey, type_name: impl Into<String>) -> Self {
        Self {
            id: NodeId::generate(),
            type_key,
            type_name: type_name.into(),
            payload: NodePayload::empty(),
            submitted: false,
            created_at_ms: None,
            draft: String::new(),
        }
    }

    pub fn submitted(
        id: NodeId,
        type_key: CollectionKey,
        type_name: impl Into<String>,
        payload: NodePayload,
        created_at_ms: Option<i64>,
    ) -> Self {
        Self {
            id,
            type_key,
            type_name: type_name.into(),
            payload,
            submitted: true,
            created_at_ms,
            draft: String::new(),
        }
    }

    pub fn from_document(
        id: NodeId,
        type_key: CollectionKey,
        created_at_ms: i64,
        document: &NodeDocument,
    ) -> Self {
        Self::submitted(
            id,
            type_key,
            document.data.name.clone(),
            document.payload(),
            Some(created_at_ms),
        )
    }

    pub fn is_file(&self) -> bool {
        self.payload.is_file()
    }

    pub fn render(&self) -> RenderedNode {
        if self.submitted {
            self.payload.render(&self.type_name)
        } else {
            RenderedNode {
                label: self.type_name.clone(),
                body: RenderedBody::Input {
                    draft: self.draft.clone(),
                },
                deletable: false,
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeData {
    pub message: String,
    pub name: String,
    pub is_submitted: bool,
    #[serde(default)]
    pub is_file: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blob_path: Option<String>,
}

/// Persisted fields of a node document; `createdAt` is owned by the store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDocument {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: NodeData,
}

impl NodeDocument {
    pub fn new(type_name: &str, payload: &NodePayload) -> Self {
        let blob_path = match payload {
            NodePayload::File(file) => file.blob_path.clone(),
            NodePayload::Text(_) => None,
        };
        Self {
            kind: NODE_DOCUMENT_KIND.to_string(),
            data: NodeData {
                message: payload.message().to_string(),
                name: type_name.to_string(),
                is_submitted: true,
                is_file: payload.is_file(),
                blob_path,
            },
        }
    }

    pub fn payload(&self) -> NodePayload {
        if self.data.is_file {
            NodePayload::File(FileRef {
                url: self.data.message.clone(),
                blob_path: self.data.blob_path.clone(),
            })
        } else {
            NodePayload::Text(self.data.message.clone())
        }
    }
}
