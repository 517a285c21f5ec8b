#![forbid(unsafe_code)]

use crate::error::BoardError;
use crate::staging::{StagedNode, StagingBuffer};
use boost_core::paths::{CollectionPath, blob_path};
use boost_core::{
    CollectionKey, DeleteEffect, FileRef, NodeBehavior, NodeDocument, NodeId, NodePayload,
    TransformEndpoint, TransformInput, TransformSet, UserId,
};
use boost_storage::{AuthState, BlobStore, DocumentStore, Fields, StoreError};
use serde_json::Value;
use std::rc::Rc;

/// Shown after a signed-out submit.
pub const LOGIN_NOTICE: &str = "Log in to save your goals";

#[derive(Clone, Debug, PartialEq)]
pub enum CreateOutcome {
    Persisted { id: NodeId, payload: NodePayload },
    Staged(StagedNode),
}

/// Routes node mutations to the store or to the staging buffer by auth state.
pub struct MutationGateway {
    store: Rc<dyn DocumentStore>,
    blobs: Rc<dyn BlobStore>,
    transforms: TransformSet,
    endpoint: Option<Rc<dyn TransformEndpoint>>,
}

impl MutationGateway {
    pub fn new(
        store: Rc<dyn DocumentStore>,
        blobs: Rc<dyn BlobStore>,
        transforms: TransformSet,
        endpoint: Option<Rc<dyn TransformEndpoint>>,
    ) -> Self {
        Self {
            store,
            blobs,
            transforms,
            endpoint,
        }
    }

    /// Trims, runs the type's transform, then caps the result.
    pub fn prepare_text(
        &self,
        key: &CollectionKey,
        type_name: &str,
        text: &str,
    ) -> Result<NodePayload, BoardError> {
        let NodePayload::Text(trimmed) = NodePayload::Text(text.to_string()).on_submit()? else {
            return Err(BoardError::InvalidPayload(boost_core::PayloadError::EmptyText));
        };
        let transformed = self.transforms.for_key(key).apply(
            TransformInput {
                type_name,
                value: &trimmed,
            },
            self.endpoint.as_deref(),
        )?;
        Ok(NodePayload::Text(transformed).on_submit()?)
    }

    /// Unconditional store create; the staging drain goes through here too.
    pub fn persist(
        &self,
        user: &UserId,
        key: &CollectionKey,
        type_name: &str,
        payload: &NodePayload,
    ) -> Result<String, BoardError> {
        let fields = document_fields(&NodeDocument::new(type_name, payload))?;
        let id = self
            .store
            .create_document(&CollectionPath::nodes(user, key), fields)
            .map_err(BoardError::Write)?;
        tracing::info!(user_id = %user, type_key = %key, node_id = %id, "node persisted");
        Ok(id)
    }

    pub fn create(
        &self,
        auth: &AuthState,
        staging: &mut StagingBuffer,
        key: &CollectionKey,
        type_name: &str,
        payload: NodePayload,
    ) -> Result<CreateOutcome, BoardError> {
        match auth.user() {
            Some(user) => {
                let id = self.persist(user, key, type_name, &payload)?;
                Ok(CreateOutcome::Persisted {
                    id: store_node_id(id)?,
                    payload,
                })
            }
            None => Ok(CreateOutcome::Staged(staging.stage(
                key.clone(),
                type_name,
                payload,
            ))),
        }
    }

    /// `payload` is the node's current content, used to release file blobs.
    pub fn delete(
        &self,
        auth: &AuthState,
        staging: &mut StagingBuffer,
        key: &CollectionKey,
        node_id: &NodeId,
        payload: Option<&NodePayload>,
    ) -> Result<(), BoardError> {
        let Some(user) = auth.user() else {
            return match staging.remove(node_id) {
                Some(_) => Ok(()),
                None => Err(BoardError::NotFound {
                    node_id: node_id.clone(),
                }),
            };
        };

        match self
            .store
            .delete_document(&CollectionPath::nodes(user, key), node_id.as_str())
        {
            Ok(()) => {}
            Err(err) if err.is_not_found() => {
                if staging.remove(node_id).is_none() {
                    return Err(BoardError::NotFound {
                        node_id: node_id.clone(),
                    });
                }
            }
            Err(err) => return Err(BoardError::Write(err)),
        }
        tracing::info!(user_id = %user, type_key = %key, node_id = %node_id, "node deleted");

        if let Some(DeleteEffect::ReleaseBlob(path)) = payload.map(|payload| payload.on_delete())
            && let Err(err) = self.blobs.delete_blob(&path)
        {
            tracing::warn!(node_id = %node_id, blob_path = %path, error = %err, "blob release failed");
        }
        Ok(())
    }

    /// Rewrites the message of an existing text node.
    pub fn update(
        &self,
        auth: &AuthState,
        staging: &mut StagingBuffer,
        key: &CollectionKey,
        type_name: &str,
        node_id: &NodeId,
        payload: NodePayload,
    ) -> Result<(), BoardError> {
        let Some(user) = auth.user() else {
            return if staging.update(node_id, payload) {
                Ok(())
            } else {
                Err(BoardError::NotFound {
                    node_id: node_id.clone(),
                })
            };
        };

        let fields = document_fields(&NodeDocument::new(type_name, &payload))?;
        match self
            .store
            .update_document(&CollectionPath::nodes(user, key), node_id.as_str(), fields)
        {
            Ok(()) => {
                tracing::info!(user_id = %user, type_key = %key, node_id = %node_id, "node updated");
                Ok(())
            }
            Err(err) if err.is_not_found() => Err(BoardError::NotFound {
                node_id: node_id.clone(),
            }),
            Err(err) => Err(BoardError::Write(err)),
        }
    }

    /// Uploads under `users/{uid}/{key}/{node_id}/{file_name}`, then creates a file node.
    pub fn upload_file(
        &self,
        auth: &AuthState,
        key: &CollectionKey,
        type_name: &str,
        node_id: &NodeId,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<(NodeId, NodePayload), BoardError> {
        let Some(user) = auth.user() else {
            return Err(BoardError::Unauthenticated);
        };

        let path = blob_path(user, key, node_id, file_name);
        let url = self
            .blobs
            .upload_blob(&path, bytes)
            .map_err(BoardError::Upload)?;
        tracing::info!(user_id = %user, type_key = %key, blob_path = %path, "file uploaded");

        let payload = NodePayload::File(FileRef {
            url,
            blob_path: Some(path.clone()),
        })
        .on_submit()?;
        match self.persist(user, key, type_name, &payload) {
            Ok(id) => Ok((store_node_id(id)?, payload)),
            Err(err) => {
                if let Err(cleanup) = self.blobs.delete_blob(&path) {
                    tracing::warn!(blob_path = %path, error = %cleanup, "orphaned blob left behind");
                }
                Err(err)
            }
        }
    }
}

fn document_fields(document: &NodeDocument) -> Result<Fields, BoardError> {
    match serde_json::to_value(document) {
        Ok(Value::Object(fields)) => Ok(fields),
        Ok(_) => Err(BoardError::Write(StoreError::InvalidInput(
            "node document must serialize to an object",
        ))),
        Err(err) => Err(BoardError::Write(StoreError::Json(err))),
    }
}

fn store_node_id(id: String) -> Result<NodeId, BoardError> {
    NodeId::try_new(id).map_err(|_| {
        BoardError::Write(StoreError::InvalidInput(
            "store returned an unusable document id",
        ))
    })
}
