#![forbid(unsafe_code)]

use crate::error::BoardError;
use boost_core::{CollectionKey, NodeId, NodePayload};
use boost_storage::now_ms;
use serde::{Deserialize, Serialize};

/// A node submitted while signed out.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StagedNode {
    pub id: NodeId,
    pub type_key: CollectionKey,
    pub type_name: String,
    pub payload: NodePayload,
    pub staged_at_ms: i64,
}

/// Outcome of one drain pass.
#[derive(Debug, Default)]
pub struct DrainReport {
    /// Staged entry and the store id it was written under, in staging order.
    pub persisted: Vec<(StagedNode, String)>,
    pub failed: usize,
}

/// Ordered nodes awaiting a signed-in user.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagingBuffer {
    entries: Vec<StagedNode>,
}

impl StagingBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(
        &mut self,
        type_key: CollectionKey,
        type_name: impl Into<String>,
        payload: NodePayload,
    ) -> StagedNode {
        let staged = StagedNode {
            id: NodeId::generate(),
            type_key,
            type_name: type_name.into(),
            payload,
            staged_at_ms: now_ms(),
        };
        tracing::debug!(node_id = %staged.id, type_key = %staged.type_key, "node staged");
        self.entries.push(staged.clone());
        staged
    }

    pub fn remove(&mut self, id: &NodeId) -> Option<StagedNode> {
        let index = self.entries.iter().position(|entry| &entry.id == id)?;
        Some(self.entries.remove(index))
    }

    pub fn update(&mut self, id: &NodeId, payload: NodePayload) -> bool {
        match self.entries.iter_mut().find(|entry| &entry.id == id) {
            Some(entry) => {
                entry.payload = payload;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: &NodeId) -> Option<&StagedNode> {
        self.entries.iter().find(|entry| &entry.id == id)
    }

    /// Staging order (oldest first).
    pub fn entries(&self) -> &[StagedNode] {
        &self.entries
    }

    pub fn for_key<'a>(
        &'a self,
        key: &'a CollectionKey,
    ) -> impl DoubleEndedIterator<Item = &'a StagedNode> + 'a {
        self.entries.iter().filter(move |entry| &entry.type_key == key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Writes every entry through `persist` in staging order. Entries that fail stay
    /// staged, still in order, for the next sign-in.
    pub fn drain_with<F>(&mut self, mut persist: F) -> DrainReport
    where
        F: FnMut(&StagedNode) -> Result<String, BoardError>,
    {
        let mut report = DrainReport::default();
        let mut kept = Vec::new();
        for entry in std::mem::take(&mut self.entries) {
            match persist(&entry) {
                Ok(store_id) => report.persisted.push((entry, store_id)),
                Err(err) => {
                    tracing::warn!(node_id = %entry.id, type_key = %entry.type_key, error = %err, "staged node kept");
                    report.failed += 1;
                    kept.push(entry);
                }
            }
        }
        self.entries = kept;
        report
    }
}
