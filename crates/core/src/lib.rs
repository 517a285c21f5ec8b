#![forbid(unsafe_code)]

pub mod analytics;
pub mod ids;
pub mod layout;
pub mod node;
pub mod paths;
pub mod transform;

pub use ids::{CollectionKey, CollectionKeyError, NodeId, NodeIdError, UserId, UserIdError};
pub use layout::{ColumnSlots, LayoutConfig, Position};
pub use node::{
    DeleteEffect, FileRef, Node, NodeBehavior, NodeData, NodeDocument, NodePayload, PayloadError,
    RenderedBody, RenderedNode,
};
pub use transform::{Transform, TransformEndpoint, TransformError, TransformInput, TransformSet};

pub const DEFAULT_TYPE_KEY: &str = "goals";
pub const DEFAULT_TYPE_NAME: &str = "Goal";
