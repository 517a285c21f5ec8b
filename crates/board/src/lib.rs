#![forbid(unsafe_code)]

//! Live node board: one subscription per active type, optimistic edits merged with
//! snapshots, a staging buffer for signed-out users, and deterministic layout.

mod board;
mod coordinator;
mod error;
mod events;
mod gateway;
mod registry;
mod staging;

pub use board::{Board, BoardContext, Notice, PlacedNode};
pub use coordinator::ColumnPhase;
pub use error::BoardError;
pub use events::EventLog;
pub use gateway::{CreateOutcome, LOGIN_NOTICE, MutationGateway};
pub use registry::{NodeType, TypeRegistry};
pub use staging::{DrainReport, StagedNode, StagingBuffer};
