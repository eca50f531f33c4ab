//! Error types shared by the graph store, propagation and update paths.

use crate::NodeId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, GraphError>;

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GraphError {
    /// Referenced identifier does not exist.
    #[error("node {0} does not exist")]
    InvalidNode(NodeId),

    /// An edge references the same node twice.
    #[error("self-loop on node {0} is not allowed")]
    SelfLoop(NodeId),

    /// Removal of an edge that is not in the graph.
    #[error("edge ({0}, {1}) not found")]
    EdgeNotFound(NodeId, NodeId),

    /// A listener was asked to pick from zero received labels. Isolated nodes are
    /// excluded from propagation, so this is an invariant violation.
    #[error("node {0} has no speakers to listen to")]
    EmptyNeighborhood(NodeId),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl GraphError {
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        GraphError::InvalidConfig(msg.into())
    }

    /// Structural errors are local to a single change record and never abort a batch.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            GraphError::InvalidNode(_) | GraphError::SelfLoop(_) | GraphError::EdgeNotFound(_, _)
        )
    }
}
