use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

pub mod config;
pub mod error;

pub use error::{GraphError, Result};

/// Dense node handle. Valid identifiers are `1..=node_count`; `0` is never a node.
pub type NodeId = usize;

/// Node -> set of community labels it belongs to.
pub type MembershipMap = BTreeMap<NodeId, BTreeSet<NodeId>>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    AddNode,
    AddEdge,
    RemoveEdge,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::AddNode => "AddNode",
            ChangeKind::AddEdge => "AddEdge",
            ChangeKind::RemoveEdge => "RemoveEdge",
        }
    }

    pub fn is_edge(&self) -> bool {
        !matches!(self, ChangeKind::AddNode)
    }
}

/// One graph mutation in an update batch. `a`/`b` are ignored for `AddNode`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChangeRecord {
    pub kind: ChangeKind,
    #[serde(default)]
    pub a: NodeId,
    #[serde(default)]
    pub b: NodeId,
}

impl ChangeRecord {
    pub fn add_node() -> Self {
        Self { kind: ChangeKind::AddNode, a: 0, b: 0 }
    }

    pub fn add_edge(a: NodeId, b: NodeId) -> Self {
        Self { kind: ChangeKind::AddEdge, a, b }
    }

    pub fn remove_edge(a: NodeId, b: NodeId) -> Self {
        Self { kind: ChangeKind::RemoveEdge, a, b }
    }
}

/// What a successfully applied change record did to the graph.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ChangeEffect {
    NodeAdded(NodeId),
    EdgeAdded(NodeId, NodeId),
    EdgeRemoved(NodeId, NodeId),
    /// The edge was already present; nothing changed.
    EdgeUnchanged(NodeId, NodeId),
}

/// Per-record result of an update batch, in batch order.
pub type ChangeOutcome = std::result::Result<ChangeEffect, GraphError>;
