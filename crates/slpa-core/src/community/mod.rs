// Community Detection Module
//
// Overlapping community detection with SLPA:
// - propagation: speaker-listener rounds over the graph
// - extractor: cutoff post-process from label history to membership
// - updater: batch graph edits with a scoped re-run over the affected frontier

mod extractor;
mod propagation;
mod result;
mod updater;

pub use extractor::CommunityExtractor;
pub use propagation::PropagationEngine;
pub use result::CommunityResult;
pub use updater::{IncrementalUpdater, UpdateReport};

use crate::storage::{GraphStore, MemoryStore};
use slpa_common::MembershipMap;
use std::collections::BTreeSet;

/// Graph, label memories and derived membership, kept in lockstep.
#[derive(Debug, Clone)]
pub struct CommunityState {
    pub graph: GraphStore,
    pub memory: MemoryStore,
    pub membership: MembershipMap,
}

impl CommunityState {
    /// Seeds every node's memory and membership with its own identity.
    pub fn new(graph: GraphStore) -> Self {
        let memory = MemoryStore::new(graph.node_count());
        let membership = graph
            .node_ids()
            .map(|node| (node, BTreeSet::from([node])))
            .collect();
        Self {
            graph,
            memory,
            membership,
        }
    }
}
