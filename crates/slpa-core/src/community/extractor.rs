use crate::storage::{MemoryStore, NodeMemory};
use slpa_common::config::validate_cutoff;
use slpa_common::{MembershipMap, NodeId, Result};
use std::collections::BTreeSet;

/// Thresholds a node's label history into its (possibly overlapping) membership.
#[derive(Debug, Clone, Copy)]
pub struct CommunityExtractor {
    cutoff: f64,
}

impl CommunityExtractor {
    pub fn new(cutoff: f64) -> Result<Self> {
        validate_cutoff(cutoff)?;
        Ok(Self { cutoff })
    }

    /// For cutoffs already checked by `SlpaConfig::validate`.
    pub(crate) fn from_validated(cutoff: f64) -> Self {
        debug_assert!(validate_cutoff(cutoff).is_ok());
        Self { cutoff }
    }

    pub fn cutoff(&self) -> f64 {
        self.cutoff
    }

    /// Labels whose frequency in `memory` is at least `cutoff`.
    ///
    /// Pure query over the counts. May be empty when the history is spread over
    /// many labels; a seed-only memory always yields the node itself.
    pub fn extract(&self, memory: &NodeMemory) -> BTreeSet<NodeId> {
        let total = memory.len() as f64;

        // compare the ratio, not cutoff * len, so exact boundaries are kept
        memory
            .counts()
            .iter()
            .filter(|&(_, &count)| count as f64 / total >= self.cutoff)
            .map(|(&label, _)| label)
            .collect()
    }

    pub fn extract_all(&self, memory: &MemoryStore) -> MembershipMap {
        memory
            .iter()
            .map(|(node, m)| (node, self.extract(m)))
            .collect()
    }

    /// Recomputes membership only for `nodes`, leaving other entries untouched.
    pub fn refresh<'a>(
        &self,
        memory: &MemoryStore,
        membership: &mut MembershipMap,
        nodes: impl IntoIterator<Item = &'a NodeId>,
    ) -> usize {
        let mut refreshed = 0;
        for &node in nodes {
            if let Some(m) = memory.get(node) {
                membership.insert(node, self.extract(m));
                refreshed += 1;
            }
        }
        refreshed
    }
}
