use crate::community::{
    CommunityExtractor, CommunityResult, CommunityState, IncrementalUpdater, PropagationEngine,
    UpdateReport,
};
use crate::storage::{EdgeMutation, GraphStore, NodeMemory};
use rand::rngs::StdRng;
use rand::SeedableRng;
use slpa_common::config::SlpaConfig;
use slpa_common::{ChangeOutcome, ChangeRecord, MembershipMap, NodeId, Result};
use std::collections::BTreeSet;

/// Owns a graph together with its SLPA label memories and community membership.
///
/// Direct edits through [`SlpaEngine::add_edge`] / [`SlpaEngine::remove_edge`]
/// only touch adjacency; the endpoints are remembered and folded into the next
/// [`SlpaEngine::apply_changes`] (or [`SlpaEngine::refresh`]) call.
pub struct SlpaEngine {
    state: CommunityState,
    config: SlpaConfig,
    extractor: CommunityExtractor,
    updater: IncrementalUpdater,
    rng: StdRng,
    pending: BTreeSet<NodeId>,
}

impl SlpaEngine {
    /// Edgeless graph with nodes `1..=node_count` and default configuration.
    pub fn new_graph(node_count: usize) -> Self {
        Self::build(GraphStore::new(node_count), SlpaConfig::default())
    }

    pub fn with_config(graph: GraphStore, config: SlpaConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(graph, config))
    }

    fn build(graph: GraphStore, config: SlpaConfig) -> Self {
        let rng = match config.propagation.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            state: CommunityState::new(graph),
            extractor: CommunityExtractor::from_validated(config.propagation.cutoff),
            updater: IncrementalUpdater::new(config.update.clone(), &config.propagation),
            config,
            rng,
            pending: BTreeSet::new(),
        }
    }

    /// Replaces the randomness source; equal seeds give identical runs.
    pub fn reseed_rng(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    pub fn graph(&self) -> &GraphStore {
        &self.state.graph
    }

    pub fn config(&self) -> &SlpaConfig {
        &self.config
    }

    pub fn node_count(&self) -> usize {
        self.state.graph.node_count()
    }

    pub fn add_node(&mut self) -> NodeId {
        let node = self.state.graph.add_node();
        let seeded = self.state.memory.add_node();
        debug_assert_eq!(node, seeded);
        self.state.membership.insert(node, BTreeSet::from([node]));
        node
    }

    pub fn add_edge(&mut self, u: NodeId, v: NodeId) -> Result<EdgeMutation> {
        let mutation = self.state.graph.add_edge(u, v)?;
        if mutation.applied {
            self.pending.extend(mutation.affected());
        }
        Ok(mutation)
    }

    pub fn remove_edge(&mut self, u: NodeId, v: NodeId) -> Result<EdgeMutation> {
        let mutation = self.state.graph.remove_edge(u, v)?;
        self.pending.extend(mutation.affected());
        Ok(mutation)
    }

    /// Fresh SLPA run over the whole graph: `rounds` rounds, then a `cutoff` post-process.
    ///
    /// All memories are re-seeded first. The cutoff and round count become the
    /// defaults for later incremental updates.
    pub fn run_slpa(&mut self, rounds: usize, cutoff: f64) -> Result<MembershipMap> {
        let extractor = CommunityExtractor::new(cutoff)?;
        let engine = PropagationEngine::from_config(&self.config.propagation).with_rounds(rounds);

        tracing::info!(
            "Running SLPA: {} rounds, cutoff {}, {} nodes, {} edges",
            rounds,
            cutoff,
            self.state.graph.node_count(),
            self.state.graph.edge_count()
        );

        self.state.memory.reseed_all();
        engine.run_all(&self.state.graph, &mut self.state.memory, &mut self.rng)?;
        self.state.membership = extractor.extract_all(&self.state.memory);

        self.extractor = extractor;
        self.updater = self.updater.clone().with_full_rounds(rounds);
        self.pending.clear();

        Ok(self.state.membership.clone())
    }

    /// [`SlpaEngine::run_slpa`] with the configured rounds and cutoff.
    pub fn run(&mut self) -> Result<MembershipMap> {
        let rounds = self.config.propagation.rounds;
        let cutoff = self.config.propagation.cutoff;
        self.run_slpa(rounds, cutoff)
    }

    /// Applies a batch of changes; one outcome per record, in batch order.
    pub fn apply_changes(&mut self, batch: &[ChangeRecord]) -> Result<Vec<ChangeOutcome>> {
        Ok(self.apply_batch(batch)?.outcomes)
    }

    /// Like [`SlpaEngine::apply_changes`], returning the full update report.
    pub fn apply_batch(&mut self, batch: &[ChangeRecord]) -> Result<UpdateReport> {
        let report = self.updater.apply(
            &mut self.state,
            &self.extractor,
            batch,
            &self.pending,
            &mut self.rng,
        )?;
        self.pending.clear();
        Ok(report)
    }

    /// Re-derives memory and membership around edges edited directly since the last update.
    pub fn refresh(&mut self) -> Result<UpdateReport> {
        self.apply_batch(&[])
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn get_membership(&self) -> MembershipMap {
        self.state.membership.clone()
    }

    pub fn membership(&self) -> &MembershipMap {
        &self.state.membership
    }

    pub fn membership_of(&self, node: NodeId) -> Option<&BTreeSet<NodeId>> {
        self.state.membership.get(&node)
    }

    pub fn memory(&self, node: NodeId) -> Option<&NodeMemory> {
        self.state.memory.get(node)
    }

    pub fn communities(&self) -> CommunityResult {
        CommunityResult::from_membership(
            &self.state.membership,
            self.config.community.min_community_size,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slpa_common::config::RoundSemantics;
    use slpa_common::{ChangeEffect, GraphError};

    fn seeded_config(seed: u64) -> SlpaConfig {
        let mut config = SlpaConfig::default();
        config.propagation.seed = Some(seed);
        config
    }

    fn engine_with_edges(node_count: usize, edges: &[(NodeId, NodeId)], seed: u64) -> SlpaEngine {
        let graph = GraphStore::from_edges(node_count, edges).unwrap();
        SlpaEngine::with_config(graph, seeded_config(seed)).unwrap()
    }

    fn two_cliques() -> Vec<(NodeId, NodeId)> {
        let mut edges = Vec::new();
        for (lo, hi) in [(1, 5), (6, 10)] {
            for u in lo..=hi {
                for v in (u + 1)..=hi {
                    edges.push((u, v));
                }
            }
        }
        edges
    }

    #[test]
    fn test_zero_rounds_membership_is_self() {
        let mut engine = engine_with_edges(3, &[(1, 2), (2, 3)], 1);
        let membership = engine.run_slpa(0, 0.3).unwrap();
        for node in 1..=3 {
            assert_eq!(membership[&node], BTreeSet::from([node]));
        }
    }

    #[test]
    fn test_disjoint_triangles_stay_apart() {
        let edges = [(1, 2), (2, 3), (1, 3), (4, 5), (5, 6), (4, 6)];
        for rounds in [1, 5, 30] {
            let mut engine = engine_with_edges(6, &edges, rounds as u64);
            let membership = engine.run_slpa(rounds, 0.1).unwrap();
            for node in 1..=6 {
                let own_side = if node <= 3 { 1..=3 } else { 4..=6 };
                let memory = engine.memory(node).unwrap();
                assert_eq!(memory.len(), rounds + 1);
                assert!(memory.labels().iter().all(|l| own_side.contains(l)));
                assert!(membership[&node].iter().all(|l| own_side.contains(l)));
            }
        }
    }

    #[test]
    fn test_isolated_node_is_its_own_community() {
        let mut engine = engine_with_edges(4, &[(1, 2), (2, 3)], 3);
        let isolated = engine.add_node();
        let membership = engine.run_slpa(25, 0.05).unwrap();
        assert_eq!(membership[&4], BTreeSet::from([4]));
        assert_eq!(membership[&isolated], BTreeSet::from([isolated]));
        assert_eq!(engine.memory(isolated).unwrap().len(), 1);
    }

    #[test]
    fn test_run_rejects_bad_cutoff() {
        let mut engine = SlpaEngine::new_graph(3);
        assert!(matches!(engine.run_slpa(5, 1.5), Err(GraphError::InvalidConfig(_))));
    }

    #[test]
    fn test_with_config_rejects_invalid_config() {
        let mut config = SlpaConfig::default();
        config.propagation.cutoff = 0.0;
        assert!(SlpaEngine::with_config(GraphStore::new(2), config).is_err());
    }

    #[test]
    fn test_dense_cliques_find_their_communities() {
        let mut engine = engine_with_edges(10, &two_cliques(), 21);
        // five candidate labels per clique, so the most frequent one is always >= 0.2
        engine.run_slpa(40, 0.2).unwrap();
        let result = engine.communities();
        for node in 1..=10 {
            let labels = engine.membership_of(node).unwrap();
            let own_side = if node <= 5 { 1..=5 } else { 6..=10 };
            assert!(!labels.is_empty());
            assert!(labels.iter().all(|l| own_side.contains(l)));
        }
        assert!(result.num_communities >= 2);
    }

    #[test]
    fn test_apply_changes_scenarios() {
        let mut engine = engine_with_edges(10, &[(1, 2), (2, 3)], 4);
        engine.run().unwrap();
        let neighbors_before = engine.graph().neighbors(1).clone();

        let outcomes = engine.apply_changes(&[ChangeRecord::add_edge(1, 1)]).unwrap();
        assert_eq!(outcomes, vec![Err(GraphError::SelfLoop(1))]);

        let outcomes = engine.apply_changes(&[ChangeRecord::add_edge(1, 99)]).unwrap();
        assert_eq!(outcomes, vec![Err(GraphError::InvalidNode(99))]);
        assert_eq!(engine.graph().neighbors(1), &neighbors_before);
    }

    #[test]
    fn test_mixed_batch_and_membership_refresh() {
        let mut engine = engine_with_edges(4, &[(1, 2), (3, 4)], 5);
        engine.run_slpa(20, 0.3).unwrap();

        let outcomes = engine
            .apply_changes(&[
                ChangeRecord::add_node(),
                ChangeRecord::add_edge(5, 4),
                ChangeRecord::remove_edge(1, 3),
                ChangeRecord::remove_edge(1, 2),
            ])
            .unwrap();

        assert_eq!(outcomes[0], Ok(ChangeEffect::NodeAdded(5)));
        assert_eq!(outcomes[1], Ok(ChangeEffect::EdgeAdded(5, 4)));
        assert_eq!(outcomes[2], Err(GraphError::EdgeNotFound(1, 3)));
        assert_eq!(outcomes[3], Ok(ChangeEffect::EdgeRemoved(1, 2)));

        let membership = engine.get_membership();
        assert_eq!(membership.len(), 5);
        assert_eq!(membership[&1], BTreeSet::from([1]));
        assert_eq!(membership[&2], BTreeSet::from([2]));
        assert!(membership[&5].iter().all(|l| (3..=5).contains(l)));
    }

    #[test]
    fn test_direct_edits_are_folded_into_next_update() {
        let mut engine = engine_with_edges(3, &[(1, 2)], 6);
        engine.run_slpa(10, 0.3).unwrap();
        assert!(!engine.has_pending());

        engine.add_edge(2, 3).unwrap();
        assert!(engine.has_pending());
        assert_eq!(engine.membership_of(3), Some(&BTreeSet::from([3])));

        let report = engine.refresh().unwrap();
        assert_eq!(report.affected, BTreeSet::from([2, 3]));
        assert!(!engine.has_pending());
        assert_eq!(engine.memory(3).unwrap().len(), 11);
    }

    #[test]
    fn test_same_seed_same_membership() {
        let edges = two_cliques();
        for semantics in [RoundSemantics::Synchronous, RoundSemantics::Asynchronous] {
            let mut config = seeded_config(77);
            config.propagation.semantics = semantics;
            let mut a = SlpaEngine::with_config(GraphStore::from_edges(10, &edges).unwrap(), config.clone()).unwrap();
            let mut b = SlpaEngine::with_config(GraphStore::from_edges(10, &edges).unwrap(), config).unwrap();
            assert_eq!(a.run().unwrap(), b.run().unwrap());

            let batch = [ChangeRecord::add_edge(5, 6)];
            a.apply_changes(&batch).unwrap();
            b.apply_changes(&batch).unwrap();
            assert_eq!(a.get_membership(), b.get_membership());
        }
    }
}
