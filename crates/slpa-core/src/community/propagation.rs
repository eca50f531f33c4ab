// Speaker-Listener Label Propagation
//
// Every round, each listener in the active set hears one label from each of its
// neighbors (a uniform draw from the speaker's memory) and keeps one of the
// received labels, chosen uniformly over the multiset. Runs a fixed number of
// rounds; there is no convergence test.

use crate::storage::{GraphStore, MemoryStore};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use slpa_common::config::{PropagationConfig, RoundSemantics};
use slpa_common::{GraphError, NodeId, Result};
use std::collections::BTreeSet;

const LISTENER_SEED_MIX: u64 = 0x9E37_79B9_7F4A_7C15;

#[derive(Debug, Clone)]
pub struct PropagationEngine {
    rounds: usize,
    semantics: RoundSemantics,
    parallel: bool,
}

impl PropagationEngine {
    pub fn new(rounds: usize) -> Self {
        Self {
            rounds,
            semantics: RoundSemantics::default(),
            parallel: false,
        }
    }

    pub fn from_config(config: &PropagationConfig) -> Self {
        Self {
            rounds: config.rounds,
            semantics: config.semantics,
            parallel: config.parallel,
        }
    }

    pub fn with_semantics(mut self, semantics: RoundSemantics) -> Self {
        self.semantics = semantics;
        self
    }

    /// Process the listeners of a synchronous round on the rayon pool.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_rounds(mut self, rounds: usize) -> Self {
        self.rounds = rounds;
        self
    }

    pub fn rounds(&self) -> usize {
        self.rounds
    }

    pub fn semantics(&self) -> RoundSemantics {
        self.semantics
    }

    /// Runs the configured rounds with `active` as listeners, visited in ascending order.
    ///
    /// Speakers are all graph neighbors of a listener, in or out of the active set.
    /// Isolated and unknown nodes are skipped. Returns the listeners whose memory grew.
    pub fn run<R: Rng + ?Sized>(
        &self,
        graph: &GraphStore,
        memory: &mut MemoryStore,
        active: &BTreeSet<NodeId>,
        rng: &mut R,
    ) -> Result<BTreeSet<NodeId>> {
        let listeners: Vec<NodeId> = active
            .iter()
            .copied()
            .filter(|&node| graph.contains(node) && graph.degree(node) > 0)
            .collect();

        if self.rounds == 0 || listeners.is_empty() {
            return Ok(BTreeSet::new());
        }

        tracing::debug!(
            "Propagating {} rounds over {} listeners ({:?}, parallel={})",
            self.rounds,
            listeners.len(),
            self.semantics,
            self.parallel
        );

        for _ in 0..self.rounds {
            match self.semantics {
                RoundSemantics::Asynchronous => asynchronous_round(graph, memory, &listeners, rng)?,
                RoundSemantics::Synchronous => {
                    let round_seed: u64 = rng.gen();
                    synchronous_round(graph, memory, &listeners, round_seed, self.parallel)?
                }
            }
        }

        Ok(listeners.into_iter().collect())
    }

    /// Fresh run over the whole graph.
    pub fn run_all<R: Rng + ?Sized>(
        &self,
        graph: &GraphStore,
        memory: &mut MemoryStore,
        rng: &mut R,
    ) -> Result<BTreeSet<NodeId>> {
        let active: BTreeSet<NodeId> = graph.node_ids().collect();
        self.run(graph, memory, &active, rng)
    }
}

/// Listeners read speakers' latest memory and write immediately.
fn asynchronous_round<R: Rng + ?Sized>(
    graph: &GraphStore,
    memory: &mut MemoryStore,
    listeners: &[NodeId],
    rng: &mut R,
) -> Result<()> {
    for &listener in listeners {
        let label = listen(graph, memory, listener, None, rng)?;
        memory.node_mut(listener).push(label);
    }
    Ok(())
}

/// Listeners read speakers' memory as of round start; picks are committed after the round.
///
/// Memory is append-only, so the round-start lengths are an immutable snapshot.
/// Each listener draws from its own generator derived from `round_seed`, which
/// makes the parallel and sequential paths produce identical picks.
fn synchronous_round(
    graph: &GraphStore,
    memory: &mut MemoryStore,
    listeners: &[NodeId],
    round_seed: u64,
    parallel: bool,
) -> Result<()> {
    let snapshot = memory.lengths();
    let view: &MemoryStore = memory;

    let pick = |&listener: &NodeId| -> Result<(NodeId, NodeId)> {
        let mut rng = listener_rng(round_seed, listener);
        let label = listen(graph, view, listener, Some(snapshot.as_slice()), &mut rng)?;
        Ok((listener, label))
    };

    let picks: Vec<(NodeId, NodeId)> = if parallel {
        listeners.par_iter().map(pick).collect::<Result<_>>()?
    } else {
        listeners.iter().map(pick).collect::<Result<_>>()?
    };

    for (listener, label) in picks {
        memory.node_mut(listener).push(label);
    }
    Ok(())
}

fn listen<R: Rng + ?Sized>(
    graph: &GraphStore,
    memory: &MemoryStore,
    listener: NodeId,
    snapshot: Option<&[usize]>,
    rng: &mut R,
) -> Result<NodeId> {
    let received: Vec<NodeId> = graph
        .neighbors(listener)
        .iter()
        .map(|&speaker| {
            let visible = snapshot.map_or(usize::MAX, |lengths| lengths[speaker - 1]);
            memory.node(speaker).speak(rng, visible)
        })
        .collect();

    debug_assert!(!received.is_empty(), "isolated listener {} reached listen()", listener);
    received
        .choose(rng)
        .copied()
        .ok_or(GraphError::EmptyNeighborhood(listener))
}

fn listener_rng(round_seed: u64, listener: NodeId) -> StdRng {
    StdRng::seed_from_u64(round_seed ^ (listener as u64).wrapping_mul(LISTENER_SEED_MIX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn triangles() -> GraphStore {
        GraphStore::from_edges(6, &[(1, 2), (2, 3), (1, 3), (4, 5), (5, 6), (4, 6)]).unwrap()
    }

    fn run_fresh(graph: &GraphStore, engine: &PropagationEngine, seed: u64) -> MemoryStore {
        let mut memory = MemoryStore::new(graph.node_count());
        let mut rng = StdRng::seed_from_u64(seed);
        engine.run_all(graph, &mut memory, &mut rng).unwrap();
        memory
    }

    #[test]
    fn test_memory_grows_by_one_per_round() {
        let mut graph = triangles();
        graph.add_node();
        for semantics in [RoundSemantics::Synchronous, RoundSemantics::Asynchronous] {
            let engine = PropagationEngine::new(15).with_semantics(semantics);
            let memory = run_fresh(&graph, &engine, 11);
            for (node, m) in memory.iter() {
                let expected = if graph.degree(node) > 0 { 16 } else { 1 };
                assert_eq!(m.len(), expected, "node {} under {:?}", node, semantics);
            }
        }
    }

    #[test]
    fn test_counts_match_memory_after_run() {
        let graph = GraphStore::from_edges(5, &[(1, 2), (2, 3), (3, 4), (4, 5), (5, 1), (1, 3)]).unwrap();
        let memory = run_fresh(&graph, &PropagationEngine::new(30), 5);
        for (_, m) in memory.iter() {
            let mut expected: HashMap<NodeId, usize> = HashMap::new();
            for &label in m.labels() {
                *expected.entry(label).or_default() += 1;
            }
            assert_eq!(&expected, m.counts());
        }
    }

    #[test]
    fn test_disjoint_components_never_exchange_labels() {
        let graph = triangles();
        for semantics in [RoundSemantics::Synchronous, RoundSemantics::Asynchronous] {
            let engine = PropagationEngine::new(25).with_semantics(semantics);
            let memory = run_fresh(&graph, &engine, 99);
            for (node, m) in memory.iter() {
                let side = if node <= 3 { 1..=3 } else { 4..=6 };
                assert!(m.labels().iter().all(|label| side.contains(label)));
            }
        }
    }

    #[test]
    fn test_zero_rounds_leaves_seed_only() {
        let graph = GraphStore::from_edges(3, &[(1, 2), (2, 3)]).unwrap();
        let memory = run_fresh(&graph, &PropagationEngine::new(0), 1);
        for (node, m) in memory.iter() {
            assert_eq!(m.labels(), &[node]);
        }
    }

    #[test]
    fn test_same_seed_reproduces_run() {
        let graph = triangles();
        let engine = PropagationEngine::new(20).with_semantics(RoundSemantics::Asynchronous);
        let a = run_fresh(&graph, &engine, 42);
        let b = run_fresh(&graph, &engine, 42);
        for ((_, ma), (_, mb)) in a.iter().zip(b.iter()) {
            assert_eq!(ma.labels(), mb.labels());
        }
    }

    #[test]
    fn test_parallel_matches_sequential_synchronous() {
        let graph = GraphStore::from_edges(
            8,
            &[(1, 2), (2, 3), (3, 4), (4, 1), (4, 5), (5, 6), (6, 7), (7, 8), (8, 5)],
        )
        .unwrap();
        let sequential = run_fresh(&graph, &PropagationEngine::new(20), 8);
        let parallel = run_fresh(&graph, &PropagationEngine::new(20).with_parallel(true), 8);
        for ((_, s), (_, p)) in sequential.iter().zip(parallel.iter()) {
            assert_eq!(s.labels(), p.labels());
        }
    }

    #[test]
    fn test_synchronous_first_round_hears_only_seeds() {
        // In round one every speaker's visible memory is its seed, so a leaf of a
        // star can only ever hear the hub.
        let graph = GraphStore::from_edges(4, &[(1, 2), (1, 3), (1, 4)]).unwrap();
        let memory = run_fresh(&graph, &PropagationEngine::new(1), 17);
        for leaf in 2..=4 {
            assert_eq!(memory.get(leaf).unwrap().labels(), &[leaf, 1]);
        }
        assert!((2..=4).contains(&memory.get(1).unwrap().labels()[1]));
    }

    #[test]
    fn test_scoped_run_only_touches_active_listeners() {
        let graph = GraphStore::from_edges(4, &[(1, 2), (2, 3), (3, 4)]).unwrap();
        let mut memory = MemoryStore::new(4);
        let mut rng = StdRng::seed_from_u64(2);
        let active: BTreeSet<NodeId> = [2, 3].into_iter().collect();
        let grown = PropagationEngine::new(5).run(&graph, &mut memory, &active, &mut rng).unwrap();
        assert_eq!(grown, active);
        assert_eq!(memory.get(1).unwrap().len(), 1);
        assert_eq!(memory.get(2).unwrap().len(), 6);
        assert_eq!(memory.get(4).unwrap().len(), 1);
    }
}
