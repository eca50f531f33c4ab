// Incremental community maintenance
//
// A batch of graph edits is applied in two passes (node creation first, then
// edge edits in batch order), collecting the endpoints of every edge that was
// actually added or removed. Those nodes lose their label history and regrow it
// through a short propagation run whose listeners are the affected nodes and
// their neighbors. Membership is re-extracted only for nodes whose memory changed.

use super::extractor::CommunityExtractor;
use super::propagation::PropagationEngine;
use super::CommunityState;
use rand::Rng;
use slpa_common::config::{PropagationConfig, UpdateConfig};
use slpa_common::{ChangeEffect, ChangeKind, ChangeOutcome, ChangeRecord, NodeId, Result};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Default)]
pub struct UpdateReport {
    /// One entry per input record, in batch order.
    pub outcomes: Vec<ChangeOutcome>,
    /// Nodes whose memory was re-seeded.
    pub affected: BTreeSet<NodeId>,
    /// Listeners of the scoped re-run (affected nodes and their neighbors).
    pub frontier: BTreeSet<NodeId>,
    /// Nodes whose membership was re-extracted.
    pub refreshed: BTreeSet<NodeId>,
    pub full_rerun: bool,
}

impl UpdateReport {
    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_err()).count()
    }
}

#[derive(Debug, Clone)]
pub struct IncrementalUpdater {
    config: UpdateConfig,
    frontier_engine: PropagationEngine,
    full_engine: PropagationEngine,
}

impl IncrementalUpdater {
    pub fn new(config: UpdateConfig, propagation: &PropagationConfig) -> Self {
        let full_engine = PropagationEngine::from_config(propagation);
        let frontier_engine = full_engine.clone().with_rounds(config.rounds);
        Self {
            config,
            frontier_engine,
            full_engine,
        }
    }

    /// Rounds used when a batch falls back to a full re-run.
    pub fn with_full_rounds(mut self, rounds: usize) -> Self {
        self.full_engine = self.full_engine.with_rounds(rounds);
        self
    }

    /// Applies `batch` and restores membership for the touched region.
    ///
    /// `pending` carries nodes already made stale by edits applied outside a batch;
    /// they are treated exactly like endpoints of edges in this batch. Structural
    /// failures are reported per record and never abort the batch.
    pub fn apply<R: Rng + ?Sized>(
        &self,
        state: &mut CommunityState,
        extractor: &CommunityExtractor,
        batch: &[ChangeRecord],
        pending: &BTreeSet<NodeId>,
        rng: &mut R,
    ) -> Result<UpdateReport> {
        let mut report = UpdateReport::default();

        // Pass 1: every AddNode record gets the next dense handle, in batch order.
        let first_new = state.graph.node_count() + 1;
        let new_count = batch.iter().filter(|r| r.kind == ChangeKind::AddNode).count();
        for _ in 0..new_count {
            state.graph.add_node();
            state.memory.add_node();
        }
        let new_nodes: BTreeSet<NodeId> = (first_new..first_new + new_count).collect();

        // Pass 2: edge edits in batch order, outcomes in record order.
        let mut affected: BTreeSet<NodeId> = pending
            .iter()
            .copied()
            .filter(|&node| state.graph.contains(node))
            .collect();
        let mut next_new = first_new;
        for record in batch {
            let outcome = match record.kind {
                ChangeKind::AddNode => {
                    let node = next_new;
                    next_new += 1;
                    Ok(ChangeEffect::NodeAdded(node))
                }
                ChangeKind::AddEdge => state.graph.add_edge(record.a, record.b).map(|m| {
                    if m.applied {
                        affected.extend(m.affected());
                        ChangeEffect::EdgeAdded(record.a, record.b)
                    } else {
                        ChangeEffect::EdgeUnchanged(record.a, record.b)
                    }
                }),
                ChangeKind::RemoveEdge => state.graph.remove_edge(record.a, record.b).map(|m| {
                    affected.extend(m.affected());
                    ChangeEffect::EdgeRemoved(record.a, record.b)
                }),
            };
            if let Err(e) = &outcome {
                tracing::warn!("Skipping change {:?}: {}", record, e);
            }
            report.outcomes.push(outcome);
        }

        if self.config.expand_communities && !affected.is_empty() {
            let before = affected.len();
            expand_to_communities(state, &mut affected);
            tracing::debug!("Community expansion grew affected set {} -> {}", before, affected.len());
        }

        if let Some(fraction) = self.config.full_rerun_fraction {
            if affected.len() as f64 > fraction * state.graph.node_count() as f64 {
                tracing::info!(
                    "{} of {} nodes affected, falling back to full re-run",
                    affected.len(),
                    state.graph.node_count()
                );
                state.memory.reseed_all();
                self.full_engine.run_all(&state.graph, &mut state.memory, rng)?;
                state.membership = extractor.extract_all(&state.memory);

                report.frontier = state.graph.node_ids().collect();
                report.refreshed = report.frontier.clone();
                report.affected = affected;
                report.full_rerun = true;
                return Ok(report);
            }
        }

        for &node in &affected {
            state.memory.reseed(node);
        }

        let mut frontier = affected.clone();
        for &node in &affected {
            frontier.extend(state.graph.neighbors(node).iter().copied());
        }

        let grown = self
            .frontier_engine
            .run(&state.graph, &mut state.memory, &frontier, rng)?;

        let mut refreshed: BTreeSet<NodeId> = affected.union(&grown).copied().collect();
        refreshed.extend(new_nodes.iter().copied());
        extractor.refresh(&state.memory, &mut state.membership, &refreshed);

        tracing::info!(
            "Applied {} changes ({} failed): {} affected, {} in frontier, {} memberships refreshed",
            batch.len(),
            report.failed(),
            affected.len(),
            frontier.len(),
            refreshed.len()
        );

        report.affected = affected;
        report.frontier = frontier;
        report.refreshed = refreshed;
        Ok(report)
    }
}

/// Adds every node that shares a current community label with an affected node.
fn expand_to_communities(state: &CommunityState, affected: &mut BTreeSet<NodeId>) {
    let labels: BTreeSet<NodeId> = affected
        .iter()
        .filter_map(|node| state.membership.get(node))
        .flatten()
        .copied()
        .collect();

    for (&node, node_labels) in &state.membership {
        if !node_labels.is_disjoint(&labels) {
            affected.insert(node);
        }
    }
}
