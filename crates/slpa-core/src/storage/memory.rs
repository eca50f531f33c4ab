use rand::Rng;
use slpa_common::NodeId;
use std::collections::HashMap;

/// Label history of a single node plus its running frequency table.
///
/// `counts` always equals the multiset frequency of `labels`; both are only ever
/// changed together through [`NodeMemory::push`] and [`NodeMemory::reseed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeMemory {
    labels: Vec<NodeId>,
    counts: HashMap<NodeId, usize>,
}

impl NodeMemory {
    pub fn seeded(node: NodeId) -> Self {
        let mut counts = HashMap::new();
        counts.insert(node, 1);
        Self {
            labels: vec![node],
            counts,
        }
    }

    pub fn push(&mut self, label: NodeId) {
        self.labels.push(label);
        *self.counts.entry(label).or_default() += 1;
    }

    /// Drops all history and seeds the memory with `node` again.
    pub fn reseed(&mut self, node: NodeId) {
        *self = Self::seeded(node);
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn labels(&self) -> &[NodeId] {
        &self.labels
    }

    pub fn count(&self, label: NodeId) -> usize {
        self.counts.get(&label).copied().unwrap_or(0)
    }

    pub fn counts(&self) -> &HashMap<NodeId, usize> {
        &self.counts
    }

    /// Uniform draw over the first `visible` entries (the whole memory if `visible >= len`).
    pub fn speak<R: Rng + ?Sized>(&self, rng: &mut R, visible: usize) -> NodeId {
        let visible = visible.min(self.labels.len());
        self.labels[rng.gen_range(0..visible)]
    }
}

/// Per-node memories, indexed by the same dense handles as the graph store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    nodes: Vec<NodeMemory>,
}

impl MemoryStore {
    pub fn new(node_count: usize) -> Self {
        Self {
            nodes: (1..=node_count).map(NodeMemory::seeded).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Appends a seeded memory for the next handle and returns that handle.
    pub fn add_node(&mut self) -> NodeId {
        let node = self.nodes.len() + 1;
        self.nodes.push(NodeMemory::seeded(node));
        node
    }

    pub fn get(&self, node: NodeId) -> Option<&NodeMemory> {
        self.nodes.get(node.wrapping_sub(1))
    }

    pub(crate) fn node(&self, node: NodeId) -> &NodeMemory {
        &self.nodes[node - 1]
    }

    pub(crate) fn node_mut(&mut self, node: NodeId) -> &mut NodeMemory {
        &mut self.nodes[node - 1]
    }

    pub fn reseed(&mut self, node: NodeId) {
        self.node_mut(node).reseed(node);
    }

    pub fn reseed_all(&mut self) {
        for (idx, memory) in self.nodes.iter_mut().enumerate() {
            memory.reseed(idx + 1);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &NodeMemory)> {
        self.nodes.iter().enumerate().map(|(idx, m)| (idx + 1, m))
    }

    /// Current memory length of every node, used as the round-start snapshot.
    pub(crate) fn lengths(&self) -> Vec<usize> {
        self.nodes.iter().map(NodeMemory::len).collect()
    }
}
