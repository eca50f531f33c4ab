use petgraph::graph::{NodeIndex, UnGraph};
use slpa_common::{GraphError, NodeId, Result};
use std::collections::BTreeSet;

/// Result of an edge mutation: both endpoints, and whether adjacency actually changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeMutation {
    pub endpoints: (NodeId, NodeId),
    pub applied: bool,
}

impl EdgeMutation {
    pub fn affected(&self) -> [NodeId; 2] {
        [self.endpoints.0, self.endpoints.1]
    }
}

/// Undirected, unweighted adjacency over dense node handles `1..=node_count`.
///
/// Slot `i` of the arena holds the neighbor set of node `i + 1`. Nodes are never
/// removed, so handles stay valid for the lifetime of the store.
#[derive(Debug, Clone, Default)]
pub struct GraphStore {
    adjacency: Vec<BTreeSet<NodeId>>,
    edge_count: usize,
}

impl GraphStore {
    pub fn new(node_count: usize) -> Self {
        Self {
            adjacency: vec![BTreeSet::new(); node_count],
            edge_count: 0,
        }
    }

    /// Builds a store from an edge list, failing on the first invalid edge.
    pub fn from_edges(node_count: usize, edges: &[(NodeId, NodeId)]) -> Result<Self> {
        let mut graph = Self::new(node_count);
        for &(u, v) in edges {
            graph.add_edge(u, v)?;
        }
        Ok(graph)
    }

    pub fn node_count(&self) -> usize {
        self.adjacency.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    pub fn contains(&self, node: NodeId) -> bool {
        node >= 1 && node <= self.adjacency.len()
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        1..=self.adjacency.len()
    }

    pub fn add_node(&mut self) -> NodeId {
        self.adjacency.push(BTreeSet::new());
        self.adjacency.len()
    }

    pub fn add_edge(&mut self, u: NodeId, v: NodeId) -> Result<EdgeMutation> {
        self.check_endpoints(u, v)?;

        let inserted = self.adjacency[u - 1].insert(v);
        if inserted {
            self.adjacency[v - 1].insert(u);
            self.edge_count += 1;
        }

        Ok(EdgeMutation {
            endpoints: (u, v),
            applied: inserted,
        })
    }

    pub fn remove_edge(&mut self, u: NodeId, v: NodeId) -> Result<EdgeMutation> {
        self.check_endpoints(u, v)?;

        if !self.adjacency[u - 1].remove(&v) {
            return Err(GraphError::EdgeNotFound(u, v));
        }
        self.adjacency[v - 1].remove(&u);
        self.edge_count -= 1;

        Ok(EdgeMutation {
            endpoints: (u, v),
            applied: true,
        })
    }

    pub fn has_edge(&self, u: NodeId, v: NodeId) -> bool {
        self.contains(u) && self.adjacency[u - 1].contains(&v)
    }

    /// Neighbor set of `node`. Panics on an unknown handle; callers validate first.
    pub fn neighbors(&self, node: NodeId) -> &BTreeSet<NodeId> {
        &self.adjacency[node - 1]
    }

    pub fn degree(&self, node: NodeId) -> usize {
        self.adjacency.get(node.wrapping_sub(1)).map_or(0, |n| n.len())
    }

    /// Each undirected edge once, as `(low, high)`.
    pub fn edges(&self) -> impl Iterator<Item = (NodeId, NodeId)> + '_ {
        self.adjacency.iter().enumerate().flat_map(|(idx, neighbors)| {
            let u = idx + 1;
            neighbors.iter().filter(move |&&v| u < v).map(move |&v| (u, v))
        })
    }

    /// Exports to a petgraph undirected graph; node weights carry the handle.
    pub fn to_petgraph(&self) -> UnGraph<NodeId, ()> {
        let mut graph = UnGraph::with_capacity(self.node_count(), self.edge_count);
        for node in self.node_ids() {
            graph.add_node(node);
        }
        for (u, v) in self.edges() {
            graph.add_edge(NodeIndex::new(u - 1), NodeIndex::new(v - 1), ());
        }
        graph
    }

    fn check_endpoints(&self, u: NodeId, v: NodeId) -> Result<()> {
        if !self.contains(u) {
            return Err(GraphError::InvalidNode(u));
        }
        if !self.contains(v) {
            return Err(GraphError::InvalidNode(v));
        }
        if u == v {
            return Err(GraphError::SelfLoop(u));
        }
        Ok(())
    }
}

impl<N, E> From<&UnGraph<N, E>> for GraphStore {
    /// Imports a petgraph graph, mapping `NodeIndex(i)` to handle `i + 1`.
    /// Self-loops and parallel edges are dropped.
    fn from(graph: &UnGraph<N, E>) -> Self {
        let mut store = Self::new(graph.node_count());
        for edge in graph.raw_edges() {
            let u = edge.source().index() + 1;
            let v = edge.target().index() + 1;
            if u == v || store.has_edge(u, v) {
                continue;
            }
            if let Err(e) = store.add_edge(u, v) {
                tracing::warn!("Skipping imported edge ({}, {}): {}", u, v, e);
            }
        }
        store
    }
}
