//! Weighted routing graph whose edge speeds may be driven by live media.

use std::collections::BTreeMap;

use strange_places_core::{EdgeMultiplier, EdgeSpec, MultiplierLookup, NodeId, Vec2};

/// Directed graph of routing nodes.
///
/// Edges carry a multiplier source rather than a fixed weight; the time cost
/// of a hop is the Euclidean length divided by the floored multiplier read at
/// query time. The graph is mutated only through world commands, so planners
/// always observe it as read-only.
#[derive(Clone, Debug, Default)]
pub struct WeightedGraph {
    nodes: BTreeMap<NodeId, GraphNode>,
}

/// Single routing node and its outgoing edges.
#[derive(Clone, Debug, PartialEq)]
pub struct GraphNode {
    position: Vec2,
    edges: Vec<GraphEdge>,
}

impl GraphNode {
    /// World-space position of the node.
    #[must_use]
    pub const fn position(&self) -> Vec2 {
        self.position
    }

    /// Outgoing edges in configuration order.
    #[must_use]
    pub fn edges(&self) -> &[GraphEdge] {
        &self.edges
    }
}

/// Directed edge leading to another node.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GraphEdge {
    target: NodeId,
    multiplier: EdgeMultiplier,
}

impl GraphEdge {
    /// Node the edge leads to.
    #[must_use]
    pub const fn target(&self) -> NodeId {
        self.target
    }

    /// Multiplier source of the edge.
    #[must_use]
    pub const fn multiplier(&self) -> EdgeMultiplier {
        self.multiplier
    }
}

impl WeightedGraph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a node, or moves an existing one while keeping its edges.
    pub fn insert_node(&mut self, node: NodeId, position: Vec2) {
        let entry = self.nodes.entry(node).or_insert_with(|| GraphNode {
            position,
            edges: Vec::new(),
        });
        entry.position = position;
    }

    /// Replaces the outgoing edges of `node`.
    ///
    /// Returns `false` without mutating anything when the node is unknown.
    pub fn set_edges(&mut self, node: NodeId, edges: &[EdgeSpec]) -> bool {
        let Some(entry) = self.nodes.get_mut(&node) else {
            return false;
        };

        entry.edges.clear();
        entry.edges.extend(edges.iter().map(|spec| GraphEdge {
            target: spec.target,
            multiplier: spec.multiplier,
        }));
        true
    }

    /// Looks up a node.
    #[must_use]
    pub fn node(&self, node: NodeId) -> Option<&GraphNode> {
        self.nodes.get(&node)
    }

    /// Position of a node, if it exists.
    #[must_use]
    pub fn position(&self, node: NodeId) -> Option<Vec2> {
        self.nodes.get(&node).map(GraphNode::position)
    }

    /// Outgoing edges of a node; unknown nodes have none.
    #[must_use]
    pub fn edges(&self, node: NodeId) -> &[GraphEdge] {
        self.nodes.get(&node).map_or(&[], |entry| entry.edges())
    }

    /// First edge from `from` to `to`, if one is configured.
    #[must_use]
    pub fn edge_between(&self, from: NodeId, to: NodeId) -> Option<&GraphEdge> {
        self.edges(from).iter().find(|edge| edge.target == to)
    }

    /// Floored speed multiplier of the edge.
    #[must_use]
    pub fn edge_rate<L>(&self, edge: &GraphEdge, lookup: &L) -> f32
    where
        L: MultiplierLookup + ?Sized,
    {
        edge.multiplier.resolve(lookup)
    }

    /// Time needed to traverse `edge` starting at `from`.
    ///
    /// Returns `None` when either endpoint is missing from the graph.
    #[must_use]
    pub fn edge_time_cost<L>(&self, from: NodeId, edge: &GraphEdge, lookup: &L) -> Option<f32>
    where
        L: MultiplierLookup + ?Sized,
    {
        let start = self.position(from)?;
        let end = self.position(edge.target)?;
        Some(start.distance(end) / self.edge_rate(edge, lookup))
    }

    /// Number of nodes in the graph.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Reports whether the graph has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
