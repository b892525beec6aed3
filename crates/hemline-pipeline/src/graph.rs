//! s-t minimum cut via maximum flow.
//!
//! Nodes are numbered `0..node_count`; the source and sink terminals are
//! added when the cut is computed. Terminal capacities are accumulated
//! per node as a single signed residual: adding the same amount to both a
//! node's source and sink link cannot change the cut, so only the
//! difference is kept and the common part is counted as flow up front.
//! This also keeps negative terminal weights (e.g. `-ln p` for `p > 1`)
//! out of the flow network, whose capacities must be non-negative.
//!
//! The maximum flow itself is [`petgraph::algo::dinics`]; the cut is read
//! off the residual network it leaves behind.

use std::collections::VecDeque;

use petgraph::Direction;
use petgraph::algo::dinics;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;

/// Residual capacities at or below this are treated as saturated.
const EPSILON: f64 = 1e-9;

/// A flow network under construction.
#[derive(Debug, Clone)]
pub struct FlowGraph {
    /// Signed terminal residual per node: positive links from the source,
    /// negative links to the sink.
    terminal: Vec<f64>,
    /// Non-terminal arcs as `(from, to, capacity)`.
    arcs: Vec<(usize, usize, f64)>,
    /// Flow counted while folding terminal links.
    flow: f64,
}

/// Result of a minimum cut.
#[derive(Debug, Clone, PartialEq)]
pub struct MinCut {
    /// `true` for nodes on the source side of the cut.
    pub source_side: Vec<bool>,
    /// Total flow, equal to the cut capacity.
    pub flow: f64,
}

impl FlowGraph {
    /// Create a graph with `node_count` non-terminal nodes, reserving
    /// room for `edge_hint` undirected neighbour edges.
    #[must_use]
    pub fn new(node_count: usize, edge_hint: usize) -> Self {
        Self {
            terminal: vec![0.0; node_count],
            arcs: Vec::with_capacity(2 * edge_hint),
            flow: 0.0,
        }
    }

    /// Add capacity from the source to `node` and from `node` to the sink.
    pub fn add_terminal_weights(&mut self, node: usize, source: f64, sink: f64) {
        let mut source = source;
        let mut sink = sink;
        let existing = self.terminal[node];
        if existing > 0.0 {
            source += existing;
        } else {
            sink -= existing;
        }
        self.flow += source.min(sink);
        self.terminal[node] = source - sink;
    }

    /// Add an edge between two nodes with a capacity in each direction.
    pub fn add_edge(&mut self, from: usize, to: usize, capacity: f64, reverse_capacity: f64) {
        if capacity > 0.0 {
            self.arcs.push((from, to, capacity));
        }
        if reverse_capacity > 0.0 {
            self.arcs.push((to, from, reverse_capacity));
        }
    }

    /// Compute the maximum flow and the corresponding minimum cut.
    ///
    /// Nodes that can still be reached from the source through
    /// unsaturated arcs are on the source side; everything else
    /// (including nodes tied between both terminals) is on the sink side.
    #[must_use]
    pub fn min_cut(self) -> MinCut {
        let node_count = self.terminal.len();
        let mut network: DiGraph<(), f64> =
            DiGraph::with_capacity(node_count + 2, self.arcs.len() + node_count);
        for _ in 0..node_count {
            network.add_node(());
        }
        let source = network.add_node(());
        let sink = network.add_node(());

        for (node, &t) in self.terminal.iter().enumerate() {
            if t > 0.0 {
                network.add_edge(source, NodeIndex::new(node), t);
            } else if t < 0.0 {
                network.add_edge(NodeIndex::new(node), sink, -t);
            }
        }
        for &(from, to, capacity) in &self.arcs {
            network.add_edge(NodeIndex::new(from), NodeIndex::new(to), capacity);
        }

        let (max_flow, edge_flows) = dinics(&network, source, sink);
        let reachable = residual_reachable(&network, &edge_flows, source);

        MinCut {
            source_side: reachable[..node_count].to_vec(),
            flow: self.flow + max_flow,
        }
    }
}

/// Nodes reachable from `source` in the residual network of `flows`.
fn residual_reachable(network: &DiGraph<(), f64>, flows: &[f64], source: NodeIndex) -> Vec<bool> {
    let mut reached = vec![false; network.node_count()];
    reached[source.index()] = true;
    let mut queue = VecDeque::from([source]);
    while let Some(u) = queue.pop_front() {
        let forward = network
            .edges_directed(u, Direction::Outgoing)
            .filter(|e| e.weight() - flows[e.id().index()] > EPSILON)
            .map(|e| e.target());
        let backward = network
            .edges_directed(u, Direction::Incoming)
            .filter(|e| flows[e.id().index()] > EPSILON)
            .map(|e| e.source());
        let next: Vec<NodeIndex> = forward.chain(backward).collect();
        for v in next {
            if !reached[v.index()] {
                reached[v.index()] = true;
                queue.push_back(v);
            }
        }
    }
    reached
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn single_node_follows_stronger_terminal() {
        let mut g = FlowGraph::new(1, 0);
        g.add_terminal_weights(0, 5.0, 2.0);
        let cut = g.min_cut();
        assert_eq!(cut.source_side, vec![true]);
        assert!((cut.flow - 2.0).abs() < 1e-12);
    }

    #[test]
    fn tied_terminals_land_on_sink_side() {
        let mut g = FlowGraph::new(1, 0);
        g.add_terminal_weights(0, 3.0, 3.0);
        let cut = g.min_cut();
        assert_eq!(cut.source_side, vec![false]);
    }

    #[test]
    fn negative_weights_only_matter_through_their_difference() {
        let mut g = FlowGraph::new(1, 0);
        g.add_terminal_weights(0, -4.0, -1.0);
        let cut = g.min_cut();
        // Source link is the smaller one: the node joins the sink.
        assert_eq!(cut.source_side, vec![false]);
    }

    #[test]
    fn chain_is_cut_at_weakest_link() {
        // source -> 0 -> 1 -> 2 -> sink with a weak middle edge.
        let mut g = FlowGraph::new(3, 2);
        g.add_terminal_weights(0, 10.0, 0.0);
        g.add_terminal_weights(2, 0.0, 10.0);
        g.add_edge(0, 1, 8.0, 8.0);
        g.add_edge(1, 2, 1.5, 1.5);
        let cut = g.min_cut();
        assert!((cut.flow - 1.5).abs() < 1e-12);
        assert_eq!(cut.source_side, vec![true, true, false]);
    }

    #[test]
    fn classic_network_max_flow() {
        // CLRS figure 26.1 shape with nodes v1..v4 as 0..3.
        let mut g = FlowGraph::new(4, 7);
        g.add_terminal_weights(0, 16.0, 0.0);
        g.add_terminal_weights(1, 13.0, 0.0);
        g.add_terminal_weights(2, 0.0, 20.0);
        g.add_terminal_weights(3, 0.0, 4.0);
        g.add_edge(0, 2, 12.0, 0.0);
        g.add_edge(1, 0, 4.0, 0.0);
        g.add_edge(2, 1, 9.0, 0.0);
        g.add_edge(1, 3, 14.0, 0.0);
        g.add_edge(3, 2, 7.0, 0.0);
        g.add_edge(0, 1, 10.0, 0.0);
        let cut = g.min_cut();
        assert!((cut.flow - 23.0).abs() < 1e-9, "flow = {}", cut.flow);
        // The minimum cut separates {s, v1, v2, v4} from {v3, t}.
        assert_eq!(cut.source_side, vec![true, true, false, true]);
    }

    #[test]
    fn both_terminals_contribute_to_flow() {
        // Common part of the two terminal links is flow even without
        // any neighbour arcs.
        let mut g = FlowGraph::new(2, 0);
        g.add_terminal_weights(0, 7.0, 3.0);
        g.add_terminal_weights(1, 1.0, 6.0);
        let cut = g.min_cut();
        assert!((cut.flow - 4.0).abs() < 1e-12, "flow = {}", cut.flow);
        assert_eq!(cut.source_side, vec![true, false]);
    }

    #[test]
    fn strong_neighbour_links_pull_a_weak_node_along() {
        // Node 1 slightly prefers the sink, but is tied strongly to node 0,
        // which is firmly on the source side.
        let mut g = FlowGraph::new(2, 1);
        g.add_terminal_weights(0, 100.0, 0.0);
        g.add_terminal_weights(1, 1.0, 2.0);
        g.add_edge(0, 1, 50.0, 50.0);
        let cut = g.min_cut();
        assert_eq!(cut.source_side, vec![true, true]);
    }

    #[test]
    fn flow_equals_cut_capacity_on_grid() {
        // 3x3 grid, left column tied to source, right column to sink.
        let mut g = FlowGraph::new(9, 12);
        for row in 0..3 {
            g.add_terminal_weights(row * 3, 100.0, 0.0);
            g.add_terminal_weights(row * 3 + 2, 0.0, 100.0);
            for col in 0..2 {
                g.add_edge(row * 3 + col, row * 3 + col + 1, 1.0, 1.0);
            }
        }
        for row in 0..2 {
            for col in 0..3 {
                g.add_edge(row * 3 + col, (row + 1) * 3 + col, 1.0, 1.0);
            }
        }
        let cut = g.min_cut();
        assert!((cut.flow - 3.0).abs() < 1e-9, "flow = {}", cut.flow);
        for row in 0..3 {
            assert!(cut.source_side[row * 3]);
            assert!(!cut.source_side[row * 3 + 2]);
        }
    }
}
