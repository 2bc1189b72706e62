//! Generic directed graph abstractions and algorithms.
//!
//! Algorithms are written against the small trait hierarchy in [`traits`] so they work on any
//! graph shape. The IR's control flow graph implements the traits through
//! [`crate::analysis::CfgView`]; unit tests use tiny adjacency-list graphs.
//!
//! # Key Components
//!
//! - [`NodeId`] - strongly-typed node index
//! - [`GraphBase`], [`Successors`], [`Predecessors`], [`RootedGraph`] - graph capabilities
//! - [`algorithms::compute_dominators`] - Lengauer-Tarjan dominator tree
//! - [`algorithms::reverse_postorder`] - iterative depth-first orderings

pub mod algorithms;
mod node;
mod traits;

pub use node::NodeId;
pub use traits::{GraphBase, Predecessors, RootedGraph, Successors};

#[cfg(test)]
pub(crate) mod testgraph {
    use super::{GraphBase, NodeId, Predecessors, RootedGraph, Successors};

    /// Adjacency-list graph for algorithm tests.
    pub struct TestGraph {
        edges: Vec<(usize, usize)>,
        nodes: usize,
    }

    impl TestGraph {
        pub fn new(nodes: usize, edges: &[(usize, usize)]) -> Self {
            Self {
                edges: edges.to_vec(),
                nodes,
            }
        }
    }

    impl GraphBase for TestGraph {
        fn node_count(&self) -> usize {
            self.nodes
        }

        fn node_ids(&self) -> impl Iterator<Item = NodeId> {
            (0..self.nodes).map(NodeId::new)
        }
    }

    impl Successors for TestGraph {
        fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId> {
            self.edges
                .iter()
                .filter(move |(from, _)| *from == node.index())
                .map(|(_, to)| NodeId::new(*to))
        }
    }

    impl Predecessors for TestGraph {
        fn predecessors(&self, node: NodeId) -> impl Iterator<Item = NodeId> {
            self.edges
                .iter()
                .filter(move |(_, to)| *to == node.index())
                .map(|(from, _)| NodeId::new(*from))
        }
    }

    impl RootedGraph for TestGraph {
        fn entry(&self) -> NodeId {
            NodeId::new(0)
        }
    }
}
