//! Graph view of a function's control flow.

mod loops;

pub use loops::{detect_loops, LoopExit, LoopForest, LoopInfo, LoopType};

use crate::{
    ir::{BlockId, Function},
    utils::graph::{
        algorithms::{compute_dominators, reverse_postorder, DominatorTree},
        GraphBase, NodeId, Predecessors, RootedGraph, Successors,
    },
};

impl From<BlockId> for NodeId {
    fn from(block: BlockId) -> Self {
        NodeId::new(block.index())
    }
}

impl From<NodeId> for BlockId {
    fn from(node: NodeId) -> Self {
        BlockId::new(node.index())
    }
}

/// A read-only control flow graph view of a [`Function`].
///
/// Nodes are block ids. Successor lists are deduplicated, so a branch with both arms on the
/// same block contributes one edge. Predecessors are computed once at construction.
pub struct CfgView<'a> {
    function: &'a Function,
    successors: Vec<Vec<NodeId>>,
    predecessors: Vec<Vec<NodeId>>,
}

impl<'a> CfgView<'a> {
    /// Builds the view.
    #[must_use]
    pub fn new(function: &'a Function) -> Self {
        let successors: Vec<Vec<NodeId>> = function
            .blocks()
            .iter()
            .map(|block| {
                block
                    .successors()
                    .into_iter()
                    .filter(|succ| succ.index() < function.block_count())
                    .map(NodeId::from)
                    .collect()
            })
            .collect();
        let predecessors = function
            .predecessor_map()
            .into_iter()
            .map(|preds| preds.into_iter().map(NodeId::from).collect())
            .collect();
        Self {
            function,
            successors,
            predecessors,
        }
    }

    /// The underlying function.
    #[must_use]
    pub fn function(&self) -> &'a Function {
        self.function
    }

    /// Computes the dominator tree rooted at the function's entry.
    #[must_use]
    pub fn dominators(&self) -> DominatorTree {
        compute_dominators(self)
    }

    /// Reachable blocks in reverse post-order from the entry.
    #[must_use]
    pub fn reverse_postorder(&self) -> Vec<BlockId> {
        reverse_postorder(self, self.entry())
            .into_iter()
            .map(BlockId::from)
            .collect()
    }

    /// Discovers the natural loops of the function.
    #[must_use]
    pub fn loops(&self) -> LoopForest {
        detect_loops(self, &self.dominators())
    }
}

impl GraphBase for CfgView<'_> {
    fn node_count(&self) -> usize {
        self.function.block_count()
    }

    fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.function.block_count()).map(NodeId::new)
    }
}

impl Successors for CfgView<'_> {
    fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId> {
        self.successors
            .get(node.index())
            .into_iter()
            .flatten()
            .copied()
    }
}

impl Predecessors for CfgView<'_> {
    fn predecessors(&self, node: NodeId) -> impl Iterator<Item = NodeId> {
        self.predecessors
            .get(node.index())
            .into_iter()
            .flatten()
            .copied()
    }
}

impl RootedGraph for CfgView<'_> {
    fn entry(&self) -> NodeId {
        self.function.entry.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::FunctionBuilder;

    #[test]
    fn test_view_edges() {
        let func = FunctionBuilder::new("f", 1).build_with(|f| {
            let c = f.param(0);
            f.block(0, "entry", |b| b.branch(c, 1, 1));
            f.block(1, "exit", |b| b.ret(None));
        });
        let view = CfgView::new(&func);

        assert_eq!(view.successors(NodeId::new(0)).count(), 1);
        assert_eq!(
            view.predecessors(NodeId::new(1)).collect::<Vec<_>>(),
            vec![NodeId::new(0)]
        );
        assert_eq!(
            view.reverse_postorder(),
            vec![BlockId::new(0), BlockId::new(1)]
        );
    }
}
