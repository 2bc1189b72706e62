//! Dominator tree computation using the Lengauer-Tarjan algorithm.
//!
//! A node `d` **dominates** a node `n` if every path from the entry node to `n`
//! must pass through `d`. The **immediate dominator** of `n` (idom(n)) is the
//! unique node that strictly dominates `n` but does not strictly dominate any
//! other dominator of `n`.
//!
//! Lifted functions routinely contain blocks that are unreachable from the entry (dead
//! fallback paths, blocks orphaned by earlier rewrites). Such nodes have no immediate
//! dominator, dominate nothing but themselves, and are dominated by nothing.
//!
//! # Algorithm
//!
//! Lengauer-Tarjan with path compression, O(V α(V)).

use crate::utils::graph::{NodeId, RootedGraph};

/// Immediate-dominator tree of a rooted graph.
#[derive(Debug, Clone)]
pub struct DominatorTree {
    entry: NodeId,
    idom: Vec<Option<NodeId>>,
}

impl DominatorTree {
    /// The root of the tree.
    #[inline]
    #[must_use]
    pub fn entry(&self) -> NodeId {
        self.entry
    }

    /// Returns the immediate dominator of `node`; `None` for the entry and for unreachable
    /// nodes.
    #[inline]
    #[must_use]
    pub fn immediate_dominator(&self, node: NodeId) -> Option<NodeId> {
        if node == self.entry {
            None
        } else {
            self.idom.get(node.index()).copied().flatten()
        }
    }

    /// Returns `true` if `node` is reachable from the entry.
    #[must_use]
    pub fn is_reachable(&self, node: NodeId) -> bool {
        node == self.entry || self.immediate_dominator(node).is_some()
    }

    /// Returns `true` if `a` dominates `b`. Every node dominates itself.
    #[must_use]
    pub fn dominates(&self, a: NodeId, b: NodeId) -> bool {
        if a == b {
            return true;
        }

        let mut current = b;
        while let Some(idom) = self.immediate_dominator(current) {
            if idom == a {
                return true;
            }
            current = idom;
        }
        false
    }

    /// Returns `true` if `a` dominates `b` and `a != b`.
    #[inline]
    #[must_use]
    pub fn strictly_dominates(&self, a: NodeId, b: NodeId) -> bool {
        a != b && self.dominates(a, b)
    }

    /// Depth of `node` in the tree (entry is 0). Unreachable nodes report 0.
    #[must_use]
    pub fn depth(&self, node: NodeId) -> usize {
        let mut depth = 0;
        let mut current = node;
        while let Some(idom) = self.immediate_dominator(current) {
            current = idom;
            depth += 1;
        }
        depth
    }

    /// Number of nodes the tree was computed for.
    #[inline]
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.idom.len()
    }
}

/// Computes the dominator tree of `graph` rooted at its entry.
pub fn compute_dominators<G>(graph: &G) -> DominatorTree
where
    G: RootedGraph,
{
    let node_count = graph.node_count();
    let entry = graph.entry();

    if node_count == 0 || entry.index() >= node_count {
        return DominatorTree {
            entry,
            idom: Vec::new(),
        };
    }

    let mut lt = LengauerTarjan::new(node_count, entry);
    lt.compute(graph);

    let idom = (0..node_count)
        .map(|i| {
            if i == entry.index() || lt.dfnum[i] == 0 {
                None
            } else {
                Some(lt.idom[i])
            }
        })
        .collect();

    DominatorTree { entry, idom }
}

struct LengauerTarjan {
    entry: NodeId,
    dfnum: Vec<usize>,
    vertex: Vec<NodeId>,
    parent: Vec<NodeId>,
    semi: Vec<NodeId>,
    idom: Vec<NodeId>,
    ancestor: Vec<NodeId>,
    best: Vec<NodeId>,
    bucket: Vec<Vec<NodeId>>,
    dfs_counter: usize,
}

const SENTINEL: NodeId = NodeId::new(usize::MAX);

impl LengauerTarjan {
    fn new(n: usize, entry: NodeId) -> Self {
        Self {
            entry,
            dfnum: vec![0; n],
            vertex: vec![SENTINEL; n],
            parent: vec![SENTINEL; n],
            semi: (0..n).map(NodeId::new).collect(),
            idom: vec![SENTINEL; n],
            ancestor: vec![SENTINEL; n],
            best: (0..n).map(NodeId::new).collect(),
            bucket: vec![Vec::new(); n],
            dfs_counter: 0,
        }
    }

    fn compute<G: RootedGraph>(&mut self, graph: &G) {
        // Phase 1: DFS numbering
        self.dfs(graph, self.entry);

        for i in (1..self.dfs_counter).rev() {
            let w = self.vertex[i];
            let parent_w = self.parent[w.index()];

            // Phase 2: semidominators
            let preds: Vec<NodeId> = graph.predecessors(w).collect();
            for v in preds {
                if v.index() >= self.dfnum.len() || self.dfnum[v.index()] == 0 {
                    // v is unreachable from entry
                    continue;
                }
                let u = self.eval(v);
                if self.dfnum[self.semi[u.index()].index()]
                    < self.dfnum[self.semi[w.index()].index()]
                {
                    self.semi[w.index()] = self.semi[u.index()];
                }
            }

            let semi_w = self.semi[w.index()];
            self.bucket[semi_w.index()].push(w);
            self.link(parent_w, w);

            // Phase 3: implicit immediate dominators
            let bucket = std::mem::take(&mut self.bucket[parent_w.index()]);
            for v in bucket {
                let u = self.eval(v);
                if self.semi[u.index()] == self.semi[v.index()] {
                    self.idom[v.index()] = parent_w;
                } else {
                    self.idom[v.index()] = u;
                }
            }
        }

        // Phase 4: explicit immediate dominators
        for i in 1..self.dfs_counter {
            let w = self.vertex[i];
            if self.idom[w.index()] != self.semi[w.index()] {
                self.idom[w.index()] = self.idom[self.idom[w.index()].index()];
            }
        }

        self.idom[self.entry.index()] = self.entry;
    }

    fn dfs<G: RootedGraph>(&mut self, graph: &G, start: NodeId) {
        let mut stack = vec![start];

        while let Some(node) = stack.pop() {
            let idx = node.index();
            if self.dfnum[idx] != 0 {
                continue;
            }

            self.dfs_counter += 1;
            self.dfnum[idx] = self.dfs_counter;
            self.vertex[self.dfs_counter - 1] = node;

            let successors: Vec<NodeId> = graph.successors(node).collect();
            for succ in successors.into_iter().rev() {
                if succ.index() < self.dfnum.len() && self.dfnum[succ.index()] == 0 {
                    self.parent[succ.index()] = node;
                    stack.push(succ);
                }
            }
        }
    }

    fn link(&mut self, w: NodeId, v: NodeId) {
        self.ancestor[v.index()] = w;
    }

    fn eval(&mut self, v: NodeId) -> NodeId {
        if self.ancestor[v.index()] == SENTINEL {
            return v;
        }

        self.compress(v);
        self.best[v.index()]
    }

    fn compress(&mut self, v: NodeId) {
        let ancestor_v = self.ancestor[v.index()];

        if self.ancestor[ancestor_v.index()] == SENTINEL {
            return;
        }

        self.compress(ancestor_v);

        let best_ancestor = self.best[ancestor_v.index()];
        let best_v = self.best[v.index()];

        if self.dfnum[self.semi[best_ancestor.index()].index()]
            < self.dfnum[self.semi[best_v.index()].index()]
        {
            self.best[v.index()] = best_ancestor;
        }

        self.ancestor[v.index()] = self.ancestor[ancestor_v.index()];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::graph::testgraph::TestGraph;

    #[test]
    fn test_diamond() {
        // 0 -> 1, 0 -> 2, 1 -> 3, 2 -> 3
        let graph = TestGraph::new(4, &[(0, 1), (0, 2), (1, 3), (2, 3)]);
        let dom = compute_dominators(&graph);

        assert_eq!(dom.immediate_dominator(NodeId::new(0)), None);
        assert_eq!(dom.immediate_dominator(NodeId::new(1)), Some(NodeId::new(0)));
        assert_eq!(dom.immediate_dominator(NodeId::new(3)), Some(NodeId::new(0)));
        assert!(dom.dominates(NodeId::new(0), NodeId::new(3)));
        assert!(!dom.dominates(NodeId::new(1), NodeId::new(3)));
        assert_eq!(dom.depth(NodeId::new(3)), 1);
    }

    #[test]
    fn test_loop() {
        // 0 -> 1 -> 2 -> 1, 2 -> 3
        let graph = TestGraph::new(4, &[(0, 1), (1, 2), (2, 1), (2, 3)]);
        let dom = compute_dominators(&graph);

        assert!(dom.dominates(NodeId::new(1), NodeId::new(2)));
        assert!(dom.dominates(NodeId::new(2), NodeId::new(3)));
        assert!(dom.strictly_dominates(NodeId::new(1), NodeId::new(3)));
    }

    #[test]
    fn test_unreachable_node() {
        // 3 is unreachable and jumps into the graph
        let graph = TestGraph::new(4, &[(0, 1), (1, 2), (3, 2)]);
        let dom = compute_dominators(&graph);

        assert!(!dom.is_reachable(NodeId::new(3)));
        assert!(!dom.dominates(NodeId::new(0), NodeId::new(3)));
        assert!(!dom.dominates(NodeId::new(3), NodeId::new(2)));
        assert!(dom.dominates(NodeId::new(1), NodeId::new(2)));
    }
}
