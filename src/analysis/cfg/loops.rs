//! Natural loop analysis.
//!
//! # Loop Structure
//!
//! ```text
//!     [preheader]     <- Single entry predecessor (optional)
//!          |
//!          v
//!     [header] <------+  <- Single entry point, dominates all loop nodes
//!          |          |
//!          v          |
//!     [body ...]      |  <- Loop body nodes
//!          |          |
//!          v          |
//!     [latch] --------+  <- Back edge source(s)
//!          |
//!          v
//!     [exit ...]         <- Exit blocks (outside loop, have predecessor in loop)
//! ```
//!
//! Interpretation loops produced by a lifter are the canonical case: the dispatch block is
//! the header, the shared block every emulated block jumps back through is the latch, and
//! the block initializing the VPC is the preheader.
//!
//! [`detect_loops`] works on any graph implementing the traits in
//! [`crate::utils::graph`]. Only nodes reachable from the entry take part.

use std::collections::{BTreeSet, HashMap};

use crate::utils::graph::{algorithms::DominatorTree, NodeId, Predecessors, Successors};

/// Shape of a loop, derived from where it exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopType {
    /// Condition checked at the header (while loop).
    PreTested,
    /// Condition checked at the latch (do-while loop).
    PostTested,
    /// No exit edge.
    Infinite,
    /// Multiple latches or exits from several body blocks.
    Complex,
}

/// An edge leaving a loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopExit {
    /// Loop block the edge leaves from.
    pub exiting_block: NodeId,
    /// Block outside the loop the edge enters.
    pub exit_block: NodeId,
}

/// A natural loop.
#[derive(Debug, Clone)]
pub struct LoopInfo {
    /// The header, dominating every block of the loop.
    pub header: NodeId,
    /// Every block of the loop, header included. Ordered by node index.
    pub body: BTreeSet<NodeId>,
    /// Blocks with a back edge to the header, in discovery order.
    pub latches: Vec<NodeId>,
    /// The single predecessor of the header outside the loop, if there is exactly one.
    pub preheader: Option<NodeId>,
    /// Edges leaving the loop.
    pub exits: Vec<LoopExit>,
    /// Nesting depth; 0 for outermost loops.
    pub depth: usize,
    /// Exit shape.
    pub loop_type: LoopType,
    /// Header of the immediately enclosing loop.
    pub parent: Option<NodeId>,
    /// Headers of the immediately nested loops.
    pub children: Vec<NodeId>,
}

impl LoopInfo {
    /// Creates a loop consisting of only `header`.
    #[must_use]
    pub fn new(header: NodeId) -> Self {
        let mut body = BTreeSet::new();
        body.insert(header);
        Self {
            header,
            body,
            latches: Vec::new(),
            preheader: None,
            exits: Vec::new(),
            depth: 0,
            loop_type: LoopType::Complex,
            parent: None,
            children: Vec::new(),
        }
    }

    /// Returns `true` if `node` is part of the loop.
    #[must_use]
    pub fn contains(&self, node: NodeId) -> bool {
        self.body.contains(&node)
    }

    /// Number of blocks in the loop.
    #[must_use]
    pub fn size(&self) -> usize {
        self.body.len()
    }

    /// Returns the latch if there is exactly one.
    #[must_use]
    pub fn single_latch(&self) -> Option<NodeId> {
        if self.latches.len() == 1 {
            Some(self.latches[0])
        } else {
            None
        }
    }

    /// A loop with one preheader and one latch.
    #[must_use]
    pub fn is_canonical(&self) -> bool {
        self.preheader.is_some() && self.single_latch().is_some()
    }

    /// Blocks outside the loop entered by an exit edge.
    pub fn exit_blocks(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.exits.iter().map(|e| e.exit_block)
    }
}

/// All natural loops of a graph.
#[derive(Debug, Clone)]
pub struct LoopForest {
    loops: Vec<LoopInfo>,
    block_to_loop: Vec<Option<usize>>,
}

impl LoopForest {
    /// Creates an empty forest for a graph of `block_count` nodes.
    #[must_use]
    pub fn new(block_count: usize) -> Self {
        Self {
            loops: Vec::new(),
            block_to_loop: vec![None; block_count],
        }
    }

    /// Adds a loop, updating the innermost-loop mapping of its blocks.
    pub fn add_loop(&mut self, loop_info: LoopInfo) {
        let loop_idx = self.loops.len();

        for &block in &loop_info.body {
            let Some(slot) = self.block_to_loop.get_mut(block.index()) else {
                continue;
            };
            match *slot {
                Some(existing) if self.loops[existing].depth >= loop_info.depth => {}
                _ => *slot = Some(loop_idx),
            }
        }

        self.loops.push(loop_info);
    }

    /// All loops, sorted by header index.
    #[must_use]
    pub fn loops(&self) -> &[LoopInfo] {
        &self.loops
    }

    /// Number of loops.
    #[must_use]
    pub fn len(&self) -> usize {
        self.loops.len()
    }

    /// Returns `true` if the graph has no loops.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.loops.is_empty()
    }

    /// The innermost loop containing `block`.
    #[must_use]
    pub fn innermost_loop(&self, block: NodeId) -> Option<&LoopInfo> {
        self.block_to_loop
            .get(block.index())
            .copied()
            .flatten()
            .map(|idx| &self.loops[idx])
    }

    /// The loop headed by `header`.
    #[must_use]
    pub fn loop_for_header(&self, header: NodeId) -> Option<&LoopInfo> {
        self.loops.iter().find(|l| l.header == header)
    }

    /// Number of loops containing `block`.
    #[must_use]
    pub fn loop_depth(&self, block: NodeId) -> usize {
        self.innermost_loop(block).map_or(0, |l| l.depth + 1)
    }

    /// Iterates over all loops.
    pub fn iter(&self) -> impl Iterator<Item = &LoopInfo> {
        self.loops.iter()
    }

    /// Loops ordered innermost first. Ties keep header order.
    #[must_use]
    pub fn by_depth_descending(&self) -> Vec<&LoopInfo> {
        let mut sorted: Vec<_> = self.loops.iter().collect();
        sorted.sort_by_key(|l| std::cmp::Reverse(l.depth));
        sorted
    }
}

/// Finds the natural loops of `graph`.
///
/// A back edge is an edge `n -> h` where `h` dominates `n`; `h` is the loop header and `n` a
/// latch. The body is everything that reaches a latch without passing through the header.
#[must_use]
pub fn detect_loops<G>(graph: &G, dominators: &DominatorTree) -> LoopForest
where
    G: Successors + Predecessors,
{
    let block_count = graph.node_count();
    let mut forest = LoopForest::new(block_count);

    let mut loops_by_header: HashMap<NodeId, LoopInfo> = HashMap::new();

    for node in graph.node_ids() {
        if !dominators.is_reachable(node) {
            continue;
        }
        for succ in graph.successors(node) {
            if dominators.dominates(succ, node) {
                let loop_info = loops_by_header
                    .entry(succ)
                    .or_insert_with(|| LoopInfo::new(succ));
                if !loop_info.latches.contains(&node) {
                    loop_info.latches.push(node);
                }
                expand_loop_body(graph, dominators, loop_info, node);
            }
        }
    }

    for loop_info in loops_by_header.values_mut() {
        compute_preheader(graph, loop_info);
        compute_exits(graph, loop_info);
        loop_info.loop_type = classify_loop(loop_info);
    }

    let mut loops: Vec<LoopInfo> = loops_by_header.into_values().collect();
    compute_nesting(&mut loops);

    // Sort by header for deterministic ordering
    loops.sort_by_key(|l| l.header.index());

    for loop_info in loops {
        forest.add_loop(loop_info);
    }

    forest
}

fn expand_loop_body<G>(graph: &G, dominators: &DominatorTree, loop_info: &mut LoopInfo, latch: NodeId)
where
    G: Predecessors,
{
    if loop_info.body.contains(&latch) {
        return;
    }

    let mut worklist = vec![latch];
    while let Some(node) = worklist.pop() {
        if loop_info.body.insert(node) {
            for pred in graph.predecessors(node) {
                if pred != loop_info.header
                    && !loop_info.body.contains(&pred)
                    && dominators.is_reachable(pred)
                {
                    worklist.push(pred);
                }
            }
        }
    }
}

fn compute_preheader<G>(graph: &G, loop_info: &mut LoopInfo)
where
    G: Predecessors,
{
    let outside: Vec<NodeId> = graph
        .predecessors(loop_info.header)
        .filter(|pred| !loop_info.body.contains(pred))
        .collect();

    loop_info.preheader = if outside.len() == 1 {
        Some(outside[0])
    } else {
        None
    };
}

fn compute_exits<G>(graph: &G, loop_info: &mut LoopInfo)
where
    G: Successors,
{
    loop_info.exits.clear();
    for &body_block in &loop_info.body {
        for succ in graph.successors(body_block) {
            if !loop_info.body.contains(&succ) {
                loop_info.exits.push(LoopExit {
                    exiting_block: body_block,
                    exit_block: succ,
                });
            }
        }
    }
}

fn classify_loop(loop_info: &LoopInfo) -> LoopType {
    if loop_info.exits.is_empty() {
        return LoopType::Infinite;
    }

    if loop_info.latches.len() > 1 {
        return LoopType::Complex;
    }

    if let Some(latch) = loop_info.single_latch() {
        let latch_exits = loop_info
            .exits
            .iter()
            .filter(|e| e.exiting_block == latch)
            .count();
        if latch_exits == loop_info.exits.len() {
            return LoopType::PostTested;
        }
    }

    let header_exits = loop_info
        .exits
        .iter()
        .filter(|e| e.exiting_block == loop_info.header)
        .count();
    if header_exits == loop_info.exits.len() {
        return LoopType::PreTested;
    }

    LoopType::Complex
}

fn compute_nesting(loops: &mut [LoopInfo]) {
    let n = loops.len();

    let header_to_idx: HashMap<NodeId, usize> = loops
        .iter()
        .enumerate()
        .map(|(i, l)| (l.header, i))
        .collect();

    // Parent is the smallest other loop containing this loop's header
    for i in 0..n {
        let header = loops[i].header;
        let parent = (0..n)
            .filter(|&j| j != i && loops[j].body.contains(&header))
            .min_by_key(|&j| loops[j].size());
        loops[i].parent = parent.map(|j| loops[j].header);
    }

    for i in 0..n {
        if let Some(parent_header) = loops[i].parent {
            if let Some(&parent_idx) = header_to_idx.get(&parent_header) {
                let child = loops[i].header;
                loops[parent_idx].children.push(child);
            }
        }
    }

    for i in 0..n {
        let mut depth = 0;
        let mut current = loops[i].parent;
        while let Some(parent_header) = current {
            depth += 1;
            current = header_to_idx
                .get(&parent_header)
                .and_then(|&idx| loops[idx].parent);
        }
        loops[i].depth = depth;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::graph::{algorithms::compute_dominators, testgraph::TestGraph};

    #[test]
    fn test_single_loop() {
        // 0 -> 1 -> 2 -> 1, 1 -> 3
        let graph = TestGraph::new(4, &[(0, 1), (1, 2), (2, 1), (1, 3)]);
        let forest = detect_loops(&graph, &compute_dominators(&graph));

        assert_eq!(forest.len(), 1);
        let lp = &forest.loops()[0];
        assert_eq!(lp.header, NodeId::new(1));
        assert_eq!(lp.single_latch(), Some(NodeId::new(2)));
        assert_eq!(lp.preheader, Some(NodeId::new(0)));
        assert!(lp.is_canonical());
        assert_eq!(lp.loop_type, LoopType::PreTested);
        assert_eq!(lp.exit_blocks().collect::<Vec<_>>(), vec![NodeId::new(3)]);
    }

    #[test]
    fn test_nested_loops() {
        // outer: 1..4, inner: 2..3
        let graph = TestGraph::new(
            6,
            &[(0, 1), (1, 2), (2, 3), (3, 2), (3, 4), (4, 1), (1, 5)],
        );
        let forest = detect_loops(&graph, &compute_dominators(&graph));

        assert_eq!(forest.len(), 2);
        let inner = forest.loop_for_header(NodeId::new(2)).unwrap();
        let outer = forest.loop_for_header(NodeId::new(1)).unwrap();
        assert_eq!(inner.depth, 1);
        assert_eq!(inner.parent, Some(NodeId::new(1)));
        assert_eq!(outer.children, vec![NodeId::new(2)]);
        assert_eq!(forest.loop_depth(NodeId::new(3)), 2);
        assert_eq!(forest.by_depth_descending()[0].header, NodeId::new(2));
    }

    #[test]
    fn test_unreachable_predecessor_not_in_body() {
        // 4 is unreachable and jumps into the loop body
        let graph = TestGraph::new(5, &[(0, 1), (1, 2), (2, 1), (2, 3), (4, 2)]);
        let forest = detect_loops(&graph, &compute_dominators(&graph));

        let lp = forest.loop_for_header(NodeId::new(1)).unwrap();
        assert!(!lp.contains(NodeId::new(4)));
        assert_eq!(lp.size(), 2);
    }

    #[test]
    fn test_two_outside_predecessors_no_preheader() {
        let graph = TestGraph::new(4, &[(0, 1), (0, 2), (1, 2), (2, 3), (3, 2)]);
        let forest = detect_loops(&graph, &compute_dominators(&graph));

        let lp = forest.loop_for_header(NodeId::new(2)).unwrap();
        assert_eq!(lp.preheader, None);
        assert_eq!(lp.loop_type, LoopType::Infinite);
    }
}
