//! Depth-first orderings.
//!
//! - [`postorder`] - Depth-first search with post-order visitation
//! - [`reverse_postorder`] - Reverse post-order (definitions before uses in acyclic regions)

use crate::utils::graph::{NodeId, Successors};

/// Returns the nodes reachable from `start` in depth-first post-order. Successors are
/// explored in the order the graph yields them.
#[allow(clippy::items_after_statements)]
pub fn postorder<G: Successors>(graph: &G, start: NodeId) -> Vec<NodeId> {
    let node_count = graph.node_count();

    if start.index() >= node_count {
        return Vec::new();
    }

    let mut visited = vec![false; node_count];
    let mut result = Vec::with_capacity(node_count);

    #[derive(Clone, Copy)]
    enum State {
        Enter,
        Exit,
    }

    let mut stack = vec![(start, State::Enter)];

    while let Some((node, state)) = stack.pop() {
        match state {
            State::Enter => {
                if visited[node.index()] {
                    continue;
                }
                visited[node.index()] = true;

                stack.push((node, State::Exit));

                // Push children in reverse order so they're processed in order
                let successors: Vec<NodeId> = graph.successors(node).collect();
                for &succ in successors.iter().rev() {
                    if succ.index() < node_count && !visited[succ.index()] {
                        stack.push((succ, State::Enter));
                    }
                }
            }
            State::Exit => {
                result.push(node);
            }
        }
    }

    result
}

/// Returns the nodes reachable from `start` in reverse post-order.
pub fn reverse_postorder<G: Successors>(graph: &G, start: NodeId) -> Vec<NodeId> {
    let mut result = postorder(graph, start);
    result.reverse();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::graph::testgraph::TestGraph;

    #[test]
    fn test_reverse_postorder_diamond() {
        let graph = TestGraph::new(4, &[(0, 1), (0, 2), (1, 3), (2, 3)]);
        let rpo = reverse_postorder(&graph, NodeId::new(0));

        assert_eq!(rpo.first(), Some(&NodeId::new(0)));
        assert_eq!(rpo.last(), Some(&NodeId::new(3)));
        assert_eq!(rpo.len(), 4);
    }

    #[test]
    fn test_postorder_skips_unreachable() {
        let graph = TestGraph::new(3, &[(0, 1)]);
        let order = postorder(&graph, NodeId::new(0));
        assert_eq!(order, vec![NodeId::new(1), NodeId::new(0)]);
    }

    #[test]
    fn test_invalid_start() {
        let graph = TestGraph::new(2, &[(0, 1)]);
        assert!(postorder(&graph, NodeId::new(5)).is_empty());
    }
}
