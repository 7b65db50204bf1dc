// Copyright 2020 Xavier Gillard
//
// Permission is hereby granted, free of charge, to any person obtaining a copy of
// this software and associated documentation files (the "Software"), to deal in
// the Software without restriction, including without limitation the rights to
// use, copy, modify, merge, publish, distribute, sublicense, and/or sell copies of
// the Software, and to permit persons to whom the Software is furnished to do so,
// subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY, FITNESS
// FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR
// COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER LIABILITY, WHETHER
// IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM, OUT OF OR IN
// CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE SOFTWARE.

//! The workflow graph itself, and the preprocessing pass that validates it is
//! a proper rDAG and builds the lookup tables (predecessors, full
//! reachability) the rest of the solver relies on.

use fxhash::{FxHashMap, FxHashSet};
use std::collections::VecDeque;

use crate::{EdgeAttrs, MergeSolverError, NodeAttrs, NodeId};

// ----------------------------------------------------------------------------
// --- GRAPH --------------------------------------------------------------
// ----------------------------------------------------------------------------
/// A workflow graph: a set of functions (nodes) connected by call edges.
/// Immutable once built -- there is no mutation API once a [`Graph`] exists,
/// only [`GraphBuilder`] produces one.
#[derive(Debug, Clone)]
pub struct Graph {
    nodes: FxHashMap<NodeId, NodeAttrs>,
    /// forward adjacency: u -> [(v, attrs)]
    out_edges: FxHashMap<NodeId, Vec<(NodeId, EdgeAttrs)>>,
}

impl Graph {
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().copied()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn attrs(&self, node: NodeId) -> Option<&NodeAttrs> {
        self.nodes.get(&node)
    }

    pub fn successors(&self, node: NodeId) -> impl Iterator<Item = (NodeId, EdgeAttrs)> + '_ {
        self.out_edges
            .get(&node)
            .into_iter()
            .flat_map(|v| v.iter().copied())
    }

    pub fn in_degree(&self, node: NodeId) -> usize {
        self.out_edges
            .values()
            .flat_map(|succs| succs.iter())
            .filter(|(v, _)| *v == node)
            .count()
    }
}

// ----------------------------------------------------------------------------
// --- GRAPH BUILDER --------------------------------------------------------
// ----------------------------------------------------------------------------
/// Incrementally assembles a [`Graph`] from nodes and edges. This is the only
/// way to construct one -- once `finish()` is called the graph is frozen.
#[derive(Debug, Default)]
pub struct GraphBuilder {
    nodes: FxHashMap<NodeId, NodeAttrs>,
    out_edges: FxHashMap<NodeId, Vec<(NodeId, EdgeAttrs)>>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(mut self, id: NodeId, attrs: NodeAttrs) -> Self {
        self.nodes.insert(id, attrs);
        self
    }

    pub fn edge(mut self, from: NodeId, to: NodeId, attrs: EdgeAttrs) -> Self {
        self.out_edges.entry(from).or_default().push((to, attrs));
        self
    }

    pub fn finish(self) -> Graph {
        Graph {
            nodes: self.nodes,
            out_edges: self.out_edges,
        }
    }
}

// ----------------------------------------------------------------------------
// --- PREPROCESSED ---------------------------------------------------------
// ----------------------------------------------------------------------------
/// The result of [`preprocess`]: the validated root, a snapshot of all node
/// ids, the predecessor lists, and the full reachability table every root
/// candidate needs.
#[derive(Debug, Clone)]
pub struct Preprocessed {
    pub root: NodeId,
    pub all_nodes: Vec<NodeId>,
    pub predecessors: FxHashMap<NodeId, Vec<NodeId>>,
    pub reachable_from: FxHashMap<NodeId, FxHashSet<NodeId>>,
}

/// Finds the single in-degree-0 node of `graph`.
///
/// All nodes of an rDAG must be reachable from one entry point; this
/// validates that the graph has exactly one candidate.
pub fn find_root(graph: &Graph) -> Result<NodeId, MergeSolverError> {
    let roots: Vec<NodeId> = graph
        .node_ids()
        .filter(|n| graph.in_degree(*n) == 0)
        .collect();

    match roots.len() {
        1 => Ok(roots[0]),
        0 => Err(MergeSolverError::NoRoot),
        _ => Err(MergeSolverError::MultipleRoots(roots)),
    }
}

/// Computes, for every node in `roots_to_check`, the set of nodes reachable
/// from it (including itself) via a breadth-first traversal of `graph`.
///
/// This is what the ILP builder uses to know which `y(i, r)` variables are
/// even meaningful: node `i` can only be assigned to a subgraph rooted at `r`
/// if `i` is reachable from `r`.
pub fn compute_reachability(
    graph: &Graph,
    roots_to_check: impl IntoIterator<Item = NodeId>,
) -> FxHashMap<NodeId, FxHashSet<NodeId>> {
    let mut reachable_from: FxHashMap<NodeId, FxHashSet<NodeId>> = FxHashMap::default();

    for r in roots_to_check {
        let mut visited = FxHashSet::default();
        visited.insert(r);
        let mut queue = VecDeque::new();
        queue.push_back(r);

        while let Some(u) = queue.pop_front() {
            for (v, _) in graph.successors(u) {
                if visited.insert(v) {
                    queue.push_back(v);
                }
            }
        }

        reachable_from.insert(r, visited);
    }

    reachable_from
}

/// Checks that `graph` has no directed cycle, via an iterative
/// white/grey/black DFS coloring.
fn is_acyclic(graph: &Graph) -> bool {
    #[derive(Clone, Copy, PartialEq)]
    enum Color {
        White,
        Grey,
        Black,
    }

    let mut color: FxHashMap<NodeId, Color> = graph.node_ids().map(|n| (n, Color::White)).collect();

    for start in graph.node_ids() {
        if color[&start] != Color::White {
            continue;
        }
        let mut stack = vec![(start, false)];
        while let Some((node, finishing)) = stack.pop() {
            if finishing {
                color.insert(node, Color::Black);
                continue;
            }
            if color[&node] == Color::Black {
                continue;
            }
            color.insert(node, Color::Grey);
            stack.push((node, true));
            for (succ, _) in graph.successors(node) {
                match color.get(&succ).copied().unwrap_or(Color::White) {
                    Color::White => stack.push((succ, false)),
                    Color::Grey => return false,
                    Color::Black => {}
                }
            }
        }
    }

    true
}

/// Runs every check and pre-computation a graph needs before root selection
/// and ILP solving can start: acyclicity, single-root validation,
/// predecessor lists, and the full reachability table.
pub fn preprocess(graph: &Graph) -> Result<Preprocessed, MergeSolverError> {
    if !is_acyclic(graph) {
        return Err(MergeSolverError::NotADag);
    }

    let root = find_root(graph)?;

    let all_nodes: Vec<NodeId> = graph.node_ids().collect();

    let mut predecessors: FxHashMap<NodeId, Vec<NodeId>> =
        all_nodes.iter().map(|n| (*n, Vec::new())).collect();
    for u in &all_nodes {
        for (v, _) in graph.successors(*u) {
            predecessors.entry(v).or_default().push(*u);
        }
    }

    let reachable_from = compute_reachability(graph, all_nodes.iter().copied());

    Ok(Preprocessed {
        root,
        all_nodes,
        predecessors,
        reachable_from,
    })
}

// ############################################################################
// #### TESTS #################################################################
// ############################################################################

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EdgeKind;

    fn attrs(memory: f64, cpu: f64) -> NodeAttrs {
        NodeAttrs { memory, cpu }
    }

    fn sync(weight: u32) -> EdgeAttrs {
        EdgeAttrs {
            weight,
            kind: EdgeKind::Sync,
        }
    }

    fn linear_chain() -> Graph {
        GraphBuilder::new()
            .node(NodeId(0), attrs(1.0, 1.0))
            .node(NodeId(1), attrs(1.0, 1.0))
            .node(NodeId(2), attrs(1.0, 1.0))
            .edge(NodeId(0), NodeId(1), sync(1))
            .edge(NodeId(1), NodeId(2), sync(1))
            .finish()
    }

    #[test]
    fn finds_the_single_root() {
        let g = linear_chain();
        assert_eq!(NodeId(0), find_root(&g).unwrap());
    }

    #[test]
    fn rejects_graphs_with_no_root() {
        let g = GraphBuilder::new()
            .node(NodeId(0), attrs(1.0, 1.0))
            .node(NodeId(1), attrs(1.0, 1.0))
            .edge(NodeId(0), NodeId(1), sync(1))
            .edge(NodeId(1), NodeId(0), sync(1))
            .finish();
        assert!(matches!(find_root(&g), Err(MergeSolverError::NotADag)) || matches!(preprocess(&g), Err(MergeSolverError::NotADag)));
    }

    #[test]
    fn rejects_graphs_with_multiple_roots() {
        let g = GraphBuilder::new()
            .node(NodeId(0), attrs(1.0, 1.0))
            .node(NodeId(1), attrs(1.0, 1.0))
            .finish();
        assert!(matches!(
            find_root(&g),
            Err(MergeSolverError::MultipleRoots(_))
        ));
    }

    #[test]
    fn detects_cycles() {
        let g = GraphBuilder::new()
            .node(NodeId(0), attrs(1.0, 1.0))
            .node(NodeId(1), attrs(1.0, 1.0))
            .edge(NodeId(0), NodeId(1), sync(1))
            .edge(NodeId(1), NodeId(0), sync(1))
            .finish();
        assert!(matches!(preprocess(&g), Err(MergeSolverError::NotADag)));
    }

    #[test]
    fn reachability_is_transitive_along_the_chain() {
        let g = linear_chain();
        let pre = preprocess(&g).unwrap();
        let from_root = &pre.reachable_from[&NodeId(0)];
        assert!(from_root.contains(&NodeId(0)));
        assert!(from_root.contains(&NodeId(1)));
        assert!(from_root.contains(&NodeId(2)));

        let from_leaf = &pre.reachable_from[&NodeId(2)];
        assert_eq!(1, from_leaf.len());
    }

    #[test]
    fn predecessors_are_recorded_for_every_node() {
        let g = linear_chain();
        let pre = preprocess(&g).unwrap();
        assert!(pre.predecessors[&NodeId(0)].is_empty());
        assert_eq!(vec![NodeId(0)], pre.predecessors[&NodeId(1)]);
        assert_eq!(vec![NodeId(1)], pre.predecessors[&NodeId(2)]);
    }
}
