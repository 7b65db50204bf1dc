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

//! A fast, unsound fail-fast check used to skip root sets that are almost
//! certainly infeasible before paying for a full ILP solve.
//!
//! # Unsoundness
//!
//! This check assumes every weakly-connected group of non-root nodes must
//! end up in a single subgraph. The ILP is free to split such a group across
//! several subgraphs when at least one of its nodes has more than one
//! reachable root, so a root set this check flags as infeasible can actually
//! be feasible. It must only be used as an advisory fast-fail in heuristic
//! strategies -- exhaustive/Optimal search must never call it.

use fxhash::{FxHashMap, FxHashSet};

use crate::{async_alpha, EdgeKind, Graph, NodeId};

struct UnionFind {
    parent: FxHashMap<NodeId, NodeId>,
}

impl UnionFind {
    fn new(nodes: impl IntoIterator<Item = NodeId>) -> Self {
        Self {
            parent: nodes.into_iter().map(|n| (n, n)).collect(),
        }
    }

    fn find(&mut self, n: NodeId) -> NodeId {
        let p = self.parent[&n];
        if p == n {
            n
        } else {
            let root = self.find(p);
            self.parent.insert(n, root);
            root
        }
    }

    fn union(&mut self, a: NodeId, b: NodeId) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra != rb {
            self.parent.insert(ra, rb);
        }
    }
}

/// Returns `true` if `roots` is likely infeasible for the given capacity.
///
/// Computes the weakly-connected components of the subgraph induced by every
/// node *not* in `roots`, and checks whether any one component's combined
/// (plus async-inflated) resource cost alone exceeds `memory_capacity` or
/// `cpu_capacity`.
pub fn aggressive_prune(
    graph: &Graph,
    roots: &FxHashSet<NodeId>,
    memory_capacity: f64,
    cpu_capacity: f64,
    concurrent_instances: u32,
) -> bool {
    let non_root_nodes: FxHashSet<NodeId> = graph.node_ids().filter(|n| !roots.contains(n)).collect();
    if non_root_nodes.is_empty() {
        return false;
    }

    let mut uf = UnionFind::new(non_root_nodes.iter().copied());
    for &u in &non_root_nodes {
        for (v, _) in graph.successors(u) {
            if non_root_nodes.contains(&v) {
                uf.union(u, v);
            }
        }
    }

    let mut groups: FxHashMap<NodeId, Vec<NodeId>> = FxHashMap::default();
    for &n in &non_root_nodes {
        let root = uf.find(n);
        groups.entry(root).or_default().push(n);
    }

    for group in groups.values() {
        let group_set: FxHashSet<NodeId> = group.iter().copied().collect();

        let base_m: f64 = group.iter().filter_map(|n| graph.attrs(*n)).map(|a| a.memory).sum();
        let base_c: f64 = group.iter().filter_map(|n| graph.attrs(*n)).map(|a| a.cpu).sum();

        if base_m > memory_capacity || base_c > cpu_capacity {
            return true;
        }

        let mut async_m = 0.0;
        let mut async_c = 0.0;
        for &u in group {
            for (v, attrs) in graph.successors(u) {
                if group_set.contains(&v) && matches!(attrs.kind, EdgeKind::Async) {
                    let alpha = async_alpha(attrs.weight, concurrent_instances);
                    if alpha > 1 {
                        if let Some(v_attrs) = graph.attrs(v) {
                            async_m += v_attrs.memory * (alpha - 1) as f64;
                            async_c += v_attrs.cpu * (alpha - 1) as f64;
                        }
                    }
                }
            }
        }

        if base_m + async_m > memory_capacity || base_c + async_c > cpu_capacity {
            return true;
        }
    }

    false
}

// ############################################################################
// #### TESTS #################################################################
// ############################################################################
