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

//! The Downstream Impact Heuristic (DIH): ranks candidate roots by the
//! resource footprint of everything reachable from them, pressure-adjusted
//! by how memory- or CPU-heavy the overall workflow is, plus their direct
//! weighted in-degree.

use fxhash::{FxHashMap, FxHashSet};
use ordered_float::OrderedFloat;

use crate::heuristics::{grasp_select, CandidateSelector, GraspRng, ScoredCandidates};
use crate::{async_alpha, EdgeKind, Graph, NodeId};

const EPSILON: f64 = 1e-9;

/// Tuning knobs for [`DownstreamImpactSelector`]. Defaults match the weights
/// used to evaluate the heuristic in its originating study: equal thirds for
/// weighted in-degree, downstream memory, and downstream CPU.
#[derive(Debug, Clone, Copy, derive_builder::Builder)]
#[builder(default)]
pub struct DihConfig {
    pub memory_capacity: f64,
    pub cpu_capacity: f64,
    pub concurrent_instances: u32,
    pub beta: f64,
    pub gamma: f64,
    pub delta: f64,
    pub rcl_size: usize,
}

impl Default for DihConfig {
    fn default() -> Self {
        Self {
            memory_capacity: 0.0,
            cpu_capacity: 0.0,
            concurrent_instances: 1,
            beta: 1.0 / 3.0,
            gamma: 1.0 / 3.0,
            delta: 1.0 / 3.0,
            rcl_size: 1,
        }
    }
}

pub struct DownstreamImpactSelector {
    pub config: DihConfig,
}

impl DownstreamImpactSelector {
    pub fn new(config: DihConfig) -> Self {
        Self { config }
    }
}

/// Computes, for every node, the set of nodes reachable from it (including
/// itself) by processing nodes in reverse topological order so each node's
/// descendant set is built from its successors' already-memoized sets,
/// without recursion.
fn descendants_by_node(graph: &Graph, order: &[NodeId]) -> FxHashMap<NodeId, FxHashSet<NodeId>> {
    let mut memo: FxHashMap<NodeId, FxHashSet<NodeId>> = FxHashMap::default();
    for &node in order {
        let mut set = FxHashSet::default();
        set.insert(node);
        for (succ, _) in graph.successors(node) {
            if let Some(succ_desc) = memo.get(&succ) {
                set.extend(succ_desc.iter().copied());
            } else {
                set.insert(succ);
            }
        }
        memo.insert(node, set);
    }
    memo
}

/// A topological order of `graph`'s nodes, reversed (leaves first). Falls
/// back to an arbitrary node order if a cycle sneaks through (preprocessing
/// should already have rejected that case).
fn reverse_topological_order(graph: &Graph) -> Vec<NodeId> {
    let mut in_degree: FxHashMap<NodeId, usize> =
        graph.node_ids().map(|n| (n, 0)).collect();
    for node in graph.node_ids() {
        for (succ, _) in graph.successors(node) {
            *in_degree.entry(succ).or_insert(0) += 1;
        }
    }

    let mut queue: std::collections::VecDeque<NodeId> = in_degree
        .iter()
        .filter(|(_, d)| **d == 0)
        .map(|(n, _)| *n)
        .collect();

    let mut order = Vec::with_capacity(in_degree.len());
    while let Some(node) = queue.pop_front() {
        order.push(node);
        for (succ, _) in graph.successors(node) {
            let d = in_degree.get_mut(&succ).unwrap();
            *d -= 1;
            if *d == 0 {
                queue.push_back(succ);
            }
        }
    }

    if order.len() != in_degree.len() {
        order = graph.node_ids().collect();
    }

    order.reverse();
    order
}

fn weighted_in_degree(graph: &Graph, predecessors: &FxHashMap<NodeId, Vec<NodeId>>, node: NodeId) -> f64 {
    predecessors
        .get(&node)
        .into_iter()
        .flatten()
        .flat_map(|&p| graph.successors(p).filter(move |(v, _)| *v == node))
        .map(|(_, attrs)| attrs.weight as f64)
        .sum()
}

impl CandidateSelector for DownstreamImpactSelector {
    fn select(
        &self,
        graph: &Graph,
        root: NodeId,
        num_candidates: usize,
        rng: &mut GraspRng,
    ) -> (FxHashSet<NodeId>, ScoredCandidates) {
        let cfg = &self.config;

        if num_candidates == 0 {
            return (FxHashSet::default(), Vec::new());
        }
        if cfg.memory_capacity <= 0.0 || cfg.cpu_capacity <= 0.0 || cfg.concurrent_instances == 0 {
            tracing::debug!("DIH called with non-positive M/C/N; no candidates scored");
            return (FxHashSet::default(), Vec::new());
        }

        let nodes_to_consider: Vec<NodeId> = graph.node_ids().filter(|&n| n != root).collect();
        if nodes_to_consider.is_empty() {
            return (FxHashSet::default(), Vec::new());
        }

        let order = reverse_topological_order(graph);
        let descendants = descendants_by_node(graph, &order);

        let mut predecessors: FxHashMap<NodeId, Vec<NodeId>> = FxHashMap::default();
        for u in graph.node_ids() {
            for (v, _) in graph.successors(u) {
                predecessors.entry(v).or_default().push(u);
            }
        }

        let mut downstream_m: FxHashMap<NodeId, f64> = FxHashMap::default();
        let mut downstream_c: FxHashMap<NodeId, f64> = FxHashMap::default();
        let mut w_in: FxHashMap<NodeId, f64> = FxHashMap::default();
        let mut max_w_in = 0.0f64;

        for &j in &nodes_to_consider {
            let desc = descendants.get(&j).cloned().unwrap_or_else(|| {
                let mut s = FxHashSet::default();
                s.insert(j);
                s
            });

            let mut ds_m: f64 = desc.iter().filter_map(|n| graph.attrs(*n)).map(|a| a.memory).sum();
            let mut ds_c: f64 = desc.iter().filter_map(|n| graph.attrs(*n)).map(|a| a.cpu).sum();

            for &u in &desc {
                for (v, attrs) in graph.successors(u) {
                    if desc.contains(&v) && matches!(attrs.kind, EdgeKind::Async) {
                        let alpha = async_alpha(attrs.weight, cfg.concurrent_instances);
                        if alpha > 1 {
                            if let Some(v_attrs) = graph.attrs(v) {
                                ds_m += v_attrs.memory * (alpha - 1) as f64;
                                ds_c += v_attrs.cpu * (alpha - 1) as f64;
                            }
                        }
                    }
                }
            }

            downstream_m.insert(j, ds_m);
            downstream_c.insert(j, ds_c);

            let win = weighted_in_degree(graph, &predecessors, j);
            w_in.insert(j, win);
            max_w_in = max_w_in.max(win);
        }

        let total_m: f64 = graph.node_ids().filter_map(|n| graph.attrs(n)).map(|a| a.memory).sum();
        let total_c: f64 = graph.node_ids().filter_map(|n| graph.attrs(n)).map(|a| a.cpu).sum();
        let mem_pressure = total_m / (cfg.memory_capacity + EPSILON);
        let cpu_pressure = total_c / (cfg.cpu_capacity + EPSILON);
        let gamma_adjusted = cfg.gamma * (1.0 + mem_pressure);
        let delta_adjusted = cfg.delta * (1.0 + cpu_pressure);

        let mut scores: ScoredCandidates = nodes_to_consider
            .iter()
            .map(|&j| {
                let norm_w_in = w_in[&j] / (max_w_in + EPSILON);
                let norm_ds_m = downstream_m[&j] / (cfg.memory_capacity + EPSILON);
                let norm_ds_c = downstream_c[&j] / (cfg.cpu_capacity + EPSILON);
                let score = cfg.beta * norm_w_in + gamma_adjusted * norm_ds_m + delta_adjusted * norm_ds_c;
                (j, score)
            })
            .collect();

        scores.sort_by_key(|&(_, score)| std::cmp::Reverse(OrderedFloat(score)));

        let chosen = grasp_select(&scores, num_candidates, cfg.rcl_size, rng);
        (chosen, scores)
    }
}

// ############################################################################
// #### TESTS #################################################################
// ############################################################################
