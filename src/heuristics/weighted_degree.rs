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

//! The Weighted In-Degree heuristic (WID): a cheaper, "local" baseline that
//! only looks at a node's immediate incoming edges, unlike [`super::downstream_impact`]
//! which considers the entire reachable subgraph.

use fxhash::{FxHashMap, FxHashSet};
use ordered_float::OrderedFloat;

use crate::heuristics::{grasp_select, CandidateSelector, GraspRng, ScoredCandidates};
use crate::{Graph, NodeId};

/// Tuning knobs for [`WeightedDegreeSelector`].
#[derive(Debug, Clone, Copy, derive_builder::Builder)]
#[builder(default)]
pub struct WidConfig {
    pub rcl_size: usize,
}

impl Default for WidConfig {
    fn default() -> Self {
        Self { rcl_size: 1 }
    }
}

pub struct WeightedDegreeSelector {
    pub config: WidConfig,
}

impl WeightedDegreeSelector {
    pub fn new(config: WidConfig) -> Self {
        Self { config }
    }
}

impl CandidateSelector for WeightedDegreeSelector {
    fn select(
        &self,
        graph: &Graph,
        root: NodeId,
        num_candidates: usize,
        rng: &mut GraspRng,
    ) -> (FxHashSet<NodeId>, ScoredCandidates) {
        if num_candidates == 0 {
            return (FxHashSet::default(), Vec::new());
        }

        let mut weighted_in_degree: FxHashMap<NodeId, f64> = FxHashMap::default();
        for u in graph.node_ids() {
            for (v, attrs) in graph.successors(u) {
                if v != root {
                    *weighted_in_degree.entry(v).or_insert(0.0) += attrs.weight as f64;
                }
            }
        }
        for n in graph.node_ids() {
            if n != root {
                weighted_in_degree.entry(n).or_insert(0.0);
            }
        }

        if weighted_in_degree.is_empty() {
            return (FxHashSet::default(), Vec::new());
        }

        let mut scores: ScoredCandidates = weighted_in_degree.into_iter().collect();
        scores.sort_by_key(|&(_, score)| std::cmp::Reverse(OrderedFloat(score)));

        let chosen = grasp_select(&scores, num_candidates, self.config.rcl_size, rng);
        (chosen, scores)
    }
}

// ############################################################################
// #### TESTS #################################################################
// ############################################################################
