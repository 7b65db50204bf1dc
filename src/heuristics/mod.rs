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

//! Heuristics that propose candidate additional roots for a merge request:
//! the [`downstream_impact`] (DIH) and [`weighted_degree`] (WID) scorers.
//! Both rank every non-root node and then draw from a GRASP Restricted
//! Candidate List so the orchestrator's retries don't always see the exact
//! same pool.

pub mod downstream_impact;
pub mod weighted_degree;

use fxhash::FxHashSet;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::{Graph, NodeId};

/// A scored candidate pool, highest score first.
pub type ScoredCandidates = Vec<(NodeId, f64)>;

/// A seedable source of randomness for GRASP candidate draws.
///
/// Constructing a [`GraspRng`] from a fixed seed and then selecting with
/// `rcl_size == 1` is what the reproducibility law requires: the same seed
/// must always yield the same candidate set, because an RCL of size 1 makes
/// the "random" draw degenerate to picking index 0.
pub struct GraspRng(StdRng);

impl GraspRng {
    pub fn from_seed(seed: u64) -> Self {
        Self(StdRng::seed_from_u64(seed))
    }

    pub fn from_entropy() -> Self {
        Self(StdRng::from_entropy())
    }
}

/// A root-candidate scoring heuristic, selected at runtime by the
/// orchestrator.
pub trait CandidateSelector {
    /// Scores every node other than `root` and draws `num_candidates` of
    /// them via GRASP. Returns the drawn set along with the full sorted
    /// score list (the orchestrator's `greedy_refine` mode consumes the
    /// latter to add candidates one at a time without re-scoring).
    fn select(
        &self,
        graph: &Graph,
        root: NodeId,
        num_candidates: usize,
        rng: &mut GraspRng,
    ) -> (FxHashSet<NodeId>, ScoredCandidates);
}

/// The shared GRASP selection loop used by both heuristics: repeatedly build
/// a Restricted Candidate List of the top `rcl_size` remaining scores, draw
/// one uniformly at random, and remove it from the pool.
///
/// `scores` must already be sorted best-first.
pub(crate) fn grasp_select(
    scores: &[(NodeId, f64)],
    num_candidates: usize,
    rcl_size: usize,
    rng: &mut GraspRng,
) -> FxHashSet<NodeId> {
    let mut chosen = FxHashSet::default();
    if num_candidates == 0 {
        return chosen;
    }

    let mut remaining: Vec<(NodeId, f64)> = scores.to_vec();
    let num_to_select = num_candidates.min(remaining.len());

    for _ in 0..num_to_select {
        if remaining.is_empty() {
            break;
        }
        let current_rcl_size = rcl_size.min(remaining.len());
        let idx = rng.0.gen_range(0..current_rcl_size);
        let (node, _) = remaining[idx];
        chosen.insert(node);
        remaining.retain(|(n, _)| *n != node);
    }

    chosen
}

// ############################################################################
// #### TESTS #################################################################
// ############################################################################
