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

//! The root-selection orchestrator: drives either an exhaustive
//! (`combinatorial`) or a sequential (`greedy_refine`) search over candidate
//! root sets, calling out to the aggressive pruner and the ILP solver as it
//! goes.

use std::collections::BTreeSet;

use fxhash::{FxHashMap, FxHashSet};
use ordered_float::OrderedFloat;
use parking_lot::Mutex;

use crate::heuristics::CandidateSelector;
use crate::ilp::{solve_subgraph, Assignment, IlpConfig, SolverStatus};
use crate::prune::aggressive_prune;
use crate::{GraspRng, Graph, NodeId, Preprocessed};

/// Which algorithm drives the search once a starting candidate pool has been
/// established.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Mode {
    /// Exhaustively enumerate R-tuples, evaluated in parallel.
    Combinatorial,
    /// Start from one feasible solution and greedily shrink R.
    GreedyRefine,
}

/// Tuning knobs for [`run_root_selection`].
#[derive(Debug, Clone, Copy, derive_builder::Builder)]
#[builder(default)]
pub struct OrchestratorConfig {
    pub memory_capacity: f64,
    pub cpu_capacity: f64,
    pub concurrent_instances: u32,
    pub max_k: usize,
    /// Only consulted when no candidate selector is supplied (Optimal mode).
    pub max_combinations_threshold: Option<u64>,
    pub mode: Mode,
    /// Number of parallel ILP workers in [`Mode::Combinatorial`]; the number
    /// of solver threads handed to the single ILP in [`Mode::GreedyRefine`].
    pub num_threads: usize,
    /// The `num_candidates` a heuristic selector starts with before the
    /// retry loop begins bumping it.
    pub initial_num_candidates: usize,
    pub ilp: IlpConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            memory_capacity: 0.0,
            cpu_capacity: 0.0,
            concurrent_instances: 1,
            max_k: 1,
            max_combinations_threshold: None,
            mode: Mode::Combinatorial,
            num_threads: num_cpus::get(),
            initial_num_candidates: 0,
            ilp: IlpConfig::default(),
        }
    }
}

/// The result of a root-selection run: `(cost, R, assignment, limit_hit)`,
/// `derive(Serialize)`'d for an external experiment driver's convenience --
/// this crate itself never writes JSON.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum RootSelectionResult {
    Infeasible,
    Found {
        cost: f64,
        roots: FxHashSet<NodeId>,
        assignment: Assignment,
        limit_hit: bool,
    },
}

struct Best {
    cost: f64,
    roots: FxHashSet<NodeId>,
    assignment: Assignment,
}

/// Runs root selection for `graph` using either a heuristic `selector` or,
/// if `None`, the exhaustive "Optimal" strategy (candidate pool = every
/// non-root node, no pruning, no retries).
pub fn run_root_selection(
    strategy_name: &str,
    graph: &Graph,
    pre: &Preprocessed,
    selector: Option<&dyn CandidateSelector>,
    cfg: &OrchestratorConfig,
    rng: &mut GraspRng,
) -> RootSelectionResult {
    let span = tracing::info_span!("run_root_selection", strategy = strategy_name);
    let _enter = span.enter();

    // Pre-flight: if any single function doesn't fit alone, nothing can.
    let trivially_feasible = pre.all_nodes.iter().all(|&n| {
        graph
            .attrs(n)
            .map(|a| a.memory <= cfg.memory_capacity && a.cpu <= cfg.cpu_capacity)
            .unwrap_or(false)
    });
    if !trivially_feasible {
        tracing::warn!("a single function exceeds container capacity; problem is infeasible");
        return RootSelectionResult::Infeasible;
    }

    let root = pre.root;
    let mut best: Option<Best> = None;
    let mut candidate_pool: Option<FxHashSet<NodeId>> = None;
    let mut all_scores: Vec<(NodeId, f64)> = Vec::new();

    match selector {
        None => {
            candidate_pool = Some(pre.all_nodes.iter().copied().filter(|&n| n != root).collect());
        }
        Some(selector) => {
            let max_retries = pre.all_nodes.len().max(1);
            let mut num_candidates = cfg.initial_num_candidates;

            for attempt in 0..max_retries {
                if attempt > 0 {
                    num_candidates += 1;
                    tracing::debug!(attempt, num_candidates, "retrying candidate selection");
                }

                let (pool, scores) = selector.select(graph, root, num_candidates, rng);
                if pool.is_empty() {
                    continue;
                }

                let mut full_r = pool.clone();
                full_r.insert(root);

                if aggressive_prune(graph, &full_r, cfg.memory_capacity, cfg.cpu_capacity, cfg.concurrent_instances) {
                    tracing::debug!("candidate pool failed the aggressive prune check");
                    continue;
                }

                let outcome = solve_subgraph(
                    graph,
                    &full_r,
                    cfg.memory_capacity,
                    cfg.cpu_capacity,
                    cfg.concurrent_instances,
                    &pre.all_nodes,
                    &pre.predecessors,
                    &pre.reachable_from,
                    &cfg.ilp,
                );

                if outcome.status == SolverStatus::Infeasible {
                    tracing::debug!("ILP found no feasible solution with the full candidate pool");
                    continue;
                }

                if let Some(cost) = outcome.cost {
                    tracing::info!(cost, roots = full_r.len(), "initial feasible solution found");
                    best = Some(Best {
                        cost,
                        roots: full_r,
                        assignment: outcome.assignment,
                    });
                }
                candidate_pool = Some(pool);
                all_scores = scores;
                break;
            }
        }
    }

    let Some(candidate_pool) = candidate_pool else {
        tracing::warn!("could not find a feasible candidate pool after exhausting retries");
        return RootSelectionResult::Infeasible;
    };

    match cfg.mode {
        Mode::GreedyRefine => run_greedy_refine(graph, pre, cfg, best, all_scores),
        Mode::Combinatorial => run_combinatorial(graph, pre, cfg, selector.is_some(), candidate_pool, best),
    }
}

fn run_greedy_refine(
    graph: &Graph,
    pre: &Preprocessed,
    cfg: &OrchestratorConfig,
    best: Option<Best>,
    all_scores: Vec<(NodeId, f64)>,
) -> RootSelectionResult {
    let Some(mut best) = best else {
        tracing::warn!("no initial solution to refine; greedy_refine cannot proceed");
        return RootSelectionResult::Infeasible;
    };

    let score_map: FxHashMap<NodeId, f64> = all_scores.into_iter().collect();
    let refine_ilp = IlpConfig {
        num_threads: cfg.num_threads as u32,
        ..cfg.ilp
    };

    loop {
        let mut removable: Vec<NodeId> = best.roots.iter().copied().filter(|&r| r != pre.root).collect();
        removable.sort_by_key(|n| OrderedFloat(score_map.get(n).copied().unwrap_or(0.0)));

        if removable.is_empty() {
            break;
        }

        let mut improved = false;
        for &to_remove in &removable {
            let mut temp_r = best.roots.clone();
            temp_r.remove(&to_remove);

            let outcome = solve_subgraph(
                graph,
                &temp_r,
                cfg.memory_capacity,
                cfg.cpu_capacity,
                cfg.concurrent_instances,
                &pre.all_nodes,
                &pre.predecessors,
                &pre.reachable_from,
                &refine_ilp,
            );

            if let Some(cost) = outcome.cost {
                if cost < best.cost {
                    tracing::info!(removed = to_remove.id(), cost, roots = temp_r.len(), "greedy refinement improved the solution");
                    best = Best {
                        cost,
                        roots: temp_r,
                        assignment: outcome.assignment,
                    };
                    improved = true;
                    break;
                }
            }
        }

        if !improved {
            break;
        }
    }

    RootSelectionResult::Found {
        cost: best.cost,
        roots: best.roots,
        assignment: best.assignment,
        limit_hit: false,
    }
}

fn run_combinatorial(
    graph: &Graph,
    pre: &Preprocessed,
    cfg: &OrchestratorConfig,
    has_selector: bool,
    candidate_pool: FxHashSet<NodeId>,
    mut best: Option<Best>,
) -> RootSelectionResult {
    let pool: Vec<NodeId> = candidate_pool.into_iter().collect();
    let mut tried_r_configs: FxHashSet<BTreeSet<NodeId>> = FxHashSet::default();
    let mut pruned_count = 0u64;
    let mut limit_hit = false;

    let worker_ilp = IlpConfig {
        num_threads: 1,
        ..cfg.ilp
    };

    for k in 1..=cfg.max_k {
        if limit_hit {
            break;
        }
        if pool.len() < k.saturating_sub(1) {
            continue;
        }

        let tuples: Vec<BTreeSet<NodeId>> = if k == 1 {
            vec![BTreeSet::from([pre.root])]
        } else {
            let k_minus_1 = k - 1;
            if k_minus_1 > pool.len() {
                continue;
            }

            let num_combinations = binomial(pool.len() as u64, k_minus_1 as u64);
            if !has_selector {
                if let Some(threshold) = cfg.max_combinations_threshold {
                    if num_combinations > threshold {
                        tracing::info!(k, num_combinations, "stopping enumeration: combination threshold exceeded");
                        limit_hit = true;
                        break;
                    }
                }
            }

            combinations(&pool, k_minus_1)
                .into_iter()
                .map(|combo| {
                    let mut set = BTreeSet::from([pre.root]);
                    set.extend(combo);
                    set
                })
                .collect()
        };

        let unique_tuples: Vec<BTreeSet<NodeId>> = tuples
            .into_iter()
            .filter(|t| tried_r_configs.insert(t.clone()))
            .collect();

        if unique_tuples.is_empty() {
            continue;
        }

        let results = evaluate_tuples_in_parallel(
            graph,
            unique_tuples,
            cfg.memory_capacity,
            cfg.cpu_capacity,
            cfg.concurrent_instances,
            &pre.all_nodes,
            &pre.predecessors,
            &pre.reachable_from,
            &worker_ilp,
            cfg.num_threads.max(1),
        );

        for (r_tuple, outcome) in results {
            if outcome.status == SolverStatus::Infeasible && outcome.cost.is_none() {
                pruned_count += 1;
                continue;
            }
            if let Some(cost) = outcome.cost {
                let is_better = best.as_ref().map(|b| cost < b.cost).unwrap_or(true);
                if is_better {
                    tracing::info!(cost, roots = r_tuple.len(), "new best solution found");
                    best = Some(Best {
                        cost,
                        roots: r_tuple.into_iter().collect(),
                        assignment: outcome.assignment,
                    });
                }
            }
        }
    }

    if pruned_count > 0 {
        tracing::info!(pruned_count, "pruned provably infeasible root sets in parallel");
    }

    match best {
        Some(best) => RootSelectionResult::Found {
            cost: best.cost,
            roots: best.roots,
            assignment: best.assignment,
            limit_hit,
        },
        None => RootSelectionResult::Infeasible,
    }
}

#[allow(clippy::too_many_arguments)]
fn evaluate_tuples_in_parallel(
    graph: &Graph,
    tuples: Vec<BTreeSet<NodeId>>,
    memory_capacity: f64,
    cpu_capacity: f64,
    concurrent_instances: u32,
    all_nodes: &[NodeId],
    predecessors: &FxHashMap<NodeId, Vec<NodeId>>,
    reachable_from: &FxHashMap<NodeId, FxHashSet<NodeId>>,
    ilp: &IlpConfig,
    num_workers: usize,
) -> Vec<(BTreeSet<NodeId>, crate::ilp::SolveOutcome)> {
    let (job_tx, job_rx) = crossbeam::channel::unbounded::<BTreeSet<NodeId>>();
    for t in tuples {
        let _ = job_tx.send(t);
    }
    drop(job_tx);

    let results = Mutex::new(Vec::new());

    std::thread::scope(|scope| {
        for _ in 0..num_workers {
            let job_rx = job_rx.clone();
            let results = &results;
            scope.spawn(move || {
                while let Ok(r_tuple) = job_rx.recv() {
                    let roots: FxHashSet<NodeId> = r_tuple.iter().copied().collect();
                    let outcome = solve_subgraph(
                        graph,
                        &roots,
                        memory_capacity,
                        cpu_capacity,
                        concurrent_instances,
                        all_nodes,
                        predecessors,
                        reachable_from,
                        ilp,
                    );
                    results.lock().push((r_tuple, outcome));
                }
            });
        }
    });

    results.into_inner()
}

/// n-choose-k, saturating at `u64::MAX` instead of overflowing -- used only
/// to decide whether to stop enumerating, never as an exact count.
fn binomial(n: u64, k: u64) -> u64 {
    if k > n {
        return 0;
    }
    let k = k.min(n - k);
    let mut result: u64 = 1;
    for i in 0..k {
        result = match result.checked_mul(n - i) {
            Some(v) => v / (i + 1),
            None => return u64::MAX,
        };
    }
    result
}

/// All k-combinations of `items`, as plain `Vec<NodeId>` subsets.
fn combinations(items: &[NodeId], k: usize) -> Vec<Vec<NodeId>> {
    if k == 0 {
        return vec![Vec::new()];
    }
    if k > items.len() {
        return Vec::new();
    }

    let mut result = Vec::new();
    let mut indices: Vec<usize> = (0..k).collect();
    loop {
        result.push(indices.iter().map(|&i| items[i]).collect());

        let mut i = k;
        loop {
            if i == 0 {
                return result;
            }
            i -= 1;
            if indices[i] != i + items.len() - k {
                break;
            }
        }
        indices[i] += 1;
        for j in (i + 1)..k {
            indices[j] = indices[j - 1] + 1;
        }
    }
}

// ############################################################################
// #### TESTS #################################################################
// ############################################################################

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binomial_matches_known_values() {
        assert_eq!(1, binomial(5, 0));
        assert_eq!(5, binomial(5, 1));
        assert_eq!(10, binomial(5, 2));
        assert_eq!(10, binomial(5, 3));
        assert_eq!(1, binomial(5, 5));
        assert_eq!(0, binomial(3, 5));
    }

    #[test]
    fn combinations_enumerates_every_subset() {
        let items = vec![NodeId(1), NodeId(2), NodeId(3)];
        let combos = combinations(&items, 2);
        assert_eq!(3, combos.len());
        assert!(combos.contains(&vec![NodeId(1), NodeId(2)]));
        assert!(combos.contains(&vec![NodeId(1), NodeId(3)]));
        assert!(combos.contains(&vec![NodeId(2), NodeId(3)]));
    }

    #[test]
    fn zero_sized_combination_is_the_empty_set() {
        let items = vec![NodeId(1), NodeId(2)];
        assert_eq!(vec![Vec::<NodeId>::new()], combinations(&items, 0));
    }
}
