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

//! The subgraph-construction ILP: given a candidate root set `R`, assigns
//! every node to one or more subgraphs rooted in `R` so as to minimize
//! cross-subgraph call weight, subject to connectivity and per-subgraph
//! resource capacity constraints.

use std::time::Duration;

use fxhash::{FxHashMap, FxHashSet};
use good_lp::solvers::highs::{highs, HighsModelStatus};
use good_lp::{constraint, variable, Expression, ProblemVariables, ResolutionError, Solution, SolverModel, Variable};

use crate::{async_alpha, EdgeKind, Graph, NodeId};

/// Tuning knobs for a single ILP solve. Defaults mirror the silent,
/// single-threaded configuration used by the per-tuple workers in
/// [`crate::orchestrator`]'s combinatorial mode; `greedy_refine` mode
/// overrides `num_threads` to hand the lone solve every available thread.
#[derive(Debug, Clone, Copy, derive_builder::Builder)]
#[builder(default)]
pub struct IlpConfig {
    pub time_limit: Option<Duration>,
    pub mip_gap: f64,
    /// Solver-specific search-focus knob. HiGHS has no direct equivalent of
    /// Gurobi's MIPFocus; a non-zero value is accepted and logged but has no
    /// effect on the solve (see DESIGN.md).
    pub mip_focus: u32,
    pub num_threads: u32,
}

impl Default for IlpConfig {
    fn default() -> Self {
        Self {
            time_limit: None,
            mip_gap: 0.0,
            mip_focus: 0,
            num_threads: 1,
        }
    }
}

/// The outcome of a single ILP solve attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SolverStatus {
    Optimal,
    /// A feasible solution was found but optimality wasn't proven (time
    /// limit hit, or the backend reported a non-standard status while still
    /// returning a solution).
    Suboptimal,
    TimeLimit,
    Infeasible,
}

/// The `(node, root)` pairs with `y = 1` in the solution.
pub type Assignment = FxHashSet<(NodeId, NodeId)>;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SolveOutcome {
    pub status: SolverStatus,
    /// Present whenever an incumbent could be recovered, even if `status`
    /// is [`SolverStatus::TimeLimit`] or [`SolverStatus::Suboptimal`]. A
    /// `TimeLimit` result can still carry `None` if HiGHS stopped without
    /// the underlying solver API exposing its incumbent.
    pub cost: Option<f64>,
    pub assignment: Assignment,
}

impl SolveOutcome {
    fn infeasible() -> Self {
        Self {
            status: SolverStatus::Infeasible,
            cost: None,
            assignment: Assignment::default(),
        }
    }
}

/// Builds and solves the subgraph-construction ILP for the given candidate
/// root set.
///
/// `all_nodes`, `predecessors`, and `reachable_from` are the tables produced
/// once by [`crate::graph::preprocess`] and reused across every call, since
/// they don't depend on `roots`.
#[allow(clippy::too_many_arguments)]
pub fn solve_subgraph(
    graph: &Graph,
    roots: &FxHashSet<NodeId>,
    memory_capacity: f64,
    cpu_capacity: f64,
    concurrent_instances: u32,
    all_nodes: &[NodeId],
    predecessors: &FxHashMap<NodeId, Vec<NodeId>>,
    reachable_from: &FxHashMap<NodeId, FxHashSet<NodeId>>,
    cfg: &IlpConfig,
) -> SolveOutcome {
    let span = tracing::debug_span!("solve_subgraph", roots = roots.len());
    let _enter = span.enter();

    let valid_roots: FxHashSet<NodeId> = roots
        .iter()
        .copied()
        .filter(|r| reachable_from.contains_key(r))
        .collect();

    if valid_roots.is_empty() && !roots.is_empty() {
        return SolveOutcome::infeasible();
    }

    if cfg.mip_focus > 0 {
        tracing::debug!(mip_focus = cfg.mip_focus, "mip_focus has no HiGHS equivalent; ignored");
    }

    let mut vars = ProblemVariables::new();
    let mut y: FxHashMap<(NodeId, NodeId), Variable> = FxHashMap::default();
    for &r in &valid_roots {
        if let Some(reach) = reachable_from.get(&r) {
            for &i in reach {
                y.insert((i, r), vars.add(variable().binary()));
            }
        }
    }

    let async_edges: Vec<(NodeId, NodeId, u32)> = all_nodes
        .iter()
        .flat_map(|&u| {
            graph
                .successors(u)
                .filter(|(_, attrs)| matches!(attrs.kind, EdgeKind::Async))
                .map(move |(v, attrs)| (u, v, attrs.weight))
        })
        .collect();

    let mut z: FxHashMap<(NodeId, NodeId, NodeId), Variable> = FxHashMap::default();
    for &(u, v, _) in &async_edges {
        for &r in &valid_roots {
            if y.contains_key(&(u, r)) && y.contains_key(&(v, r)) {
                z.insert((u, v, r), vars.add(variable().binary()));
            }
        }
    }

    // Objective: total potential cross-subgraph cost minus the savings from
    // internalizing edges whose target is a root.
    let mut total_potential_cost = 0.0;
    let mut cost_savings = Expression::from(0.0);
    for &u in all_nodes {
        for (v, attrs) in graph.successors(u) {
            if valid_roots.contains(&v) {
                total_potential_cost += attrs.weight as f64;
                if let Some(&var) = y.get(&(u, v)) {
                    cost_savings += attrs.weight as f64 * var;
                }
            }
        }
    }
    let objective = total_potential_cost - cost_savings;

    // `using(highs)` returns a consuming builder: every setter below takes
    // `self` by value and hands back the configured problem, so the chain
    // has to be threaded through a single reassigned binding rather than
    // called as discarded statements.
    let mut problem = vars
        .minimise(objective.clone())
        .using(highs)
        .set_time_limit(cfg.time_limit.map(|d| d.as_secs_f64()).unwrap_or(f64::MAX))
        // Silent logging: no solver chatter should ever reach the caller's stdout.
        .set_verbose(false)
        .set_mip_rel_gap(cfg.mip_gap)
        .set_threads(cfg.num_threads.max(1));

    // Constraint 1: root inclusion.
    for &r in &valid_roots {
        if let Some(&var) = y.get(&(r, r)) {
            problem = problem.with(constraint!(var == 1));
        }
    }

    // Constraint 2: node coverage (>= 1 permits duplication across subgraphs).
    for &i in all_nodes {
        let covering: Expression = valid_roots
            .iter()
            .filter_map(|&r| y.get(&(i, r)))
            .map(|&v| Expression::from(v))
            .sum();
        if covering.linear.coefficients.is_empty() {
            // `i` is unreachable from every candidate root: infeasible by construction.
            return SolveOutcome::infeasible();
        }
        problem = problem.with(constraint!(covering >= 1));
    }

    // Constraint 3: connectivity -- a node in G_r needs a predecessor in G_r.
    for &r in &valid_roots {
        for &i in reachable_from.get(&r).into_iter().flatten() {
            if i == r {
                continue;
            }
            let preds = predecessors.get(&i).cloned().unwrap_or_default();
            let pred_sum: Expression = preds
                .iter()
                .filter_map(|p| y.get(&(*p, r)))
                .map(|&v| Expression::from(v))
                .sum();
            if let Some(&y_ir) = y.get(&(i, r)) {
                if pred_sum.linear.coefficients.is_empty() {
                    problem = problem.with(constraint!(y_ir == 0));
                } else {
                    problem = problem.with(constraint!(y_ir <= pred_sum));
                }
            }
        }
    }

    // Constraint 4: cross-edge rule -- an edge into a non-root target must
    // stay internal to whatever subgraph the source is in.
    for &u in all_nodes {
        for (v, _) in graph.successors(u) {
            if valid_roots.contains(&v) {
                continue;
            }
            for &r in &valid_roots {
                if let (Some(&y_ur), Some(&y_vr)) = (y.get(&(u, r)), y.get(&(v, r))) {
                    problem = problem.with(constraint!(y_ur <= y_vr));
                }
            }
        }
    }

    // Constraints 5 & 6: per-root memory/CPU capacity, including the async penalty.
    for &r in &valid_roots {
        let mem_sum: Expression = y
            .iter()
            .filter(|((_, rr), _)| *rr == r)
            .filter_map(|((i, _), &v)| graph.attrs(*i).map(|a| a.memory * v))
            .sum();
        let cpu_sum: Expression = y
            .iter()
            .filter(|((_, rr), _)| *rr == r)
            .filter_map(|((i, _), &v)| graph.attrs(*i).map(|a| a.cpu * v))
            .sum();

        let mut async_mem = Expression::from(0.0);
        let mut async_cpu = Expression::from(0.0);
        for (&(u, v, r_of_z), &z_var) in z.iter() {
            if r_of_z != r {
                continue;
            }
            let weight = async_edges
                .iter()
                .find(|&&(au, av, _)| au == u && av == v)
                .map(|&(_, _, w)| w)
                .unwrap_or(0);
            let alpha = async_alpha(weight, concurrent_instances);
            if alpha > 1 {
                if let Some(v_attrs) = graph.attrs(v) {
                    async_mem += v_attrs.memory * (alpha - 1) as f64 * z_var;
                    async_cpu += v_attrs.cpu * (alpha - 1) as f64 * z_var;
                }
            }
        }

        problem = problem.with(constraint!(mem_sum + async_mem <= memory_capacity));
        problem = problem.with(constraint!(cpu_sum + async_cpu <= cpu_capacity));
    }

    // Constraint 7: linearize z(u, v, r) == y(u, r) AND y(v, r).
    for (&(u, v, r), &z_var) in z.iter() {
        let y_ur = y[&(u, r)];
        let y_vr = y[&(v, r)];
        problem = problem.with(constraint!(z_var <= y_ur));
        problem = problem.with(constraint!(z_var <= y_vr));
        problem = problem.with(constraint!(z_var >= y_ur + y_vr - 1));
    }

    match problem.solve() {
        Ok(solution) => {
            let assignment: Assignment = y
                .iter()
                .filter(|&(_, &var)| solution.value(var) > 0.9)
                .map(|(&(i, r), _)| (i, r))
                .collect();
            let cost = total_potential_cost
                - y.iter()
                    .filter(|&(&(i, r), _)| graph.successors(i).any(|(v, _)| v == r))
                    .map(|(&(i, r), &var)| {
                        graph
                            .successors(i)
                            .find(|(v, _)| *v == r)
                            .map(|(_, attrs)| attrs.weight as f64 * solution.value(var))
                            .unwrap_or(0.0)
                    })
                    .sum::<f64>();
            let status = match solution.status() {
                HighsModelStatus::Optimal => SolverStatus::Optimal,
                HighsModelStatus::TimeLimit => SolverStatus::TimeLimit,
                _ => SolverStatus::Suboptimal,
            };
            tracing::debug!(cost, "solve_subgraph found a feasible assignment");
            SolveOutcome {
                status,
                cost: Some(cost),
                assignment,
            }
        }
        // `good_lp`'s `SolverModel::solve` only distinguishes a proven
        // `Infeasible`/`Unbounded` model from everything else; a time-limited
        // or otherwise non-optimal-but-feasible HiGHS run that stops without
        // that proof still surfaces here as `Err`, with no incumbent
        // attached to recover. Only the proven cases are reported infeasible
        // -- anything else is an unresolved time limit, not a disproof.
        Err(ResolutionError::Infeasible) | Err(ResolutionError::Unbounded) => SolveOutcome::infeasible(),
        Err(other) => {
            tracing::warn!(error = %other, "ILP solve stopped without proving optimality or infeasibility");
            SolveOutcome {
                status: SolverStatus::TimeLimit,
                cost: None,
                assignment: Assignment::default(),
            }
        }
    }
}

// ############################################################################
// #### TESTS #################################################################
// ############################################################################

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::preprocess;
    use crate::{EdgeAttrs, GraphBuilder, NodeAttrs};

    fn attrs(memory: f64, cpu: f64) -> NodeAttrs {
        NodeAttrs { memory, cpu }
    }

    fn sync(weight: u32) -> EdgeAttrs {
        EdgeAttrs {
            weight,
            kind: EdgeKind::Sync,
        }
    }

    #[test]
    fn single_root_everything_assigned_is_feasible() {
        let g = GraphBuilder::new()
            .node(NodeId(0), attrs(1.0, 1.0))
            .node(NodeId(1), attrs(1.0, 1.0))
            .node(NodeId(2), attrs(1.0, 1.0))
            .edge(NodeId(0), NodeId(1), sync(1))
            .edge(NodeId(1), NodeId(2), sync(1))
            .finish();
        let pre = preprocess(&g).unwrap();
        let roots: FxHashSet<NodeId> = [NodeId(0)].into_iter().collect();
        let outcome = solve_subgraph(
            &g,
            &roots,
            100.0,
            100.0,
            1,
            &pre.all_nodes,
            &pre.predecessors,
            &pre.reachable_from,
            &IlpConfig::default(),
        );
        assert_eq!(SolverStatus::Optimal, outcome.status);
        assert_eq!(Some(0.0), outcome.cost);
    }

    #[test]
    fn capacity_too_small_for_a_single_node_is_infeasible() {
        let g = GraphBuilder::new()
            .node(NodeId(0), attrs(100.0, 100.0))
            .finish();
        let pre = preprocess(&g).unwrap();
        let roots: FxHashSet<NodeId> = [NodeId(0)].into_iter().collect();
        let outcome = solve_subgraph(
            &g,
            &roots,
            1.0,
            1.0,
            1,
            &pre.all_nodes,
            &pre.predecessors,
            &pre.reachable_from,
            &IlpConfig::default(),
        );
        assert_eq!(SolverStatus::Infeasible, outcome.status);
    }
}
