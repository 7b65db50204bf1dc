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

//! # rdag-merge-solver
//! A solver for the serverless function-merging problem: given a workflow
//! modeled as a rooted DAG (rDAG) of functions calling one another, decide
//! which functions should be co-deployed ("merged") into the same container
//! so as to minimize cross-container call overhead, subject to per-container
//! memory and CPU capacity.
//!
//! The crate is organized around three layers:
//! - [`graph`]: the workflow data model and the preprocessing pass that
//!   validates a graph is a proper rDAG and builds the lookup tables the
//!   rest of the solver needs (reachability, predecessors).
//! - [`heuristics`]: the Downstream Impact Heuristic and the Weighted
//!   In-Degree heuristic, both GRASP-randomized candidate-root scorers.
//! - [`ilp`] and [`prune`]: the exact subgraph-construction ILP and the
//!   cheap, unsound aggressive pruner used to fast-fail obviously
//!   infeasible candidate root sets.
//! - [`orchestrator`]: ties the above together into the two root-selection
//!   strategies -- exhaustive combinatorial search and greedy refinement.
//!
//! ## Quick Example
//! The following merges a three-node linear chain into a single container
//! whenever the combined resource footprint fits.
//!
//! ```
//! use rdag_merge_solver::*;
//!
//! let graph = GraphBuilder::new()
//!     .node(NodeId(0), NodeAttrs { memory: 10.0, cpu: 10.0 })
//!     .node(NodeId(1), NodeAttrs { memory: 10.0, cpu: 10.0 })
//!     .node(NodeId(2), NodeAttrs { memory: 10.0, cpu: 10.0 })
//!     .edge(NodeId(0), NodeId(1), EdgeAttrs { weight: 100, kind: EdgeKind::Sync })
//!     .edge(NodeId(1), NodeId(2), EdgeAttrs { weight: 100, kind: EdgeKind::Sync })
//!     .finish();
//!
//! let pre = preprocess(&graph).expect("graph is a valid rDAG");
//!
//! let cfg = OrchestratorConfig {
//!     memory_capacity: 15.0,
//!     cpu_capacity: 15.0,
//!     concurrent_instances: 1,
//!     max_k: 3,
//!     mode: Mode::Combinatorial,
//!     num_threads: 1,
//!     ..Default::default()
//! };
//!
//! let mut rng = GraspRng::from_seed(0);
//! match run_root_selection("Optimal", &graph, &pre, None, &cfg, &mut rng) {
//!     RootSelectionResult::Found { cost, roots, .. } => {
//!         assert_eq!(200.0, cost);
//!         assert_eq!(3, roots.len());
//!     }
//!     RootSelectionResult::Infeasible => panic!("expected a feasible merge"),
//! }
//! ```

mod common;
mod error;
mod graph;
pub mod heuristics;
mod ilp;
mod orchestrator;
mod prune;

pub use common::*;
pub use error::*;
pub use graph::*;
pub use heuristics::downstream_impact::{DihConfig, DihConfigBuilder, DownstreamImpactSelector};
pub use heuristics::weighted_degree::{WeightedDegreeSelector, WidConfig, WidConfigBuilder};
pub use heuristics::{CandidateSelector, GraspRng};
pub use ilp::*;
pub use orchestrator::*;
pub use prune::aggressive_prune;
