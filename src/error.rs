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

//! Errors raised by this crate. Infeasibility of a merge request is *not*
//! represented here -- it is a normal, expected outcome of the solver and is
//! reported through [`crate::orchestrator::RootSelectionResult::Infeasible`]
//! instead. The variants below are reserved for malformed input: a caller
//! handed us something that isn't a valid rooted DAG.

use crate::NodeId;

/// Failures that can occur while validating or preprocessing a workflow
/// graph, before any optimization is attempted.
#[derive(Debug, thiserror::Error)]
pub enum MergeSolverError {
    /// The graph contains a cycle; an rDAG must be acyclic.
    #[error("graph contains a cycle; an rDAG must be acyclic")]
    NotADag,

    /// No node has in-degree 0, so there is no candidate root.
    #[error("graph has no node with in-degree 0")]
    NoRoot,

    /// More than one node has in-degree 0; the root is ambiguous.
    #[error("graph has multiple in-degree-0 nodes: {0:?}")]
    MultipleRoots(Vec<NodeId>),
}
