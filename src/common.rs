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

//! This module defines the most basic data types that are used throughout all
//! the code of our library (both at the graph and solver levels). These are
//! also the types your client library is likely to work with.

use std::num::NonZeroU32;

// ----------------------------------------------------------------------------
// --- NODE ID ------------------------------------------------------------
// ----------------------------------------------------------------------------
/// The identity of a node (a deployable function) in the workflow rDAG.
/// Callers that key their own functions by name, UUID, or some other type
/// are expected to intern those identities into a dense `NodeId` before
/// building a `Graph`; internally, every map in this crate is keyed by
/// `NodeId` so that lookups stay O(1) with a cheap hash.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, serde::Serialize, serde::Deserialize)]
pub struct NodeId(pub u32);
impl NodeId {
    #[inline]
    pub fn id(self) -> u32 {
        self.0
    }
}

// ----------------------------------------------------------------------------
// --- NODE / EDGE ATTRIBUTES ---------------------------------------------------
// ----------------------------------------------------------------------------
/// The resource footprint of a single function: memory and CPU cost, both
/// expressed in whatever unit the capacity constraints (`m`, `c`) of a
/// merge request use.
#[derive(Debug, Copy, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct NodeAttrs {
    /// Memory cost of invoking this function.
    pub memory: f64,
    /// CPU cost of invoking this function.
    pub cpu: f64,
}

/// Whether an edge represents a synchronous call (the caller blocks on the
/// callee) or an asynchronous one (the caller may have many invocations of
/// the callee in flight at once).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize)]
pub enum EdgeKind {
    Sync,
    Async,
}

/// The attributes carried by an edge `u -> v`: how often `u` invokes `v`
/// (`weight`) and whether those invocations are synchronous or async.
#[derive(Debug, Copy, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct EdgeAttrs {
    /// Number of times the source node invokes the target node.
    pub weight: u32,
    pub kind: EdgeKind,
}

// ----------------------------------------------------------------------------
// --- ASYNC PENALTY ------------------------------------------------------------
// ----------------------------------------------------------------------------
/// Peak number of concurrent in-flight invocations an async edge of the given
/// `weight` can produce once the caller and callee are merged into a single
/// deployable unit that serves `n` concurrent workflow instances.
///
/// `alpha_uv = ceil(weight / n)`. When `alpha_uv > 1`, the merged unit must be
/// provisioned for `alpha_uv` concurrent copies of the callee, which is what
/// the resource-capacity constraints in [`crate::ilp`] and the aggressive
/// pruner in [`crate::prune`] charge against `m`/`c`.
///
/// All three components share this single definition so they can never
/// disagree about how the penalty is computed.
#[inline]
pub fn async_alpha(weight: u32, n: u32) -> u64 {
    let n = NonZeroU32::new(n).map(|n| n.get() as u64).unwrap_or(1);
    let weight = weight as u64;
    weight.div_ceil(n)
}

/// The extra resource cost incurred by merging an async edge `u -> v` of the
/// given `weight` and per-invocation `resource_cost`, given `n` concurrent
/// workflow instances. Zero when `alpha_uv <= 1` (no extra concurrent copies
/// are required).
#[inline]
pub fn async_penalty(weight: u32, n: u32, resource_cost: f64) -> f64 {
    let alpha = async_alpha(weight, n);
    if alpha > 1 {
        (alpha - 1) as f64 * resource_cost
    } else {
        0.0
    }
}

// ############################################################################
// #### TESTS #################################################################
// ############################################################################


#[cfg(test)]
mod test_async_penalty {
    use super::{async_alpha, async_penalty};

    #[test]
    fn alpha_is_ceil_division() {
        assert_eq!(1, async_alpha(5, 5));
        assert_eq!(2, async_alpha(6, 5));
        assert_eq!(1, async_alpha(1, 5));
        assert_eq!(10, async_alpha(10, 1));
    }

    #[test]
    fn no_penalty_when_alpha_is_one() {
        assert_eq!(0.0, async_penalty(5, 5, 10.0));
        assert_eq!(0.0, async_penalty(1, 100, 10.0));
    }

    #[test]
    fn penalty_scales_with_extra_concurrent_copies() {
        // weight=11, n=5 -> alpha = ceil(11/5) = 3 -> 2 extra copies
        assert_eq!(20.0, async_penalty(11, 5, 10.0));
    }
}
