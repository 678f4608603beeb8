//! Flow-function contracts
//!
//! A flow function maps one fact to the set of facts holding after an edge
//! of the exploded super-graph. The provider hands out one function per
//! graph edge kind; implementations are expected to be stateless or
//! internally synchronized since workers query them concurrently.

use std::sync::Arc;

use rustc_hash::FxHashSet;

use super::fact::DataflowFact;
use super::icfg::InterproceduralCfg;
use super::state::SolverState;

/// Maps one fact to the facts holding after an edge: `D -> 2^D`
pub trait FlowFunction<N, D>: Send + Sync
where
    D: DataflowFact,
{
    /// Compute the facts holding after this edge for the given state
    fn compute_targets(&self, state: &SolverState<N, D>) -> FxHashSet<D>;

    /// Return-flow variant that additionally sees the caller-side facts at
    /// the call site. Defaults to ignoring them.
    fn compute_return_targets(
        &self,
        state: &SolverState<N, D>,
        _caller_side_facts: &[D],
    ) -> FxHashSet<D> {
        self.compute_targets(state)
    }
}

/// Provider of flow functions for the four edge kinds of the exploded
/// super-graph
pub trait FlowFunctions<I, D>: Send + Sync
where
    I: InterproceduralCfg,
    D: DataflowFact,
{
    /// Intra-procedural edge `curr -> succ`
    fn normal_flow_function(
        &self,
        curr: &I::Node,
        succ: &I::Node,
    ) -> Arc<dyn FlowFunction<I::Node, D>>;

    /// Call edge `call_site -> callee entry`
    fn call_flow_function(
        &self,
        call_site: &I::Node,
        callee: &I::Method,
    ) -> Arc<dyn FlowFunction<I::Node, D>>;

    /// Return edge `exit_stmt -> return_site`. Both sites are `None` for
    /// the side-effect-only invocation on methods without any caller.
    fn return_flow_function(
        &self,
        call_site: Option<&I::Node>,
        callee: &I::Method,
        exit_stmt: &I::Node,
        return_site: Option<&I::Node>,
    ) -> Arc<dyn FlowFunction<I::Node, D>>;

    /// Pass-through edge `call_site -> return_site` for facts that bypass
    /// the callee
    fn call_to_return_flow_function(
        &self,
        call_site: &I::Node,
        return_site: &I::Node,
    ) -> Arc<dyn FlowFunction<I::Node, D>>;
}

/// Identity flow function: `f(d) = {d}`
pub struct IdentityFlowFunction;

impl<N, D: DataflowFact> FlowFunction<N, D> for IdentityFlowFunction {
    fn compute_targets(&self, state: &SolverState<N, D>) -> FxHashSet<D> {
        FxHashSet::from_iter([state.target_fact.clone()])
    }
}

/// Kill flow function: `f(d) = {}`
pub struct KillFlowFunction;

impl<N, D: DataflowFact> FlowFunction<N, D> for KillFlowFunction {
    fn compute_targets(&self, _state: &SolverState<N, D>) -> FxHashSet<D> {
        FxHashSet::default()
    }
}

/// Gen flow function: `f(d) = {d, gen_fact}`
pub struct GenFlowFunction<D> {
    pub gen_fact: D,
}

impl<N, D: DataflowFact> FlowFunction<N, D> for GenFlowFunction<D> {
    fn compute_targets(&self, state: &SolverState<N, D>) -> FxHashSet<D> {
        FxHashSet::from_iter([state.target_fact.clone(), self.gen_fact.clone()])
    }
}
