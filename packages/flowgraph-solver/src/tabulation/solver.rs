//! Concurrent IFDS tabulation solver
//!
//! Worklist-based tabulation with summary bookkeeping:
//!
//! 1. Seeds enter as path edges `(zero, n, d)`
//! 2. Each newly recorded path edge becomes one pool task
//! 3. Tasks dispatch on the target statement: call, exit or normal flow
//! 4. Call sites register caller contexts in the incoming table and reuse
//!    end summaries instead of re-descending into known callees
//! 5. Exits register end summaries and wire return flows back to every
//!    recorded caller context
//! 6. The fixed point is reached when the pool is quiescent
//!
//! The incoming/end-summary handshake (insert incoming then read summaries,
//! insert summary then read incoming) guarantees that for every pair of
//! entries at least one worker observes both, whatever the interleaving.
//!
//! References:
//! - Reps, Horwitz, Sagiv (1995): "Precise Interprocedural Dataflow
//!   Analysis via Graph Reachability"
//! - Naeem, Lhotak, Rodriguez (2010): "Practical Extensions to the IFDS
//!   Algorithm"

use std::fmt;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashSet;
use parking_lot::{Mutex, RwLock};
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, error, info, warn};

use crate::errors::{Result, SolverError};
use crate::shared::executor::InterruptibleExecutor;

use super::fact::DataflowFact;
use super::flow::{FlowFunction, FlowFunctions};
use super::flow_cache::{FlowCacheStats, FlowFunctionCache};
use super::icfg::InterproceduralCfg;
use super::memory::MemoryManager;
use super::problem::TabulationProblem;
use super::state::{
    PathEdge, PredecessorShorteningMode, SolverDirection, SolverPhase, SolverState,
};
use super::tables::{EndSummaryTable, IncomingFlags, IncomingTable, JumpFunctions};

/// Skip the callee branch of call sites with more possible callees than
/// this; negative disables the cap
const DEFAULT_MAX_CALLEES_PER_CALL_SITE: i64 = 75;

/// Drop abstractions whose path length exceeds this; negative disables
const DEFAULT_MAX_ABSTRACTION_PATH_LENGTH: i64 = 100;

/// Why a solver was terminated from the outside
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminationReason {
    /// A memory watchdog crossed its threshold
    MemoryExhausted,

    /// The time budget was exhausted
    TimedOut,

    /// Externally requested abort
    Aborted(String),
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationReason::MemoryExhausted => write!(f, "memory threshold reached"),
            TerminationReason::TimedOut => write!(f, "time budget exhausted"),
            TerminationReason::Aborted(cause) => write!(f, "aborted: {cause}"),
        }
    }
}

/// Observer of solver lifecycle events. Listeners may be added while a
/// solve is running; removal is not supported.
pub trait SolverStatusListener: Send + Sync {
    fn solver_started(&self);
    fn solver_terminated(&self);
}

/// The concurrent tabulation solver
///
/// Created via [`TabulationSolver::new`], which hands out an `Arc` because
/// worker tasks share the solver. Configuration setters take `&self` and
/// may be called before or between solves.
pub struct TabulationSolver<I, D>
where
    I: InterproceduralCfg,
    D: DataflowFact,
{
    this: Weak<Self>,

    icfg: Arc<I>,
    flow_functions: Arc<FlowFunctionCache<I, D>>,
    zero_value: D,
    initial_seeds: FxHashMap<I::Node, FxHashSet<D>>,
    follow_returns_past_seeds: bool,

    jump_functions: JumpFunctions<I::Node, D>,
    end_summary: EndSummaryTable<I::Method, I::Node, D>,
    incoming: IncomingTable<I::Method, I::Node, D>,

    /// Path edges that entered the tables as unbalanced returns
    unbalanced_returns: DashSet<PathEdge<I::Node, D>>,

    executor: RwLock<Arc<InterruptibleExecutor>>,
    kill_flag: RwLock<Option<TerminationReason>>,
    listeners: Mutex<Vec<Arc<dyn SolverStatusListener>>>,

    memory_manager: RwLock<Option<Arc<dyn MemoryManager<D>>>>,
    solver_phase: RwLock<SolverPhase>,
    direction: RwLock<SolverDirection>,

    /// Reserved; stored for collaborators but without effect here
    shortening_mode: RwLock<PredecessorShorteningMode>,

    max_callees_per_call_site: AtomicI64,
    max_abstraction_path_length: AtomicI64,

    /// Reserved; stored for collaborators but without effect here
    max_join_point_abstractions: AtomicI64,

    propagation_count: AtomicU64,
}

impl<I, D> TabulationSolver<I, D>
where
    I: InterproceduralCfg,
    D: DataflowFact,
{
    /// Create a solver with the default pool of `max(1, cores - 1)`
    /// worker threads
    pub fn new(problem: &impl TabulationProblem<I, D>) -> Result<Arc<Self>> {
        let executor = Arc::new(InterruptibleExecutor::with_default_pool()?);
        Self::with_executor(problem, executor)
    }

    /// Create a solver running on the given executor
    pub fn with_executor(
        problem: &impl TabulationProblem<I, D>,
        executor: Arc<InterruptibleExecutor>,
    ) -> Result<Arc<Self>> {
        let flow_functions = Arc::new(FlowFunctionCache::new(problem.flow_functions()));
        Ok(Arc::new_cyclic(|this| Self {
            this: this.clone(),
            icfg: problem.interprocedural_cfg(),
            flow_functions,
            zero_value: problem.zero_value(),
            initial_seeds: problem.initial_seeds(),
            follow_returns_past_seeds: problem.follow_returns_past_seeds(),
            jump_functions: JumpFunctions::new(),
            end_summary: EndSummaryTable::new(),
            incoming: IncomingTable::new(),
            unbalanced_returns: DashSet::new(),
            executor: RwLock::new(executor),
            kill_flag: RwLock::new(None),
            listeners: Mutex::new(Vec::new()),
            memory_manager: RwLock::new(None),
            solver_phase: RwLock::new(SolverPhase::default()),
            direction: RwLock::new(SolverDirection::default()),
            shortening_mode: RwLock::new(PredecessorShorteningMode::default()),
            max_callees_per_call_site: AtomicI64::new(DEFAULT_MAX_CALLEES_PER_CALL_SITE),
            max_abstraction_path_length: AtomicI64::new(DEFAULT_MAX_ABSTRACTION_PATH_LENGTH),
            max_join_point_abstractions: AtomicI64::new(-1),
            propagation_count: AtomicU64::new(0),
        }))
    }

    /// Run the tabulation to its fixed point
    ///
    /// Clears the kill flag, purges stale phase-one summaries when in the
    /// second phase, submits the seeds and blocks until the pool is
    /// quiescent. The executor is shut down afterwards; install a fresh one
    /// via [`set_executor`](Self::set_executor) before solving again.
    pub fn solve(&self) -> Result<()> {
        self.reset();

        if *self.solver_phase.read() == SolverPhase::Second {
            self.end_summary.purge_with_source_context();
        }

        let listeners: Vec<_> = self.listeners.lock().clone();
        for listener in &listeners {
            listener.solver_started();
        }

        let direction = *self.direction.read();
        info!(?direction, seed_stmts = self.initial_seeds.len(), "tabulation started");

        self.submit_initial_seeds();

        let executor = self.executor.read().clone();
        let completion = executor.await_completion();

        let stats = self.flow_cache_stats();
        debug!(
            hits = stats.hits(),
            misses = stats.misses(),
            sheds = stats.sheds(),
            "flow cache statistics"
        );

        for listener in &listeners {
            listener.solver_terminated();
        }

        executor.shutdown();
        executor.await_termination();

        match completion {
            Ok(()) => {
                info!(
                    ?direction,
                    propagations = self.propagation_count(),
                    jump_edges = self.jump_functions.len(),
                    "tabulation finished"
                );
                Ok(())
            }
            Err(failure) => {
                error!(?direction, %failure, "tabulation abandoned");
                Err(SolverError::TaskFailed(failure))
            }
        }
    }

    /// Propagate each seed `(n, d)` as the path edge `(zero, n, d)`
    fn submit_initial_seeds(&self) {
        for (node, facts) in &self.initial_seeds {
            for fact in facts {
                self.propagate(
                    SolverState::new(self.zero_value.clone(), node.clone(), fact.clone()),
                    None,
                    false,
                );
            }
        }
    }

    /// Dispatch one path edge. Runs on a pool worker.
    fn process_edge(&self, state: SolverState<I::Node, D>) {
        if self.icfg.is_call_stmt(&state.node) {
            self.process_call(&state);
        } else {
            // a statement such as "throw" can be an exit and still have
            // successors; it gets both treatments
            if self.icfg.is_exit_stmt(&state.node) {
                self.process_exit(&state);
            }
            if !self.icfg.succs_of(&state.node).is_empty() {
                self.process_normal_flow(&state);
            }
        }
    }

    /// Call-site processing: register caller contexts, reuse summaries,
    /// descend into fresh callees, and run call-to-return flows
    fn process_call(&self, state: &SolverState<I::Node, D>) {
        let call_site = &state.node;
        let d1 = &state.source_fact;
        let d2 = &state.target_fact;
        let memory_manager = self.memory_manager.read().clone();

        let return_sites = self.icfg.return_sites_of_call_at(call_site);

        let callees = self.icfg.callees_of_call_at(call_site);
        let max_callees = self.max_callees_per_call_site.load(Ordering::Relaxed);
        if max_callees < 0 || callees.len() <= max_callees as usize {
            for callee in callees.iter().filter(|m| self.icfg.is_concrete(m)) {
                if self.is_killed() {
                    break;
                }

                let function = self.flow_functions.call_flow_function(call_site, callee);
                let targets = self.compute_flow(&function, state);
                if targets.is_empty() {
                    continue;
                }

                let start_points = self.icfg.start_points_of(callee);
                for d3 in targets {
                    let Some(d3) = self.rewrite_generated(&memory_manager, d2, d3) else {
                        continue;
                    };

                    // register that (callee, d3) has an incoming edge from
                    // (call_site, d1, d2)
                    let flags = self.incoming.add(
                        callee.clone(),
                        d3.clone(),
                        call_site.clone(),
                        d1.clone(),
                        d2.clone(),
                    );
                    if !flags.contains(IncomingFlags::NEW_INCOMING) {
                        continue;
                    }

                    // a known summary makes re-analyzing the callee redundant
                    if self.apply_end_summary_on_call(state, &return_sites, callee, &d3) {
                        continue;
                    }

                    // another worker already started exploring this entry
                    if !flags.contains(IncomingFlags::NEW_CALLEE) {
                        continue;
                    }

                    for start_point in &start_points {
                        self.propagate(
                            SolverState::new(d3.clone(), start_point.clone(), d3.clone()),
                            Some(call_site),
                            false,
                        );
                    }
                }
            }
        }

        // intra-procedural flows along the call-to-return functions
        for return_site in &return_sites {
            let function = self
                .flow_functions
                .call_to_return_flow_function(call_site, return_site);
            for d3 in self.compute_flow(&function, state) {
                let Some(d3) = self.rewrite_generated(&memory_manager, d2, d3) else {
                    continue;
                };
                self.propagate(state.derive(return_site.clone(), d3), Some(call_site), false);
            }
        }
    }

    /// Wire every known exit of `(callee, entry_fact)` to the return sites
    /// of this call. Returns whether anything was propagated.
    fn apply_end_summary_on_call(
        &self,
        state: &SolverState<I::Node, D>,
        return_sites: &[I::Node],
        callee: &I::Method,
        entry_fact: &D,
    ) -> bool {
        let call_site = &state.node;
        let d1 = &state.source_fact;
        let memory_manager = self.memory_manager.read().clone();

        let mut has_propagated = false;
        for (exit_stmt, d4) in self.end_summary.summaries_for(callee, entry_fact) {
            for return_site in return_sites {
                let function = self.flow_functions.return_flow_function(
                    Some(call_site),
                    callee,
                    &exit_stmt,
                    Some(return_site),
                );
                let synthesized =
                    SolverState::new(entry_fact.clone(), return_site.clone(), d4.clone());
                let targets =
                    self.compute_return_flow(&function, &synthesized, std::slice::from_ref(d1));
                for d5 in targets {
                    let Some(d5) = self.rewrite_generated(&memory_manager, &d4, d5) else {
                        continue;
                    };
                    self.propagate(state.derive(return_site.clone(), d5), Some(call_site), false);
                    has_propagated = true;
                }
            }
        }
        has_propagated
    }

    /// Exit processing: register the end summary, then wire return flows
    /// to every recorded caller context
    fn process_exit(&self, state: &SolverState<I::Node, D>) {
        let exit_stmt = &state.node;
        let method = self.icfg.method_of(exit_stmt);
        let d1 = &state.source_fact;
        let d2 = &state.target_fact;

        // another worker already propagated this summary
        if !self
            .end_summary
            .add(method.clone(), d1.clone(), exit_stmt.clone(), d2.clone())
        {
            return;
        }

        let memory_manager = self.memory_manager.read().clone();
        let incoming = self.incoming.incoming_for(&method, d1);

        for (call_site, caller_contexts) in &incoming {
            if self.is_killed() {
                return;
            }

            let caller_side: Vec<D> = caller_contexts.iter().map(|(d4, _)| d4.clone()).collect();
            for return_site in self.icfg.return_sites_of_call_at(call_site) {
                let function = self.flow_functions.return_flow_function(
                    Some(call_site),
                    &method,
                    exit_stmt,
                    Some(&return_site),
                );
                let targets = self.compute_return_flow(&function, state, &caller_side);
                if targets.is_empty() {
                    continue;
                }
                for (d4, _) in caller_contexts {
                    for d5 in &targets {
                        let Some(d5) = self.rewrite_generated(&memory_manager, d2, d5.clone())
                        else {
                            continue;
                        };
                        self.propagate(
                            SolverState::new(d4.clone(), return_site.clone(), d5),
                            Some(call_site),
                            false,
                        );
                    }
                }
            }
        }

        // unbalanced problems: return out of a method with no incoming flow
        // recorded. Only zero-rooted values go past seeds; conditionally
        // generated values stay inside callers that have an incoming edge.
        if self.follow_returns_past_seeds && incoming.is_empty() && *d1 == self.zero_value {
            let callers = self.icfg.callers_of(&method);
            for call_site in &callers {
                for return_site in self.icfg.return_sites_of_call_at(call_site) {
                    let function = self.flow_functions.return_flow_function(
                        Some(call_site),
                        &method,
                        exit_stmt,
                        Some(&return_site),
                    );
                    let targets = self.compute_return_flow(
                        &function,
                        state,
                        std::slice::from_ref(&self.zero_value),
                    );
                    for d5 in targets {
                        let Some(d5) = self.rewrite_generated(&memory_manager, d2, d5) else {
                            continue;
                        };
                        self.propagate(
                            SolverState::new(self.zero_value.clone(), return_site.clone(), d5),
                            Some(call_site),
                            true,
                        );
                    }
                }
            }

            // with no caller at all the return statement would never be
            // visited; fire the flow function once for its side effects and
            // discard the outputs
            if callers.is_empty() {
                let function =
                    self.flow_functions
                        .return_flow_function(None, &method, exit_stmt, None);
                function.compute_targets(state);
            }
        }
    }

    /// Normal intra-procedural flow to every successor
    fn process_normal_flow(&self, state: &SolverState<I::Node, D>) {
        let memory_manager = self.memory_manager.read().clone();
        let d2 = &state.target_fact;

        for succ in self.icfg.succs_of(&state.node) {
            if self.is_killed() {
                return;
            }

            let function = self.flow_functions.normal_flow_function(&state.node, &succ);
            for d3 in self.compute_flow(&function, state) {
                let d3 = if let Some(manager) = &memory_manager {
                    if *d2 != d3 {
                        match manager.handle_generated_memory_object(d2, d3) {
                            Some(rewritten) => rewritten,
                            None => continue,
                        }
                    } else {
                        d3
                    }
                } else {
                    d3
                };
                self.propagate(state.derive(succ.clone(), d3), None, false);
            }
        }
    }

    /// Record the edge and schedule its processing exactly once
    ///
    /// The related call site is passed through for collaborators and not
    /// used by the core itself.
    fn propagate(
        &self,
        state: SolverState<I::Node, D>,
        _related_call_site: Option<&I::Node>,
        is_unbalanced_return: bool,
    ) {
        let mut state = state;

        if let Some(manager) = self.memory_manager.read().clone() {
            let SolverState {
                source_fact,
                node,
                target_fact,
            } = state;
            let Some(source_fact) = manager.handle_memory_object(source_fact) else {
                return;
            };
            let Some(target_fact) = manager.handle_memory_object(target_fact) else {
                return;
            };
            state = SolverState {
                source_fact,
                node,
                target_fact,
            };
        }

        let max_path_length = self.max_abstraction_path_length.load(Ordering::Relaxed);
        if max_path_length >= 0 && state.target_fact.path_length() > max_path_length as usize {
            return;
        }

        if is_unbalanced_return {
            self.unbalanced_returns.insert(state.path_edge());
        }

        // the insert is the de-duplication point: of two workers proposing
        // the same edge, exactly one schedules the task
        if self.jump_functions.insert_if_absent(state.path_edge()) {
            self.schedule_edge_processing(state);
        }
    }

    fn schedule_edge_processing(&self, state: SolverState<I::Node, D>) {
        if self.is_killed() {
            return;
        }
        let executor = self.executor.read().clone();
        if executor.is_terminating() || executor.is_terminated() {
            return;
        }
        let Some(solver) = self.this.upgrade() else {
            return;
        };
        executor.execute(move || solver.process_edge(state));
        self.propagation_count.fetch_add(1, Ordering::Relaxed);
    }

    fn compute_flow(
        &self,
        function: &Arc<dyn FlowFunction<I::Node, D>>,
        state: &SolverState<I::Node, D>,
    ) -> FxHashSet<D> {
        let targets = function.compute_targets(state);
        self.tag_source_contexts(state, targets)
    }

    fn compute_return_flow(
        &self,
        function: &Arc<dyn FlowFunction<I::Node, D>>,
        state: &SolverState<I::Node, D>,
        caller_side_facts: &[D],
    ) -> FxHashSet<D> {
        let targets = function.compute_return_targets(state, caller_side_facts);
        self.tag_source_contexts(state, targets)
    }

    /// In the second phase every flow result inherits the source context of
    /// the fact it was derived from
    fn tag_source_contexts(
        &self,
        state: &SolverState<I::Node, D>,
        targets: FxHashSet<D>,
    ) -> FxHashSet<D> {
        if targets.is_empty() || *self.solver_phase.read() != SolverPhase::Second {
            return targets;
        }
        targets
            .into_iter()
            .map(|mut fact| {
                fact.derive_source_context(&state.target_fact);
                fact
            })
            .collect()
    }

    fn rewrite_generated(
        &self,
        memory_manager: &Option<Arc<dyn MemoryManager<D>>>,
        parent: &D,
        generated: D,
    ) -> Option<D> {
        match memory_manager {
            Some(manager) => manager.handle_generated_memory_object(parent, generated),
            None => Some(generated),
        }
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Set the kill flag, interrupt the pool and begin shutdown. Running
    /// tasks finish their current edge; everything queued is dropped.
    pub fn force_terminate(&self, reason: TerminationReason) {
        warn!(%reason, "forced termination requested");
        *self.kill_flag.write() = Some(reason);
        let executor = self.executor.read().clone();
        executor.interrupt();
        executor.shutdown();
    }

    /// Whether the solver stopped, forcedly or naturally
    pub fn is_terminated(&self) -> bool {
        self.is_killed() || self.executor.read().is_terminated()
    }

    /// Whether termination was forced rather than natural
    pub fn is_killed(&self) -> bool {
        self.kill_flag.read().is_some()
    }

    /// Clear the kill flag. Accumulated tables are preserved, which is what
    /// carries the first phase's summaries into the second.
    pub fn reset(&self) {
        *self.kill_flag.write() = None;
    }

    pub fn add_status_listener(&self, listener: Arc<dyn SolverStatusListener>) {
        self.listeners.lock().push(listener);
    }

    pub fn termination_reason(&self) -> Option<TerminationReason> {
        self.kill_flag.read().clone()
    }

    // ------------------------------------------------------------------
    // Configuration
    // ------------------------------------------------------------------

    /// Cap on callees considered per call site; negative disables
    pub fn set_max_callees_per_call_site(&self, max_callees: i64) {
        self.max_callees_per_call_site
            .store(max_callees, Ordering::Relaxed);
    }

    /// Cap on the abstraction path length; negative disables
    pub fn set_max_abstraction_path_length(&self, max_path_length: i64) {
        self.max_abstraction_path_length
            .store(max_path_length, Ordering::Relaxed);
    }

    /// Reserved: recorded per join point abstraction budget; no effect in
    /// this core
    pub fn set_max_join_point_abstractions(&self, max_join_point_abstractions: i64) {
        self.max_join_point_abstractions
            .store(max_join_point_abstractions, Ordering::Relaxed);
    }

    /// Reserved: predecessor shortening strategy; no effect in this core
    pub fn set_predecessor_shortening_mode(&self, mode: PredecessorShorteningMode) {
        *self.shortening_mode.write() = mode;
    }

    pub fn set_memory_manager(&self, memory_manager: Option<Arc<dyn MemoryManager<D>>>) {
        *self.memory_manager.write() = memory_manager;
    }

    pub fn memory_manager(&self) -> Option<Arc<dyn MemoryManager<D>>> {
        self.memory_manager.read().clone()
    }

    pub fn set_solver_phase(&self, phase: SolverPhase) {
        *self.solver_phase.write() = phase;
    }

    /// Label this instance as the forward or backward solver of a
    /// bidirectional analysis
    pub fn set_solver_direction(&self, direction: SolverDirection) {
        *self.direction.write() = direction;
    }

    /// Install a fresh executor, e.g. between the two phases after the
    /// previous one was shut down
    pub fn set_executor(&self, executor: Arc<InterruptibleExecutor>) {
        *self.executor.write() = executor;
    }

    // ------------------------------------------------------------------
    // Observables
    // ------------------------------------------------------------------

    pub fn jump_functions(&self) -> &JumpFunctions<I::Node, D> {
        &self.jump_functions
    }

    pub fn end_summary(&self) -> &EndSummaryTable<I::Method, I::Node, D> {
        &self.end_summary
    }

    pub fn incoming(&self) -> &IncomingTable<I::Method, I::Node, D> {
        &self.incoming
    }

    /// Number of tasks scheduled so far; monotone within one solve
    pub fn propagation_count(&self) -> u64 {
        self.propagation_count.load(Ordering::Relaxed)
    }

    pub fn reset_statistics(&self) {
        self.propagation_count.store(0, Ordering::Relaxed);
    }

    pub fn flow_cache_stats(&self) -> &FlowCacheStats {
        self.flow_functions.stats()
    }

    /// Path edges recorded while propagating unbalanced returns
    pub fn unbalanced_return_edges(&self) -> FxHashSet<PathEdge<I::Node, D>> {
        self.unbalanced_returns
            .iter()
            .map(|edge| edge.key().clone())
            .collect()
    }
}
