/*
 * Flowgraph Solver - Concurrent IFDS Tabulation Engine
 *
 * Worklist-driven fixed-point engine computing interprocedural, finite,
 * distributive subset (IFDS) data-flow summaries over the exploded
 * super-graph of an interprocedural control-flow graph.
 *
 * Layout:
 * - shared/     : cross-cutting runtime pieces (interruptible worker pool)
 * - tabulation/ : the solver core (domain contracts, tables, propagation)
 *
 * The crate deliberately contains no taint abstractions, flow functions or
 * ICFG construction. Those arrive through the `TabulationProblem` contract;
 * the engine only tabulates.
 *
 * References:
 * - Reps, Horwitz, Sagiv (1995): "Precise Interprocedural Dataflow Analysis
 *   via Graph Reachability"
 * - Naeem, Lhotak, Rodriguez (2010): "Practical Extensions to the IFDS
 *   Algorithm"
 */

/// Error types
pub mod errors;

/// Shared runtime utilities
pub mod shared;

/// The IFDS tabulation core
pub mod tabulation;

pub use errors::{Result, SolverError};
pub use shared::executor::InterruptibleExecutor;
pub use tabulation::{
    DataflowFact, FlowFunction, FlowFunctionCache, FlowFunctions, GenFlowFunction,
    IdentityFlowFunction, IncomingFlags, InterproceduralCfg, KillFlowFunction, MemoryManager,
    PathEdge, PredecessorShorteningMode, SolverDirection, SolverPhase, SolverState,
    SolverStatusListener, TabulationProblem, TabulationSolver, TerminationReason,
};
