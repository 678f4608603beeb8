//! IFDS tabulation core
//!
//! Worklist-based tabulation in the style of Reps/Horwitz/Sagiv with the
//! call/return summary bookkeeping of Naeem/Lhotak/Rodriguez, run
//! concurrently on an interruptible worker pool.

pub mod fact;
pub mod flow;
pub mod flow_cache;
pub mod icfg;
pub mod memory;
pub mod problem;
pub mod solver;
pub mod state;
pub mod tables;

pub use fact::DataflowFact;
pub use flow::{FlowFunction, FlowFunctions, GenFlowFunction, IdentityFlowFunction, KillFlowFunction};
pub use flow_cache::{FlowCacheStats, FlowFunctionCache};
pub use icfg::InterproceduralCfg;
pub use memory::MemoryManager;
pub use problem::TabulationProblem;
pub use solver::{SolverStatusListener, TabulationSolver, TerminationReason};
pub use state::{PathEdge, PredecessorShorteningMode, SolverDirection, SolverPhase, SolverState};
pub use tables::{EndSummaryTable, IncomingFlags, IncomingTable, JumpFunctions};
