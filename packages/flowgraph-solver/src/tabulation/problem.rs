//! Tabulation problem contract
//!
//! Everything the engine consumes arrives through this trait: the zero
//! fact, the graph, the flow functions and the seeds. The solver copies
//! these out at construction and never touches the problem again.

use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};

use super::fact::DataflowFact;
use super::flow::FlowFunctions;
use super::icfg::InterproceduralCfg;

/// An IFDS tabulation problem
pub trait TabulationProblem<I, D>
where
    I: InterproceduralCfg,
    D: DataflowFact,
{
    /// The designated zero fact representing unconditional flow
    fn zero_value(&self) -> D;

    /// The interprocedural control-flow graph under analysis
    fn interprocedural_cfg(&self) -> Arc<I>;

    /// The flow-function provider
    fn flow_functions(&self) -> Arc<dyn FlowFunctions<I, D>>;

    /// Seed facts per statement. Each seed `(n, d)` is propagated as the
    /// path edge `(zero, n, d)`.
    fn initial_seeds(&self) -> FxHashMap<I::Node, FxHashSet<D>>;

    /// Whether returns are followed past seed statements when no incoming
    /// call was recorded (unbalanced returns)
    fn follow_returns_past_seeds(&self) -> bool {
        false
    }
}
