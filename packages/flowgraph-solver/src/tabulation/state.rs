//! Path edges and solver state
//!
//! The fundamental unit of work is the path edge `(d1, n, d2)`: fact `d2`
//! holds at `n` along some path that entered the containing method with
//! fact `d1`. `SolverState` is the owned task payload; `PathEdge` is the
//! same triple used as the de-duplication key in the jump-function table.

/// A path edge in flight: the payload of one worklist task
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SolverState<N, D> {
    /// Fact at the entry of the method containing `node`
    pub source_fact: D,

    /// Current statement
    pub node: N,

    /// Fact holding at `node`
    pub target_fact: D,
}

impl<N: Clone, D: Clone> SolverState<N, D> {
    pub fn new(source_fact: D, node: N, target_fact: D) -> Self {
        Self {
            source_fact,
            node,
            target_fact,
        }
    }

    /// Derive a new state at another statement, preserving the method-entry
    /// fact
    pub fn derive(&self, node: N, target_fact: D) -> Self {
        Self {
            source_fact: self.source_fact.clone(),
            node,
            target_fact,
        }
    }

    /// The de-duplication key for this state
    pub fn path_edge(&self) -> PathEdge<N, D> {
        PathEdge {
            source_fact: self.source_fact.clone(),
            node: self.node.clone(),
            target_fact: self.target_fact.clone(),
        }
    }
}

/// Key type for the jump-function table
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathEdge<N, D> {
    pub source_fact: D,
    pub node: N,
    pub target_fact: D,
}

impl<N, D> PathEdge<N, D> {
    pub fn new(source_fact: D, node: N, target_fact: D) -> Self {
        Self {
            source_fact,
            node,
            target_fact,
        }
    }
}

/// Diagnostic label distinguishing the two solver instances of a
/// bidirectional analysis. Each instance owns its own jump-function table;
/// nothing is shared across directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SolverDirection {
    #[default]
    Forward,
    Backward,
}

/// The two propagation phases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SolverPhase {
    /// Propagate abstractions regardless of source identity
    #[default]
    First,

    /// Re-propagate with source contexts attached via
    /// `DataflowFact::derive_source_context`
    Second,
}

/// Strategy for shortening predecessor chains on method returns.
///
/// Reserved: stored for collaborators of the core but without effect on
/// tabulation itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PredecessorShorteningMode {
    #[default]
    Never,
    ShortenIfEqual,
    Always,
}
