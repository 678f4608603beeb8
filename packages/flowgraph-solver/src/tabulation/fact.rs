//! Abstraction-domain contract
//!
//! A dataflow fact is an element of the finite, distributive subset domain
//! the solver tabulates over. The engine never inspects a fact's structure;
//! it only needs equality, hashing, the propagation path length and the
//! phase-two source-context hooks.

use std::fmt::Debug;
use std::hash::Hash;

/// Element of the data-flow domain
///
/// The designated zero fact (unconditional flow) is supplied by the
/// problem, not by this trait; see
/// [`TabulationProblem::zero_value`](crate::tabulation::TabulationProblem::zero_value).
pub trait DataflowFact: Clone + Eq + Hash + Debug + Send + Sync + 'static {
    /// Number of propagation steps accumulated by this fact. Used to
    /// enforce the configurable abstraction path-length bound.
    fn path_length(&self) -> usize;

    /// Phase-two hook: attach the source context carried by `parent` to
    /// this fact. Domains that do not track sources keep the default no-op.
    fn derive_source_context(&mut self, _parent: &Self) {}

    /// Whether this fact carries a source context. Entries whose exit fact
    /// answers `true` are purged from the end-summary table when the solver
    /// enters its second phase.
    fn has_source_context(&self) -> bool {
        false
    }
}
