//! Interprocedural CFG adapter contract
//!
//! The solver treats the graph as a set of pure queries. Adapters may block
//! internally (lazy loading, on-demand call-graph construction); the core
//! never caches graph answers beyond the current operation.

use std::fmt::Debug;
use std::hash::Hash;

/// Graph queries the tabulation engine consumes
pub trait InterproceduralCfg: Send + Sync + 'static {
    /// Statement identifier
    type Node: Clone + Eq + Hash + Debug + Send + Sync + 'static;

    /// Procedure identifier
    type Method: Clone + Eq + Hash + Debug + Send + Sync + 'static;

    /// Successors of a statement
    fn succs_of(&self, node: &Self::Node) -> Vec<Self::Node>;

    /// Possible callees of a call statement
    fn callees_of_call_at(&self, call_site: &Self::Node) -> Vec<Self::Method>;

    /// Return sites of a call statement
    fn return_sites_of_call_at(&self, call_site: &Self::Node) -> Vec<Self::Node>;

    /// Entry statements of a method
    fn start_points_of(&self, method: &Self::Method) -> Vec<Self::Node>;

    /// Call statements that may invoke a method
    fn callers_of(&self, method: &Self::Method) -> Vec<Self::Node>;

    /// The method containing a statement
    fn method_of(&self, node: &Self::Node) -> Self::Method;

    /// Whether the statement is a call
    fn is_call_stmt(&self, node: &Self::Node) -> bool;

    /// Whether the statement is a method exit
    fn is_exit_stmt(&self, node: &Self::Node) -> bool;

    /// Whether the method has a body worth descending into. Abstract and
    /// phantom procedures answer `false` and are skipped at call sites.
    fn is_concrete(&self, _method: &Self::Method) -> bool {
        true
    }
}
