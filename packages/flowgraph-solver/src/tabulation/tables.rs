//! Concurrent solver tables
//!
//! Three tables back the tabulation, all built on atomic insert-if-absent:
//!
//! - **Jump functions**: every path edge already propagated by this solver
//!   instance. First insertion wins and schedules the processing task;
//!   duplicates are dropped, which is what makes the fixed point terminate.
//! - **End summaries**: per `(method, entry fact)` the exit pairs
//!   discovered so far.
//! - **Incoming**: per `(callee, entry fact)` the caller contexts that
//!   entered it, with a flag word distinguishing a new caller context from
//!   a first-ever entry into the callee.
//!
//! The incoming/end-summary pair carries the Naeem/Lhotak/Rodriguez
//! coordination: insert incoming then read summaries, insert summary then
//! read incoming. At least one of the two orderings observes every pair.

use std::hash::Hash;

use bitflags::bitflags;
use dashmap::{DashMap, DashSet};
use rustc_hash::FxHashSet;

use super::fact::DataflowFact;
use super::state::PathEdge;

/// Path edges already propagated by one solver instance
///
/// Owned per instance; forward and backward solvers never share a table.
pub struct JumpFunctions<N, D>
where
    N: Clone + Eq + Hash,
    D: DataflowFact,
{
    edges: DashMap<PathEdge<N, D>, D>,
}

impl<N, D> JumpFunctions<N, D>
where
    N: Clone + Eq + Hash,
    D: DataflowFact,
{
    pub fn new() -> Self {
        Self {
            edges: DashMap::new(),
        }
    }

    /// Atomically record the edge. Returns `true` when it was absent, in
    /// which case the caller owns scheduling its processing task.
    pub fn insert_if_absent(&self, edge: PathEdge<N, D>) -> bool {
        use dashmap::mapref::entry::Entry;
        match self.edges.entry(edge) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                let target = slot.key().target_fact.clone();
                slot.insert(target);
                true
            }
        }
    }

    pub fn contains(&self, edge: &PathEdge<N, D>) -> bool {
        self.edges.contains_key(edge)
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Snapshot of all recorded edges
    pub fn snapshot(&self) -> FxHashSet<PathEdge<N, D>> {
        self.edges.iter().map(|e| e.key().clone()).collect()
    }

    /// Facts known to hold at a statement, over all entry contexts
    pub fn facts_at(&self, node: &N) -> FxHashSet<D> {
        self.edges
            .iter()
            .filter(|e| e.key().node == *node)
            .map(|e| e.key().target_fact.clone())
            .collect()
    }
}

impl<N, D> Default for JumpFunctions<N, D>
where
    N: Clone + Eq + Hash,
    D: DataflowFact,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Discovered exits per `(method, entry fact)`
pub struct EndSummaryTable<M, N, D>
where
    M: Clone + Eq + Hash,
    N: Clone + Eq + Hash,
    D: DataflowFact,
{
    summaries: DashMap<(M, D), DashSet<(N, D)>>,
}

impl<M, N, D> EndSummaryTable<M, N, D>
where
    M: Clone + Eq + Hash,
    N: Clone + Eq + Hash,
    D: DataflowFact,
{
    pub fn new() -> Self {
        Self {
            summaries: DashMap::new(),
        }
    }

    /// Record that `method`, entered with `entry_fact`, reaches
    /// `exit_stmt` with `exit_fact`. Returns `true` on first insertion.
    pub fn add(&self, method: M, entry_fact: D, exit_stmt: N, exit_fact: D) -> bool {
        self.summaries
            .entry((method, entry_fact))
            .or_default()
            .insert((exit_stmt, exit_fact))
    }

    /// Snapshot of the exit pairs recorded for `(method, entry_fact)`
    pub fn summaries_for(&self, method: &M, entry_fact: &D) -> Vec<(N, D)> {
        self.summaries
            .get(&(method.clone(), entry_fact.clone()))
            .map(|set| set.iter().map(|pair| pair.key().clone()).collect())
            .unwrap_or_default()
    }

    /// Drop every exit pair whose fact carries a source context. Run when
    /// entering the second phase: such pairs are first-phase artifacts that
    /// must be recomputed under real sources.
    pub fn purge_with_source_context(&self) {
        for entry in self.summaries.iter() {
            entry.value().retain(|(_, exit_fact)| !exit_fact.has_source_context());
        }
    }

    /// Number of `(method, entry fact)` keys
    pub fn len(&self) -> usize {
        self.summaries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.summaries.is_empty()
    }

    /// Flattened snapshot: `(method, entry fact, exit stmt, exit fact)`
    pub fn snapshot(&self) -> FxHashSet<(M, D, N, D)> {
        self.summaries
            .iter()
            .flat_map(|entry| {
                let (method, entry_fact) = entry.key().clone();
                entry
                    .value()
                    .iter()
                    .map(|pair| {
                        let (exit_stmt, exit_fact) = pair.key().clone();
                        (method.clone(), entry_fact.clone(), exit_stmt, exit_fact)
                    })
                    .collect::<Vec<_>>()
            })
            .collect()
    }
}

impl<M, N, D> Default for EndSummaryTable<M, N, D>
where
    M: Clone + Eq + Hash,
    N: Clone + Eq + Hash,
    D: DataflowFact,
{
    fn default() -> Self {
        Self::new()
    }
}

bitflags! {
    /// Outcome of recording a caller context in the incoming table
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct IncomingFlags: u8 {
        /// The `(call site, caller entry, call-site fact)` context was new
        const NEW_INCOMING = 0b01;
        /// The callee had never been entered with this fact before
        const NEW_CALLEE = 0b10;
    }
}

/// Caller contexts per `(callee, entry fact)`
///
/// `(M, d3) => call site => (caller entry d1 => call-site fact d2)`
pub struct IncomingTable<M, N, D>
where
    M: Clone + Eq + Hash,
    N: Clone + Eq + Hash,
    D: DataflowFact,
{
    incoming: DashMap<(M, D), DashMap<N, DashMap<D, D>>>,
}

impl<M, N, D> IncomingTable<M, N, D>
where
    M: Clone + Eq + Hash,
    N: Clone + Eq + Hash,
    D: DataflowFact,
{
    pub fn new() -> Self {
        Self {
            incoming: DashMap::new(),
        }
    }

    /// Record that `call_site` caused `callee` to be entered with
    /// `entry_fact`, from caller context `(caller_entry_fact,
    /// call_site_fact)`.
    pub fn add(
        &self,
        callee: M,
        entry_fact: D,
        call_site: N,
        caller_entry_fact: D,
        call_site_fact: D,
    ) -> IncomingFlags {
        let mut flags = IncomingFlags::empty();
        let callee_contexts = self.incoming.entry((callee, entry_fact)).or_insert_with(|| {
            flags |= IncomingFlags::NEW_CALLEE;
            DashMap::new()
        });
        let site_contexts = callee_contexts.entry(call_site).or_default();
        if site_contexts.insert(caller_entry_fact, call_site_fact).is_none() {
            flags |= IncomingFlags::NEW_INCOMING;
        }
        flags
    }

    /// Snapshot of the caller contexts recorded for `(callee, entry_fact)`:
    /// per call site, the `(caller entry, call-site fact)` pairs
    pub fn incoming_for(&self, callee: &M, entry_fact: &D) -> Vec<(N, Vec<(D, D)>)> {
        self.incoming
            .get(&(callee.clone(), entry_fact.clone()))
            .map(|sites| {
                sites
                    .iter()
                    .map(|site| {
                        let contexts = site
                            .value()
                            .iter()
                            .map(|ctx| (ctx.key().clone(), ctx.value().clone()))
                            .collect();
                        (site.key().clone(), contexts)
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of `(callee, entry fact)` keys
    pub fn len(&self) -> usize {
        self.incoming.len()
    }

    pub fn is_empty(&self) -> bool {
        self.incoming.is_empty()
    }

    /// Flattened snapshot: `(callee, entry fact, call site, caller entry,
    /// call-site fact)`
    pub fn snapshot(&self) -> FxHashSet<(M, D, N, D, D)> {
        self.incoming
            .iter()
            .flat_map(|entry| {
                let (callee, entry_fact) = entry.key().clone();
                let mut rows = Vec::new();
                for site in entry.value().iter() {
                    for ctx in site.value().iter() {
                        rows.push((
                            callee.clone(),
                            entry_fact.clone(),
                            site.key().clone(),
                            ctx.key().clone(),
                            ctx.value().clone(),
                        ));
                    }
                }
                rows
            })
            .collect()
    }
}

impl<M, N, D> Default for IncomingTable<M, N, D>
where
    M: Clone + Eq + Hash,
    N: Clone + Eq + Hash,
    D: DataflowFact,
{
    fn default() -> Self {
        Self::new()
    }
}
