//! Memoizing flow-function cache
//!
//! Wraps any flow-function provider and memoizes each query by its edge
//! tuple. There are no soft references in Rust, so the original soft-value
//! retention becomes capacity-bounded shedding: when a tier reaches its cap
//! it is cleared wholesale. Misses recompute through the wrapped provider,
//! so shedding never affects correctness.
//!
//! Safe under concurrent access; a race between two workers computing the
//! same entry at worst duplicates one provider call, which is cheaper than
//! holding a shard lock across user code.

use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use super::fact::DataflowFact;
use super::flow::{FlowFunction, FlowFunctions};
use super::icfg::InterproceduralCfg;

/// Default per-tier capacity before shedding
const FLOW_CACHE_CAPACITY: usize = 10_000;

/// Hit/miss/shed counters, one set per cache instance
#[derive(Debug, Default)]
pub struct FlowCacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    sheds: AtomicU64,
}

impl FlowCacheStats {
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn sheds(&self) -> u64 {
        self.sheds.load(Ordering::Relaxed)
    }
}

type CachedFlow<I, D> = Arc<dyn FlowFunction<<I as InterproceduralCfg>::Node, D>>;

/// Memoizing wrapper around a flow-function provider
pub struct FlowFunctionCache<I, D>
where
    I: InterproceduralCfg,
    D: DataflowFact,
{
    delegate: Arc<dyn FlowFunctions<I, D>>,

    normal: DashMap<(I::Node, I::Node), CachedFlow<I, D>>,
    call: DashMap<(I::Node, I::Method), CachedFlow<I, D>>,
    ret: DashMap<(Option<I::Node>, I::Method, I::Node, Option<I::Node>), CachedFlow<I, D>>,
    call_to_return: DashMap<(I::Node, I::Node), CachedFlow<I, D>>,

    capacity: usize,
    stats: FlowCacheStats,
}

impl<I, D> FlowFunctionCache<I, D>
where
    I: InterproceduralCfg,
    D: DataflowFact,
{
    pub fn new(delegate: Arc<dyn FlowFunctions<I, D>>) -> Self {
        Self::with_capacity(delegate, FLOW_CACHE_CAPACITY)
    }

    /// Cache with an explicit per-tier capacity
    pub fn with_capacity(delegate: Arc<dyn FlowFunctions<I, D>>, capacity: usize) -> Self {
        Self {
            delegate,
            normal: DashMap::new(),
            call: DashMap::new(),
            ret: DashMap::new(),
            call_to_return: DashMap::new(),
            capacity: capacity.max(1),
            stats: FlowCacheStats::default(),
        }
    }

    pub fn stats(&self) -> &FlowCacheStats {
        &self.stats
    }

    /// Total number of memoized entries across all tiers
    pub fn len(&self) -> usize {
        self.normal.len() + self.call.len() + self.ret.len() + self.call_to_return.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lookup<K>(
        &self,
        tier: &DashMap<K, CachedFlow<I, D>>,
        key: K,
        compute: impl FnOnce() -> CachedFlow<I, D>,
    ) -> CachedFlow<I, D>
    where
        K: Eq + Hash,
    {
        if let Some(hit) = tier.get(&key) {
            self.stats.hits.fetch_add(1, Ordering::Relaxed);
            return Arc::clone(&hit);
        }
        self.stats.misses.fetch_add(1, Ordering::Relaxed);
        if tier.len() >= self.capacity {
            tier.clear();
            self.stats.sheds.fetch_add(1, Ordering::Relaxed);
        }
        let function = compute();
        tier.insert(key, Arc::clone(&function));
        function
    }
}

impl<I, D> FlowFunctions<I, D> for FlowFunctionCache<I, D>
where
    I: InterproceduralCfg,
    D: DataflowFact,
{
    fn normal_flow_function(
        &self,
        curr: &I::Node,
        succ: &I::Node,
    ) -> Arc<dyn FlowFunction<I::Node, D>> {
        self.lookup(&self.normal, (curr.clone(), succ.clone()), || {
            self.delegate.normal_flow_function(curr, succ)
        })
    }

    fn call_flow_function(
        &self,
        call_site: &I::Node,
        callee: &I::Method,
    ) -> Arc<dyn FlowFunction<I::Node, D>> {
        self.lookup(&self.call, (call_site.clone(), callee.clone()), || {
            self.delegate.call_flow_function(call_site, callee)
        })
    }

    fn return_flow_function(
        &self,
        call_site: Option<&I::Node>,
        callee: &I::Method,
        exit_stmt: &I::Node,
        return_site: Option<&I::Node>,
    ) -> Arc<dyn FlowFunction<I::Node, D>> {
        let key = (
            call_site.cloned(),
            callee.clone(),
            exit_stmt.clone(),
            return_site.cloned(),
        );
        self.lookup(&self.ret, key, || {
            self.delegate
                .return_flow_function(call_site, callee, exit_stmt, return_site)
        })
    }

    fn call_to_return_flow_function(
        &self,
        call_site: &I::Node,
        return_site: &I::Node,
    ) -> Arc<dyn FlowFunction<I::Node, D>> {
        self.lookup(
            &self.call_to_return,
            (call_site.clone(), return_site.clone()),
            || {
                self.delegate
                    .call_to_return_flow_function(call_site, return_site)
            },
        )
    }
}
