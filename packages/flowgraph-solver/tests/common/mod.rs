#![allow(dead_code)]

//! Shared fixtures for the integration tests: a programmable mock ICFG, a
//! string-based fact domain and problem builders.

use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};

use flowgraph_solver::tabulation::flow::{FlowFunction, FlowFunctions, IdentityFlowFunction};
use flowgraph_solver::tabulation::{
    DataflowFact, InterproceduralCfg, PathEdge, TabulationProblem, TabulationSolver,
};
use flowgraph_solver::InterruptibleExecutor;

/// Test fact: a named variable with a hop count and an optional source tag
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TestFact {
    Zero,
    Var {
        name: String,
        hops: usize,
        source: Option<String>,
    },
}

impl TestFact {
    pub fn var(name: &str) -> Self {
        TestFact::Var {
            name: name.to_string(),
            hops: 0,
            source: None,
        }
    }

    pub fn var_with_source(name: &str, source: &str) -> Self {
        TestFact::Var {
            name: name.to_string(),
            hops: 0,
            source: Some(source.to_string()),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            TestFact::Zero => "zero",
            TestFact::Var { name, .. } => name,
        }
    }
}

impl DataflowFact for TestFact {
    fn path_length(&self) -> usize {
        match self {
            TestFact::Zero => 0,
            TestFact::Var { hops, .. } => *hops,
        }
    }

    fn derive_source_context(&mut self, parent: &Self) {
        let parent_label = parent.label().to_string();
        if let TestFact::Var { source, .. } = self {
            if source.is_none() {
                *source = Some(parent_label);
            }
        }
    }

    fn has_source_context(&self) -> bool {
        matches!(self, TestFact::Var { source: Some(_), .. })
    }
}

/// Programmable mock ICFG over string statements and methods
#[derive(Default)]
pub struct MockIcfg {
    succs: FxHashMap<String, Vec<String>>,
    calls: FxHashSet<String>,
    callees: FxHashMap<String, Vec<String>>,
    return_sites: FxHashMap<String, Vec<String>>,
    start_points: FxHashMap<String, Vec<String>>,
    callers: FxHashMap<String, Vec<String>>,
    methods: FxHashMap<String, String>,
    exits: FxHashSet<String>,
}

impl MockIcfg {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a statement inside a method
    pub fn stmt(&mut self, node: &str, method: &str) -> &mut Self {
        self.methods.insert(node.to_string(), method.to_string());
        self
    }

    /// Add a normal intra-procedural edge
    pub fn edge(&mut self, from: &str, to: &str) -> &mut Self {
        self.succs
            .entry(from.to_string())
            .or_default()
            .push(to.to_string());
        self
    }

    /// Mark a statement as a method exit
    pub fn exit(&mut self, node: &str) -> &mut Self {
        self.exits.insert(node.to_string());
        self
    }

    /// Register a method entry statement
    pub fn start_point(&mut self, method: &str, node: &str) -> &mut Self {
        let points = self.start_points.entry(method.to_string()).or_default();
        if !points.iter().any(|p| p == node) {
            points.push(node.to_string());
        }
        self
    }

    /// Register a call edge with its return site
    pub fn call(&mut self, call_site: &str, callee: &str, return_site: &str) -> &mut Self {
        self.calls.insert(call_site.to_string());
        let callees = self.callees.entry(call_site.to_string()).or_default();
        if !callees.iter().any(|c| c == callee) {
            callees.push(callee.to_string());
        }
        let sites = self.return_sites.entry(call_site.to_string()).or_default();
        if !sites.iter().any(|r| r == return_site) {
            sites.push(return_site.to_string());
        }
        let callers = self.callers.entry(callee.to_string()).or_default();
        if !callers.iter().any(|c| c == call_site) {
            callers.push(call_site.to_string());
        }
        self
    }
}

impl InterproceduralCfg for MockIcfg {
    type Node = String;
    type Method = String;

    fn succs_of(&self, node: &String) -> Vec<String> {
        self.succs.get(node).cloned().unwrap_or_default()
    }

    fn callees_of_call_at(&self, call_site: &String) -> Vec<String> {
        self.callees.get(call_site).cloned().unwrap_or_default()
    }

    fn return_sites_of_call_at(&self, call_site: &String) -> Vec<String> {
        self.return_sites.get(call_site).cloned().unwrap_or_default()
    }

    fn start_points_of(&self, method: &String) -> Vec<String> {
        self.start_points.get(method).cloned().unwrap_or_default()
    }

    fn callers_of(&self, method: &String) -> Vec<String> {
        self.callers.get(method).cloned().unwrap_or_default()
    }

    fn method_of(&self, node: &String) -> String {
        self.methods
            .get(node)
            .cloned()
            .unwrap_or_else(|| "main".to_string())
    }

    fn is_call_stmt(&self, node: &String) -> bool {
        self.calls.contains(node)
    }

    fn is_exit_stmt(&self, node: &String) -> bool {
        self.exits.contains(node)
    }
}

/// Identity flows for every edge kind
pub struct IdentityFlows;

impl FlowFunctions<MockIcfg, TestFact> for IdentityFlows {
    fn normal_flow_function(
        &self,
        _curr: &String,
        _succ: &String,
    ) -> Arc<dyn FlowFunction<String, TestFact>> {
        Arc::new(IdentityFlowFunction)
    }

    fn call_flow_function(
        &self,
        _call_site: &String,
        _callee: &String,
    ) -> Arc<dyn FlowFunction<String, TestFact>> {
        Arc::new(IdentityFlowFunction)
    }

    fn return_flow_function(
        &self,
        _call_site: Option<&String>,
        _callee: &String,
        _exit_stmt: &String,
        _return_site: Option<&String>,
    ) -> Arc<dyn FlowFunction<String, TestFact>> {
        Arc::new(IdentityFlowFunction)
    }

    fn call_to_return_flow_function(
        &self,
        _call_site: &String,
        _return_site: &String,
    ) -> Arc<dyn FlowFunction<String, TestFact>> {
        Arc::new(IdentityFlowFunction)
    }
}

/// Problem builder around a mock graph
pub struct TestProblem {
    pub icfg: Arc<MockIcfg>,
    pub flows: Arc<dyn FlowFunctions<MockIcfg, TestFact>>,
    pub seeds: FxHashMap<String, FxHashSet<TestFact>>,
    pub follow_returns: bool,
}

impl TestProblem {
    pub fn new(icfg: MockIcfg) -> Self {
        Self {
            icfg: Arc::new(icfg),
            flows: Arc::new(IdentityFlows),
            seeds: FxHashMap::default(),
            follow_returns: false,
        }
    }

    pub fn seed(mut self, node: &str, fact: TestFact) -> Self {
        self.seeds
            .entry(node.to_string())
            .or_default()
            .insert(fact);
        self
    }

    pub fn with_flows(mut self, flows: Arc<dyn FlowFunctions<MockIcfg, TestFact>>) -> Self {
        self.flows = flows;
        self
    }

    pub fn follow_returns(mut self, follow: bool) -> Self {
        self.follow_returns = follow;
        self
    }
}

impl TabulationProblem<MockIcfg, TestFact> for TestProblem {
    fn zero_value(&self) -> TestFact {
        TestFact::Zero
    }

    fn interprocedural_cfg(&self) -> Arc<MockIcfg> {
        Arc::clone(&self.icfg)
    }

    fn flow_functions(&self) -> Arc<dyn FlowFunctions<MockIcfg, TestFact>> {
        Arc::clone(&self.flows)
    }

    fn initial_seeds(&self) -> FxHashMap<String, FxHashSet<TestFact>> {
        self.seeds.clone()
    }

    fn follow_returns_past_seeds(&self) -> bool {
        self.follow_returns
    }
}

/// Build a solver over an explicit worker count
pub fn solver_with_threads(
    problem: &TestProblem,
    threads: usize,
) -> Arc<TabulationSolver<MockIcfg, TestFact>> {
    let executor = Arc::new(InterruptibleExecutor::new(threads).unwrap());
    TabulationSolver::with_executor(problem, executor).unwrap()
}

/// Shorthand for a path-edge key
pub fn edge(source: TestFact, node: &str, target: TestFact) -> PathEdge<String, TestFact> {
    PathEdge::new(source, node.to_string(), target)
}
