//! Call, return and summary scenarios

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use common::{edge, solver_with_threads, MockIcfg, TestFact, TestProblem};
use flowgraph_solver::tabulation::flow::{
    FlowFunction, FlowFunctions, IdentityFlowFunction, KillFlowFunction,
};

/// Identity flows except an empty call-to-return function: everything has
/// to travel through the callee
struct ThroughCalleeFlows;

impl FlowFunctions<MockIcfg, TestFact> for ThroughCalleeFlows {
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
        Arc::new(KillFlowFunction)
    }
}

fn single_call_graph() -> MockIcfg {
    let mut icfg = MockIcfg::new();
    icfg.edge("s", "c")
        .call("c", "M", "r")
        .edge("r", "e")
        .exit("e")
        .stmt("sp", "M")
        .stmt("ep", "M")
        .start_point("M", "sp")
        .edge("sp", "ep")
        .exit("ep");
    icfg
}

#[test]
fn call_records_incoming_summary_and_return() {
    let problem = TestProblem::new(single_call_graph())
        .seed("s", TestFact::var("a"))
        .with_flows(Arc::new(ThroughCalleeFlows));
    let solver = solver_with_threads(&problem, 2);
    solver.solve().unwrap();

    let a = TestFact::var("a");

    // the caller context was wired into the incoming table
    let incoming = solver.incoming().incoming_for(&"M".to_string(), &a);
    assert_eq!(incoming.len(), 1);
    assert_eq!(incoming[0].0, "c");
    assert_eq!(incoming[0].1, vec![(TestFact::Zero, a.clone())]);

    // the callee exit was summarized
    let summaries = solver.end_summary().summaries_for(&"M".to_string(), &a);
    assert_eq!(summaries, vec![("ep".to_string(), a.clone())]);

    // callee body ran under its own entry fact, the return flowed back
    assert!(solver.jump_functions().contains(&edge(a.clone(), "sp", a.clone())));
    assert!(solver.jump_functions().contains(&edge(a.clone(), "ep", a.clone())));
    assert!(solver.jump_functions().contains(&edge(TestFact::Zero, "r", a.clone())));
    assert!(solver.jump_functions().contains(&edge(TestFact::Zero, "e", a.clone())));

    // nothing crossed the call site directly: the kill on call-to-return
    // means the only path to r is the return flow
    assert_eq!(solver.jump_functions().len(), 6);
}

#[test]
fn two_callers_share_one_callee_exploration() {
    let mut icfg = MockIcfg::new();
    icfg.edge("s", "c1")
        .call("c1", "M", "r1")
        .edge("r1", "c2")
        .call("c2", "M", "r2")
        .edge("r2", "e")
        .exit("e")
        .stmt("sp", "M")
        .stmt("ep", "M")
        .start_point("M", "sp")
        .edge("sp", "ep")
        .exit("ep");

    let problem = TestProblem::new(icfg).seed("s", TestFact::var("a"));
    let solver = solver_with_threads(&problem, 4);
    solver.solve().unwrap();

    let a = TestFact::var("a");

    // both call sites registered, one summary serves them both
    let incoming = solver.incoming().incoming_for(&"M".to_string(), &a);
    let mut sites: Vec<&str> = incoming.iter().map(|(site, _)| site.as_str()).collect();
    sites.sort_unstable();
    assert_eq!(sites, vec!["c1", "c2"]);
    assert_eq!(
        solver.end_summary().summaries_for(&"M".to_string(), &a),
        vec![("ep".to_string(), a.clone())]
    );

    // the callee body was entered exactly once: a single self-loop edge
    let body_entries: Vec<_> = solver
        .jump_functions()
        .snapshot()
        .into_iter()
        .filter(|e| e.node == "sp")
        .collect();
    assert_eq!(body_entries, vec![edge(a.clone(), "sp", a.clone())]);

    // both returns were wired
    assert!(solver.jump_functions().contains(&edge(TestFact::Zero, "r1", a.clone())));
    assert!(solver.jump_functions().contains(&edge(TestFact::Zero, "r2", a.clone())));
}

fn wide_call_site_graph(callees: usize) -> MockIcfg {
    let mut icfg = MockIcfg::new();
    for i in 0..callees {
        icfg.call("c", &format!("M{i}"), "r");
    }
    icfg
}

#[test]
fn callee_cap_skips_call_flows_but_not_call_to_return() {
    let problem = TestProblem::new(wide_call_site_graph(100)).seed("c", TestFact::var("a"));
    let solver = solver_with_threads(&problem, 2);
    solver.solve().unwrap();

    let a = TestFact::var("a");

    // over the default cap of 75: no callee work at all
    assert!(solver.incoming().is_empty());
    assert!(solver.end_summary().is_empty());

    // the call-to-return flow still ran
    assert!(solver.jump_functions().contains(&edge(TestFact::Zero, "r", a.clone())));
    assert_eq!(solver.jump_functions().len(), 2);
}

#[test]
fn disabling_the_callee_cap_restores_call_flows() {
    let problem = TestProblem::new(wide_call_site_graph(100)).seed("c", TestFact::var("a"));
    let solver = solver_with_threads(&problem, 2);
    solver.set_max_callees_per_call_site(-1);
    solver.solve().unwrap();

    // every callee entry is registered once the cap is off
    assert_eq!(solver.incoming().len(), 100);
}

#[test]
fn unbalanced_return_flows_into_unanalyzed_callers() {
    let mut icfg = MockIcfg::new();
    icfg.call("c", "M", "r")
        .edge("r", "after")
        .stmt("sp", "M")
        .stmt("ep", "M")
        .start_point("M", "sp")
        .edge("sp", "ep")
        .exit("ep");

    // the seed starts inside M, so no incoming edge is ever recorded
    let problem = TestProblem::new(icfg)
        .seed("sp", TestFact::var("a"))
        .follow_returns(true);
    let solver = solver_with_threads(&problem, 2);
    solver.solve().unwrap();

    let a = TestFact::var("a");
    let return_edge = edge(TestFact::Zero, "r", a.clone());

    assert!(solver.jump_functions().contains(&return_edge));
    assert!(solver.jump_functions().contains(&edge(TestFact::Zero, "after", a.clone())));

    let unbalanced = solver.unbalanced_return_edges();
    assert!(unbalanced.contains(&return_edge));
    // unbalanced returns only ever carry the zero entry fact
    assert!(unbalanced.iter().all(|e| e.source_fact == TestFact::Zero));
}

/// Counts return-flow queries made without a call site, the side-effect
/// path for methods nobody calls
struct RecordingFlows {
    null_site_queries: AtomicUsize,
}

impl FlowFunctions<MockIcfg, TestFact> for RecordingFlows {
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
        call_site: Option<&String>,
        _callee: &String,
        _exit_stmt: &String,
        return_site: Option<&String>,
    ) -> Arc<dyn FlowFunction<String, TestFact>> {
        if call_site.is_none() && return_site.is_none() {
            self.null_site_queries.fetch_add(1, Ordering::Relaxed);
        }
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

#[test]
fn callerless_methods_still_fire_the_return_flow() {
    let mut icfg = MockIcfg::new();
    icfg.stmt("sp", "M")
        .stmt("ep", "M")
        .start_point("M", "sp")
        .edge("sp", "ep")
        .exit("ep");

    let flows = Arc::new(RecordingFlows {
        null_site_queries: AtomicUsize::new(0),
    });
    let problem = TestProblem::new(icfg)
        .seed("sp", TestFact::var("a"))
        .with_flows(flows.clone())
        .follow_returns(true);
    let solver = solver_with_threads(&problem, 2);
    solver.solve().unwrap();

    // fired exactly once, outputs discarded
    assert_eq!(flows.null_site_queries.load(Ordering::Relaxed), 1);
    assert_eq!(solver.jump_functions().len(), 2);
    assert!(solver.unbalanced_return_edges().is_empty());
}
