mod common;

use common::{decision, form, scheduler, scheduler_with, service, service_with_body};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use wfcore::{EngineError, GraphError, RecordStatus, WorkflowGraph};
use wfruntime::{FailureKind, RunStatus, RuntimeConfig};

fn linear(n: usize) -> WorkflowGraph {
    let mut graph = WorkflowGraph::new("linear");
    for i in 0..n {
        graph.add_node(service(&format!("n{}", i), "https://x/step"));
        if i > 0 {
            graph.connect(format!("n{}", i - 1), format!("n{}", i));
        }
    }
    graph
}

#[tokio::test]
async fn test_linear_graph_visits_every_node_once() {
    let (scheduler, calls) = scheduler();

    let state = scheduler.run(&linear(5), json!({})).await.unwrap();

    assert_eq!(state.status(), RunStatus::Completed);
    assert_eq!(state.history().len(), 5);
    assert_eq!(calls.lock().unwrap().len(), 5);
    assert_eq!(state.current_node_id(), None);
    assert!(state.check_invariants().is_ok());
}

#[tokio::test]
async fn test_single_node_scenario() {
    let (scheduler, _) = scheduler();
    let graph: WorkflowGraph = serde_json::from_value(json!({
        "name": "health",
        "nodes": [{ "id": "start", "kind": "service", "config": { "url": "https://x/health", "method": "GET" } }],
        "edges": []
    }))
    .unwrap();

    let state = scheduler.run(&graph, json!({})).await.unwrap();

    assert_eq!(state.status(), RunStatus::Completed);
    assert_eq!(state.history().len(), 1);
    assert_eq!(state.history()[0].node_id, "start");
    assert_eq!(state.steps(), 1);
}

#[tokio::test]
async fn test_decision_routing_is_deterministic() {
    let (scheduler, _) = scheduler();
    let mut graph = WorkflowGraph::new("route");
    graph.add_node(decision("check", None));
    graph.add_node(service("big", "https://x/big"));
    graph.add_node(service("small", "https://x/small"));
    graph.connect_when("check", "big", "x>1");
    graph.connect_when("check", "small", "x<=1");

    for _ in 0..10 {
        let state = scheduler.run(&graph, json!({ "x": 2 })).await.unwrap();
        let visited: Vec<_> = state.history().iter().map(|r| r.node_id.as_str()).collect();
        assert_eq!(visited, vec!["check", "big"]);
    }
}

#[tokio::test]
async fn test_decision_branch_keys_and_fallback() {
    let (scheduler, _) = scheduler();
    let mut graph = WorkflowGraph::new("review");
    graph.add_node(decision("route", Some(r#"if amount > 100 { "review" } else { "auto" }"#)));
    graph.add_node(service("manual", "https://x/manual"));
    graph.add_node(service("approve", "https://x/approve"));
    graph.add_node(service("other", "https://x/other"));
    graph.connect("route", "other");
    graph.connect_when("route", "manual", "review");
    graph.connect_when("route", "approve", "\"auto\"");

    let state = scheduler.run(&graph, json!({ "amount": 250 })).await.unwrap();
    assert_eq!(state.history().last().unwrap().node_id, "manual");
    assert_eq!(state.response_of("route"), Some(&json!({ "result": "review" })));

    let state = scheduler.run(&graph, json!({ "amount": 5 })).await.unwrap();
    assert_eq!(state.history().last().unwrap().node_id, "approve");
}

#[tokio::test]
async fn test_boolean_branch_does_not_fall_through_to_literal_true() {
    let (scheduler, _) = scheduler();
    let mut graph = WorkflowGraph::new("bool");
    graph.add_node(decision("gate", Some("flag")));
    graph.add_node(service("yes", "https://x/yes"));
    graph.add_node(service("no", "https://x/no"));
    graph.connect_when("gate", "yes", "true");
    graph.connect_when("gate", "no", "false");

    let state = scheduler.run(&graph, json!({ "flag": false })).await.unwrap();
    assert_eq!(state.history().last().unwrap().node_id, "no");
}

#[tokio::test]
async fn test_revisited_decision_follows_its_latest_key() {
    let (scheduler, calls) = scheduler();
    let mut graph = WorkflowGraph::new("poll");
    graph.add_node(service("start", "https://x/start"));
    let script = r#"if state.contains("retry") { "done" } else { "retry" }"#;
    graph.add_node(decision("check", Some(script)));
    graph.add_node(service("retry", "https://x/retry"));
    graph.add_node(service("done", "https://x/done"));
    graph.connect("start", "check");
    graph.connect_when("check", "retry", "retry");
    graph.connect_when("check", "done", "done");
    graph.connect("retry", "check");

    let state = scheduler.run(&graph, json!({})).await.unwrap();

    assert_eq!(state.status(), RunStatus::Completed);
    let visited: Vec<_> = state.history().iter().map(|r| r.node_id.as_str()).collect();
    assert_eq!(visited, vec!["start", "check", "retry", "check", "done"]);
    assert_eq!(*calls.lock().unwrap(), vec!["start", "retry", "done"]);
    assert_eq!(state.response_of("check"), Some(&json!({ "result": "done" })));
}

#[tokio::test]
async fn test_bare_word_condition_ignores_state_entry_of_same_name() {
    let (scheduler, _) = scheduler();
    let mut graph = WorkflowGraph::new("shadow");
    graph.add_node(decision("check", Some(r#""done""#)));
    graph.add_node(service("retry", "https://x/retry"));
    graph.add_node(service("done", "https://x/done"));
    graph.connect_when("check", "retry", "retry");
    graph.connect_when("check", "done", "done");

    // A truthy input named like the first branch must not capture the route.
    let state = scheduler.run(&graph, json!({ "retry": { "attempts": 3 } })).await.unwrap();

    assert_eq!(state.status(), RunStatus::Completed);
    assert_eq!(state.history().last().unwrap().node_id, "done");
}

#[tokio::test]
async fn test_revisited_form_passes_stored_submission_through() {
    let (scheduler, calls) = scheduler();
    let mut graph = WorkflowGraph::new("confirm");
    graph.add_node(service("start", "https://x/start"));
    graph.add_node(form("ask"));
    let script = r#"if state.contains("again") { "done" } else { "again" }"#;
    graph.add_node(decision("check", Some(script)));
    graph.add_node(service("again", "https://x/again"));
    graph.add_node(service("done", "https://x/done"));
    graph.connect("start", "ask");
    graph.connect("ask", "check");
    graph.connect_when("check", "again", "again");
    graph.connect_when("check", "done", "done");
    graph.connect("again", "ask");

    let paused = scheduler.run(&graph, json!({})).await.unwrap();
    assert_eq!(paused.current_node_id(), Some("ask"));

    let state = scheduler
        .resume(paused, &graph, json!({ "name": "ada" }))
        .await
        .unwrap();

    assert_eq!(state.status(), RunStatus::Completed);
    let ask: Vec<_> = state
        .history()
        .iter()
        .filter(|r| r.node_id == "ask")
        .map(|r| r.status)
        .collect();
    assert_eq!(ask, vec![RecordStatus::Paused, RecordStatus::Success, RecordStatus::Success]);
    assert_eq!(state.response_of("ask"), Some(&json!({ "name": "ada" })));
    assert_eq!(*calls.lock().unwrap(), vec!["start", "again", "done"]);
}

#[tokio::test]
async fn test_no_matching_edge_fails_the_run() {
    let (scheduler, _) = scheduler();
    let mut graph = WorkflowGraph::new("stuck");
    graph.add_node(decision("check", None));
    graph.add_node(service("big", "https://x/big"));
    graph.connect_when("check", "big", "x > 10");

    let state = scheduler.run(&graph, json!({ "x": 1 })).await.unwrap();

    assert_eq!(state.status(), RunStatus::Failed);
    let failure = state.failure().unwrap();
    assert_eq!(failure.kind, FailureKind::NoMatchingEdge);
    assert_eq!(failure.node_id.as_deref(), Some("check"));
    assert_eq!(state.history().len(), 1);
}

#[tokio::test]
async fn test_pause_and_resume_continuity() {
    let (scheduler, calls) = scheduler();
    let mut graph = WorkflowGraph::new("signup");
    graph.add_node(service("A", "https://x/a"));
    graph.add_node(form("B"));
    let body = json!({ "u": "{{u}}", "name": "{{B.response_data.name}}" });
    graph.add_node(service_with_body("C", body));
    graph.connect("A", "B");
    graph.connect("B", "C");

    let paused = scheduler.run(&graph, json!({ "u": 1 })).await.unwrap();
    assert_eq!(paused.status(), RunStatus::Paused);
    assert_eq!(paused.current_node_id(), Some("B"));
    assert_eq!(paused.pending_form().unwrap()["title"], "Who are you?");
    assert_eq!(paused.history().last().unwrap().status, RecordStatus::Paused);

    let done = scheduler
        .resume(paused, &graph, json!({ "name": "bob" }))
        .await
        .unwrap();

    assert_eq!(done.status(), RunStatus::Completed);
    assert_eq!(done.response_of("B"), Some(&json!({ "name": "bob" })));
    assert_eq!(done.request_of("C"), Some(&json!({ "u": 1, "name": "bob" })));
    assert_eq!(*calls.lock().unwrap(), vec!["A", "C"]);

    let statuses: Vec<_> = done.history().iter().map(|r| (r.node_id.as_str(), r.status)).collect();
    assert_eq!(
        statuses,
        vec![
            ("A", RecordStatus::Success),
            ("B", RecordStatus::Paused),
            ("B", RecordStatus::Success),
            ("C", RecordStatus::Success),
        ]
    );
}

#[tokio::test]
async fn test_rejected_submission_keeps_run_paused() {
    let (scheduler, _) = scheduler();
    let mut graph = WorkflowGraph::new("signup");
    graph.add_node(form("B"));
    graph.add_node(service("C", "https://x/c"));
    graph.connect("B", "C");

    let paused = scheduler.run(&graph, json!({})).await.unwrap();
    let err = scheduler
        .resume(paused.clone(), &graph, json!({ "name": 42 }))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Schema(_)), "{}", err);

    // The caller's copy is untouched and can still be resumed.
    assert_eq!(paused.status(), RunStatus::Paused);
    let done = scheduler.resume(paused, &graph, json!({ "name": "ok" })).await.unwrap();
    assert_eq!(done.status(), RunStatus::Completed);
}

#[tokio::test]
async fn test_resume_requires_paused_state_and_same_graph_version() {
    let (scheduler, _) = scheduler();
    let mut graph = WorkflowGraph::new("signup");
    graph.add_node(form("B"));

    let paused = scheduler.run(&graph, json!({})).await.unwrap();

    let mut edited = graph.clone();
    edited.version += 1;
    let err = scheduler
        .resume(paused.clone(), &edited, json!({ "name": "bob" }))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::GraphMismatch { .. }));

    let done = scheduler.resume(paused, &graph, json!({ "name": "bob" })).await.unwrap();
    assert_eq!(done.status(), RunStatus::Completed);

    let err = scheduler.resume(done, &graph, json!({ "name": "bob" })).await.unwrap_err();
    assert!(matches!(err, EngineError::NotPaused { .. }));
}

#[tokio::test]
async fn test_service_error_without_failure_edge_fails_run() {
    let (scheduler, _) = scheduler();
    let mut graph = WorkflowGraph::new("broken");
    graph.add_node(service("call", "https://x/fail"));
    graph.add_node(service("after", "https://x/after"));
    graph.connect("call", "after");

    let state = scheduler.run(&graph, json!({})).await.unwrap();

    assert_eq!(state.status(), RunStatus::Failed);
    assert_eq!(state.history().len(), 1);
    let record = &state.history()[0];
    assert_eq!(record.status, RecordStatus::Error);
    assert_eq!(record.error_message.as_deref(), Some("HTTP 500: boom"));
    let failure = state.failure().unwrap();
    assert_eq!(failure.kind, FailureKind::NodeFailed);
    assert_eq!(failure.node_id.as_deref(), Some("call"));
}

#[tokio::test]
async fn test_service_error_follows_failure_edge() {
    let (scheduler, _) = scheduler();
    let mut graph = WorkflowGraph::new("recover");
    graph.add_node(service("call", "https://x/fail"));
    graph.add_node(service("after", "https://x/after"));
    graph.add_node(service("cleanup", "https://x/cleanup"));
    graph.connect("call", "after");
    graph.connect_when("call", "cleanup", "error");

    let state = scheduler.run(&graph, json!({})).await.unwrap();

    assert_eq!(state.status(), RunStatus::Completed);
    let visited: Vec<_> = state.history().iter().map(|r| r.node_id.as_str()).collect();
    assert_eq!(visited, vec!["call", "cleanup"]);
}

#[tokio::test]
async fn test_template_error_is_fatal() {
    let (scheduler, _) = scheduler();
    let mut graph = WorkflowGraph::new("fatal");
    graph.add_node(service("call", "https://x/bad-template"));
    graph.add_node(service("cleanup", "https://x/cleanup"));
    graph.connect_when("call", "cleanup", "error");

    let state = scheduler.run(&graph, json!({})).await.unwrap();

    assert_eq!(state.status(), RunStatus::Failed);
    assert_eq!(state.failure().unwrap().kind, FailureKind::Template);
    assert_eq!(state.history().len(), 1);
}

#[tokio::test]
async fn test_graph_configuration_errors() {
    let (scheduler, _) = scheduler();

    let mut two_entries = WorkflowGraph::new("two");
    two_entries.add_node(service("a", "https://x/a"));
    two_entries.add_node(service("b", "https://x/b"));
    let err = scheduler.run(&two_entries, json!({})).await.unwrap_err();
    assert!(matches!(err, EngineError::Graph(GraphError::MultipleEntryNodes(_))));

    let mut dangling = WorkflowGraph::new("dangling");
    dangling.add_node(service("a", "https://x/a"));
    dangling.connect("a", "ghost");
    let err = scheduler.run(&dangling, json!({})).await.unwrap_err();
    assert!(matches!(err, EngineError::Graph(GraphError::DanglingEdge { .. })));

    let mut ring = WorkflowGraph::new("ring");
    ring.add_node(service("a", "https://x/a"));
    ring.add_node(service("b", "https://x/b"));
    ring.connect("a", "b");
    ring.connect("b", "a");
    let err = scheduler.run(&ring, json!({})).await.unwrap_err();
    assert!(matches!(err, EngineError::Graph(GraphError::NoEntryNode)));

    let err = scheduler.run(&linear(1), json!([1, 2])).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidInputs(_)));
}

#[tokio::test]
async fn test_step_budget_stops_loops() {
    let (scheduler, calls) = scheduler_with(RuntimeConfig {
        max_steps: 5,
        ..RuntimeConfig::default()
    });
    let mut graph = WorkflowGraph::new("spin");
    graph.add_node(service("start", "https://x/start"));
    graph.add_node(service("spin", "https://x/spin"));
    graph.connect("start", "spin");
    graph.connect("spin", "spin");

    let state = scheduler.run(&graph, json!({})).await.unwrap();

    assert_eq!(state.status(), RunStatus::Failed);
    assert_eq!(state.failure().unwrap().kind, FailureKind::StepLimitExceeded);
    assert_eq!(state.steps(), 5);
    assert_eq!(calls.lock().unwrap().len(), 5);
}

#[tokio::test]
async fn test_cancelled_run_executes_nothing() {
    let (scheduler, calls) = scheduler();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let state = scheduler
        .run_with_cancel(&linear(3), json!({}), cancel)
        .await
        .unwrap();

    assert_eq!(state.status(), RunStatus::Failed);
    assert_eq!(state.failure().unwrap().kind, FailureKind::Cancelled);
    assert!(state.history().is_empty());
    assert!(calls.lock().unwrap().is_empty());
}
