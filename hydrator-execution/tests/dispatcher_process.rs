//! Dispatcher tests against real worker processes
//!
//! Shell one-liners stand in for worker binaries so the reply, exit and
//! timeout signal paths are exercised end-to-end. The callback points at
//! an unreachable port: delivery failures must be logged, never folded
//! into the task outcome.

#![cfg(unix)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;
use url::Url;

use hydrator_config::HttpConfig;
use hydrator_core::HydrationTask;
use hydrator_delivery::CallbackClient;
use hydrator_execution::{
    DispatcherConfig, ExecutionError, TaskDispatcher, WorkerPool, WorkerSpawnConfig,
    TASK_TIMEOUT_MESSAGE,
};

/// Shell worker that answers the first request with a fixed reply body,
/// echoing back the request's correlation id.
fn replying_script(reply_json: &str) -> String {
    format!(
        r#"read -r line
id=$(printf '%s' "$line" | sed -n 's/.*"correlation_id":"\([0-9a-f-]*\)".*/\1/p')
printf '{{"protocol_version":1,"timestamp":"2024-01-01T00:00:00Z","message":{{"type":"hydration_result","correlation_id":"%s","reply":{}}}}}\n' "$id"
sleep 5
"#,
        reply_json
    )
}

fn dispatcher_for(script: &str, timeout: Duration, grace: Duration) -> TaskDispatcher {
    let spawn_config = WorkerSpawnConfig {
        program: Some("sh".into()),
        args: vec!["-c".to_string(), script.to_string()],
    };
    let pool = Arc::new(WorkerPool::new(spawn_config, 1));
    let delivery = CallbackClient::new(&HttpConfig::default()).unwrap();
    let config = DispatcherConfig {
        function_path: "hydraters/test".to_string(),
        function_config: serde_json::Value::Null,
        task_timeout: timeout,
        termination_grace: grace,
    };
    TaskDispatcher::new(pool, delivery, config)
}

fn task() -> HydrationTask {
    HydrationTask {
        file_path: Url::parse("http://files.example.com/a.pdf").unwrap(),
        // Unreachable on purpose; delivery failures stay out of the outcome.
        callback: Url::parse("http://127.0.0.1:9/documents/1").unwrap(),
        document: Default::default(),
        priority: 0,
    }
}

#[tokio::test]
async fn reply_with_changes_resolves_the_task() {
    let script = replying_script(r#"{"changes":{"metadata":{"a":1}}}"#);
    let dispatcher = dispatcher_for(&script, Duration::from_secs(10), Duration::from_millis(100));

    let outcome = dispatcher.execute(task()).await;

    assert!(outcome.error.is_none(), "unexpected error: {:?}", outcome.error);
    let changes = outcome.changes.expect("changes expected");
    assert_eq!(changes.get("metadata"), Some(&json!({"a": 1})));
}

#[tokio::test]
async fn reply_changes_are_sanitized_before_delivery() {
    let script = replying_script(r#"{"changes":{"metadata":{"a":1},"actions":[],"data":{}}}"#);
    let dispatcher = dispatcher_for(&script, Duration::from_secs(10), Duration::from_millis(100));

    let outcome = dispatcher.execute(task()).await;

    let changes = outcome.changes.expect("changes expected");
    assert_eq!(changes.get("metadata"), Some(&json!({"a": 1})));
    assert!(changes.get("actions").is_none());
    assert!(changes.get("data").is_none());
}

#[tokio::test]
async fn terminal_reply_error_is_reported_as_data() {
    let script = replying_script(r#"{"error":{"kind":"hydration","message":"Corrupted file"}}"#);
    let dispatcher = dispatcher_for(&script, Duration::from_secs(10), Duration::from_millis(100));

    let outcome = dispatcher.execute(task()).await;

    assert!(outcome.error.is_none());
    let changes = outcome.changes.expect("failure change-set expected");
    assert!(changes.is_hydration_failure());
    assert_eq!(changes.get("hydration_error"), Some(&json!("Corrupted file")));
}

#[tokio::test]
async fn transient_reply_error_fails_the_job() {
    let script = replying_script(r#"{"error":{"kind":"task","message":"disk full"}}"#);
    let dispatcher = dispatcher_for(&script, Duration::from_secs(10), Duration::from_millis(100));

    let outcome = dispatcher.execute(task()).await;

    assert!(matches!(outcome.error, Some(ExecutionError::Task(_))));
}

#[tokio::test]
async fn deferral_reply_produces_no_error_and_no_changes() {
    let script = replying_script("{}");
    let dispatcher = dispatcher_for(&script, Duration::from_secs(10), Duration::from_millis(100));

    let outcome = dispatcher.execute(task()).await;

    assert!(outcome.error.is_none());
    assert!(outcome.changes.is_none());
}

#[tokio::test]
async fn nonzero_exit_is_a_transient_failure() {
    let dispatcher = dispatcher_for("exit 7", Duration::from_secs(10), Duration::from_millis(100));

    let outcome = dispatcher.execute(task()).await;

    assert!(matches!(
        outcome.error,
        Some(ExecutionError::WorkerExited { code: 7 })
    ));
    assert!(outcome.changes.is_none());
}

#[tokio::test]
async fn unresponsive_worker_times_out_with_the_recorded_message() {
    let dispatcher = dispatcher_for(
        // Ignore SIGTERM so the forced kill path is the one that ends it.
        "trap '' TERM; sleep 30",
        Duration::from_millis(300),
        Duration::from_millis(100),
    );

    let started = Instant::now();
    let outcome = dispatcher.execute(task()).await;
    let elapsed = started.elapsed();

    assert!(outcome.error.is_none(), "timeout must not be a job error");
    let changes = outcome.changes.expect("timeout change-set expected");
    assert!(changes.is_hydration_failure());
    assert_eq!(
        changes.get("hydration_error"),
        Some(&json!(TASK_TIMEOUT_MESSAGE))
    );

    // Finalized within timeout + grace, with scheduling slack.
    assert!(
        elapsed < Duration::from_secs(5),
        "finalization took {:?}",
        elapsed
    );
}
