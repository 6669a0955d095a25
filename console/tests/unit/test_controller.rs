//! Controller scenarios: load, issue, rollback and teardown

use std::time::Duration;

use deployctl::deploy::fsm::{Action, ActionKind};
use deployctl::errors::ConsoleError;
use deployctl::models::deployment::{DeploymentStatus, Environment};
use deployctl::models::progress::{ProgressEvent, ProgressPhase, ProgressStatus};

use crate::support::{settle, Harness, Reply};

#[tokio::test(start_paused = true)]
async fn test_load_stable_does_not_poll() {
    let harness = Harness::new();
    harness
        .transport
        .script("GET /deployments/1", [Reply::status(DeploymentStatus::Running)]);

    let deployment = harness.controller.load(1).await.unwrap();
    assert_eq!(deployment.status, DeploymentStatus::Running);
    assert!(!harness.controller.is_polling(1));

    let actions = harness.controller.enabled_actions(1);
    assert!(actions.contains(ActionKind::Stop));
    assert!(!actions.contains(ActionKind::Start));

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(harness.transport.count("GET /deployments/1"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_start_rejected_while_pending() {
    let harness = Harness::new();
    harness
        .transport
        .script("GET /deployments/1", [Reply::status(DeploymentStatus::Pending)]);

    harness.controller.load(1).await.unwrap();
    assert!(harness.controller.is_polling(1));
    assert!(harness.controller.enabled_actions(1).is_empty());

    let result = harness.controller.issue(Action::Start, 1).await;
    assert!(matches!(result, Err(ConsoleError::ValidationError(_))));
    assert_eq!(harness.transport.count("POST /deployments/1/start"), 0);
    assert_eq!(
        harness.controller.current(1).unwrap().status,
        DeploymentStatus::Pending
    );

    harness.controller.teardown(1);
}

#[tokio::test(start_paused = true)]
async fn test_issue_loads_unobserved_deployment() {
    let harness = Harness::new();
    harness.transport.script(
        "GET /deployments/1",
        [
            Reply::status(DeploymentStatus::Stopped),
            Reply::status(DeploymentStatus::Running),
        ],
    );
    harness
        .transport
        .script("POST /deployments/1/start", [Reply::ok(r#"{"message": "Starting"}"#)]);

    harness.controller.issue(Action::Start, 1).await.unwrap();
    assert_eq!(
        harness.controller.current(1).unwrap().status,
        DeploymentStatus::Starting
    );
    assert!(harness.controller.is_polling(1));

    tokio::time::sleep(Duration::from_secs(4)).await;
    assert_eq!(
        harness.controller.current(1).unwrap().status,
        DeploymentStatus::Running
    );
    assert!(!harness.controller.is_polling(1));
    assert_eq!(
        harness.journal(),
        vec![
            "GET /deployments/1",
            "POST /deployments/1/start",
            "GET /deployments/1"
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_sync_streams_progress_then_refreshes() {
    let harness = Harness::new();
    harness.transport.script(
        "GET /deployments/1",
        [
            Reply::status(DeploymentStatus::Success),
            Reply::status(DeploymentStatus::Success),
        ],
    );
    harness
        .transport
        .script("POST /deployments/1/sync", [Reply::ok(r#"{"message": "Sync started"}"#)]);

    harness.controller.load(1).await.unwrap();
    let mut subscription = harness.controller.subscribe(1).unwrap();

    harness.controller.issue(Action::Sync, 1).await.unwrap();
    assert_eq!(
        harness.controller.current(1).unwrap().status,
        DeploymentStatus::Syncing
    );
    assert!(harness.controller.progress(1).unwrap().in_progress);

    // channel opened before the sync request went out
    assert_eq!(
        harness.journal(),
        vec!["GET /deployments/1", "CONNECT 1", "POST /deployments/1/sync"]
    );

    harness.send(ProgressEvent::new(
        ProgressStatus::Running,
        "Pulling changes",
        40,
    ));
    settle().await;
    let record = subscription.progress.borrow_and_update().clone();
    assert_eq!(record.progress, 40);
    assert_eq!(record.message, "Pulling changes");
    assert!(record.in_progress);

    harness.send(ProgressEvent::new(
        ProgressStatus::Complete,
        "Sync complete",
        100,
    ));
    settle().await;

    let record = harness.controller.progress(1).unwrap();
    assert_eq!(record.phase, ProgressPhase::Complete);
    assert_eq!(record.progress, 100);
    assert!(!record.in_progress);
    assert_eq!(
        harness.controller.current(1).unwrap().status,
        DeploymentStatus::Success
    );
    assert_eq!(harness.channel.closes(), 1);
    assert!(!harness.controller.is_streaming(1));
    assert!(!harness.controller.is_polling(1));
    assert_eq!(harness.transport.count("POST /deployments/1/sync"), 1);
    assert_eq!(harness.transport.count("GET /deployments/1"), 2);
}

fn sync_then_start(harness: &Harness) {
    harness.transport.script(
        "GET /deployments/1",
        [
            Reply::status(DeploymentStatus::Success),
            Reply::status(DeploymentStatus::Success),
            Reply::status(DeploymentStatus::Success),
            Reply::status(DeploymentStatus::Starting),
        ],
    );
    harness
        .transport
        .script("POST /deployments/1/sync", [Reply::ok(r#"{"message": "Sync started"}"#)]);
    harness
        .transport
        .script("POST /deployments/1/start", [Reply::ok(r#"{"message": "Starting"}"#)]);
}

fn complete(harness: &Harness) {
    harness.send(ProgressEvent::new(ProgressStatus::Complete, "Sync complete", 100));
}

fn assert_starting(harness: &Harness) {
    assert_eq!(
        harness.controller.current(1).unwrap().status,
        DeploymentStatus::Starting
    );
    assert!(harness.controller.is_polling(1));
    assert!(!harness.controller.enabled_actions(1).contains(ActionKind::Start));
}

#[tokio::test(start_paused = true)]
async fn test_late_final_fetch_does_not_override_next_action() {
    let harness = Harness::new();
    sync_then_start(&harness);

    harness.controller.load(1).await.unwrap();
    harness.controller.issue(Action::Sync, 1).await.unwrap();

    // the fetch after the stream ends hangs
    let gate = harness.transport.gate("GET /deployments/1");
    complete(&harness);
    settle().await;
    assert!(harness.controller.is_streaming(1));

    // the refresher reports success in the meantime
    tokio::time::sleep(Duration::from_millis(3500)).await;
    assert_eq!(
        harness.controller.current(1).unwrap().status,
        DeploymentStatus::Success
    );
    assert!(!harness.controller.is_polling(1));

    harness.controller.issue(Action::Start, 1).await.unwrap();
    gate.notify_one();
    settle().await;

    assert!(!harness.controller.is_streaming(1));
    assert_starting(&harness);

    tokio::time::sleep(Duration::from_millis(3500)).await;
    assert_starting(&harness);
    assert_eq!(harness.transport.count("GET /deployments/1"), 4);

    harness.controller.teardown(1);
}

#[tokio::test(start_paused = true)]
async fn test_late_refresh_does_not_override_next_action() {
    let harness = Harness::new();
    sync_then_start(&harness);

    harness.controller.load(1).await.unwrap();
    harness.controller.issue(Action::Sync, 1).await.unwrap();

    // the refresher's first tick hangs
    let gate = harness.transport.gate("GET /deployments/1");
    tokio::time::sleep(Duration::from_millis(3500)).await;
    assert_eq!(harness.transport.count("GET /deployments/1"), 2);
    assert!(harness.controller.is_polling(1));

    // the final fetch settles the deployment while that tick is in flight
    complete(&harness);
    settle().await;
    assert_eq!(
        harness.controller.current(1).unwrap().status,
        DeploymentStatus::Success
    );

    harness.controller.issue(Action::Start, 1).await.unwrap();
    gate.notify_one();
    settle().await;
    assert_starting(&harness);

    tokio::time::sleep(Duration::from_millis(3500)).await;
    assert_starting(&harness);
    assert_eq!(harness.transport.count("GET /deployments/1"), 4);

    harness.controller.teardown(1);
}

#[tokio::test(start_paused = true)]
async fn test_failed_action_rolls_back() {
    let harness = Harness::new();
    harness
        .transport
        .script("GET /deployments/1", [Reply::status(DeploymentStatus::Success)]);
    harness.transport.script(
        "POST /deployments/1/stop",
        [Reply::Status(500, r#"{"detail": "SSH connection failed"}"#.to_string())],
    );

    harness.controller.load(1).await.unwrap();
    let result = harness.controller.issue(Action::Stop, 1).await;

    match result {
        Err(ConsoleError::ApiError { status, detail }) => {
            assert_eq!(status, 500);
            assert_eq!(detail, "SSH connection failed");
        }
        other => panic!("unexpected result {:?}", other),
    }
    assert_eq!(
        harness.controller.current(1).unwrap().status,
        DeploymentStatus::Success
    );
    assert!(!harness.controller.is_polling(1));
    assert!(harness.controller.enabled_actions(1).contains(ActionKind::Stop));
}

#[tokio::test(start_paused = true)]
async fn test_failed_sync_closes_channel() {
    let harness = Harness::new();
    harness
        .transport
        .script("GET /deployments/1", [Reply::status(DeploymentStatus::Success)]);
    harness
        .transport
        .script("POST /deployments/1/sync", [Reply::Network]);

    harness.controller.load(1).await.unwrap();
    let result = harness.controller.issue(Action::Sync, 1).await;

    assert!(matches!(result, Err(ConsoleError::Network { .. })));
    assert_eq!(harness.channel.connects(), 1);
    assert_eq!(harness.channel.closes(), 1);
    assert!(!harness.controller.is_streaming(1));
    let record = harness.controller.progress(1).unwrap();
    assert_eq!(record.phase, ProgressPhase::Error);
    assert!(!record.in_progress);
    assert_eq!(
        harness.controller.current(1).unwrap().status,
        DeploymentStatus::Success
    );
}

#[tokio::test(start_paused = true)]
async fn test_deploy_sends_path_and_environment() {
    let harness = Harness::new();
    harness
        .transport
        .script("GET /deployments/1", [Reply::status(DeploymentStatus::NotDeployed)]);
    harness
        .transport
        .script("POST /deployments/1/deploy", [Reply::ok(r#"{"message": "Deploying"}"#)]);

    harness.controller.load(1).await.unwrap();
    harness
        .controller
        .issue(
            Action::Deploy {
                deploy_path: Some("/opt/new".to_string()),
                environment: Environment::Staging,
            },
            1,
        )
        .await
        .unwrap();

    assert_eq!(
        harness.controller.current(1).unwrap().status,
        DeploymentStatus::Pending
    );
    assert!(harness.controller.is_polling(1));
    assert_eq!(harness.channel.connects(), 0);
    harness.controller.teardown(1);
}

#[tokio::test(start_paused = true)]
async fn test_delete_releases_view() {
    let harness = Harness::new();
    harness
        .transport
        .script("GET /deployments/1", [Reply::status(DeploymentStatus::Failed)]);
    harness.transport.script(
        "DELETE /deployments/1",
        [Reply::ok(r#"{"message": "Deployment deleted"}"#)],
    );

    harness.controller.load(1).await.unwrap();
    harness.controller.issue(Action::Delete, 1).await.unwrap();

    assert!(harness.controller.subscribe(1).is_none());
    assert!(harness.controller.current(1).is_none());
    assert!(harness.controller.enabled_actions(1).is_empty());
    assert!(!harness.controller.is_polling(1));
}

#[tokio::test(start_paused = true)]
async fn test_teardown_stops_polling_and_mutation() {
    let harness = Harness::new();
    harness.transport.script(
        "GET /deployments/1",
        [
            Reply::status(DeploymentStatus::Syncing),
            Reply::status(DeploymentStatus::Success),
        ],
    );

    harness.controller.load(1).await.unwrap();
    let subscription = harness.controller.subscribe(1).unwrap();
    assert!(harness.controller.is_polling(1));

    harness.controller.teardown(1);
    assert!(!harness.controller.is_polling(1));

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(harness.transport.count("GET /deployments/1"), 1);
    assert_eq!(
        subscription.deployment.borrow().as_ref().unwrap().status,
        DeploymentStatus::Syncing
    );
}

#[tokio::test(start_paused = true)]
async fn test_teardown_during_stream_ignores_late_events() {
    let harness = Harness::new();
    harness
        .transport
        .script("GET /deployments/1", [Reply::status(DeploymentStatus::Running)]);
    harness
        .transport
        .script("POST /deployments/1/sync", [Reply::ok("{}")]);

    harness.controller.load(1).await.unwrap();
    harness.controller.issue(Action::Sync, 1).await.unwrap();
    let subscription = harness.controller.subscribe(1).unwrap();
    assert!(harness.controller.is_streaming(1));

    harness.controller.teardown(1);
    harness.send(ProgressEvent::new(
        ProgressStatus::Complete,
        "Sync complete",
        100,
    ));
    tokio::time::sleep(Duration::from_secs(30)).await;

    let record = subscription.progress.borrow().clone();
    assert!(record.in_progress);
    assert_eq!(record.progress, 0);
    assert_eq!(harness.transport.count("GET /deployments/1"), 1);
    assert!(!harness.controller.is_streaming(1));
}
