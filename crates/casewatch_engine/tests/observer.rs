mod support;

use std::sync::Arc;
use std::time::Duration;

use casewatch_core::{
    CaseId, ConnectionState, DisplayState, ErrorKind, ProcessingUpdate, StatusKind, StatusView,
};
use casewatch_engine::{
    ChangeFeed, FeedEventType, Handshake, MemoryChangeFeed, ObserverSettings, RawChange,
    StaticSession, StatusObserver,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use support::{at, error, init_logging, snapshot, FakeClient};

const CASE: &str = "case-42";

async fn wait_for(observer: &StatusObserver, pred: impl Fn(&StatusView) -> bool) -> StatusView {
    let mut rx = observer.changes();
    tokio::time::timeout(Duration::from_secs(600), async {
        loop {
            {
                let view = rx.borrow_and_update();
                if pred(&*view) {
                    return view.clone();
                }
            }
            rx.changed().await.expect("observer running");
        }
    })
    .await
    .expect("view condition reached")
}

fn spawn_observer(
    client: &Arc<FakeClient>,
    token: Option<&str>,
    feed: Option<&Arc<MemoryChangeFeed>>,
) -> (StatusObserver, Arc<StaticSession>) {
    let session = Arc::new(StaticSession::new(token.map(str::to_string)));
    let feed = feed.map(|feed| feed.clone() as Arc<dyn ChangeFeed>);
    let observer = StatusObserver::spawn(
        client.clone(),
        session.clone(),
        feed,
        ObserverSettings::default(),
    );
    (observer, session)
}

fn completed_row() -> RawChange {
    RawChange {
        event: FeedEventType::Update,
        table: "cases".to_string(),
        record: json!({
            "id": CASE,
            "processing_status": "completed",
            "ai_processed": true,
            "updated_at": "2023-11-14T22:13:25Z",
        }),
    }
}

fn processing_row(updated_at: &str) -> RawChange {
    RawChange {
        event: FeedEventType::Update,
        table: "cases".to_string(),
        record: json!({
            "id": CASE,
            "processing_status": "processing",
            "enhanced_processing_status": "precedent_research",
            "updated_at": updated_at,
        }),
    }
}

#[tokio::test(start_paused = true)]
async fn polling_follows_case_to_completion_then_stops() {
    init_logging();
    let client = FakeClient::new();
    client.script_status(
        CASE,
        [
            Ok(snapshot(CASE, StatusKind::Pending, 0)),
            Ok(snapshot(CASE, StatusKind::Processing, 5)),
            Ok(snapshot(CASE, StatusKind::Completed, 10)),
        ],
    );
    let (observer, _session) = spawn_observer(&client, Some("secret"), None);

    let mut transitions = observer.transitions();
    observer.subscribe(CaseId::new(CASE));
    let mut seen: Vec<StatusKind> = Vec::new();
    tokio::time::timeout(Duration::from_secs(120), async {
        loop {
            let view = transitions.recv().await.expect("observer running");
            if let Some(kind) = view.status.as_ref().map(|status| status.status) {
                if seen.last() != Some(&kind) {
                    seen.push(kind);
                }
                if kind.is_terminal() {
                    break;
                }
            }
        }
    })
    .await
    .expect("case completes");

    assert_eq!(
        seen,
        vec![
            StatusKind::Pending,
            StatusKind::Processing,
            StatusKind::Completed
        ]
    );

    tokio::time::sleep(Duration::from_secs(60)).await;
    let view = observer.view();
    assert_eq!(client.status_calls(CASE), 3);
    assert_eq!(view.connection, ConnectionState::Disconnected);
    assert!(!view.is_polling);
    assert_eq!(view.display_state(), DisplayState::Completed);
}

#[tokio::test(start_paused = true)]
async fn live_update_completes_case_and_releases_channel() {
    init_logging();
    let client = FakeClient::new();
    client.set_realtime(Ok(true));
    client.script_status(CASE, [Ok(snapshot(CASE, StatusKind::Processing, 0))]);
    let feed = Arc::new(MemoryChangeFeed::default());
    let (observer, _session) = spawn_observer(&client, Some("secret"), Some(&feed));

    observer.subscribe(CaseId::new(CASE));
    let view = wait_for(&observer, |view| view.is_connected && view.status.is_some()).await;
    assert_eq!(view.connection, ConnectionState::Connected);
    assert_eq!(view.reconnect_attempts, 0);
    assert_eq!(feed.active_subscriptions(), 1);

    assert_eq!(feed.publish(completed_row()), 1);
    let view = wait_for(&observer, |view| {
        view.status
            .as_ref()
            .is_some_and(|status| status.status == StatusKind::Completed)
    })
    .await;

    assert!(!view.is_connected);
    assert!(view.status.as_ref().unwrap().ai_processed);
    assert_eq!(view.notification.as_ref().unwrap().processing_status, "completed");
    assert_eq!(feed.active_subscriptions(), 0);
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(client.status_calls(CASE), 1);
}

#[tokio::test(start_paused = true)]
async fn repeated_channel_failures_fall_back_to_polling() {
    init_logging();
    let client = FakeClient::new();
    client.set_realtime(Ok(true));
    client.script_status(CASE, [Ok(snapshot(CASE, StatusKind::Processing, 0))]);
    let feed = Arc::new(MemoryChangeFeed::new(Handshake::Reject));
    let (observer, _session) = spawn_observer(&client, Some("secret"), Some(&feed));

    let started = tokio::time::Instant::now();
    observer.subscribe(CaseId::new(CASE));
    let view = wait_for(&observer, |view| view.is_polling).await;

    // Reconnects wait 2s, 4s, 8s and 16s before the fifth failure.
    assert!(started.elapsed() >= Duration::from_secs(30));
    assert!(started.elapsed() < Duration::from_secs(31));
    assert_eq!(feed.subscribe_attempts(), 5);
    assert_eq!(view.reconnect_attempts, 5);
    assert_eq!(view.connection, ConnectionState::Polling);

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(feed.subscribe_attempts(), 5);
}

#[tokio::test(start_paused = true)]
async fn reconnect_catches_up_on_missed_updates() {
    init_logging();
    let client = FakeClient::new();
    client.set_realtime(Ok(true));
    client.script_status(CASE, [Ok(snapshot(CASE, StatusKind::Processing, 0))]);
    let feed = Arc::new(MemoryChangeFeed::default());
    let (observer, _session) = spawn_observer(&client, Some("secret"), Some(&feed));

    observer.subscribe(CaseId::new(CASE));
    wait_for(&observer, |view| view.is_connected && view.status.is_some()).await;

    client.set_updates(vec![ProcessingUpdate {
        case_id: CaseId::new(CASE),
        processing_status: "completed".to_string(),
        enhanced_processing_status: Some("report_ready".to_string()),
        ai_processed: true,
        last_updated: Some(at(20)),
    }]);
    assert_eq!(feed.fail_all("socket closed"), 1);
    let view = wait_for(&observer, |view| {
        view.status
            .as_ref()
            .is_some_and(|status| status.status == StatusKind::Completed)
    })
    .await;

    assert_eq!(client.update_queries().last(), Some(&at(0)));
    assert_eq!(view.status.as_ref().unwrap().case_stage, "report_ready");
    assert_eq!(view.status.as_ref().unwrap().last_update, at(20));
    assert!(!view.is_connected);
}

#[tokio::test(start_paused = true)]
async fn terminal_poll_ends_watch_even_when_push_clock_runs_ahead() {
    init_logging();
    let client = FakeClient::new();
    client.set_realtime(Ok(true));
    client.script_status(
        CASE,
        [
            Ok(snapshot(CASE, StatusKind::Processing, 0)),
            Ok(snapshot(CASE, StatusKind::Completed, 50)),
        ],
    );
    let feed = Arc::new(MemoryChangeFeed::default());
    let (observer, _session) = spawn_observer(&client, Some("secret"), Some(&feed));

    observer.subscribe(CaseId::new(CASE));
    wait_for(&observer, |view| view.is_connected && view.status.is_some()).await;
    // Stamped 22:15:00Z, ahead of the 22:14:10Z the API reports on completion.
    assert_eq!(feed.publish(processing_row("2023-11-14T22:15:00Z")), 1);
    wait_for(&observer, |view| view.notification.is_some()).await;

    feed.set_handshake(Handshake::Reject);
    assert_eq!(feed.fail_all("socket closed"), 1);
    let view = wait_for(&observer, |view| {
        view.status
            .as_ref()
            .is_some_and(|status| status.status == StatusKind::Completed)
    })
    .await;
    assert_eq!(view.status.as_ref().unwrap().last_update, at(50));

    tokio::time::sleep(Duration::from_secs(600)).await;
    let view = observer.view();
    assert!(!view.is_polling);
    assert_eq!(view.connection, ConnectionState::Disconnected);
    assert_eq!(view.display_state(), DisplayState::Completed);
    assert_eq!(client.status_calls(CASE), 2);
}

#[tokio::test(start_paused = true)]
async fn unstamped_push_does_not_block_newer_snapshots() {
    init_logging();
    let client = FakeClient::new();
    client.set_realtime(Ok(true));
    client.script_status(CASE, [Ok(snapshot(CASE, StatusKind::Pending, 0))]);
    let feed = Arc::new(MemoryChangeFeed::default());
    let (observer, _session) = spawn_observer(&client, Some("secret"), Some(&feed));

    observer.subscribe(CaseId::new(CASE));
    wait_for(&observer, |view| view.is_connected && view.status.is_some()).await;
    let unstamped = RawChange {
        event: FeedEventType::Update,
        table: "cases".to_string(),
        record: json!({ "id": CASE, "processing_status": "processing" }),
    };
    assert_eq!(feed.publish(unstamped), 1);
    let view = wait_for(&observer, |view| view.notification.is_some()).await;
    assert_eq!(view.status.as_ref().unwrap().status, StatusKind::Processing);
    assert_eq!(view.status.as_ref().unwrap().last_update, at(0));

    client.script_status(CASE, [Ok(snapshot(CASE, StatusKind::Processing, 5))]);
    observer.refresh_status();
    let view = wait_for(&observer, |view| {
        view.status
            .as_ref()
            .is_some_and(|status| status.last_update == at(5))
    })
    .await;
    assert_eq!(view.status.as_ref().unwrap().case_stage, "analysis");
}

#[tokio::test(start_paused = true)]
async fn resubscribe_ignores_capability_check_from_earlier_subscription() {
    init_logging();
    let client = FakeClient::new();
    client.set_realtime(Ok(true));
    client.set_realtime_delay(Duration::from_secs(5));
    client.script_status(CASE, [Ok(snapshot(CASE, StatusKind::Processing, 0))]);
    let feed = Arc::new(MemoryChangeFeed::default());
    let (observer, _session) = spawn_observer(&client, Some("secret"), Some(&feed));

    observer.subscribe(CaseId::new(CASE));
    tokio::time::sleep(Duration::from_secs(1)).await;
    // The first capability check is still in flight and will answer "live".
    client.set_realtime(Ok(false));
    observer.unsubscribe();
    observer.subscribe(CaseId::new(CASE));

    tokio::time::sleep(Duration::from_secs(4) + Duration::from_millis(500)).await;
    let view = observer.view();
    assert_eq!(view.connection, ConnectionState::Disconnected);
    assert!(view.is_loading);

    let view = wait_for(&observer, |view| view.is_polling && view.status.is_some()).await;
    assert_eq!(view.status.as_ref().unwrap().status, StatusKind::Processing);
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(feed.subscribe_attempts(), 0);
    assert!(observer.view().is_polling);
}

#[tokio::test(start_paused = true)]
async fn auth_failure_halts_polling_until_session_refresh() {
    init_logging();
    let client = FakeClient::new();
    client.script_status(CASE, [Err(error(ErrorKind::Auth))]);
    let (observer, session) = spawn_observer(&client, None, None);

    observer.subscribe(CaseId::new(CASE));
    tokio::time::sleep(Duration::from_secs(60)).await;

    let view = observer.view();
    assert!(!view.is_polling);
    assert_eq!(view.error.as_ref().map(|err| err.kind), Some(ErrorKind::Auth));
    assert_eq!(view.display_state(), DisplayState::Error);
    assert_eq!(client.status_calls(CASE), 1);

    client.script_status(CASE, [Ok(snapshot(CASE, StatusKind::Processing, 30))]);
    session.set_token(Some("fresh".to_string()));
    observer.session_refreshed();
    let view = wait_for(&observer, |view| view.is_polling && view.status.is_some()).await;
    assert_eq!(view.error, None);
}

#[tokio::test(start_paused = true)]
async fn session_refresh_upgrades_polling_to_live() {
    init_logging();
    let client = FakeClient::new();
    client.set_realtime(Ok(true));
    client.script_status(CASE, [Ok(snapshot(CASE, StatusKind::Processing, 0))]);
    let feed = Arc::new(MemoryChangeFeed::default());
    let (observer, session) = spawn_observer(&client, None, Some(&feed));

    observer.subscribe(CaseId::new(CASE));
    wait_for(&observer, |view| view.is_polling).await;
    assert_eq!(feed.subscribe_attempts(), 0);

    session.set_token(Some("secret".to_string()));
    observer.session_refreshed();
    wait_for(&observer, |view| view.is_connected).await;
    assert_eq!(feed.active_subscriptions(), 1);

    tokio::time::sleep(Duration::from_secs(1)).await;
    let calls = client.status_calls(CASE);
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(client.status_calls(CASE), calls);
}

#[tokio::test(start_paused = true)]
async fn unsubscribe_releases_everything_and_is_idempotent() {
    init_logging();
    let client = FakeClient::new();
    client.set_realtime(Ok(true));
    client.script_status(CASE, [Ok(snapshot(CASE, StatusKind::Processing, 0))]);
    let feed = Arc::new(MemoryChangeFeed::default());
    let (observer, _session) = spawn_observer(&client, Some("secret"), Some(&feed));

    observer.subscribe(CaseId::new(CASE));
    wait_for(&observer, |view| view.is_connected).await;

    observer.unsubscribe();
    observer.unsubscribe();
    let view = wait_for(&observer, |view| view.case_id.is_none()).await;
    assert_eq!(view.status, None);
    assert_eq!(view.connection, ConnectionState::Disconnected);
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(feed.active_subscriptions(), 0);
}

#[tokio::test(start_paused = true)]
async fn dropping_the_observer_stops_polling() {
    init_logging();
    let client = FakeClient::new();
    client.script_status(CASE, [Ok(snapshot(CASE, StatusKind::Processing, 0))]);
    let (observer, _session) = spawn_observer(&client, Some("secret"), None);

    observer.subscribe(CaseId::new(CASE));
    wait_for(&observer, |view| view.is_polling).await;
    tokio::time::sleep(Duration::from_secs(12)).await;
    observer.shutdown();

    tokio::time::sleep(Duration::from_millis(10)).await;
    let calls = client.status_calls(CASE);
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(client.status_calls(CASE), calls);
}

#[tokio::test(start_paused = true)]
async fn missing_case_shows_no_data_and_keeps_polling() {
    init_logging();
    let client = FakeClient::new();
    let (observer, _session) = spawn_observer(&client, Some("secret"), None);

    observer.subscribe(CaseId::new(CASE));
    let view = wait_for(&observer, |view| view.is_polling && !view.is_loading).await;
    assert_eq!(view.display_state(), DisplayState::NoData);

    tokio::time::sleep(Duration::from_secs(11)).await;
    assert!(client.status_calls(CASE) >= 3);
    assert!(observer.view().is_polling);
}
