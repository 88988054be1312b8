//! Orchestrator: pre-session buffering, deep links, and the PIN flow.

use std::sync::Arc;
use std::time::Duration;

use assurance_core::{CloseCode, ConnectionError, Environment, EventType, FileStore, IdentityStore};
use integration_tests::fixtures::{self, authenticated_details, stage_deep_link, PIN, SESSION_ID};
use integration_tests::mocks::UiCall;
use integration_tests::setup::{settle, TestContext};
use session::{SessionConfig, SessionState};

#[tokio::test(start_paused = true)]
async fn test_only_one_live_session() {
    let ctx = TestContext::new();
    let orchestrator = ctx.orchestrator(vec![]);

    assert!(orchestrator.create_session(authenticated_details()));
    assert!(!orchestrator.create_session(authenticated_details()));

    assert_eq!(ctx.factory.created(), 1);
    assert_eq!(ctx.socket().connect_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_buffered_events_are_delivered_after_pairing() {
    let ctx = TestContext::new();
    let orchestrator = ctx.orchestrator(vec![]);

    for event in fixtures::generic_events(orchestrator.event_sequence(), 3) {
        assert!(orchestrator.queue_event(event));
    }
    assert_eq!(orchestrator.buffered_len(), 3);

    assert!(orchestrator.handle_deep_link(&stage_deep_link()));
    assert_eq!(orchestrator.buffered_len(), 0);
    assert!(ctx.presenter.contains(&UiCall::PinPrompt));
    assert_eq!(ctx.socket().connect_count(), 0);

    orchestrator.pin_screen_connect_clicked(PIN).unwrap();
    let socket = ctx.socket();
    assert_eq!(socket.connect_count(), 1);

    // goes straight to the session now
    assert!(orchestrator.queue_event(fixtures::generic_event(orchestrator.event_sequence(), "live")));

    socket.open();
    settle().await;

    let sent = socket.sent();
    assert_eq!(sent[0].event_type, EventType::Client);
    let labels: Vec<_> = sent[1..].iter().filter_map(fixtures::label_of).collect();
    assert_eq!(labels, vec!["event-0", "event-1", "event-2", "live"]);
    assert!(orchestrator.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_stage_deep_link_targets_stage_host() {
    let ctx = TestContext::new();
    let orchestrator = ctx.orchestrator(vec![]);

    assert!(orchestrator.handle_deep_link(&stage_deep_link()));
    let session = orchestrator.session().unwrap();
    assert_eq!(session.session_id(), SESSION_ID);
    assert_eq!(session.details().environment(), Environment::Stage);

    orchestrator.pin_screen_connect_clicked(PIN).unwrap();
    let connects = ctx.socket().connects();
    let url = &connects[0];
    assert!(url.host_str().unwrap().contains("-stage"));
    let query: Vec<(String, String)> = url.query_pairs().into_owned().collect();
    assert!(query.contains(&("token".to_string(), PIN.to_string())));
    assert!(query.contains(&("orgId".to_string(), fixtures::ORG_ID.to_string())));
}

#[tokio::test(start_paused = true)]
async fn test_malformed_deep_link_is_ignored() {
    let ctx = TestContext::new();
    let orchestrator = ctx.orchestrator(vec![]);

    assert!(!orchestrator.handle_deep_link("myapp://?unrelated=1"));
    assert!(!orchestrator.handle_deep_link("not a link"));

    assert!(orchestrator.session().is_none());
    assert_eq!(ctx.factory.created(), 0);
    assert!(orchestrator.can_process_events());
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_timer_drops_buffer_without_session() {
    let ctx = TestContext::new();
    let orchestrator = ctx.orchestrator(vec![]);
    for event in fixtures::generic_events(orchestrator.event_sequence(), 2) {
        orchestrator.queue_event(event);
    }

    orchestrator.start_shutdown_timer();
    tokio::time::advance(Duration::from_millis(4_900)).await;
    settle().await;
    assert!(orchestrator.can_process_events());
    assert_eq!(orchestrator.buffered_len(), 2);

    tokio::time::advance(Duration::from_millis(200)).await;
    settle().await;

    assert!(!orchestrator.can_process_events());
    assert!(orchestrator.has_ever_terminated());
    assert_eq!(orchestrator.buffered_len(), 0);
    assert!(!orchestrator.queue_event(fixtures::generic_event(orchestrator.event_sequence(), "late")));
}

#[tokio::test(start_paused = true)]
async fn test_deep_link_cancels_shutdown_timer() {
    let ctx = TestContext::new();
    let orchestrator = ctx.orchestrator(vec![]);

    orchestrator.start_shutdown_timer();
    assert!(orchestrator.handle_deep_link(&stage_deep_link()));

    tokio::time::advance(Duration::from_secs(10)).await;
    settle().await;

    assert!(orchestrator.session().is_some());
    assert!(orchestrator.can_process_events());
    assert!(!orchestrator.has_ever_terminated());
}

#[tokio::test(start_paused = true)]
async fn test_empty_pin_keeps_session_pending() {
    let ctx = TestContext::new();
    let orchestrator = ctx.orchestrator(vec![]);
    orchestrator.handle_deep_link(&stage_deep_link());

    assert_eq!(
        orchestrator.pin_screen_connect_clicked("   "),
        Err(ConnectionError::NoPinCode)
    );

    assert!(orchestrator.session().is_some());
    assert_eq!(ctx.presenter.errors(), vec![ConnectionError::NoPinCode]);
    assert!(!ctx.presenter.contains(&UiCall::Dismissed));
    assert_eq!(ctx.socket().connect_count(), 0);

    // a second try with a real PIN connects
    orchestrator.pin_screen_connect_clicked(PIN).unwrap();
    assert_eq!(ctx.socket().connect_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_missing_org_id_terminates_session() {
    let ctx = TestContext::with_config(SessionConfig::default());
    let orchestrator = ctx.orchestrator(vec![]);
    orchestrator.handle_deep_link(&stage_deep_link());

    assert_eq!(
        orchestrator.pin_screen_connect_clicked(PIN),
        Err(ConnectionError::NoOrgId)
    );

    assert!(orchestrator.session().is_none());
    assert_eq!(ctx.presenter.errors(), vec![ConnectionError::NoOrgId]);
    assert!(ctx.presenter.contains(&UiCall::Dismissed));
}

#[tokio::test(start_paused = true)]
async fn test_pin_without_session_fails() {
    let ctx = TestContext::new();
    let orchestrator = ctx.orchestrator(vec![]);

    assert_eq!(
        orchestrator.pin_screen_connect_clicked(PIN),
        Err(ConnectionError::Generic)
    );
}

#[tokio::test(start_paused = true)]
async fn test_initialize_pin_screen_flow_reprompts_pending_session() {
    let ctx = TestContext::new();
    let orchestrator = ctx.orchestrator(vec![]);
    orchestrator.handle_deep_link(&stage_deep_link());

    orchestrator.initialize_pin_screen_flow();

    let prompts = ctx
        .presenter
        .calls()
        .into_iter()
        .filter(|c| *c == UiCall::PinPrompt)
        .count();
    assert_eq!(prompts, 2);
}

#[tokio::test(start_paused = true)]
async fn test_pin_cancel_terminates() {
    let ctx = TestContext::new();
    let orchestrator = ctx.orchestrator(vec![]);
    orchestrator.handle_deep_link(&stage_deep_link());

    orchestrator.pin_screen_cancel_clicked();

    assert!(orchestrator.session().is_none());
    assert!(orchestrator.has_ever_terminated());
    assert!(!orchestrator.can_process_events());
}

#[tokio::test(start_paused = true)]
async fn test_resume_persisted_session() {
    let ctx = TestContext::new();
    let url = authenticated_details().derive_connection_url().unwrap();
    ctx.identity.save_connected_url(url.as_str());
    let orchestrator = ctx.orchestrator(vec![]);

    assert!(orchestrator.resume_persisted_session());

    let session = orchestrator.session().unwrap();
    assert_eq!(session.session_id(), SESSION_ID);
    assert_eq!(session.state(), SessionState::Connecting);
    assert_eq!(ctx.socket().connects(), vec![url]);
}

#[tokio::test(start_paused = true)]
async fn test_unusable_persisted_url_is_cleared() {
    let ctx = TestContext::new();
    ctx.identity.save_connected_url("https://example.com/somewhere-else");
    let orchestrator = ctx.orchestrator(vec![]);

    assert!(!orchestrator.resume_persisted_session());
    assert_eq!(ctx.identity.connected_url(), None);
    assert!(orchestrator.session().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_resume_without_persisted_url_does_nothing() {
    let ctx = TestContext::new();
    let orchestrator = ctx.orchestrator(vec![]);

    assert!(!orchestrator.resume_persisted_session());
    assert_eq!(ctx.factory.created(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_clicked_ends_session() {
    let ctx = TestContext::new();
    let orchestrator = ctx.orchestrator(vec![]);
    orchestrator.create_session(authenticated_details());
    let socket = ctx.socket();
    socket.open();
    settle().await;
    assert!(orchestrator.is_connected());

    orchestrator.disconnect_clicked();
    settle().await;

    assert!(!orchestrator.is_connected());
    assert!(orchestrator.session().is_none());
    assert_eq!(socket.disconnect_count(), 1);
    assert!(ctx.presenter.contains(&UiCall::Disconnected));
    assert!(!orchestrator.queue_event(fixtures::generic_event(orchestrator.event_sequence(), "late")));
}

#[tokio::test(start_paused = true)]
async fn test_events_dropped_after_terminal_close() {
    let ctx = TestContext::new();
    let orchestrator = ctx.orchestrator(vec![]);
    orchestrator.create_session(authenticated_details());
    let socket = ctx.socket();
    socket.open();
    settle().await;

    socket.drop_with(CloseCode::DeletedSession);
    settle().await;

    assert!(orchestrator.session().is_none());
    assert!(!orchestrator.can_process_events());
    assert!(!orchestrator.queue_event(fixtures::generic_event(orchestrator.event_sequence(), "late")));
    assert_eq!(ctx.presenter.errors(), vec![ConnectionError::SessionDeleted]);
}

#[tokio::test(start_paused = true)]
async fn test_new_session_allowed_after_terminal_close() {
    let ctx = TestContext::new();
    let orchestrator = ctx.orchestrator(vec![]);
    orchestrator.create_session(authenticated_details());
    ctx.socket().drop_with(CloseCode::OrgMismatch);
    settle().await;

    assert!(orchestrator.create_session(authenticated_details()));
    assert_eq!(ctx.factory.created(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_quick_connect_requires_org_id() {
    let ctx = TestContext::with_config(SessionConfig::default());
    let orchestrator = ctx.orchestrator(vec![]);

    assert_eq!(orchestrator.quick_connect_clicked(), Err(ConnectionError::NoOrgId));
    assert_eq!(ctx.presenter.errors(), vec![ConnectionError::NoOrgId]);
}

#[tokio::test(start_paused = true)]
async fn test_connected_session_resumes_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");

    let mut first = TestContext::new();
    first.identity = IdentityStore::new(Arc::new(FileStore::open(&path).unwrap()));
    let client_id = first.identity.client_id();
    let orchestrator = first.orchestrator(vec![]);
    orchestrator.create_session(authenticated_details());
    first.socket().open();
    settle().await;
    assert!(orchestrator.is_connected());

    // a fresh process with the same state file
    let mut second = TestContext::new();
    second.identity = IdentityStore::new(Arc::new(FileStore::open(&path).unwrap()));
    assert_eq!(second.identity.client_id(), client_id);
    let resumed = second.orchestrator(vec![]);

    assert!(resumed.resume_persisted_session());
    assert_eq!(resumed.session().unwrap().session_id(), SESSION_ID);
    assert_eq!(second.socket().connect_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_session_can_be_driven_from_a_foreign_thread() {
    let ctx = TestContext::new();
    let orchestrator = ctx.orchestrator(vec![]);

    let remote = orchestrator.clone();
    let created = std::thread::spawn(move || remote.create_session(authenticated_details())).join();
    assert!(matches!(created, Ok(true)));
    let socket = ctx.socket();
    assert_eq!(socket.connect_count(), 1);

    let remote = orchestrator.clone();
    assert!(std::thread::spawn(move || remote.terminate_session()).join().is_ok());
    assert_eq!(socket.disconnect_count(), 1);
    assert!(orchestrator.has_ever_terminated());
    assert!(orchestrator.session().is_none());
}
