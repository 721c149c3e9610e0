//! End-to-end moderation scenarios: scripted classifier backend, mock
//! gateway, real engine.

use async_trait::async_trait;
use roomwarden::gateway::{GatewayClient, RawMessage};
use roomwarden::moderation::{ModerationEngine, PolicyClassifier, PollResult, RoomWatcher};
use roomwarden::providers::Provider;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ROOM: &str = "!room:example.org";

/// Backend stub with a fixed answer for every call.
struct FixedAnswer {
    answer: Option<&'static str>,
    calls: Arc<AtomicUsize>,
}

impl FixedAnswer {
    fn new(answer: Option<&'static str>) -> Self {
        Self {
            answer,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl Provider for FixedAnswer {
    async fn chat_with_system(
        &self,
        _system_prompt: Option<&str>,
        _message: &str,
        _model: &str,
        _temperature: f64,
    ) -> anyhow::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.answer {
            Some(answer) => Ok(answer.to_string()),
            None => anyhow::bail!("backend unavailable"),
        }
    }
}

fn make_engine(server: &MockServer, answer: Option<&'static str>) -> ModerationEngine {
    let gateway = GatewayClient::new(server.uri()).with_session("sess-1");
    let classifier = PolicyClassifier::new(Box::new(FixedAnswer::new(answer)), "test-model", 0.0);
    ModerationEngine::new(gateway, classifier, ROOM, CancellationToken::new())
}

fn message(event_id: &str, sender: &str, body: &str) -> RawMessage {
    RawMessage {
        event_id: event_id.to_string(),
        sender: sender.to_string(),
        body: body.to_string(),
        timestamp: 0,
    }
}

async fn mock_ok_post(server: &MockServer, endpoint: String, times: u64) {
    Mock::given(method("POST"))
        .and(path(endpoint))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .expect(times)
        .mount(server)
        .await;
}

/// Three violations by one user inside the decay window: first redact only,
/// second redact + warning, third redact + ban.
#[tokio::test]
async fn escalation_ladder_for_a_repeat_offender() {
    let server = MockServer::start().await;

    for event in ["$e1", "$e2", "$e3"] {
        mock_ok_post(&server, format!("/rooms/sess-1/{ROOM}/redact/{event}"), 1).await;
    }

    let warning = "@alice:example.org This is your second violation. \
One more illicit message within 1 hour will result in a ban.";
    Mock::given(method("POST"))
        .and(path(format!("/rooms/sess-1/{ROOM}/send")))
        .and(body_json(serde_json::json!({"body": warning})))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": "success",
            "event_id": "$warn1"
        })))
        .expect(1)
        .mount(&server)
        .await;

    mock_ok_post(
        &server,
        format!("/rooms/sess-1/{ROOM}/ban/@alice:example.org"),
        1,
    )
    .await;

    let mut engine = make_engine(&server, Some("YES"));
    engine
        .handle_message(message("$e1", "@alice:example.org", "first"))
        .await;
    engine
        .handle_message(message("$e2", "@alice:example.org", "second"))
        .await;
    engine
        .handle_message(message("$e3", "@alice:example.org", "third"))
        .await;

    let record = engine.ledger().get("@alice:example.org").unwrap();
    assert_eq!(record.count, 3);
    assert_eq!(record.history.len(), 3);
}

/// The same (sender, event id) observed twice never reaches the classifier
/// a second time, and draws no second round of actions.
#[tokio::test]
async fn duplicate_event_is_classified_once() {
    let server = MockServer::start().await;
    mock_ok_post(&server, format!("/rooms/sess-1/{ROOM}/redact/$dup"), 1).await;

    let gateway = GatewayClient::new(server.uri()).with_session("sess-1");
    let provider = FixedAnswer::new(Some("YES"));
    let calls = Arc::clone(&provider.calls);
    let classifier = PolicyClassifier::new(Box::new(provider), "test-model", 0.0);
    let mut engine = ModerationEngine::new(gateway, classifier, ROOM, CancellationToken::new());

    engine
        .handle_message(message("$dup", "@alice:example.org", "bad"))
        .await;
    engine
        .handle_message(message("$dup", "@alice:example.org", "bad"))
        .await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(engine.ledger().get("@alice:example.org").unwrap().count, 1);
}

/// A compliant verdict triggers no gateway actions at all.
#[tokio::test]
async fn compliant_message_draws_no_actions() {
    let server = MockServer::start().await;
    mock_ok_post(&server, format!("/rooms/sess-1/{ROOM}/redact/$ok"), 0).await;

    let mut engine = make_engine(&server, Some("NO"));
    engine
        .handle_message(message("$ok", "@alice:example.org", "hello"))
        .await;

    assert!(engine.ledger().get("@alice:example.org").is_none());
}

/// With the backend completely down, the fail-safe positive verdict still
/// redacts: the system over-flags rather than passing content through.
#[tokio::test]
async fn classifier_outage_still_redacts() {
    let server = MockServer::start().await;
    mock_ok_post(&server, format!("/rooms/sess-1/{ROOM}/redact/$x"), 1).await;

    let mut engine = make_engine(&server, None);
    engine
        .handle_message(message("$x", "@alice:example.org", "???"))
        .await;

    let record = engine.ledger().get("@alice:example.org").unwrap();
    assert_eq!(record.count, 1);
}

/// The watcher threads the continuation token: the second poll carries the
/// token the first poll returned, and the token advances on empty polls too.
#[tokio::test]
async fn watcher_threads_tokens_across_polls() {
    let server = MockServer::start().await;

    // Second poll: must present since=s1, comes back empty with a newer token.
    Mock::given(method("GET"))
        .and(path(format!("/rooms/sess-1/{ROOM}/watch")))
        .and(wiremock::matchers::query_param("since", "s1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "has_new_messages": false,
            "messages": [],
            "next_batch": "s2"
        })))
        .expect(1)
        .mount(&server)
        .await;

    // First poll: no token yet, returns a message and token s1.
    Mock::given(method("GET"))
        .and(path(format!("/rooms/sess-1/{ROOM}/watch")))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "has_new_messages": true,
            "messages": [
                {"event_id": "$m1", "sender": "@alice:example.org", "body": "hi", "timestamp": 1}
            ],
            "next_batch": "s1"
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    let client = GatewayClient::new(server.uri()).with_session("sess-1");
    let mut watcher = RoomWatcher::new(ROOM);

    let first = watcher.poll(&client).await;
    assert!(matches!(first, PollResult::NewMessages(_)), "got {first:?}");
    assert_eq!(watcher.next_batch(), Some("s1"));

    let second = watcher.poll(&client).await;
    assert!(matches!(second, PollResult::NoNewMessages), "got {second:?}");
    assert_eq!(watcher.next_batch(), Some("s2"));
}

/// Full loop smoke test: join, poll, classify, redact, stop on cancel.
/// Only the newest message of the batch is inspected.
#[tokio::test]
async fn run_loop_redacts_newest_message_and_stops_on_cancel() {
    let server = MockServer::start().await;

    mock_ok_post(&server, format!("/rooms/sess-1/{ROOM}/join"), 1).await;
    mock_ok_post(&server, format!("/rooms/sess-1/{ROOM}/redact/$newest"), 1).await;
    mock_ok_post(&server, format!("/rooms/sess-1/{ROOM}/redact/$older"), 0).await;

    // One poll with a two-message batch, then quiet.
    Mock::given(method("GET"))
        .and(path(format!("/rooms/sess-1/{ROOM}/watch")))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "has_new_messages": true,
            "messages": [
                {"event_id": "$newest", "sender": "@alice:example.org", "body": "bad", "timestamp": 2},
                {"event_id": "$older", "sender": "@bob:example.org", "body": "also bad", "timestamp": 1}
            ],
            "next_batch": "s1"
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/rooms/sess-1/{ROOM}/watch")))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "has_new_messages": false,
            "messages": [],
            "next_batch": "s2"
        })))
        .mount(&server)
        .await;

    let gateway = GatewayClient::new(server.uri()).with_session("sess-1");
    let classifier =
        PolicyClassifier::new(Box::new(FixedAnswer::new(Some("YES"))), "test-model", 0.0);
    let cancel = CancellationToken::new();
    let mut engine = ModerationEngine::new(gateway, classifier, ROOM, cancel.clone());

    let handle = tokio::spawn(async move { engine.run().await });

    // Give the loop one full cycle, then stop it.
    tokio::time::sleep(std::time::Duration::from_millis(800)).await;
    cancel.cancel();
    handle.await.unwrap().unwrap();
}
