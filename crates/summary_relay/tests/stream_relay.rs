mod common;

use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;
use summary_core::{Envelope, RequestInit};
use summary_relay::{
    JobPort, Port, RelayConfig, StreamOutcome, StreamRelay, ValidatedRequest,
};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{chapter_json, collect, config, extension, settings_with_uid, sse_body};

const ROUTE: &str = "/api/summarize/videoABC";

fn request(server: &MockServer) -> ValidatedRequest {
    ValidatedRequest {
        url: format!("{}{}", server.uri(), ROUTE),
        init: RequestInit::post_json(&json!({"chapters": [], "no_transcript": false})),
    }
}

/// Runs one stream job to completion and returns its outcome with every envelope the client saw.
async fn run_with(config: RelayConfig, server: &MockServer) -> (StreamOutcome, Vec<Envelope>) {
    let relay = StreamRelay::new(config, settings_with_uid()).expect("relay");
    let (mut ui, background) = Port::pair("summarize-videoABC", extension());
    let job = JobPort::new(background);
    let cancel = CancellationToken::new();

    let outcome = tokio::time::timeout(
        Duration::from_secs(5),
        relay.run(&job, &request(server), &cancel),
    )
    .await
    .expect("stream relay hung");
    drop(job);
    (outcome, collect(&mut ui).await)
}

async fn run(server: &MockServer) -> (StreamOutcome, Vec<Envelope>) {
    run_with(config(&server.uri()), server).await
}

fn error_message(envelope: &Envelope) -> &str {
    match envelope {
        Envelope::Error { error } => &error.message,
        other => panic!("expected error envelope, got {other:?}"),
    }
}

#[tokio::test]
async fn client_error_is_reported_once_and_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ROUTE))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"detail": "nope"})))
        .expect(1)
        .mount(&server)
        .await;

    let (outcome, envelopes) = run(&server).await;

    assert_eq!(outcome, StreamOutcome::Failed);
    assert_eq!(envelopes.len(), 1);
    assert_eq!(
        error_message(&envelopes[0]),
        "onopen, invalid response, status=404"
    );
}

#[tokio::test]
async fn server_error_is_retried_until_the_stream_opens() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ROUTE))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    let body = sse_body(&[
        (
            "summary",
            &json!({"state": "doing", "chapters": [chapter_json("c1", 0.0, "first")]}).to_string(),
        ),
        ("close", "{}"),
    ]);
    Mock::given(method("POST"))
        .and(path(ROUTE))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let (outcome, envelopes) = run(&server).await;

    assert_eq!(outcome, StreamOutcome::Completed);
    assert_eq!(envelopes.len(), 1);
    assert!(matches!(&envelopes[0], Envelope::Sse { sse_event, .. } if sse_event == "summary"));
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn retries_are_bounded_when_configured() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;
    let config = RelayConfig {
        max_retries: Some(2),
        ..config(&server.uri())
    };

    let (outcome, envelopes) = run_with(config, &server).await;

    assert_eq!(outcome, StreamOutcome::Failed);
    assert_eq!(envelopes.len(), 1);
    assert!(error_message(&envelopes[0]).starts_with("gave up after 3 retriable failures"));
}

#[tokio::test]
async fn json_answer_short_circuits_the_stream() {
    let server = MockServer::start().await;
    let summary = json!({"state": "done", "chapters": [chapter_json("c1", 0.0, "cached")]});
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(summary.clone()))
        .expect(1)
        .mount(&server)
        .await;

    let (outcome, envelopes) = run(&server).await;

    assert_eq!(outcome, StreamOutcome::ShortCircuited);
    assert_eq!(envelopes, vec![Envelope::response(true, Some(summary))]);
}

#[tokio::test]
async fn created_json_answer_short_circuits_the_stream() {
    let server = MockServer::start().await;
    let summary = json!({"state": "done"});
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201).set_body_json(summary.clone()))
        .expect(1)
        .mount(&server)
        .await;

    let (outcome, envelopes) = run(&server).await;

    assert_eq!(outcome, StreamOutcome::ShortCircuited);
    assert_eq!(envelopes, vec![Envelope::response(true, Some(summary))]);
}

#[tokio::test]
async fn too_many_requests_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(2)
        .with_priority(1)
        .mount(&server)
        .await;
    let partial = json!({"state": "done"});
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(
                sse_body(&[("summary", &partial.to_string()), ("close", "{}")]),
                "text/event-stream",
            ),
        )
        .mount(&server)
        .await;
    let config = RelayConfig {
        max_retries: Some(2),
        ..config(&server.uri())
    };

    let (outcome, envelopes) = run_with(config, &server).await;

    assert_eq!(outcome, StreamOutcome::Completed);
    assert_eq!(envelopes, vec![Envelope::sse("summary", partial)]);
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn unexpected_content_type_is_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("<html></html>", "text/html"))
        .expect(1)
        .mount(&server)
        .await;

    let (outcome, envelopes) = run(&server).await;

    assert_eq!(outcome, StreamOutcome::Failed);
    assert_eq!(envelopes.len(), 1);
    assert!(error_message(&envelopes[0]).starts_with("onopen, invalid response, contentType=text/html"));
}

#[tokio::test]
async fn malformed_and_unknown_events_are_dropped() {
    let server = MockServer::start().await;
    let good = json!({"state": "doing", "chapters": [chapter_json("c2", 30.0, "second")]});
    let body = sse_body(&[
        ("summary", "{not json"),
        ("ping", "{}"),
        ("summary", &good.to_string()),
        ("close", "{}"),
    ]);
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let (outcome, envelopes) = run(&server).await;

    assert_eq!(outcome, StreamOutcome::Completed);
    assert_eq!(envelopes, vec![Envelope::sse("summary", good)]);
}

#[tokio::test]
async fn end_of_body_without_close_event_completes() {
    let server = MockServer::start().await;
    let partial = json!({"state": "done"});
    let body = sse_body(&[("summary", &partial.to_string())]);
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .expect(1)
        .mount(&server)
        .await;

    let (outcome, envelopes) = run(&server).await;

    assert_eq!(outcome, StreamOutcome::Completed);
    assert_eq!(envelopes, vec![Envelope::sse("summary", partial)]);
}

#[tokio::test]
async fn client_disconnect_aborts_the_stream() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(sse_body(&[("close", "{}")]), "text/event-stream")
                .set_delay(Duration::from_secs(30)),
        )
        .mount(&server)
        .await;
    let relay = StreamRelay::new(config(&server.uri()), settings_with_uid()).expect("relay");
    let (ui, background) = Port::pair("summarize-videoABC", extension());
    let job = JobPort::new(background);
    let cancel = CancellationToken::new();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        drop(ui);
    });
    let outcome = tokio::time::timeout(
        Duration::from_secs(5),
        relay.run(&job, &request(&server), &cancel),
    )
    .await
    .expect("disconnect did not abort the stream");

    assert_eq!(outcome, StreamOutcome::Cancelled);
}

#[tokio::test]
async fn cancellation_token_aborts_the_stream() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    let relay = StreamRelay::new(config(&server.uri()), settings_with_uid()).expect("relay");
    let (mut ui, background) = Port::pair("summarize-videoABC", extension());
    let job = JobPort::new(background);
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });
    let outcome = tokio::time::timeout(
        Duration::from_secs(5),
        relay.run(&job, &request(&server), &cancel),
    )
    .await
    .expect("cancel did not abort the stream");
    drop(job);

    assert_eq!(outcome, StreamOutcome::Cancelled);
    assert_eq!(collect(&mut ui).await, Vec::<Envelope>::new());
}
