mod common;

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;
use summary_core::{copy_chapters, summarize, JobKey, Operation, PageChapter, SummaryState};
use summary_relay::{JobId, Multiplexer, Subscriber};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{chapter_json, config, extension, settings_with_uid, sse_body, RecordingTabs};

fn multiplexer(server: &MockServer) -> Multiplexer {
    Multiplexer::new(
        config(&server.uri()),
        settings_with_uid(),
        Arc::new(RecordingTabs::default()),
    )
    .expect("multiplexer")
}

async fn subscriber(server: &MockServer) -> Subscriber {
    Subscriber::new(Arc::new(multiplexer(server)), extension())
}

fn summarize_key(toggled: u64) -> JobKey {
    JobKey::new(Operation::Summarize, "videoABC", toggled)
}

/// Waits until the first upstream request arrived and returns the id of its job.
async fn single_job(mux: &Multiplexer, server: &MockServer) -> JobId {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let sent = server.received_requests().await.unwrap_or_default().len();
            if sent == 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
                continue;
            }
            if let [job] = mux.active_jobs().as_slice() {
                return job.id;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("background job never registered")
}

async fn wait_until_gone(mux: &Multiplexer, id: JobId) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while mux.active_jobs().iter().any(|job| job.id == id) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("background job still registered");
}

/// The first request hangs; every later one streams `chapter` and closes.
async fn mount_slow_then_streaming(server: &MockServer, chapter: serde_json::Value) {
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(sse_body(&[("close", "{}")]), "text/event-stream")
                .set_delay(Duration::from_secs(30)),
        )
        .up_to_n_times(1)
        .with_priority(1)
        .mount(server)
        .await;
    let body = sse_body(&[
        (
            "summary",
            &json!({"state": "done", "chapters": [chapter]}).to_string(),
        ),
        ("close", "{}"),
    ]);
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(server)
        .await;
}

#[tokio::test]
async fn streamed_chapters_arrive_merged_and_sorted() {
    let server = MockServer::start().await;
    let body = sse_body(&[
        (
            "summary",
            &json!({"state": "doing", "chapters": [chapter_json("c2", 95.0, "second")]})
                .to_string(),
        ),
        (
            "summary",
            &json!({"state": "done", "chapters": [chapter_json("c1", 0.0, "first")]}).to_string(),
        ),
        ("close", "{}"),
    ]);
    Mock::given(method("POST"))
        .and(path("/api/summarize/videoABC"))
        .and(body_partial_json(json!({"no_transcript": false})))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .expect(1)
        .mount(&server)
        .await;
    let subscriber = subscriber(&server).await;

    let chapters = vec![PageChapter {
        title: "Intro".into(),
        timestamp: "0:00".into(),
    }];
    let handle = subscriber.subscribe(
        JobKey::new(Operation::Summarize, "videoABC", 1),
        summarize(&server.uri(), "videoABC", &chapters, false),
    );
    let view = handle.join().await;

    assert_eq!(view.error, None);
    assert!(!view.loading);
    assert!(view.done);
    let cids: Vec<_> = view.chapters().iter().map(|c| c.cid.as_str()).collect();
    assert_eq!(cids, vec!["c1", "c2"]);
    assert_eq!(view.summary.as_ref().unwrap().state, SummaryState::Done);
    assert_eq!(
        copy_chapters(view.chapters(), true).unwrap(),
        "# Chapter c1 - 0:00\n\nfirst\n\n# Chapter c2 - 1:35\n\nsecond"
    );
}

#[tokio::test]
async fn json_answer_replaces_the_summary() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "state": "no_transcript"
        })))
        .mount(&server)
        .await;
    let subscriber = subscriber(&server).await;

    let view = subscriber
        .subscribe(
            JobKey::new(Operation::Summarize, "videoABC", 1),
            summarize(&server.uri(), "videoABC", &[], true),
        )
        .join()
        .await;

    assert_eq!(view.error, None);
    assert!(view.no_transcript());
    assert!(view.chapters().is_empty());
}

#[tokio::test]
async fn fatal_status_surfaces_as_view_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&server)
        .await;
    let subscriber = subscriber(&server).await;

    let view = subscriber
        .subscribe(
            JobKey::new(Operation::Summarize, "videoABC", 1),
            summarize(&server.uri(), "videoABC", &[], false),
        )
        .join()
        .await;

    let error = view.error.expect("error reported");
    assert_eq!(error.message, "onopen, invalid response, status=403");
    assert!(!view.loading);
    assert!(view.done);
}

#[tokio::test]
async fn dispose_aborts_the_background_job() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(sse_body(&[("close", "{}")]), "text/event-stream")
                .set_delay(Duration::from_secs(30)),
        )
        .mount(&server)
        .await;
    let mux = multiplexer(&server);
    let subscriber = Subscriber::new(Arc::new(mux.clone()), extension());

    let handle = subscriber.subscribe(
        summarize_key(1),
        summarize(&server.uri(), "videoABC", &[], false),
    );
    let mut updates = handle.updates();
    updates.wait_for(|view| view.loading).await.expect("driver alive");
    handle.dispose();
    let view = tokio::time::timeout(Duration::from_secs(5), handle.join())
        .await
        .expect("dispose did not stop the subscription");

    assert!(view.done);
    assert!(!view.loading);
    assert_eq!(view.error, None);

    tokio::time::timeout(Duration::from_secs(5), async {
        while !mux.active_jobs().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("background job still registered after dispose");
}

#[tokio::test]
async fn new_toggle_replaces_the_running_job() {
    let server = MockServer::start().await;
    mount_slow_then_streaming(&server, chapter_json("c9", 12.0, "fresh")).await;
    let mux = multiplexer(&server);
    let subscriber = Subscriber::new(Arc::new(mux.clone()), extension());

    let handle = subscriber.subscribe(
        summarize_key(1),
        summarize(&server.uri(), "videoABC", &[], false),
    );
    let first = single_job(&mux, &server).await;
    assert!(handle.resubscribe(
        summarize_key(2),
        summarize(&server.uri(), "videoABC", &[], false),
    ));
    let view = tokio::time::timeout(Duration::from_secs(5), handle.join())
        .await
        .expect("second toggle never finished");

    assert_eq!(view.error, None);
    assert!(view.done);
    let cids: Vec<_> = view.chapters().iter().map(|c| c.cid.as_str()).collect();
    assert_eq!(cids, vec!["c9"]);
    wait_until_gone(&mux, first).await;
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn zero_toggle_resets_and_aborts_the_job() {
    let server = MockServer::start().await;
    mount_slow_then_streaming(&server, chapter_json("c1", 0.0, "unused")).await;
    let mux = multiplexer(&server);
    let subscriber = Subscriber::new(Arc::new(mux.clone()), extension());

    let handle = subscriber.subscribe(
        summarize_key(1),
        summarize(&server.uri(), "videoABC", &[], false),
    );
    let first = single_job(&mux, &server).await;
    assert!(handle.resubscribe(
        summarize_key(0),
        summarize(&server.uri(), "videoABC", &[], false),
    ));
    let view = tokio::time::timeout(Duration::from_secs(5), handle.join())
        .await
        .expect("reset did not end the subscription");

    assert_eq!(view.summary, None);
    assert_eq!(view.error, None);
    assert!(!view.loading);
    wait_until_gone(&mux, first).await;
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}
