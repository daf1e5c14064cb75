//! Server-sent-events bridge: one upstream event stream becomes a sequence of port envelopes.
//!
//! The transport (`reqwest-eventsource`) reconnects on its own after network
//! and body errors, but closes for good on an open-time status or content-type
//! mismatch. The relay reopens the stream itself after a retriable status, and
//! short-circuits a JSON body into one `RESPONSE`.
use std::sync::Arc;

use futures_util::StreamExt;
use relay_logging::{relay_debug, relay_info, relay_warn};
use reqwest_eventsource::retry::Constant;
use reqwest_eventsource::{Error as SourceError, Event, EventSource};
use serde_json::Value;
use summary_core::{Envelope, SseEventKind};
use tokio_util::sync::CancellationToken;

use crate::error::{classify_status, StatusClass};
use crate::http::{RelayContext, ValidatedRequest};
use crate::{JobPort, RelayConfig, RelayError, SettingsStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    /// Close event or end of stream without a prior fatal error.
    Completed,
    /// The server answered with a plain JSON body, delivered as one `RESPONSE`.
    ShortCircuited,
    /// A fatal error was reported as one `ERROR`.
    Failed,
    /// The port disconnected or the job was cancelled.
    Cancelled,
}

/// What the relay does with one transport error.
enum Disposition {
    EndOfStream,
    ShortCircuit(reqwest::Response),
    Fatal(RelayError),
    /// The transport reconnects on its own.
    Retry(RelayError),
    /// The transport closed; the relay opens a new source after the retry delay.
    Reopen(RelayError),
}

enum Flow {
    Continue,
    Close,
}

#[derive(Clone)]
pub struct StreamRelay {
    ctx: Arc<RelayContext>,
}

impl StreamRelay {
    pub fn new(config: RelayConfig, settings: Arc<dyn SettingsStore>) -> Result<Self, RelayError> {
        Ok(Self::from_context(Arc::new(RelayContext::new(config, settings)?)))
    }

    pub(crate) fn from_context(ctx: Arc<RelayContext>) -> Self {
        Self { ctx }
    }

    pub async fn run(
        &self,
        port: &JobPort,
        request: &ValidatedRequest,
        cancel: &CancellationToken,
    ) -> StreamOutcome {
        let builder = match self.ctx.authorized_request(request).await {
            Ok(builder) => builder,
            Err(err) => return fail(port, err),
        };
        relay_debug!("port={} stream opening url={}", port.name(), request.url);

        let mut retries = Retries::new(self.ctx.config.max_retries);
        loop {
            let Some(attempt) = builder.try_clone() else {
                return fail(
                    port,
                    RelayError::Stream("request body cannot be replayed".to_string()),
                );
            };
            let mut source = match EventSource::new(attempt) {
                Ok(source) => source,
                Err(err) => return fail(port, RelayError::Stream(err.to_string())),
            };
            source.set_retry_policy(Box::new(Constant::new(self.ctx.config.retry_delay, None)));

            match self.pump(port, &mut source, cancel, &mut retries).await {
                Pump::Finished(outcome) => return outcome,
                Pump::Reopen => {
                    source.close();
                    let aborted = tokio::select! {
                        _ = cancel.cancelled() => true,
                        _ = port.disconnected() => true,
                        _ = tokio::time::sleep(self.ctx.config.retry_delay) => false,
                    };
                    if aborted {
                        relay_info!("port={} stream aborted by disconnect", port.name());
                        return StreamOutcome::Cancelled;
                    }
                    relay_debug!("port={} stream reopening", port.name());
                }
            }
        }
    }

    /// Drives one `EventSource` until the job ends or the connection has to be reopened.
    async fn pump(
        &self,
        port: &JobPort,
        source: &mut EventSource,
        cancel: &CancellationToken,
        retries: &mut Retries,
    ) -> Pump {
        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => None,
                _ = port.disconnected() => None,
                event = source.next() => Some(event),
            };
            let Some(event) = next else {
                relay_info!("port={} stream aborted by disconnect", port.name());
                source.close();
                return Pump::Finished(StreamOutcome::Cancelled);
            };

            match event {
                None => {
                    // Transport closed without a terminal event.
                    return Pump::Finished(match retries.exhausted() {
                        Some(err) => fail(port, err),
                        None => {
                            port.disconnect();
                            StreamOutcome::Completed
                        }
                    });
                }
                Some(Ok(Event::Open)) => {
                    retries.reset();
                    relay_debug!("port={} stream open", port.name());
                }
                Some(Ok(Event::Message(message))) => {
                    if let Flow::Close = forward(port, &message.event, &message.data) {
                        source.close();
                        port.disconnect();
                        return Pump::Finished(StreamOutcome::Completed);
                    }
                }
                Some(Err(err)) => {
                    let disposition = dispose(&self.ctx.config, err);
                    let (err, reopen) = match disposition {
                        Disposition::EndOfStream => {
                            relay_info!("port={} stream closed", port.name());
                            source.close();
                            port.disconnect();
                            return Pump::Finished(StreamOutcome::Completed);
                        }
                        Disposition::ShortCircuit(response) => {
                            source.close();
                            return Pump::Finished(short_circuit(port, response).await);
                        }
                        Disposition::Fatal(err) => {
                            source.close();
                            return Pump::Finished(fail(port, err));
                        }
                        Disposition::Reopen(err) => (err, true),
                        Disposition::Retry(err) => (err, false),
                    };
                    if let Err(exhausted) = retries.record(&err) {
                        source.close();
                        return Pump::Finished(fail(port, exhausted));
                    }
                    relay_warn!(
                        "port={} retriable stream error (attempt {}): {}",
                        port.name(),
                        retries.failures,
                        err
                    );
                    if reopen {
                        return Pump::Reopen;
                    }
                }
            }
        }
    }
}

enum Pump {
    Finished(StreamOutcome),
    /// The source closed itself after an open-time status; a fresh one is needed.
    Reopen,
}

/// Consecutive retriable failures since the stream last opened.
struct Retries {
    max: Option<usize>,
    failures: usize,
    last: Option<String>,
}

impl Retries {
    fn new(max: Option<usize>) -> Self {
        Self {
            max,
            failures: 0,
            last: None,
        }
    }

    fn reset(&mut self) {
        self.failures = 0;
        self.last = None;
    }

    fn record(&mut self, err: &RelayError) -> Result<(), RelayError> {
        self.failures += 1;
        self.last = Some(err.to_string());
        match self.max {
            Some(max) if self.failures > max => Err(RelayError::RetriesExhausted {
                attempts: self.failures,
                last: err.to_string(),
            }),
            _ => Ok(()),
        }
    }

    /// The give-up error when a retry was still pending.
    fn exhausted(&self) -> Option<RelayError> {
        self.last.as_ref().map(|last| RelayError::RetriesExhausted {
            attempts: self.failures,
            last: last.clone(),
        })
    }
}

fn dispose(config: &RelayConfig, err: SourceError) -> Disposition {
    match err {
        SourceError::StreamEnded => Disposition::EndOfStream,
        SourceError::InvalidStatusCode(status, response) => {
            let code = status.as_u16();
            match classify_status(code) {
                StatusClass::Fatal => Disposition::Fatal(RelayError::FatalStatus(code)),
                StatusClass::Retriable => Disposition::Reopen(RelayError::RetriableStatus(code)),
                StatusClass::Success => by_content_type(config, response),
            }
        }
        SourceError::InvalidContentType(_, response) => by_content_type(config, response),
        SourceError::Transport(err) => Disposition::Retry(RelayError::from_transport(err)),
        SourceError::Utf8(err) => Disposition::Retry(RelayError::Stream(err.to_string())),
        SourceError::Parser(err) => Disposition::Retry(RelayError::Stream(err.to_string())),
        SourceError::InvalidLastEventId(id) => {
            Disposition::Fatal(RelayError::Stream(format!("invalid last event id {id:?}")))
        }
    }
}

/// A successful answer that is not an event stream: JSON short-circuits, anything else is fatal.
fn by_content_type(config: &RelayConfig, response: reqwest::Response) -> Disposition {
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();
    if config.is_json_content_type(&content_type) {
        Disposition::ShortCircuit(response)
    } else {
        Disposition::Fatal(RelayError::UnexpectedContentType(content_type))
    }
}

/// Forwards one decoded event. A payload that is not JSON is dropped, not fatal.
fn forward(port: &JobPort, event: &str, data: &str) -> Flow {
    match SseEventKind::parse(event) {
        SseEventKind::Close => {
            relay_debug!("port={} close event", port.name());
            Flow::Close
        }
        SseEventKind::Summary => {
            match serde_json::from_str::<Value>(data) {
                Ok(payload) => {
                    relay_debug!(
                        "port={} sse event={} data={}",
                        port.name(),
                        event,
                        relay_logging::truncate_for_log(data, 200)
                    );
                    port.emit(Envelope::sse(event, payload));
                }
                Err(err) => {
                    relay_warn!("port={} dropping malformed sse data: {}", port.name(), err);
                }
            }
            Flow::Continue
        }
        SseEventKind::Other(name) => {
            relay_debug!("port={} ignoring sse event={}", port.name(), name);
            Flow::Continue
        }
    }
}

async fn short_circuit(port: &JobPort, response: reqwest::Response) -> StreamOutcome {
    let ok = response.status().is_success();
    match response.json::<Value>().await {
        Ok(json) => {
            relay_info!("port={} server answered with json, ok={}", port.name(), ok);
            port.emit(Envelope::response(ok, Some(json)));
            port.disconnect();
            StreamOutcome::ShortCircuited
        }
        Err(err) => fail(port, RelayError::Decode(err)),
    }
}

fn fail(port: &JobPort, err: RelayError) -> StreamOutcome {
    relay_warn!("port={} stream failed: {}", port.name(), err);
    port.emit(Envelope::error(err.to_record()));
    port.disconnect();
    StreamOutcome::Failed
}
