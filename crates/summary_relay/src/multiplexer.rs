//! Background dispatcher: accepts ports, validates the first message and runs one relay per port.
//!
//! Every accepted port runs in its own Tokio task, so a failing or panicking
//! job never disturbs the others.
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use relay_logging::{relay_debug, relay_error, relay_info, relay_warn};
use summary_core::{split_port_name, Envelope};
use tokio_util::sync::CancellationToken;

use crate::http::{validate_frame, HttpRelay, RelayContext, TabOpener, ValidatedRequest};
use crate::job::{JobId, JobPhase, JobSnapshot, RelayKind};
use crate::stream::StreamRelay;
use crate::{
    JobPort, Port, PortConnector, RelayConfig, RelayError, SenderInfo, SettingsStore,
};

struct JobEntry {
    name: String,
    phase: JobPhase,
    cancel: CancellationToken,
}

struct Inner {
    ctx: Arc<RelayContext>,
    http: HttpRelay,
    stream: StreamRelay,
    jobs: Mutex<HashMap<JobId, JobEntry>>,
    next_id: AtomicU64,
}

/// Cheap to clone; all clones share one job registry.
#[derive(Clone)]
pub struct Multiplexer {
    inner: Arc<Inner>,
}

impl Multiplexer {
    pub fn new(
        config: RelayConfig,
        settings: Arc<dyn SettingsStore>,
        tabs: Arc<dyn TabOpener>,
    ) -> Result<Self, RelayError> {
        let ctx = Arc::new(RelayContext::new(config, settings)?);
        Ok(Self {
            inner: Arc::new(Inner {
                http: HttpRelay::from_context(ctx.clone(), tabs),
                stream: StreamRelay::from_context(ctx.clone()),
                ctx,
                jobs: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
            }),
        })
    }

    /// Takes ownership of the background end of a port and starts its job.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn accept(&self, port: Port) -> JobId {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        relay_info!("port={} accepted job={}", port.name(), id);
        self.inner.lock_jobs().insert(
            id,
            JobEntry {
                name: port.name().to_string(),
                phase: JobPhase::AwaitingFirstMessage,
                cancel: cancel.clone(),
            },
        );

        let inner = self.inner.clone();
        tokio::spawn(async move {
            let _guard = JobGuard {
                inner: inner.clone(),
                id,
            };
            inner.run_job(id, port, cancel).await;
        });
        id
    }

    /// Aborts a job. Idempotent, and a no-op once the job has finished.
    pub fn cancel(&self, id: JobId) -> bool {
        match self.inner.lock_jobs().get(&id) {
            Some(entry) => {
                relay_info!("port={} cancel job={}", entry.name, id);
                entry.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub fn active_jobs(&self) -> Vec<JobSnapshot> {
        let mut jobs: Vec<_> = self
            .inner
            .lock_jobs()
            .iter()
            .map(|(id, entry)| JobSnapshot {
                id: *id,
                name: entry.name.clone(),
                phase: entry.phase,
            })
            .collect();
        jobs.sort_by_key(|job| job.id);
        jobs
    }

    /// One-shot runtime message path, without a port.
    pub async fn send_message(&self, sender: &SenderInfo, envelope: Envelope) -> Envelope {
        self.inner.http.handle(sender, envelope).await
    }
}

impl PortConnector for Multiplexer {
    fn connect(&self, name: &str, sender: SenderInfo) -> Port {
        let (ui, background) = Port::pair(name, sender);
        self.accept(background);
        ui
    }
}

impl Inner {
    fn lock_jobs(&self) -> MutexGuard<'_, HashMap<JobId, JobEntry>> {
        self.jobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn advance(
        &self,
        id: JobId,
        transition: impl FnOnce(JobPhase) -> Result<JobPhase, crate::job::IllegalTransition>,
    ) {
        if let Some(entry) = self.lock_jobs().get_mut(&id) {
            match transition(entry.phase) {
                Ok(next) => entry.phase = next,
                Err(err) => relay_error!("port={} job={}: {}", entry.name, id, err),
            }
        }
    }

    async fn run_job(&self, id: JobId, mut port: Port, cancel: CancellationToken) {
        let first = tokio::select! {
            frame = port.recv() => frame,
            _ = cancel.cancelled() => None,
        };
        let Some(frame) = first else {
            relay_debug!("port={} closed before any message", port.name());
            return;
        };
        self.advance(id, JobPhase::on_first_message);

        let port = JobPort::new(port);
        let request = match validate_frame(&self.ctx.config, port.sender(), frame) {
            Ok(request) => request,
            Err(err) => {
                relay_warn!("port={} rejected: {}", port.name(), err);
                self.advance(id, JobPhase::reject);
                port.emit(Envelope::error(err.to_record()));
                port.disconnect();
                return;
            }
        };

        let kind = self.classify(port.name(), &request);
        self.advance(id, |phase| phase.dispatch(kind));
        relay_debug!("port={} dispatched job={} as {:?}", port.name(), id, kind);

        match kind {
            RelayKind::OneShot => {
                let envelope = tokio::select! {
                    envelope = self.http.execute(&request) => Some(envelope),
                    _ = cancel.cancelled() => None,
                    _ = port.disconnected() => None,
                };
                if let Some(envelope) = envelope {
                    port.emit(envelope);
                }
                port.disconnect();
            }
            RelayKind::Streaming => {
                let outcome = self.stream.run(&port, &request, &cancel).await;
                relay_info!("port={} job={} finished: {:?}", port.name(), id, outcome);
                port.disconnect();
            }
        }
    }

    /// Everything streams unless the URL is an internal page or the
    /// operation is configured as one-shot.
    fn classify(&self, port_name: &str, request: &ValidatedRequest) -> RelayKind {
        let (operation, _) = split_port_name(port_name);
        if self.ctx.config.is_internal_page(&request.url) || self.ctx.config.is_one_shot(operation)
        {
            RelayKind::OneShot
        } else {
            RelayKind::Streaming
        }
    }
}

/// Removes the registry entry when the job task ends, including by panic.
struct JobGuard {
    inner: Arc<Inner>,
    id: JobId,
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        if let Some(entry) = self.inner.lock_jobs().remove(&self.id) {
            let phase = entry.phase.terminate();
            relay_debug!("port={} job={} {:?}", entry.name, self.id, phase);
        }
    }
}
