use crate::view_model::SubscriptionView;
use crate::{ErrorRecord, JobKey, Summary};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// Nothing requested yet, or reset with a zero toggle.
    #[default]
    Idle,
    /// Port open, waiting for messages.
    Loading,
    /// Completed normally (`RESPONSE` or background-initiated close).
    Done,
    /// Terminal `ERROR` or protocol violation.
    Failed,
    /// The UI surface went away before completion.
    Disposed,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Done | Phase::Failed | Phase::Disposed)
    }
}

/// Client-side state of one subscription.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SubscriptionState {
    key: Option<JobKey>,
    phase: Phase,
    summary: Option<Summary>,
    error: Option<ErrorRecord>,
    dirty: bool,
}

impl SubscriptionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn view(&self) -> SubscriptionView {
        SubscriptionView {
            summary: self.summary.clone(),
            error: self.error.clone(),
            loading: self.phase == Phase::Loading && self.error.is_none(),
            done: self.phase.is_terminal(),
            dirty: self.dirty,
        }
    }

    pub fn key(&self) -> Option<&JobKey> {
        self.key.as_ref()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Toggle of the currently open port, if any.
    pub fn active_toggle(&self) -> Option<u64> {
        match (&self.key, self.phase) {
            (Some(key), Phase::Loading) => Some(key.toggled),
            _ => None,
        }
    }

    /// Returns whether the state changed since the last call, clearing the flag.
    pub fn consume_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    pub(crate) fn reset(&mut self) {
        self.key = None;
        self.phase = Phase::Idle;
        self.summary = None;
        self.error = None;
        self.dirty = true;
    }

    pub(crate) fn begin(&mut self, key: JobKey) {
        self.key = Some(key);
        self.phase = Phase::Loading;
        self.summary = Some(Summary::doing());
        self.error = None;
        self.dirty = true;
    }

    pub(crate) fn replace_summary(&mut self, summary: Summary) {
        self.summary = Some(summary);
        self.phase = Phase::Done;
        self.dirty = true;
    }

    pub(crate) fn merge_partial(&mut self, partial: Summary) {
        self.summary.get_or_insert_with(Summary::default).merge(partial);
        self.dirty = true;
    }

    pub(crate) fn fail(&mut self, error: ErrorRecord) {
        self.error = Some(error);
        self.phase = Phase::Failed;
        self.dirty = true;
    }

    pub(crate) fn finish(&mut self) {
        self.phase = Phase::Done;
        self.dirty = true;
    }

    pub(crate) fn dispose(&mut self) {
        self.phase = Phase::Disposed;
        self.dirty = true;
    }
}
