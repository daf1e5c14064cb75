use crate::{Chapter, ErrorRecord, Summary, SummaryState};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SubscriptionView {
    pub summary: Option<Summary>,
    pub error: Option<ErrorRecord>,
    /// A request is in flight and no error has been reported.
    pub loading: bool,
    /// The job reached a terminal state (completed, failed or disposed).
    pub done: bool,
    pub dirty: bool,
}

impl SubscriptionView {
    pub fn chapters(&self) -> &[Chapter] {
        self.summary
            .as_ref()
            .map(Summary::chapters)
            .unwrap_or_default()
    }

    /// Missing transcript is rendered as a notice, never as a failure.
    pub fn no_transcript(&self) -> bool {
        matches!(
            self.summary.as_ref().map(|s| s.state),
            Some(SummaryState::NoTranscript)
        )
    }
}
