use thiserror::Error;

pub type JobId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayKind {
    OneShot,
    Streaming,
}

/// Lifecycle of one accepted port on the background side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobPhase {
    AwaitingFirstMessage,
    Validating,
    /// Invalid sender or malformed first message; an `ERROR` was sent.
    Rejected,
    Dispatched(RelayKind),
    Terminated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("illegal job transition from {from:?} on {event}")]
pub struct IllegalTransition {
    pub from: JobPhase,
    pub event: &'static str,
}

impl JobPhase {
    pub fn on_first_message(self) -> Result<Self, IllegalTransition> {
        match self {
            JobPhase::AwaitingFirstMessage => Ok(JobPhase::Validating),
            from => Err(IllegalTransition {
                from,
                event: "first_message",
            }),
        }
    }

    pub fn reject(self) -> Result<Self, IllegalTransition> {
        match self {
            JobPhase::Validating => Ok(JobPhase::Rejected),
            from => Err(IllegalTransition {
                from,
                event: "reject",
            }),
        }
    }

    pub fn dispatch(self, kind: RelayKind) -> Result<Self, IllegalTransition> {
        match self {
            JobPhase::Validating => Ok(JobPhase::Dispatched(kind)),
            from => Err(IllegalTransition {
                from,
                event: "dispatch",
            }),
        }
    }

    /// Any phase may end; ending twice is harmless.
    pub fn terminate(self) -> Self {
        JobPhase::Terminated
    }

    pub fn is_terminal(self) -> bool {
        self == JobPhase::Terminated
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSnapshot {
    pub id: JobId,
    pub name: String,
    pub phase: JobPhase,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_dispatches() {
        let phase = JobPhase::AwaitingFirstMessage
            .on_first_message()
            .and_then(|p| p.dispatch(RelayKind::Streaming))
            .unwrap();
        assert_eq!(phase, JobPhase::Dispatched(RelayKind::Streaming));
        assert!(phase.terminate().is_terminal());
    }

    #[test]
    fn rejected_jobs_cannot_dispatch() {
        let rejected = JobPhase::AwaitingFirstMessage
            .on_first_message()
            .and_then(JobPhase::reject)
            .unwrap();
        assert_eq!(
            rejected.dispatch(RelayKind::OneShot),
            Err(IllegalTransition {
                from: JobPhase::Rejected,
                event: "dispatch",
            })
        );
    }

    #[test]
    fn first_message_is_accepted_once() {
        let validating = JobPhase::AwaitingFirstMessage.on_first_message().unwrap();
        assert!(validating.on_first_message().is_err());
        assert!(JobPhase::Terminated.reject().is_err());
    }
}
