use serde_json::Value;

use crate::{Envelope, JobKey};

#[derive(Debug, Clone, PartialEq)]
pub enum Msg {
    /// Caller requested a job; a zero toggle resets the subscription.
    Subscribe { key: JobKey, request: Envelope },
    /// Raw frame received on the port opened for `toggled`.
    Frame { toggled: u64, frame: Value },
    /// The background side closed the port opened for `toggled`.
    PortClosed { toggled: u64 },
    /// The UI surface unmounted.
    Dispose,
    /// Fallback for placeholder wiring.
    NoOp,
}
