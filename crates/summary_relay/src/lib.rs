//! Summary relay: background-host side of the message bridge plus the client subscription runtime.
mod config;
mod error;
mod http;
mod identity;
mod job;
mod multiplexer;
mod persist;
mod port;
mod settings;
mod stream;
mod subscription;

pub use config::{RelayConfig, DEFAULT_BASE_URL, DEFAULT_INTERNAL_PAGE_PREFIX};
pub use error::{classify_status, RelayError, StatusClass};
pub use http::{validate, validate_frame, HttpRelay, TabOpener, ValidatedRequest};
pub use identity::{
    auth_headers, ensure_uid, AuthHeaders, API_KEY_HEADER, UID_HEADER, VERSION_HEADER,
};
pub use job::{IllegalTransition, JobId, JobPhase, JobSnapshot, RelayKind};
pub use multiplexer::Multiplexer;
pub use persist::{ensure_dir, read_optional, AtomicFileWriter, PersistError};
pub use port::{JobPort, Port, PortConnector, PortError, SenderInfo};
pub use settings::{MemorySettings, SettingsChange, SettingsError, SettingsStore};
pub use stream::{StreamOutcome, StreamRelay};
pub use subscription::{SubscriptionHandle, Subscriber};
