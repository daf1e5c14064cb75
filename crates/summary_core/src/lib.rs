//! Summary core: wire protocol, chapter model and the pure subscription state machine.
mod effect;
mod format;
mod msg;
mod protocol;
mod request;
mod settings;
mod state;
mod summary;
mod update;
mod video;
mod view_model;

pub use effect::Effect;
pub use format::{copy_chapters, format_seconds};
pub use msg::Msg;
pub use protocol::{
    Envelope, ErrorRecord, ProtocolError, RequestInit, SseEventKind, SSE_EVENT_CLOSE,
    SSE_EVENT_SUMMARY,
};
pub use request::{
    feedback, port_name, split_port_name, summarize, translate, user_url, JobKey, Operation,
};
pub use settings::{SettingKey, TargetLang};
pub use state::{Phase, SubscriptionState};
pub use summary::{merge_chapters, Chapter, ChapterStyle, PageChapter, Summary, SummaryState};
pub use update::update;
pub use video::parse_video_id;
pub use view_model::SubscriptionView;
