//! Casewatch core: data model and the pure status reconciler.
mod backoff;
mod dashboard;
mod effect;
mod error;
mod msg;
mod state;
mod types;
mod update;
mod view_model;

pub use backoff::{
    reconnect_delay, AdaptiveInterval, BackoffPolicy, ADAPTIVE_GROWTH, ADAPTIVE_MAX_INTERVAL,
    ADAPTIVE_MIN_INTERVAL,
};
pub use dashboard::{summarize, DashboardSummary, StatusCounts};
pub use effect::Effect;
pub use error::{ErrorKind, StatusError};
pub use msg::Msg;
pub use state::{Phase, ReconcilerSettings, ReconcilerState, DEFAULT_CASE_POLL_INTERVAL};
pub use types::{
    CaseId, CaseStatus, ChannelLifecycle, ConnectionState, ProcessingUpdate, StatusKind,
};
pub use update::update;
pub use view_model::{DisplayState, StatusView};
