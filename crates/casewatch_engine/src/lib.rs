//! Casewatch engine: transports and the async driver for the status reconciler.
mod adaptive;
mod client;
mod feed;
mod list;
mod live;
mod observer;
mod polling;
mod session;
mod types;

pub use adaptive::AdaptivePoller;
pub use client::{ClientSettings, ReqwestStatusClient, StatusClient, API_URL_ENV, DEFAULT_API_URL};
pub use feed::{
    ChangeFeed, FeedError, FeedEventType, FeedMessage, FeedMessages, FeedRegistration,
    Handshake, MemoryChangeFeed, RawChange,
};
pub use list::{CaseListObserver, CaseListView, ListSettings};
pub use live::{
    registrations_for, translate_change, FeedTables, LiveChannel, LiveSettings,
    ARTIFACT_INSERTED_STATUS, RESULT_INSERTED_STATUS,
};
pub use observer::{ObserverSettings, StatusObserver, TRANSITION_CAPACITY};
pub use polling::{PollingEngine, LIST_POLL_INTERVAL};
pub use session::{SessionProvider, StaticSession};
pub use types::{EventSink, LiveEvent, PollEvent, WidgetEvent};
