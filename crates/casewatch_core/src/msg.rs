use crate::{CaseId, CaseStatus, ChannelLifecycle, ProcessingUpdate, StatusError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Msg {
    /// A consumer mounted with a case id (or switched to another one).
    Subscribe(CaseId),
    /// The consumer went away.
    Unsubscribe,
    /// Manual refresh; always allowed, whatever the transport.
    RefreshRequested,
    /// The session provider refreshed its token.
    SessionRefreshed,
    /// Outcome of the live-update capability check.
    ProbeFinished { case_id: CaseId, available: bool },
    /// Lifecycle report from the live channel.
    Channel {
        case_id: CaseId,
        event: ChannelLifecycle,
    },
    /// A scheduled reconnect timer fired.
    ReconnectDue { case_id: CaseId },
    /// Push notification from the live channel.
    LiveUpdate(ProcessingUpdate),
    /// Result of a status fetch (initial load, poll tick or manual refresh).
    StatusFetched {
        case_id: CaseId,
        result: Result<CaseStatus, StatusError>,
    },
    /// Result of a catch-up fetch after the live channel reconnected.
    UpdatesFetched {
        case_id: CaseId,
        result: Result<Vec<ProcessingUpdate>, StatusError>,
    },
    NoOp,
}
