use std::time::Duration;

use casewatch_core::{CaseId, CaseStatus, ChannelLifecycle, ProcessingUpdate, StatusError};
use tokio::sync::mpsc;

/// Receiver side of a transport; every transport reports through one of these.
pub trait EventSink<E>: Send + Sync {
    fn emit(&self, event: E);
}

impl<E: Send> EventSink<E> for mpsc::UnboundedSender<E> {
    fn emit(&self, event: E) {
        let _ = self.send(event);
    }
}

/// One poll tick's outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollEvent {
    pub case_id: CaseId,
    pub result: Result<CaseStatus, StatusError>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveEvent {
    Lifecycle {
        case_id: CaseId,
        event: ChannelLifecycle,
    },
    Update(ProcessingUpdate),
}

/// Emitted by the adaptive poller when the payload changed or a fetch failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WidgetEvent {
    pub path: String,
    pub result: Result<Vec<u8>, StatusError>,
    pub next_poll: Duration,
}
