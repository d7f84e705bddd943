use crate::{CaseId, CaseStatus, ConnectionState, ErrorKind, ProcessingUpdate, StatusError, StatusKind};

/// What consumers render for a single case.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatusView {
    pub case_id: Option<CaseId>,
    pub status: Option<CaseStatus>,
    pub notification: Option<ProcessingUpdate>,
    pub connection: ConnectionState,
    pub is_connected: bool,
    pub is_polling: bool,
    pub error: Option<StatusError>,
    pub is_loading: bool,
    pub reconnect_attempts: u32,
}

/// Coarse rendering bucket; keeps "no data yet" apart from real errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayState {
    Loading,
    NoData,
    Active,
    Error,
    Completed,
    Failed,
}

impl StatusView {
    pub fn display_state(&self) -> DisplayState {
        match self.status.as_ref().map(|status| status.status) {
            Some(StatusKind::Completed) => return DisplayState::Completed,
            Some(StatusKind::Failed) => return DisplayState::Failed,
            _ => {}
        }
        if let Some(error) = self.error.as_ref() {
            if error.kind != ErrorKind::NotFound {
                return DisplayState::Error;
            }
        }
        match (&self.status, self.is_loading) {
            (Some(_), _) => DisplayState::Active,
            (None, true) => DisplayState::Loading,
            (None, false) => DisplayState::NoData,
        }
    }
}
