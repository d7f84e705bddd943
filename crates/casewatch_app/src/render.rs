//! Plain-text lines for status transitions and list summaries.

use std::collections::HashMap;

use casewatch_core::{CaseId, ConnectionState, DisplayState, StatusKind, StatusView};
use casewatch_engine::CaseListView;
use chrono::{DateTime, Local};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, PartialEq, Eq)]
struct Seen {
    status: Option<StatusKind>,
    stage: Option<String>,
    connection: ConnectionState,
    display: DisplayState,
}

impl Seen {
    fn of(view: &StatusView) -> Self {
        Self {
            status: view.status.as_ref().map(|status| status.status),
            stage: view
                .notification
                .as_ref()
                .and_then(|note| note.enhanced_processing_status.clone())
                .or_else(|| view.status.as_ref().map(|status| status.case_stage.clone())),
            connection: view.connection,
            display: view.display_state(),
        }
    }
}

/// Turns a stream of views into one line per visible change.
#[derive(Debug, Default)]
pub struct TransitionPrinter {
    seen: HashMap<CaseId, Seen>,
}

impl TransitionPrinter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a line when status, stage, transport or display state moved.
    pub fn observe(&mut self, view: &StatusView, now: DateTime<Local>) -> Option<String> {
        let case_id = view.case_id.clone()?;
        let seen = Seen::of(view);
        if self.seen.get(&case_id) == Some(&seen) {
            return None;
        }
        let line = transition_line(&case_id, view, &seen, now);
        self.seen.insert(case_id, seen);
        Some(line)
    }
}

fn transition_line(case_id: &CaseId, view: &StatusView, seen: &Seen, now: DateTime<Local>) -> String {
    let status = match (seen.status, seen.display) {
        (Some(kind), _) => kind.as_str(),
        (None, DisplayState::Loading) => "loading",
        (None, DisplayState::NoData) => "no data",
        (None, _) => "unknown",
    };
    let mut line = format!(
        "{}  {}  {}  [{}]",
        now.format(TIME_FORMAT),
        case_id,
        status,
        connection_label(seen.connection)
    );
    if let Some(stage) = seen.stage.as_deref().filter(|stage| !stage.is_empty()) {
        line.push_str(&format!("  stage={stage}"));
    }
    if view.reconnect_attempts > 0 && seen.connection != ConnectionState::Connected {
        line.push_str(&format!("  reconnects={}", view.reconnect_attempts));
    }
    if seen.display == DisplayState::Error {
        if let Some(error) = view.error.as_ref() {
            line.push_str(&format!("  error={error}"));
        }
    }
    line
}

fn connection_label(connection: ConnectionState) -> &'static str {
    match connection {
        ConnectionState::Connected => "live",
        ConnectionState::Polling => "polling",
        ConnectionState::Disconnected => "idle",
    }
}

pub fn summary_line(view: &CaseListView, now: DateTime<Local>) -> String {
    let summary = &view.summary;
    let counts = StatusKind::ALL
        .iter()
        .map(|kind| format!("{} {}", kind, summary.counts.get(*kind)))
        .collect::<Vec<_>>()
        .join("  ");
    let mut line = format!(
        "{}  {} cases  {}  progress {}%",
        now.format(TIME_FORMAT),
        summary.total,
        counts,
        summary.progress_percent
    );
    if let Some(error) = view.error.as_ref() {
        line.push_str(&format!("  error={error}"));
    }
    line
}
