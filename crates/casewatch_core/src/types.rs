use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a case submitted to the processing pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CaseId(String);

impl CaseId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CaseId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Pipeline status as reported by the status endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusKind {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl StatusKind {
    pub const ALL: [StatusKind; 4] = [
        StatusKind::Pending,
        StatusKind::Processing,
        StatusKind::Completed,
        StatusKind::Failed,
    ];

    /// `completed` and `failed` end all observation for a case.
    pub fn is_terminal(self) -> bool {
        matches!(self, StatusKind::Completed | StatusKind::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StatusKind::Pending => "pending",
            StatusKind::Processing => "processing",
            StatusKind::Completed => "completed",
            StatusKind::Failed => "failed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        StatusKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(raw.trim()))
    }
}

impl fmt::Display for StatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authoritative snapshot from `GET /cases/{id}/status`.
///
/// Superseded entirely by the next snapshot; never patched in place except
/// when a push notification is folded in by the reducer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseStatus {
    pub case_id: CaseId,
    pub status: StatusKind,
    pub last_update: DateTime<Utc>,
    #[serde(default)]
    pub case_stage: String,
    #[serde(default)]
    pub ai_processed: bool,
    #[serde(default)]
    pub errors: Vec<String>,
}

/// Incremental event from the live channel or the catch-up endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingUpdate {
    pub case_id: CaseId,
    pub processing_status: String,
    #[serde(default)]
    pub enhanced_processing_status: Option<String>,
    #[serde(default)]
    pub ai_processed: bool,
    /// Server timestamp of the change; `None` when the source row carried none.
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

impl ProcessingUpdate {
    /// The explicit pipeline status carried by this update, if any.
    ///
    /// Synthetic signals (result or artifact inserts) return `None`.
    pub fn status_kind(&self) -> Option<StatusKind> {
        StatusKind::parse(&self.processing_status)
    }
}

/// Transport health as shown to consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Connected,
    Polling,
    #[default]
    Disconnected,
}

/// Lifecycle report from the live channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelLifecycle {
    Subscribed,
    ChannelError(String),
    TimedOut,
}
