use std::fmt;

use serde::{Deserialize, Serialize};

/// Error surfaced to consumers through the reconciled view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusError {
    #[serde(rename = "type")]
    pub kind: ErrorKind,
    pub message: String,
}

impl StatusError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Maps an HTTP status code onto the error taxonomy.
    pub fn from_http_status(code: u16, message: impl Into<String>) -> Self {
        let kind = match code {
            401 => ErrorKind::Auth,
            404 => ErrorKind::NotFound,
            429 => ErrorKind::RateLimited,
            500..=599 => ErrorKind::Network,
            _ => ErrorKind::General,
        };
        Self::new(kind, message)
    }
}

impl fmt::Display for StatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for StatusError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// 401; needs an external token refresh, never retried internally.
    Auth,
    /// Connection failure or request timeout; retried on the next tick.
    Network,
    /// 404; the case has no server-side record yet.
    NotFound,
    /// 429; back off before the next tick.
    RateLimited,
    /// Live transport failure; bounded reconnect, then fallback.
    Channel,
    General,
}

impl ErrorKind {
    /// Whether polling may keep running after this error.
    pub fn keeps_polling(self) -> bool {
        !matches!(self, ErrorKind::Auth)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Auth => write!(f, "auth"),
            ErrorKind::Network => write!(f, "network"),
            ErrorKind::NotFound => write!(f, "not_found"),
            ErrorKind::RateLimited => write!(f, "rate_limited"),
            ErrorKind::Channel => write!(f, "channel"),
            ErrorKind::General => write!(f, "general"),
        }
    }
}
