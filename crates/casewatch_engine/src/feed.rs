//! Change-feed provider boundary and an in-process implementation.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FeedEventType {
    Insert,
    Update,
}

/// One `{tableName, filter, eventType}` registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedRegistration {
    pub table_name: String,
    /// PostgREST-style row filter, e.g. `case_id=eq.42`.
    pub filter: String,
    pub event_type: FeedEventType,
}

impl FeedRegistration {
    pub fn matches(&self, change: &RawChange) -> bool {
        if self.table_name != change.table || self.event_type != change.event {
            return false;
        }
        let Some((column, condition)) = self.filter.split_once('=') else {
            return true;
        };
        let Some(expected) = condition.strip_prefix("eq.") else {
            return false;
        };
        match change.record.get(column) {
            Some(Value::String(actual)) => actual == expected,
            Some(Value::Number(actual)) => actual.to_string() == expected,
            _ => false,
        }
    }
}

/// Payload as delivered by the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawChange {
    pub event: FeedEventType,
    pub table: String,
    #[serde(rename = "new")]
    pub record: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FeedMessage {
    Subscribed,
    ChannelError(String),
    TimedOut,
    Closed,
    Change(RawChange),
}

pub type FeedMessages = mpsc::UnboundedReceiver<FeedMessage>;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FeedError {
    #[error("change feed rejected registration: {0}")]
    Rejected(String),
    #[error("change feed unavailable")]
    Unavailable,
}

/// Subscribe-by-table/row-filter primitive of the change-feed provider.
///
/// The registration stays alive until `cancel` is cancelled or the returned
/// receiver is dropped, whichever comes first.
#[async_trait::async_trait]
pub trait ChangeFeed: Send + Sync {
    async fn subscribe(
        &self,
        topic: &str,
        registrations: Vec<FeedRegistration>,
        cancel: CancellationToken,
    ) -> Result<FeedMessages, FeedError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handshake {
    /// Acknowledge every registration right away.
    Acknowledge,
    /// Never acknowledge; the subscriber's handshake timer decides.
    Silent,
    /// Refuse registrations.
    Reject,
}

struct Registered {
    topic: String,
    registrations: Vec<FeedRegistration>,
    tx: mpsc::UnboundedSender<FeedMessage>,
    cancel: CancellationToken,
}

impl Registered {
    fn is_live(&self) -> bool {
        !self.cancel.is_cancelled() && !self.tx.is_closed()
    }
}

/// In-process change feed; publishes to every matching live registration.
pub struct MemoryChangeFeed {
    handshake: Mutex<Handshake>,
    subscribers: Mutex<Vec<Registered>>,
    attempts: AtomicUsize,
}

impl Default for MemoryChangeFeed {
    fn default() -> Self {
        Self::new(Handshake::Acknowledge)
    }
}

impl MemoryChangeFeed {
    pub fn new(handshake: Handshake) -> Self {
        Self {
            handshake: Mutex::new(handshake),
            subscribers: Mutex::new(Vec::new()),
            attempts: AtomicUsize::new(0),
        }
    }

    pub fn set_handshake(&self, handshake: Handshake) {
        *self.handshake.lock().unwrap_or_else(PoisonError::into_inner) = handshake;
    }

    /// Delivers a change; returns how many registrations received it.
    pub fn publish(&self, change: RawChange) -> usize {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(Registered::is_live);
        subscribers
            .iter()
            .filter(|sub| sub.registrations.iter().any(|reg| reg.matches(&change)))
            .filter(|sub| sub.tx.send(FeedMessage::Change(change.clone())).is_ok())
            .count()
    }

    /// Sends a lifecycle message to every live registration on `topic`.
    pub fn signal(&self, topic: &str, message: FeedMessage) -> usize {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(Registered::is_live);
        subscribers
            .iter()
            .filter(|sub| sub.topic == topic)
            .filter(|sub| sub.tx.send(message.clone()).is_ok())
            .count()
    }

    /// Sends a channel error to every live registration.
    pub fn fail_all(&self, reason: &str) -> usize {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(Registered::is_live);
        subscribers
            .iter()
            .filter(|sub| {
                sub.tx
                    .send(FeedMessage::ChannelError(reason.to_string()))
                    .is_ok()
            })
            .count()
    }

    /// Number of `subscribe` calls so far, rejected ones included.
    pub fn subscribe_attempts(&self) -> usize {
        self.attempts.load(Ordering::Relaxed)
    }

    pub fn active_subscriptions(&self) -> usize {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(Registered::is_live);
        subscribers.len()
    }
}

#[async_trait::async_trait]
impl ChangeFeed for MemoryChangeFeed {
    async fn subscribe(
        &self,
        topic: &str,
        registrations: Vec<FeedRegistration>,
        cancel: CancellationToken,
    ) -> Result<FeedMessages, FeedError> {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        let handshake = *self.handshake.lock().unwrap_or_else(PoisonError::into_inner);
        if handshake == Handshake::Reject {
            return Err(FeedError::Rejected(topic.to_string()));
        }

        let (tx, messages) = mpsc::unbounded_channel();
        if handshake == Handshake::Acknowledge {
            let _ = tx.send(FeedMessage::Subscribed);
        }
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Registered {
                topic: topic.to_string(),
                registrations,
                tx,
                cancel,
            });
        Ok(messages)
    }
}
