use std::sync::Arc;
use std::time::Duration;

use casewatch_core::{CaseId, ChannelLifecycle, ProcessingUpdate};
use casewatch_logging::{watch_debug, watch_info, watch_warn};
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::feed::{ChangeFeed, FeedEventType, FeedMessage, FeedRegistration, RawChange};
use crate::{EventSink, LiveEvent};

/// `processingStatus` reported when a result record is inserted.
pub const RESULT_INSERTED_STATUS: &str = "stage_completed";
/// `processingStatus` reported when an intermediate artifact is inserted.
pub const ARTIFACT_INSERTED_STATUS: &str = "stage_transition";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedTables {
    pub cases: String,
    pub results: String,
    pub artifacts: String,
}

impl Default for FeedTables {
    fn default() -> Self {
        Self {
            cases: "cases".to_string(),
            results: "case_results".to_string(),
            artifacts: "case_artifacts".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveSettings {
    pub handshake_timeout: Duration,
    pub tables: FeedTables,
}

impl Default for LiveSettings {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(10),
            tables: FeedTables::default(),
        }
    }
}

struct ActiveSubscription {
    case_id: CaseId,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Push subscription for one case at a time.
///
/// Errors and timeouts are reported, never retried here.
pub struct LiveChannel {
    feed: Arc<dyn ChangeFeed>,
    settings: LiveSettings,
    parent: CancellationToken,
    active: Option<ActiveSubscription>,
}

impl LiveChannel {
    pub fn new(feed: Arc<dyn ChangeFeed>, settings: LiveSettings) -> Self {
        Self::with_parent(feed, settings, CancellationToken::new())
    }

    /// Subscriptions are cancelled together with `parent`.
    pub fn with_parent(
        feed: Arc<dyn ChangeFeed>,
        settings: LiveSettings,
        parent: CancellationToken,
    ) -> Self {
        Self {
            feed,
            settings,
            parent,
            active: None,
        }
    }

    pub fn subscribe(&mut self, case_id: CaseId, sink: Arc<dyn EventSink<LiveEvent>>) {
        self.unsubscribe();
        watch_info!("live channel subscribing case={}", case_id);
        let cancel = self.parent.child_token();
        let task = tokio::spawn(run_subscription(
            self.feed.clone(),
            self.settings.clone(),
            case_id.clone(),
            sink,
            cancel.clone(),
        ));
        self.active = Some(ActiveSubscription {
            case_id,
            cancel,
            task,
        });
    }

    /// Returns `false` when nothing was subscribed.
    pub fn unsubscribe(&mut self) -> bool {
        let Some(active) = self.active.take() else {
            return false;
        };
        watch_info!("live channel unsubscribing case={}", active.case_id);
        active.cancel.cancel();
        active.task.abort();
        true
    }

    /// The case currently bound, if its subscription is still running.
    pub fn active_case(&self) -> Option<&CaseId> {
        self.active
            .as_ref()
            .filter(|active| !active.task.is_finished())
            .map(|active| &active.case_id)
    }
}

impl Drop for LiveChannel {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

pub fn registrations_for(tables: &FeedTables, case_id: &CaseId) -> Vec<FeedRegistration> {
    vec![
        FeedRegistration {
            table_name: tables.cases.clone(),
            filter: format!("id=eq.{case_id}"),
            event_type: FeedEventType::Update,
        },
        FeedRegistration {
            table_name: tables.results.clone(),
            filter: format!("case_id=eq.{case_id}"),
            event_type: FeedEventType::Insert,
        },
        FeedRegistration {
            table_name: tables.artifacts.clone(),
            filter: format!("case_id=eq.{case_id}"),
            event_type: FeedEventType::Insert,
        },
    ]
}

async fn run_subscription(
    feed: Arc<dyn ChangeFeed>,
    settings: LiveSettings,
    case_id: CaseId,
    sink: Arc<dyn EventSink<LiveEvent>>,
    cancel: CancellationToken,
) {
    let lifecycle = |event: ChannelLifecycle| LiveEvent::Lifecycle {
        case_id: case_id.clone(),
        event,
    };
    let deadline = tokio::time::sleep(settings.handshake_timeout);
    tokio::pin!(deadline);

    let topic = format!("case-status-{case_id}");
    let registrations = registrations_for(&settings.tables, &case_id);
    let registered = tokio::select! {
        biased;
        _ = cancel.cancelled() => return,
        _ = &mut deadline => {
            watch_warn!("live channel handshake timed out case={}", case_id);
            sink.emit(lifecycle(ChannelLifecycle::TimedOut));
            return;
        }
        registered = feed.subscribe(&topic, registrations, cancel.clone()) => registered,
    };
    let mut messages = match registered {
        Ok(messages) => messages,
        Err(err) => {
            watch_warn!("live channel registration failed case={}: {}", case_id, err);
            sink.emit(lifecycle(ChannelLifecycle::ChannelError(err.to_string())));
            return;
        }
    };

    let mut acknowledged = false;
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = &mut deadline, if !acknowledged => {
                watch_warn!("live channel handshake timed out case={}", case_id);
                sink.emit(lifecycle(ChannelLifecycle::TimedOut));
                break;
            }
            message = messages.recv() => match message {
                Some(FeedMessage::Subscribed) => {
                    acknowledged = true;
                    watch_info!("live channel subscribed case={}", case_id);
                    sink.emit(lifecycle(ChannelLifecycle::Subscribed));
                }
                Some(FeedMessage::Change(change)) => {
                    match translate_change(&settings.tables, &case_id, &change) {
                        Some(update) => sink.emit(LiveEvent::Update(update)),
                        None => watch_debug!(
                            "live channel ignored {:?} on {} case={}",
                            change.event,
                            change.table,
                            case_id
                        ),
                    }
                }
                Some(FeedMessage::TimedOut) => {
                    watch_warn!("live channel timed out case={}", case_id);
                    sink.emit(lifecycle(ChannelLifecycle::TimedOut));
                    break;
                }
                Some(FeedMessage::ChannelError(reason)) => {
                    watch_warn!("live channel error case={}: {}", case_id, reason);
                    sink.emit(lifecycle(ChannelLifecycle::ChannelError(reason)));
                    break;
                }
                Some(FeedMessage::Closed) | None => {
                    watch_warn!("live channel closed by provider case={}", case_id);
                    sink.emit(lifecycle(ChannelLifecycle::ChannelError(
                        "channel closed".to_string(),
                    )));
                    break;
                }
            },
        }
    }
    cancel.cancel();
}

/// Maps a raw change onto a `ProcessingUpdate`.
///
/// Case row updates carry their own status; result and artifact inserts get
/// the synthetic [`RESULT_INSERTED_STATUS`] and [`ARTIFACT_INSERTED_STATUS`].
pub fn translate_change(
    tables: &FeedTables,
    case_id: &CaseId,
    change: &RawChange,
) -> Option<ProcessingUpdate> {
    let record = &change.record;
    let (processing_status, enhanced, stamp_field) = match change.event {
        FeedEventType::Update if change.table == tables.cases => {
            let status = str_field(record, "processing_status")
                .or_else(|| str_field(record, "status"))?;
            (
                status,
                str_field(record, "enhanced_processing_status"),
                "updated_at",
            )
        }
        FeedEventType::Insert if change.table == tables.results => (
            RESULT_INSERTED_STATUS.to_string(),
            str_field(record, "stage").or_else(|| Some(change.table.clone())),
            "created_at",
        ),
        FeedEventType::Insert if change.table == tables.artifacts => (
            ARTIFACT_INSERTED_STATUS.to_string(),
            str_field(record, "stage").or_else(|| Some(change.table.clone())),
            "created_at",
        ),
        _ => return None,
    };

    let last_updated = str_field(record, stamp_field)
        .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
        .map(|stamp| stamp.with_timezone(&Utc));

    Some(ProcessingUpdate {
        case_id: case_id.clone(),
        processing_status,
        enhanced_processing_status: enhanced,
        ai_processed: record
            .get("ai_processed")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        last_updated,
    })
}

fn str_field(record: &Value, field: &str) -> Option<String> {
    record
        .get(field)
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
}
