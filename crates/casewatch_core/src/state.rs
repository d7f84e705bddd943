use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::view_model::StatusView;
use crate::{
    BackoffPolicy, CaseId, CaseStatus, ConnectionState, Effect, ErrorKind, ProcessingUpdate,
    StatusError, StatusKind,
};

pub const DEFAULT_CASE_POLL_INTERVAL: Duration = Duration::from_millis(5_000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcilerSettings {
    pub poll_interval: Duration,
    pub backoff: BackoffPolicy,
}

impl Default for ReconcilerSettings {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_CASE_POLL_INTERVAL,
            backoff: BackoffPolicy::default(),
        }
    }
}

/// Which transport currently owns a watched case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Waiting for the capability check.
    Probing,
    /// Channel open requested, waiting for `Subscribed`.
    Connecting,
    Live,
    /// Channel closed, reconnect timer pending.
    Reconnecting,
    Polling,
    /// Polling stopped after an auth failure; waits for a session refresh.
    Halted,
    Terminal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CaseWatch {
    pub(crate) case_id: CaseId,
    pub(crate) phase: Phase,
    pub(crate) status: Option<CaseStatus>,
    pub(crate) notification: Option<ProcessingUpdate>,
    pub(crate) error: Option<StatusError>,
    pub(crate) reconnect_attempts: u32,
    pub(crate) loading: bool,
}

impl CaseWatch {
    fn new(case_id: CaseId) -> Self {
        Self {
            case_id,
            phase: Phase::Probing,
            status: None,
            notification: None,
            error: None,
            reconnect_attempts: 0,
            loading: true,
        }
    }

    fn is_terminal(&self) -> bool {
        self.status
            .as_ref()
            .is_some_and(|status| status.status.is_terminal())
    }

    /// Effects that release whatever transport the current phase holds.
    fn release_transport(&self) -> Vec<Effect> {
        match self.phase {
            Phase::Connecting | Phase::Live => vec![Effect::CloseChannel],
            Phase::Reconnecting => vec![Effect::CancelReconnect],
            Phase::Polling => vec![Effect::StopPolling {
                case_id: self.case_id.clone(),
            }],
            Phase::Probing | Phase::Halted | Phase::Terminal => Vec::new(),
        }
    }
}

/// Reconciled status for the one case this instance observes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReconcilerState {
    settings: ReconcilerSettings,
    watch: Option<CaseWatch>,
    dirty: bool,
}

impl ReconcilerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(settings: ReconcilerSettings) -> Self {
        Self {
            settings,
            ..Self::default()
        }
    }

    pub fn settings(&self) -> &ReconcilerSettings {
        &self.settings
    }

    pub fn case_id(&self) -> Option<&CaseId> {
        self.watch.as_ref().map(|watch| &watch.case_id)
    }

    pub fn phase(&self) -> Option<Phase> {
        self.watch.as_ref().map(|watch| watch.phase)
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.watch
            .as_ref()
            .map_or(0, |watch| watch.reconnect_attempts)
    }

    pub fn view(&self) -> StatusView {
        let Some(watch) = self.watch.as_ref() else {
            return StatusView::default();
        };
        let connection = match watch.phase {
            Phase::Live => ConnectionState::Connected,
            Phase::Polling => ConnectionState::Polling,
            _ => ConnectionState::Disconnected,
        };
        StatusView {
            case_id: Some(watch.case_id.clone()),
            status: watch.status.clone(),
            notification: watch.notification.clone(),
            connection,
            is_connected: connection == ConnectionState::Connected,
            is_polling: connection == ConnectionState::Polling,
            error: watch.error.clone(),
            is_loading: watch.loading,
            reconnect_attempts: watch.reconnect_attempts,
        }
    }

    /// Returns and clears the "view changed" flag.
    pub fn consume_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Returns the watch only if it observes `case_id`.
    fn watch_for(&mut self, case_id: &CaseId) -> Option<&mut CaseWatch> {
        self.watch
            .as_mut()
            .filter(|watch| &watch.case_id == case_id)
    }

    pub(crate) fn subscribe(&mut self, case_id: CaseId) -> Vec<Effect> {
        let mut effects = self.unsubscribe();
        self.watch = Some(CaseWatch::new(case_id.clone()));
        self.mark_dirty();
        // The first snapshot is fetched once the capability check picks a transport.
        effects.push(Effect::ProbeLive { case_id });
        effects
    }

    pub(crate) fn unsubscribe(&mut self) -> Vec<Effect> {
        let Some(watch) = self.watch.take() else {
            return Vec::new();
        };
        self.mark_dirty();
        watch.release_transport()
    }

    pub(crate) fn refresh(&mut self) -> Vec<Effect> {
        match self.watch.as_ref() {
            Some(watch) => vec![Effect::FetchStatus {
                case_id: watch.case_id.clone(),
            }],
            None => Vec::new(),
        }
    }

    pub(crate) fn session_refreshed(&mut self) -> Vec<Effect> {
        let Some(watch) = self.watch.as_mut() else {
            return Vec::new();
        };
        if !matches!(
            watch.phase,
            Phase::Polling | Phase::Halted | Phase::Reconnecting
        ) {
            return Vec::new();
        }
        let mut effects = watch.release_transport();
        watch.phase = Phase::Probing;
        watch.reconnect_attempts = 0;
        if watch.error.as_ref().is_some_and(|e| e.kind == ErrorKind::Auth) {
            watch.error = None;
        }
        let case_id = watch.case_id.clone();
        self.mark_dirty();
        effects.push(Effect::ProbeLive { case_id });
        effects
    }

    pub(crate) fn probe_finished(&mut self, case_id: &CaseId, available: bool) -> Vec<Effect> {
        let interval = self.settings.poll_interval;
        let Some(watch) = self.watch_for(case_id) else {
            return Vec::new();
        };
        if watch.phase != Phase::Probing {
            return Vec::new();
        }
        // Polling fetches on its first tick, so only the live path asks for a snapshot.
        let effects = if available {
            watch.phase = Phase::Connecting;
            vec![
                Effect::OpenChannel {
                    case_id: case_id.clone(),
                },
                Effect::FetchStatus {
                    case_id: case_id.clone(),
                },
            ]
        } else {
            watch.phase = Phase::Polling;
            vec![Effect::StartPolling {
                case_id: case_id.clone(),
                interval,
            }]
        };
        self.mark_dirty();
        effects
    }

    pub(crate) fn channel_subscribed(&mut self, case_id: &CaseId) -> Vec<Effect> {
        let Some(watch) = self.watch_for(case_id) else {
            return Vec::new();
        };
        if watch.phase != Phase::Connecting {
            return Vec::new();
        }
        watch.phase = Phase::Live;
        watch.reconnect_attempts = 0;
        if watch.error.as_ref().is_some_and(|e| e.kind == ErrorKind::Channel) {
            watch.error = None;
        }
        let catch_up = watch.status.as_ref().map(|status| Effect::FetchUpdatesSince {
            case_id: case_id.clone(),
            since: status.last_update,
        });
        self.mark_dirty();
        catch_up.into_iter().collect()
    }

    pub(crate) fn channel_failed(&mut self, case_id: &CaseId, error: StatusError) -> Vec<Effect> {
        let settings = self.settings;
        let Some(watch) = self.watch_for(case_id) else {
            return Vec::new();
        };
        if !matches!(watch.phase, Phase::Connecting | Phase::Live) {
            return Vec::new();
        }
        watch.error = Some(error);
        watch.reconnect_attempts = (watch.reconnect_attempts + 1).min(settings.backoff.max_attempts);
        let mut effects = vec![Effect::CloseChannel];
        if watch.reconnect_attempts >= settings.backoff.max_attempts {
            watch.phase = Phase::Polling;
            effects.push(Effect::StartPolling {
                case_id: case_id.clone(),
                interval: settings.poll_interval,
            });
        } else {
            watch.phase = Phase::Reconnecting;
            effects.push(Effect::ScheduleReconnect {
                case_id: case_id.clone(),
                delay: settings.backoff.delay(watch.reconnect_attempts),
            });
        }
        self.mark_dirty();
        effects
    }

    pub(crate) fn reconnect_due(&mut self, case_id: &CaseId) -> Vec<Effect> {
        let Some(watch) = self.watch_for(case_id) else {
            return Vec::new();
        };
        if watch.phase != Phase::Reconnecting {
            return Vec::new();
        }
        watch.phase = Phase::Connecting;
        self.mark_dirty();
        vec![Effect::OpenChannel {
            case_id: case_id.clone(),
        }]
    }

    pub(crate) fn apply_snapshot(&mut self, snapshot: CaseStatus) -> Vec<Effect> {
        let case_id = snapshot.case_id.clone();
        let Some(watch) = self.watch_for(&case_id) else {
            return Vec::new();
        };
        watch.loading = false;
        let accepted = match watch.status.as_ref() {
            None => true,
            Some(held) => accepts(held, Some(snapshot.status), Some(snapshot.last_update)),
        };
        if accepted {
            watch.status = Some(snapshot);
            watch.error = None;
        }
        self.mark_dirty();
        self.enter_terminal_if_needed()
    }

    pub(crate) fn apply_update(&mut self, update: ProcessingUpdate) -> Vec<Effect> {
        let case_id = update.case_id.clone();
        let Some(watch) = self.watch_for(&case_id) else {
            return Vec::new();
        };
        let explicit = update.status_kind();
        if let Some(held) = watch.status.as_ref() {
            if !accepts(held, explicit, update.last_updated) {
                return Vec::new();
            }
        }

        if let Some(kind) = explicit {
            let stage = update.enhanced_processing_status.clone();
            match watch.status.as_mut() {
                Some(held) => {
                    held.status = kind;
                    if let Some(at) = update.last_updated {
                        held.last_update = at;
                    }
                    held.ai_processed = update.ai_processed;
                    if let Some(stage) = stage {
                        held.case_stage = stage;
                    }
                }
                None => {
                    // An unstamped push cannot be ordered against the first
                    // snapshot, so it only shows up as the notification.
                    if let Some(last_update) = update.last_updated {
                        watch.status = Some(CaseStatus {
                            case_id: update.case_id.clone(),
                            status: kind,
                            last_update,
                            case_stage: stage.unwrap_or_default(),
                            ai_processed: update.ai_processed,
                            errors: Vec::new(),
                        });
                        watch.loading = false;
                    }
                }
            }
        }
        watch.notification = Some(update);
        self.mark_dirty();
        self.enter_terminal_if_needed()
    }

    pub(crate) fn apply_fetch_error(&mut self, case_id: &CaseId, error: StatusError) -> Vec<Effect> {
        let Some(watch) = self.watch_for(case_id) else {
            return Vec::new();
        };
        watch.loading = false;
        let halt = error.kind == ErrorKind::Auth && watch.phase == Phase::Polling;
        watch.error = Some(error);
        let mut effects = Vec::new();
        if halt {
            effects = watch.release_transport();
            watch.phase = Phase::Halted;
        }
        self.mark_dirty();
        effects
    }

    fn enter_terminal_if_needed(&mut self) -> Vec<Effect> {
        let Some(watch) = self.watch.as_mut() else {
            return Vec::new();
        };
        if !watch.is_terminal() || watch.phase == Phase::Terminal {
            return Vec::new();
        }
        let effects = watch.release_transport();
        watch.phase = Phase::Terminal;
        effects
    }
}

/// Stale-update guard.
///
/// Terminal states are monotonic: once held, only the same terminal status is
/// taken, and a terminal observation always replaces a non-terminal one
/// whatever its timestamp. Everything else is ordered by time; an observation
/// without a timestamp is not ordered at all.
fn accepts(
    held: &CaseStatus,
    incoming: Option<StatusKind>,
    incoming_at: Option<DateTime<Utc>>,
) -> bool {
    let not_older = incoming_at.map_or(true, |at| at >= held.last_update);
    if held.status.is_terminal() {
        return incoming == Some(held.status) && not_older;
    }
    if incoming.is_some_and(|kind| kind.is_terminal()) {
        return true;
    }
    not_older
}
