use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use casewatch_core::{CaseId, ErrorKind};
use casewatch_logging::{watch_debug, watch_info, watch_warn};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{EventSink, PollEvent, StatusClient};

pub const LIST_POLL_INTERVAL: Duration = Duration::from_millis(30_000);

struct PollTimer {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl PollTimer {
    fn stop(self) {
        self.cancel.cancel();
        self.task.abort();
    }
}

/// Periodic status fetches, one independent timer per case id.
///
/// A timer stops itself after a terminal status or an auth failure; any
/// other failure is logged and the next tick runs as scheduled.
pub struct PollingEngine {
    client: Arc<dyn StatusClient>,
    parent: CancellationToken,
    timers: HashMap<CaseId, PollTimer>,
}

impl PollingEngine {
    pub fn new(client: Arc<dyn StatusClient>) -> Self {
        Self::with_parent(client, CancellationToken::new())
    }

    /// Timers are cancelled together with `parent`.
    pub fn with_parent(client: Arc<dyn StatusClient>, parent: CancellationToken) -> Self {
        Self {
            client,
            parent,
            timers: HashMap::new(),
        }
    }

    /// Fetches immediately, then every `interval`. Replaces any timer
    /// already running for `case_id`.
    pub fn start_polling(
        &mut self,
        case_id: CaseId,
        interval: Duration,
        sink: Arc<dyn EventSink<PollEvent>>,
    ) {
        self.stop_polling(&case_id);
        watch_info!("polling start case={} interval_ms={}", case_id, interval.as_millis());
        let cancel = self.parent.child_token();
        let task = tokio::spawn(poll_loop(
            self.client.clone(),
            case_id.clone(),
            interval,
            sink,
            cancel.clone(),
        ));
        self.timers.insert(case_id, PollTimer { cancel, task });
    }

    /// Returns `false` when no timer existed for `case_id`.
    pub fn stop_polling(&mut self, case_id: &CaseId) -> bool {
        match self.timers.remove(case_id) {
            Some(timer) => {
                watch_debug!("polling stop case={}", case_id);
                timer.stop();
                true
            }
            None => false,
        }
    }

    pub fn stop_all_polling(&mut self) {
        for (_, timer) in self.timers.drain() {
            timer.stop();
        }
    }

    pub fn is_polling(&self, case_id: &CaseId) -> bool {
        self.timers
            .get(case_id)
            .is_some_and(|timer| !timer.task.is_finished())
    }

    /// Case ids whose timers are still running.
    pub fn active_cases(&self) -> Vec<CaseId> {
        let mut cases: Vec<CaseId> = self
            .timers
            .iter()
            .filter(|(_, timer)| !timer.task.is_finished())
            .map(|(case_id, _)| case_id.clone())
            .collect();
        cases.sort();
        cases
    }
}

impl Drop for PollingEngine {
    fn drop(&mut self) {
        self.stop_all_polling();
    }
}

async fn poll_loop(
    client: Arc<dyn StatusClient>,
    case_id: CaseId,
    interval: Duration,
    sink: Arc<dyn EventSink<PollEvent>>,
    cancel: CancellationToken,
) {
    let mut wait = Duration::ZERO;
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(wait) => {}
        }
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            result = client.fetch_case_status(&case_id) => result,
        };

        wait = interval;
        let stop = match &result {
            Ok(status) if status.status.is_terminal() => {
                watch_info!("polling case={} reached {}, stopping", case_id, status.status);
                true
            }
            Ok(status) => {
                watch_debug!("polling case={} status={}", case_id, status.status);
                false
            }
            Err(err) if !err.kind.keeps_polling() => {
                watch_warn!("polling case={} halted: {}", case_id, err);
                true
            }
            Err(err) if err.kind == ErrorKind::RateLimited => {
                wait = interval.saturating_mul(2);
                watch_warn!(
                    "polling case={} rate limited, next tick in {}ms",
                    case_id,
                    wait.as_millis()
                );
                false
            }
            Err(err) => {
                watch_warn!("polling case={} fetch failed, continuing: {}", case_id, err);
                false
            }
        };

        sink.emit(PollEvent {
            case_id: case_id.clone(),
            result,
        });
        if stop {
            return;
        }
    }
}
