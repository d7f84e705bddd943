#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use casewatch_core::{CaseId, CaseStatus, ErrorKind, ProcessingUpdate, StatusError, StatusKind};
use casewatch_engine::{EventSink, StatusClient};
use chrono::{DateTime, Utc};

pub fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(casewatch_logging::initialize_for_tests);
}

pub fn at(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
}

pub fn snapshot(case_id: &str, status: StatusKind, secs: i64) -> CaseStatus {
    CaseStatus {
        case_id: CaseId::new(case_id),
        status,
        last_update: at(secs),
        case_stage: "analysis".to_string(),
        ai_processed: status == StatusKind::Completed,
        errors: Vec::new(),
    }
}

pub fn error(kind: ErrorKind) -> StatusError {
    StatusError::new(kind, format!("scripted {kind}"))
}

/// Pops scripted results in order and keeps repeating the last one.
struct Script<T> {
    steps: VecDeque<T>,
}

impl<T: Clone> Script<T> {
    fn next(&mut self) -> Option<T> {
        if self.steps.len() > 1 {
            self.steps.pop_front()
        } else {
            self.steps.front().cloned()
        }
    }
}

/// In-memory `StatusClient` answering from per-endpoint scripts.
pub struct FakeClient {
    statuses: Mutex<HashMap<CaseId, Script<Result<CaseStatus, StatusError>>>>,
    lists: Mutex<Script<Result<Vec<CaseStatus>, StatusError>>>,
    raw: Mutex<Script<Result<Vec<u8>, StatusError>>>,
    updates: Mutex<Vec<ProcessingUpdate>>,
    realtime: Mutex<Result<bool, StatusError>>,
    realtime_delay: Mutex<Duration>,
    status_calls: Mutex<HashMap<CaseId, usize>>,
    update_queries: Mutex<Vec<DateTime<Utc>>>,
    list_calls: Mutex<usize>,
    raw_calls: Mutex<usize>,
}

impl Default for FakeClient {
    fn default() -> Self {
        Self {
            statuses: Mutex::new(HashMap::new()),
            lists: Mutex::new(Script {
                steps: VecDeque::new(),
            }),
            raw: Mutex::new(Script {
                steps: VecDeque::new(),
            }),
            updates: Mutex::new(Vec::new()),
            realtime: Mutex::new(Ok(false)),
            realtime_delay: Mutex::new(Duration::ZERO),
            status_calls: Mutex::new(HashMap::new()),
            update_queries: Mutex::new(Vec::new()),
            list_calls: Mutex::new(0),
            raw_calls: Mutex::new(0),
        }
    }
}

impl FakeClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script_status(
        &self,
        case_id: &str,
        steps: impl IntoIterator<Item = Result<CaseStatus, StatusError>>,
    ) {
        self.statuses.lock().unwrap().insert(
            CaseId::new(case_id),
            Script {
                steps: steps.into_iter().collect(),
            },
        );
    }

    pub fn script_list(&self, steps: impl IntoIterator<Item = Result<Vec<CaseStatus>, StatusError>>) {
        self.lists.lock().unwrap().steps = steps.into_iter().collect();
    }

    pub fn script_raw(&self, steps: impl IntoIterator<Item = Result<Vec<u8>, StatusError>>) {
        self.raw.lock().unwrap().steps = steps.into_iter().collect();
    }

    pub fn set_updates(&self, updates: Vec<ProcessingUpdate>) {
        *self.updates.lock().unwrap() = updates;
    }

    pub fn set_realtime(&self, available: Result<bool, StatusError>) {
        *self.realtime.lock().unwrap() = available;
    }

    /// Delays capability answers. The answer is read when the call starts.
    pub fn set_realtime_delay(&self, delay: Duration) {
        *self.realtime_delay.lock().unwrap() = delay;
    }

    pub fn status_calls(&self, case_id: &str) -> usize {
        self.status_calls
            .lock()
            .unwrap()
            .get(&CaseId::new(case_id))
            .copied()
            .unwrap_or(0)
    }

    pub fn update_queries(&self) -> Vec<DateTime<Utc>> {
        self.update_queries.lock().unwrap().clone()
    }

    pub fn list_calls(&self) -> usize {
        *self.list_calls.lock().unwrap()
    }

    pub fn raw_calls(&self) -> usize {
        *self.raw_calls.lock().unwrap()
    }
}

#[async_trait::async_trait]
impl StatusClient for FakeClient {
    async fn fetch_case_status(&self, case_id: &CaseId) -> Result<CaseStatus, StatusError> {
        *self
            .status_calls
            .lock()
            .unwrap()
            .entry(case_id.clone())
            .or_insert(0) += 1;
        self.statuses
            .lock()
            .unwrap()
            .get_mut(case_id)
            .and_then(Script::next)
            .unwrap_or_else(|| Err(error(ErrorKind::NotFound)))
    }

    async fn fetch_all_statuses(&self) -> Result<Vec<CaseStatus>, StatusError> {
        *self.list_calls.lock().unwrap() += 1;
        self.lists.lock().unwrap().next().unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn fetch_updates_since(
        &self,
        case_id: &CaseId,
        since: DateTime<Utc>,
    ) -> Result<Vec<ProcessingUpdate>, StatusError> {
        self.update_queries.lock().unwrap().push(since);
        Ok(self
            .updates
            .lock()
            .unwrap()
            .iter()
            .filter(|update| {
                &update.case_id == case_id && update.last_updated.is_some_and(|at| at > since)
            })
            .cloned()
            .collect())
    }

    async fn realtime_available(&self) -> Result<bool, StatusError> {
        let answer = self.realtime.lock().unwrap().clone();
        let delay = *self.realtime_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        answer
    }

    async fn fetch_raw(&self, _path: &str) -> Result<Vec<u8>, StatusError> {
        *self.raw_calls.lock().unwrap() += 1;
        self.raw
            .lock()
            .unwrap()
            .next()
            .unwrap_or_else(|| Err(error(ErrorKind::NotFound)))
    }
}

/// Sink that records every event for later inspection.
pub struct Recorder<E> {
    events: Mutex<Vec<E>>,
}

impl<E> Recorder<E> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(Vec::new()),
        })
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap().len()
    }
}

impl<E: Clone> Recorder<E> {
    pub fn events(&self) -> Vec<E> {
        self.events.lock().unwrap().clone()
    }
}

impl<E: Send> EventSink<E> for Recorder<E> {
    fn emit(&self, event: E) {
        self.events.lock().unwrap().push(event);
    }
}
