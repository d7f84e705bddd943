use std::sync::Arc;
use std::time::Duration;

use casewatch_core::{summarize, CaseStatus, DashboardSummary, ErrorKind, StatusError};
use casewatch_logging::{watch_info, watch_warn};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::polling::LIST_POLL_INTERVAL;
use crate::StatusClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListSettings {
    pub poll_interval: Duration,
}

impl Default for ListSettings {
    fn default() -> Self {
        Self {
            poll_interval: LIST_POLL_INTERVAL,
        }
    }
}

/// Dashboard-level view over every case of the current user.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CaseListView {
    pub cases_status: Vec<CaseStatus>,
    pub is_loading: bool,
    pub error: Option<StatusError>,
    pub summary: DashboardSummary,
}

/// Polls `GET /cases/status` and publishes a [`CaseListView`].
///
/// After an auth failure automatic polling pauses until
/// [`CaseListObserver::refresh_status`] is called.
pub struct CaseListObserver {
    refresh_tx: mpsc::UnboundedSender<()>,
    view_rx: watch::Receiver<CaseListView>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl CaseListObserver {
    pub fn spawn(client: Arc<dyn StatusClient>, settings: ListSettings) -> Self {
        let (refresh_tx, refresh_rx) = mpsc::unbounded_channel();
        let (view_tx, view_rx) = watch::channel(CaseListView {
            is_loading: true,
            ..CaseListView::default()
        });
        let cancel = CancellationToken::new();
        let task = tokio::spawn(list_loop(
            client,
            settings,
            view_tx,
            refresh_rx,
            cancel.clone(),
        ));
        Self {
            refresh_tx,
            view_rx,
            cancel,
            task,
        }
    }

    pub fn refresh_status(&self) {
        let _ = self.refresh_tx.send(());
    }

    pub fn view(&self) -> CaseListView {
        self.view_rx.borrow().clone()
    }

    pub fn changes(&self) -> watch::Receiver<CaseListView> {
        self.view_rx.clone()
    }
}

impl Drop for CaseListObserver {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.task.abort();
    }
}

async fn list_loop(
    client: Arc<dyn StatusClient>,
    settings: ListSettings,
    view_tx: watch::Sender<CaseListView>,
    mut refresh_rx: mpsc::UnboundedReceiver<()>,
    cancel: CancellationToken,
) {
    loop {
        view_tx.send_modify(|view| view.is_loading = true);
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            result = client.fetch_all_statuses() => result,
        };

        let paused = matches!(&result, Err(err) if err.kind == ErrorKind::Auth);
        match result {
            Ok(cases) => {
                watch_info!("case list refreshed, {} cases", cases.len());
                view_tx.send_modify(|view| {
                    view.summary = summarize(&cases);
                    view.cases_status = cases;
                    view.error = None;
                    view.is_loading = false;
                });
            }
            Err(err) => {
                watch_warn!("case list fetch failed: {}", err);
                view_tx.send_modify(|view| {
                    view.error = Some(err);
                    view.is_loading = false;
                });
            }
        }

        if paused {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                refresh = refresh_rx.recv() => if refresh.is_none() { return },
            }
        } else {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                refresh = refresh_rx.recv() => if refresh.is_none() { return },
                _ = tokio::time::sleep(settings.poll_interval) => {}
            }
        }
    }
}
