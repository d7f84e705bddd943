use std::future::Future;
use std::sync::Arc;

use casewatch_core::{
    update, CaseId, ChannelLifecycle, Effect, Msg, ReconcilerSettings, ReconcilerState, StatusView,
};
use casewatch_logging::{watch_debug, watch_info, watch_warn};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::feed::ChangeFeed;
use crate::live::{LiveChannel, LiveSettings};
use crate::polling::PollingEngine;
use crate::{EventSink, LiveEvent, PollEvent, SessionProvider, StatusClient};

/// Views buffered per transition subscriber before it starts lagging.
pub const TRANSITION_CAPACITY: usize = 64;

#[derive(Debug, Clone, Default)]
pub struct ObserverSettings {
    pub reconciler: ReconcilerSettings,
    pub live: LiveSettings,
}

/// Handle to a running status reconciler.
///
/// All reconciled state lives on one driver task; this handle only sends
/// messages to it and reads published [`StatusView`]s, either the latest one
/// through [`changes`](Self::changes) or every one through
/// [`transitions`](Self::transitions). Dropping the handle cancels every
/// transport the driver holds.
pub struct StatusObserver {
    msg_tx: mpsc::UnboundedSender<Msg>,
    view_rx: watch::Receiver<StatusView>,
    transitions_tx: broadcast::Sender<StatusView>,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl StatusObserver {
    /// Starts the driver on the current tokio runtime. Without a change feed
    /// every case falls back to polling.
    pub fn spawn(
        client: Arc<dyn StatusClient>,
        session: Arc<dyn SessionProvider>,
        feed: Option<Arc<dyn ChangeFeed>>,
        settings: ObserverSettings,
    ) -> Self {
        let (msg_tx, msg_rx) = mpsc::unbounded_channel();
        let state = ReconcilerState::with_settings(settings.reconciler);
        let (view_tx, view_rx) = watch::channel(state.view());
        let (transitions_tx, _) = broadcast::channel(TRANSITION_CAPACITY);
        let (result_tx, result_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();

        let driver = Driver {
            state,
            polling: PollingEngine::with_parent(client.clone(), shutdown.child_token()),
            live: feed.map(|feed| {
                LiveChannel::with_parent(feed, settings.live.clone(), shutdown.child_token())
            }),
            client,
            session,
            reconnect: None,
            sink: Arc::new(MsgSink(msg_tx.clone())),
            msg_tx: msg_tx.clone(),
            result_tx,
            generation: 0,
            requests: shutdown.child_token(),
            view_tx,
            transitions_tx: transitions_tx.clone(),
            shutdown: shutdown.clone(),
        };
        let task = tokio::spawn(driver.run(msg_rx, result_rx));

        Self {
            msg_tx,
            view_rx,
            transitions_tx,
            shutdown,
            task,
        }
    }

    /// Binds the observer to `case_id`, releasing any previous case first.
    pub fn subscribe(&self, case_id: CaseId) {
        self.send(Msg::Subscribe(case_id));
    }

    pub fn unsubscribe(&self) {
        self.send(Msg::Unsubscribe);
    }

    /// One-off status fetch; available in every state.
    pub fn refresh_status(&self) {
        self.send(Msg::RefreshRequested);
    }

    /// Tells the observer that the session provider obtained a new token.
    pub fn session_refreshed(&self) {
        self.send(Msg::SessionRefreshed);
    }

    pub fn view(&self) -> StatusView {
        self.view_rx.borrow().clone()
    }

    /// Latest-value receiver; views published in quick succession collapse
    /// into the last one.
    pub fn changes(&self) -> watch::Receiver<StatusView> {
        self.view_rx.clone()
    }

    /// Every view published after this call, in order.
    pub fn transitions(&self) -> broadcast::Receiver<StatusView> {
        self.transitions_tx.subscribe()
    }

    /// Cancels all transports and stops the driver.
    pub fn shutdown(self) {
        // Drop does the work.
    }

    fn send(&self, msg: Msg) {
        if self.msg_tx.send(msg).is_err() {
            watch_warn!("status observer is no longer running");
        }
    }
}

impl Drop for StatusObserver {
    fn drop(&mut self) {
        self.shutdown.cancel();
        self.task.abort();
    }
}

/// Turns transport events into reducer messages.
struct MsgSink(mpsc::UnboundedSender<Msg>);

impl EventSink<PollEvent> for MsgSink {
    fn emit(&self, event: PollEvent) {
        let _ = self.0.send(Msg::StatusFetched {
            case_id: event.case_id,
            result: event.result,
        });
    }
}

impl EventSink<LiveEvent> for MsgSink {
    fn emit(&self, event: LiveEvent) {
        let msg = match event {
            LiveEvent::Lifecycle { case_id, event } => Msg::Channel { case_id, event },
            LiveEvent::Update(update) => Msg::LiveUpdate(update),
        };
        let _ = self.0.send(msg);
    }
}

struct Driver {
    state: ReconcilerState,
    client: Arc<dyn StatusClient>,
    session: Arc<dyn SessionProvider>,
    polling: PollingEngine,
    live: Option<LiveChannel>,
    reconnect: Option<JoinHandle<()>>,
    sink: Arc<MsgSink>,
    msg_tx: mpsc::UnboundedSender<Msg>,
    /// One-off request results, tagged with the subscription generation.
    result_tx: mpsc::UnboundedSender<(u64, Msg)>,
    generation: u64,
    /// Cancels the one-off requests of the current subscription.
    requests: CancellationToken,
    view_tx: watch::Sender<StatusView>,
    transitions_tx: broadcast::Sender<StatusView>,
    shutdown: CancellationToken,
}

impl Driver {
    async fn run(
        mut self,
        mut msg_rx: mpsc::UnboundedReceiver<Msg>,
        mut result_rx: mpsc::UnboundedReceiver<(u64, Msg)>,
    ) {
        loop {
            let msg = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                msg = msg_rx.recv() => match msg {
                    Some(msg) => msg,
                    None => break,
                },
                Some((generation, msg)) = result_rx.recv() => {
                    if generation != self.generation {
                        watch_debug!("dropping result from an earlier subscription {:?}", msg);
                        continue;
                    }
                    msg
                }
            };
            self.dispatch(msg);
        }
        watch_debug!("status observer driver stopped");
    }

    fn dispatch(&mut self, msg: Msg) {
        if matches!(msg, Msg::Subscribe(_) | Msg::Unsubscribe) {
            self.new_generation();
        }
        let state = std::mem::take(&mut self.state);
        let (mut next, effects) = update(state, msg);
        if next.consume_dirty() {
            let view = next.view();
            // No transition subscribers is fine.
            let _ = self.transitions_tx.send(view.clone());
            self.view_tx.send_replace(view);
        }
        self.state = next;
        for effect in effects {
            self.execute(effect);
        }
    }

    fn execute(&mut self, effect: Effect) {
        watch_debug!("status observer effect {:?}", effect);
        match effect {
            Effect::FetchStatus { case_id } => {
                let client = self.client.clone();
                self.request(async move {
                    let result = client.fetch_case_status(&case_id).await;
                    Msg::StatusFetched { case_id, result }
                });
            }
            Effect::ProbeLive { case_id } => {
                let client = self.client.clone();
                let has_feed = self.live.is_some();
                let has_token = self.session.access_token().is_some();
                self.request(async move {
                    let available = probe_live(client.as_ref(), &case_id, has_feed, has_token).await;
                    Msg::ProbeFinished { case_id, available }
                });
            }
            Effect::OpenChannel { case_id } => match self.live.as_mut() {
                Some(live) => live.subscribe(case_id, self.sink.clone()),
                None => {
                    let _ = self.msg_tx.send(Msg::Channel {
                        case_id,
                        event: ChannelLifecycle::ChannelError("no change feed configured".into()),
                    });
                }
            },
            Effect::CloseChannel => {
                if let Some(live) = self.live.as_mut() {
                    live.unsubscribe();
                }
            }
            Effect::ScheduleReconnect { case_id, delay } => {
                self.cancel_reconnect();
                watch_info!(
                    "live channel reconnect case={} in {}ms",
                    case_id,
                    delay.as_millis()
                );
                let msg_tx = self.msg_tx.clone();
                let shutdown = self.shutdown.clone();
                self.reconnect = Some(tokio::spawn(async move {
                    tokio::select! {
                        biased;
                        _ = shutdown.cancelled() => {}
                        _ = tokio::time::sleep(delay) => {
                            let _ = msg_tx.send(Msg::ReconnectDue { case_id });
                        }
                    }
                }));
            }
            Effect::CancelReconnect => self.cancel_reconnect(),
            Effect::StartPolling { case_id, interval } => {
                self.polling
                    .start_polling(case_id, interval, self.sink.clone());
            }
            Effect::StopPolling { case_id } => {
                self.polling.stop_polling(&case_id);
            }
            Effect::FetchUpdatesSince { case_id, since } => {
                let client = self.client.clone();
                self.request(async move {
                    let result = client.fetch_updates_since(&case_id, since).await;
                    Msg::UpdatesFetched { case_id, result }
                });
            }
        }
    }

    /// Abandons in-flight requests and ignores results already queued.
    fn new_generation(&mut self) {
        self.requests.cancel();
        self.requests = self.shutdown.child_token();
        self.generation += 1;
    }

    /// Runs a one-off request and feeds its result back as a message.
    fn request<F>(&self, fut: F)
    where
        F: Future<Output = Msg> + Send + 'static,
    {
        let result_tx = self.result_tx.clone();
        let generation = self.generation;
        let cancel = self.requests.clone();
        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {}
                msg = fut => {
                    let _ = result_tx.send((generation, msg));
                }
            }
        });
    }

    fn cancel_reconnect(&mut self) {
        if let Some(task) = self.reconnect.take() {
            task.abort();
        }
    }
}

impl Drop for Driver {
    fn drop(&mut self) {
        self.shutdown.cancel();
        self.cancel_reconnect();
    }
}

async fn probe_live(
    client: &dyn StatusClient,
    case_id: &CaseId,
    has_feed: bool,
    has_token: bool,
) -> bool {
    if !has_feed {
        watch_info!("live updates unavailable case={}: no change feed", case_id);
        return false;
    }
    if !has_token {
        watch_info!("live updates unavailable case={}: no session token", case_id);
        return false;
    }
    match client.realtime_available().await {
        Ok(true) => true,
        Ok(false) => {
            watch_info!("live updates disabled by backend case={}", case_id);
            false
        }
        Err(err) => {
            watch_warn!("live capability check failed case={}: {}", case_id, err);
            false
        }
    }
}
