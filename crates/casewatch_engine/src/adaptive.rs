use std::sync::Arc;

use casewatch_core::AdaptiveInterval;
use casewatch_logging::{watch_debug, watch_warn};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{EventSink, StatusClient, WidgetEvent};

/// Polls a widget endpoint, slowing down while its payload stays identical.
pub struct AdaptivePoller {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl AdaptivePoller {
    pub fn spawn(
        client: Arc<dyn StatusClient>,
        path: impl Into<String>,
        interval: AdaptiveInterval,
        sink: Arc<dyn EventSink<WidgetEvent>>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(adaptive_loop(
            client,
            path.into(),
            interval,
            sink,
            cancel.clone(),
        ));
        Self { cancel, task }
    }

    pub fn stop(&self) {
        self.cancel.cancel();
        self.task.abort();
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for AdaptivePoller {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn adaptive_loop(
    client: Arc<dyn StatusClient>,
    path: String,
    mut interval: AdaptiveInterval,
    sink: Arc<dyn EventSink<WidgetEvent>>,
    cancel: CancellationToken,
) {
    loop {
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            result = client.fetch_raw(&path) => result,
        };

        match result {
            Ok(payload) => {
                if interval.observe(&payload) {
                    sink.emit(WidgetEvent {
                        path: path.clone(),
                        result: Ok(payload),
                        next_poll: interval.current(),
                    });
                } else {
                    watch_debug!(
                        "widget {} unchanged, next poll in {}ms",
                        path,
                        interval.current().as_millis()
                    );
                }
            }
            Err(err) => {
                interval.observe_error();
                watch_warn!("widget {} fetch failed: {}", path, err);
                sink.emit(WidgetEvent {
                    path: path.clone(),
                    result: Err(err),
                    next_poll: interval.current(),
                });
            }
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(interval.current()) => {}
        }
    }
}
