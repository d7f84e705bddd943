use crate::{ChannelLifecycle, Effect, ErrorKind, Msg, ReconcilerState, StatusError};

/// Pure update function: applies a message to state and returns any effects.
///
/// Every transport change goes through here, so an effect list never opens a
/// transport before releasing the one the previous phase held.
pub fn update(mut state: ReconcilerState, msg: Msg) -> (ReconcilerState, Vec<Effect>) {
    let effects = match msg {
        Msg::Subscribe(case_id) => state.subscribe(case_id),
        Msg::Unsubscribe => state.unsubscribe(),
        Msg::RefreshRequested => state.refresh(),
        Msg::SessionRefreshed => state.session_refreshed(),
        Msg::ProbeFinished { case_id, available } => state.probe_finished(&case_id, available),
        Msg::Channel { case_id, event } => match event {
            ChannelLifecycle::Subscribed => state.channel_subscribed(&case_id),
            ChannelLifecycle::ChannelError(message) => {
                state.channel_failed(&case_id, StatusError::new(ErrorKind::Channel, message))
            }
            ChannelLifecycle::TimedOut => state.channel_failed(
                &case_id,
                StatusError::new(ErrorKind::Channel, "live channel handshake timed out"),
            ),
        },
        Msg::ReconnectDue { case_id } => state.reconnect_due(&case_id),
        Msg::LiveUpdate(update) => state.apply_update(update),
        Msg::StatusFetched { case_id, result } => match result {
            Ok(snapshot) if snapshot.case_id == case_id => state.apply_snapshot(snapshot),
            Ok(_) => Vec::new(),
            Err(error) => state.apply_fetch_error(&case_id, error),
        },
        Msg::UpdatesFetched { case_id, result } => match result {
            Ok(mut updates) => {
                updates.retain(|update| update.case_id == case_id);
                // Unstamped rows sort first so stamped ones decide the outcome.
                updates.sort_by_key(|update| update.last_updated);
                updates
                    .into_iter()
                    .flat_map(|update| state.apply_update(update))
                    .collect()
            }
            // A 404 here only means nothing happened since the timestamp.
            Err(error) if error.kind == ErrorKind::NotFound => Vec::new(),
            Err(error) => state.apply_fetch_error(&case_id, error),
        },
        Msg::NoOp => Vec::new(),
    };

    (state, effects)
}
