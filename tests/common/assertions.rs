//! Event collection helpers

use std::time::Duration;
use tokio::sync::broadcast;
use warc_worker::{Event, ItemState, Stage};

/// Every event buffered in `rx`
pub fn drain_events(rx: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// States reported for `item`, in order
pub fn states_of(events: &[Event], item: &str) -> Vec<ItemState> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::StateChanged { item: name, state } if name == item => Some(state.clone()),
            _ => None,
        })
        .collect()
}

/// Stage and error code of the first failure reported for `item`
pub fn failure_of(events: &[Event], item: &str) -> Option<(Stage, String)> {
    events.iter().find_map(|e| match e {
        Event::ItemFailed {
            item: name,
            stage,
            code,
            ..
        } if name == item => Some((*stage, code.clone())),
        _ => None,
    })
}

/// Wait for the first event matching `pred`
pub async fn wait_for_event<F>(
    rx: &mut broadcast::Receiver<Event>,
    timeout: Duration,
    mut pred: F,
) -> Option<Event>
where
    F: FnMut(&Event) -> bool,
{
    tokio::time::timeout(timeout, async {
        loop {
            match rx.recv().await {
                Ok(event) if pred(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    })
    .await
    .ok()
    .flatten()
}
