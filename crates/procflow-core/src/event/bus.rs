//! Fan-out of `RunEvent`s from the engine to observers.
//!
//! Publishing never waits: with no subscribers the event is dropped, and a
//! slow subscriber loses the oldest events rather than stalling a run.

use procflow_types::event::RunEvent;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<RunEvent>,
}

impl EventBus {
    /// `capacity` events are buffered per subscriber before it starts lagging.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: RunEvent) {
        // Err only means nobody is listening.
        let _ = self.sender.send(event);
    }

    /// Log every subsequent event through `tracing` until the bus closes.
    pub fn spawn_event_log(&self) -> JoinHandle<()> {
        let mut events = self.subscribe();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => tracing::info!(
                        run_id = %event.run_id(),
                        kind = event.kind(),
                        detail = ?event,
                        "run event"
                    ),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "run event log fell behind");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.sender.receiver_count())
            .finish()
    }
}
