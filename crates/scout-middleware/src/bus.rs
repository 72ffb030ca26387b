//! Headless publish/subscribe event bus.
//!
//! Uses a [`tokio::sync::broadcast`] channel under the hood so every
//! subscriber receives every event without any single subscriber blocking
//! the publisher.  Slow subscribers lose the oldest events once the buffer
//! fills; the exploration loop never waits on them.

use scout_types::Event;
use tokio::sync::broadcast;
use tracing::trace;

/// Default channel capacity (number of buffered events before old ones are
/// dropped for slow subscribers).
const DEFAULT_CAPACITY: usize = 256;

/// Shared event bus.  Clone it cheaply – all clones share the same
/// underlying channel.
#[derive(Clone, Debug)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish `event` to every current subscriber.
    ///
    /// Returns the number of receivers handed the event.  Zero subscribers
    /// is a normal condition and yields `0`.
    pub fn publish(&self, event: Event) -> usize {
        match self.sender.send(event) {
            Ok(n) => n,
            Err(broadcast::error::SendError(dropped)) => {
                trace!(source = %dropped.source, "event published with no subscribers");
                0
            }
        }
    }

    /// Subscribe to all events published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Number of live subscribers.  Publishers use this to skip building
    /// expensive payloads nobody will read.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
