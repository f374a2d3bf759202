//! Channel notifications
//!
//! Workers publish [`ChannelEvent`]s without blocking; when the bus is full
//! the event is dropped. Every subscriber drains the same queue, so use one
//! receiver per consumer loop.

use crossbeam::channel::{bounded, Receiver, Sender, TrySendError};

/// Default bus capacity
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Playback notifications from channel workers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelEvent {
    /// The ring was pre-filled and the voice started
    Started { channel: i32 },
    /// The stream ran out, the loop budget is spent and the queue has drained
    Completed { channel: i32 },
}

impl ChannelEvent {
    pub fn channel(&self) -> i32 {
        match *self {
            ChannelEvent::Started { channel } | ChannelEvent::Completed { channel } => channel,
        }
    }
}

/// Event bus shared by every channel of a pool
pub struct EventBus {
    sender: Sender<ChannelEvent>,
    receiver: Receiver<ChannelEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity.max(1));
        Self { sender, receiver }
    }

    /// Handle for publishing from worker threads
    pub fn publisher(&self) -> EventPublisher {
        EventPublisher {
            sender: self.sender.clone(),
        }
    }

    /// Receiver for consuming events
    pub fn subscribe(&self) -> Receiver<ChannelEvent> {
        self.receiver.clone()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

/// Non-blocking publishing end of an [`EventBus`]
#[derive(Clone)]
pub struct EventPublisher {
    sender: Sender<ChannelEvent>,
}

impl EventPublisher {
    /// Publish without blocking; returns false if the event was dropped
    pub fn publish(&self, event: ChannelEvent) -> bool {
        match self.sender.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                log::trace!("Event bus full, dropping {:?}", event);
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}
