use crate::highlight::WordChanged;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;

const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    WordChanged(WordChanged),
    LoopArmed { start: f64, end: f64 },
    LoopCleared,
    SeekFailed { target: f64, reason: String },
    /// The time source failed this many samples in a row.
    Degraded { consecutive_failures: u32 },
    Recovered,
}

/// Fan-out of `PlayerEvent`s to any number of subscribers.
///
/// `emit` never waits; a subscriber that falls more than the channel
/// capacity behind observes `Lagged` and skips ahead.
pub struct EventEmitter {
    tx: broadcast::Sender<PlayerEvent>,
    emit_count: AtomicU64,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            emit_count: AtomicU64::new(0),
        }
    }

    /// Returns the number of subscribers that received the event.
    pub fn emit(&self, event: PlayerEvent) -> usize {
        self.emit_count.fetch_add(1, Ordering::Relaxed);
        self.tx.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn emit_count(&self) -> u64 {
        self.emit_count.load(Ordering::Relaxed)
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new()
    }
}
