// Audio time source contract and sentence looping

pub mod looping;
pub mod simulated;

pub use looping::{LoopController, LoopUpdate};
pub use simulated::SimulatedSource;

use crate::error::Result;
use async_trait::async_trait;
use tokio::sync::broadcast;

/// Notifications raised by an audio source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlaybackEvent {
    Play,
    Pause,
    /// A seek completed and the position is now `time`.
    Seeked { time: f64 },
    /// Playback reached the end of the media.
    Ended,
}

/// Anything that can report a playback position and be driven by the player.
///
/// The timing core depends only on this contract. Reads are synchronous and
/// cheap; only readiness and seeking suspend.
#[async_trait]
pub trait AudioSource: Send + Sync {
    /// Current playback position in seconds.
    fn current_time(&self) -> Result<f64>;

    /// Total media length in seconds.
    fn duration(&self) -> f64;

    fn is_playing(&self) -> bool;

    /// Whether the media can be played and seeked.
    fn is_ready(&self) -> bool;

    /// Resolves once the media is ready.
    async fn wait_ready(&self);

    fn play(&self) -> Result<()>;

    fn pause(&self);

    /// Move the position to `time`. Completion does not guarantee the
    /// position has settled; callers confirm with `current_time`.
    async fn seek(&self, time: f64) -> Result<()>;

    /// Restrict playback to `[start, end]`, wrapping to `start` at `end`.
    fn set_loop_bounds(&self, start: f64, end: f64);

    fn clear_loop(&self);

    /// Current speed multiplier.
    fn playback_rate(&self) -> f64;

    /// Change speed without moving the position. Rejects non-positive rates.
    fn set_playback_rate(&self, rate: f64) -> Result<()>;

    fn subscribe(&self) -> broadcast::Receiver<PlaybackEvent>;
}

/// Loop bounds as instructed to the source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackLoop {
    pub start: f64,
    pub end: f64,
    pub active: bool,
}

impl PlaybackLoop {
    pub fn contains(&self, time: f64, epsilon: f64) -> bool {
        self.active && time >= self.start - epsilon && time <= self.end + epsilon
    }
}
