use super::{AudioSource, PlaybackEvent};
use crate::error::{PlayerError, Result};
use async_trait::async_trait;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::time::Instant;
use tracing::debug;

const EVENT_CAPACITY: usize = 64;

struct ClockState {
    /// Position at `anchor`, or the resting position while paused.
    base: f64,
    anchor: Option<Instant>,
    speed: f64,
    loop_bounds: Option<(f64, f64)>,
    failing_reads: u32,
}

/// An in-process audio source driven by the tokio clock.
///
/// Stands in for a real media element: it advances while playing, honours
/// loop bounds, emits the usual notifications, and can be told to misbehave
/// (slow seeks, seeks that land off target, failed reads). Under a paused
/// tokio runtime it is fully deterministic.
pub struct SimulatedSource {
    duration: f64,
    seek_latency: Duration,
    seek_drift: f64,
    state: Mutex<ClockState>,
    ready: watch::Sender<bool>,
    events: broadcast::Sender<PlaybackEvent>,
}

impl SimulatedSource {
    pub fn new(duration: f64) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (ready, _) = watch::channel(true);
        Self {
            duration: duration.max(0.0),
            seek_latency: Duration::ZERO,
            seek_drift: 0.0,
            state: Mutex::new(ClockState {
                base: 0.0,
                anchor: None,
                speed: 1.0,
                loop_bounds: None,
                failing_reads: 0,
            }),
            ready,
            events,
        }
    }

    pub fn with_speed(self, speed: f64) -> Self {
        self.lock().speed = if speed.is_finite() && speed > 0.0 { speed } else { 1.0 };
        self
    }

    pub fn with_seek_latency(mut self, latency: Duration) -> Self {
        self.seek_latency = latency;
        self
    }

    /// Seeks land this far from the requested target.
    pub fn with_seek_drift(mut self, drift: f64) -> Self {
        self.seek_drift = drift;
        self
    }

    pub fn with_ready(self, ready: bool) -> Self {
        self.ready.send_replace(ready);
        self
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.send_replace(ready);
    }

    /// Make the next `count` position reads fail.
    pub fn fail_next_reads(&self, count: u32) {
        self.lock().failing_reads = count;
    }

    pub fn loop_bounds(&self) -> Option<(f64, f64)> {
        self.lock().loop_bounds
    }

    fn lock(&self) -> MutexGuard<'_, ClockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: PlaybackEvent) {
        let _ = self.events.send(event);
    }

    /// Bring the clock up to date, applying loop wrap and end of media.
    fn settle(&self, state: &mut ClockState) -> f64 {
        let Some(anchor) = state.anchor else {
            return state.base;
        };

        let now = Instant::now();
        let mut position = state.base + now.duration_since(anchor).as_secs_f64() * state.speed;

        // Only advancing across `end` wraps. A seek that lands past the end
        // leaves `base` there and plays on until the loop is re-armed.
        if let Some((start, end)) = state.loop_bounds {
            if state.base < end && position >= end {
                let span = end - start;
                position = if span > 0.0 {
                    start + (position - end) % span
                } else {
                    start
                };
                state.base = position;
                state.anchor = Some(now);
                self.emit(PlaybackEvent::Seeked { time: position });
                return position;
            }
        }

        if position >= self.duration {
            state.base = self.duration;
            state.anchor = None;
            self.emit(PlaybackEvent::Ended);
            return self.duration;
        }

        position
    }

    /// Restart the clock from `position` so later wraps are judged from here.
    fn rebase(state: &mut ClockState, position: f64) {
        state.base = position;
        if state.anchor.is_some() {
            state.anchor = Some(Instant::now());
        }
    }
}

#[async_trait]
impl AudioSource for SimulatedSource {
    fn current_time(&self) -> Result<f64> {
        let mut state = self.lock();
        if state.failing_reads > 0 {
            state.failing_reads -= 1;
            return Err(PlayerError::SourceUnavailable(
                "position read failed".to_string(),
            ));
        }
        Ok(self.settle(&mut state))
    }

    fn duration(&self) -> f64 {
        self.duration
    }

    fn is_playing(&self) -> bool {
        let mut state = self.lock();
        self.settle(&mut state);
        state.anchor.is_some()
    }

    fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    async fn wait_ready(&self) {
        let mut ready = self.ready.subscribe();
        let _ = ready.wait_for(|ready| *ready).await;
    }

    fn play(&self) -> Result<()> {
        if !self.is_ready() {
            return Err(PlayerError::SourceUnavailable("media not ready".to_string()));
        }

        let mut state = self.lock();
        self.settle(&mut state);
        if state.anchor.is_some() {
            return Ok(());
        }
        if state.base >= self.duration {
            state.base = 0.0;
        }
        state.anchor = Some(Instant::now());
        drop(state);

        self.emit(PlaybackEvent::Play);
        Ok(())
    }

    fn pause(&self) {
        let mut state = self.lock();
        let position = self.settle(&mut state);
        if state.anchor.take().is_none() {
            return;
        }
        state.base = position;
        drop(state);

        self.emit(PlaybackEvent::Pause);
    }

    async fn seek(&self, time: f64) -> Result<()> {
        if !time.is_finite() {
            return Err(PlayerError::SourceUnavailable(format!(
                "invalid seek target {}",
                time
            )));
        }

        self.wait_ready().await;
        if !self.seek_latency.is_zero() {
            tokio::time::sleep(self.seek_latency).await;
        }

        let landed = (time + self.seek_drift).clamp(0.0, self.duration);
        Self::rebase(&mut self.lock(), landed);
        debug!("Simulated seek to {:.3}s landed at {:.3}s", time, landed);

        self.emit(PlaybackEvent::Seeked { time: landed });
        Ok(())
    }

    fn set_loop_bounds(&self, start: f64, end: f64) {
        let mut state = self.lock();
        let position = self.settle(&mut state);
        Self::rebase(&mut state, position);
        state.loop_bounds = Some((start, end));
    }

    fn clear_loop(&self) {
        let mut state = self.lock();
        self.settle(&mut state);
        state.loop_bounds = None;
    }

    fn playback_rate(&self) -> f64 {
        self.lock().speed
    }

    fn set_playback_rate(&self, rate: f64) -> Result<()> {
        if !rate.is_finite() || rate <= 0.0 {
            return Err(PlayerError::InvalidRate(rate));
        }

        let mut state = self.lock();
        let position = self.settle(&mut state);
        Self::rebase(&mut state, position);
        state.speed = rate;
        debug!("Simulated playback rate set to {}x at {:.3}s", rate, position);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<PlaybackEvent> {
        self.events.subscribe()
    }
}
