use crate::config::{SchedulerConfig, TickMode};
use std::time::Duration;
use tokio::time::{interval, Instant, Interval, MissedTickBehavior};

/// Periodic wake-up source for the scheduler.
///
/// In frame mode the underlying interval runs at the frame rate and wake-ups
/// are throttled to the target tick interval, the way an animation-frame
/// callback would be. Cancel-safe: dropping a pending `tick()` loses nothing.
pub struct Ticker {
    mode: TickMode,
    interval: Interval,
    target: Duration,
    frame: Duration,
    last_fire: Option<Instant>,
}

impl Ticker {
    pub fn new(config: &SchedulerConfig) -> Self {
        let period = match config.tick_mode {
            TickMode::Timer => config.tick_interval(),
            TickMode::Frame => config.frame_interval(),
        };
        let mut interval = interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        Self {
            mode: config.tick_mode,
            interval,
            target: config.tick_interval(),
            frame: config.frame_interval(),
            last_fire: None,
        }
    }

    pub fn mode(&self) -> TickMode {
        self.mode
    }

    pub async fn tick(&mut self) -> Instant {
        loop {
            let now = self.interval.tick().await;
            match self.mode {
                TickMode::Timer => return now,
                TickMode::Frame => {
                    // Half a frame of slack, so a 33ms target fires on every second 16ms frame.
                    let min_gap = self.target.saturating_sub(self.frame / 2);
                    let due = match self.last_fire {
                        Some(last) => now.saturating_duration_since(last) >= min_gap,
                        None => true,
                    };
                    if due {
                        self.last_fire = Some(now);
                        return now;
                    }
                }
            }
        }
    }

    /// Restart the period from now, after an out-of-band sample.
    pub fn reset(&mut self) {
        self.interval.reset();
        self.last_fire = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(mode: TickMode) -> SchedulerConfig {
        SchedulerConfig {
            tick_mode: mode,
            tick_interval_ms: 33,
            frame_interval_ms: 16,
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn timer_ticks_at_target_interval() {
        let mut ticker = Ticker::new(&config(TickMode::Timer));

        let first = ticker.tick().await;
        let second = ticker.tick().await;

        assert_eq!(second - first, Duration::from_millis(33));
    }

    #[tokio::test(start_paused = true)]
    async fn frame_ticks_are_throttled() {
        let mut ticker = Ticker::new(&config(TickMode::Frame));

        let first = ticker.tick().await;
        let second = ticker.tick().await;
        let third = ticker.tick().await;

        // Frames arrive every 16ms; only every other one is let through.
        assert_eq!(second - first, Duration::from_millis(32));
        assert_eq!(third - second, Duration::from_millis(32));
    }

    #[tokio::test(start_paused = true)]
    async fn reset_delays_next_tick() {
        let mut ticker = Ticker::new(&config(TickMode::Timer));
        ticker.tick().await;

        tokio::time::advance(Duration::from_millis(20)).await;
        let reset_at = Instant::now();
        ticker.reset();

        let next = ticker.tick().await;
        assert_eq!(next - reset_at, Duration::from_millis(33));
    }
}
