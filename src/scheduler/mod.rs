pub mod monitor;
pub mod ticker;

pub use monitor::{SampleRecord, TickMonitor, TickStats};
pub use ticker::Ticker;

use crate::config::SchedulerConfig;
use crate::error::{PlayerError, Result};
use crate::highlight::WordChanged;
use crate::index::WordIndex;
use crate::transcript::Word;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Why a sample is being taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleKind {
    /// Periodic tick; ignored while paused.
    Tick,
    /// First sample after playback resumes.
    Resume,
    /// Out-of-band sample after a seek.
    Seek,
}

#[derive(Debug)]
pub enum TickOutcome {
    /// Playback is paused; nothing was read.
    Idle,
    /// Time has not moved enough since the previous sample.
    Skipped,
    Unchanged { time: f64 },
    Changed(WordChanged),
    /// The reading was unusable; the tick was dropped.
    Failed { error: PlayerError, consecutive: u32 },
}

/// Turns time readings into `WordChanged` transitions.
///
/// The scheduler owns the word index and remembers the last reported word,
/// so downstream work scales with the number of transitions rather than the
/// number of ticks.
pub struct TimingScheduler {
    config: SchedulerConfig,
    index: WordIndex,
    playing: bool,
    current: Option<usize>,
    last_time: Option<f64>,
    failures: u32,
    monitor: Option<TickMonitor>,
}

impl TimingScheduler {
    pub fn new(index: WordIndex, config: SchedulerConfig) -> Self {
        Self {
            config,
            index,
            playing: false,
            current: None,
            last_time: None,
            failures: 0,
            monitor: None,
        }
    }

    /// Attach a tick monitor; it is started here and stopped by its owner.
    pub fn with_monitor(mut self, mut monitor: TickMonitor) -> Self {
        monitor.start();
        self.monitor = Some(monitor);
        self
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn index(&self) -> &WordIndex {
        &self.index
    }

    /// Swap in a freshly built index.
    ///
    /// Returns a change to none when a word was highlighted, so consumers
    /// can clear state that refers to the old transcript.
    pub fn replace_index(&mut self, index: WordIndex) -> Option<WordChanged> {
        self.index = index;
        self.last_time = None;
        let previous = self.current.take()?;
        Some(WordChanged {
            previous_index: Some(previous),
            current_index: None,
            word: None,
            time: 0.0,
        })
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn set_playing(&mut self, playing: bool) {
        if self.playing && !playing {
            self.index.clear_recent();
        }
        self.playing = playing;
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    pub fn current_word(&self) -> Option<&Word> {
        self.current.and_then(|i| self.index.word(i))
    }

    pub fn last_time(&self) -> Option<f64> {
        self.last_time
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.failures
    }

    pub fn is_degraded(&self) -> bool {
        self.failures >= self.config.degraded_after
    }

    pub fn monitor(&self) -> Option<&TickMonitor> {
        self.monitor.as_ref()
    }

    pub fn take_monitor(&mut self) -> Option<TickMonitor> {
        self.monitor.take()
    }

    /// Take one sample of the playback position.
    pub fn sample(&mut self, reading: Result<f64>, kind: SampleKind) -> TickOutcome {
        if kind == SampleKind::Tick && !self.playing {
            return TickOutcome::Idle;
        }

        let started = Instant::now();
        let outcome = self.resolve(reading, kind);

        if let Some(monitor) = self.monitor.as_mut() {
            let record = match &outcome {
                TickOutcome::Changed(_) => SampleRecord::Changed,
                TickOutcome::Unchanged { .. } => SampleRecord::Unchanged,
                TickOutcome::Failed { .. } => SampleRecord::Failed,
                TickOutcome::Skipped | TickOutcome::Idle => SampleRecord::Skipped,
            };
            monitor.record(record, started.elapsed());
        }

        outcome
    }

    fn resolve(&mut self, reading: Result<f64>, kind: SampleKind) -> TickOutcome {
        let time = match checked_time(reading) {
            Ok(time) => time,
            Err(error) => {
                self.failures = self.failures.saturating_add(1);
                if self.failures == self.config.degraded_after {
                    warn!(
                        "Time source failed {} samples in a row, highlighting degraded: {}",
                        self.failures, error
                    );
                } else {
                    debug!("Dropping tick ({} consecutive failures): {}", self.failures, error);
                }
                return TickOutcome::Failed {
                    error,
                    consecutive: self.failures,
                };
            }
        };

        if self.is_degraded() {
            info!("Time source recovered after {} failed samples", self.failures);
        }
        self.failures = 0;

        let mut forced = kind != SampleKind::Tick;
        if let Some(previous) = self.last_time {
            if !forced && time < previous - self.config.rewind_epsilon {
                debug!("Rewind {:.3}s -> {:.3}s treated as seek", previous, time);
                forced = true;
            }
            if !forced && (time - previous).abs() < self.config.min_time_delta {
                return TickOutcome::Skipped;
            }
        }
        self.last_time = Some(time);

        let word = self.index.query(time).cloned();
        let current_index = word.as_ref().map(|w| w.index);

        if current_index == self.current {
            return TickOutcome::Unchanged { time };
        }

        let change = WordChanged {
            previous_index: self.current,
            current_index,
            word,
            time,
        };
        self.current = current_index;
        TickOutcome::Changed(change)
    }
}

fn checked_time(reading: Result<f64>) -> Result<f64> {
    let time = reading?;
    if !time.is_finite() || time < 0.0 {
        return Err(PlayerError::SourceUnavailable(format!(
            "unusable time reading {}",
            time
        )));
    }
    Ok(time)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndexConfig;

    fn scheduler() -> TimingScheduler {
        let words = vec![
            Word::new("Hello", 0.0, 0.4, 0),
            Word::new("there", 0.5, 0.9, 1),
            Word::new("friend", 1.5, 2.0, 2),
        ];
        let index = WordIndex::from_words(words, IndexConfig::default()).unwrap();
        let mut scheduler = TimingScheduler::new(index, SchedulerConfig::default());
        scheduler.set_playing(true);
        scheduler
    }

    fn changed_to(outcome: &TickOutcome) -> Option<Option<&str>> {
        match outcome {
            TickOutcome::Changed(change) => Some(change.word.as_ref().map(|w| w.text.as_str())),
            _ => None,
        }
    }

    #[test]
    fn test_emits_only_on_transitions() {
        let mut scheduler = scheduler();

        let first = scheduler.sample(Ok(0.1), SampleKind::Tick);
        assert_eq!(changed_to(&first), Some(Some("Hello")));

        let same = scheduler.sample(Ok(0.2), SampleKind::Tick);
        assert!(matches!(same, TickOutcome::Unchanged { .. }));

        let next = scheduler.sample(Ok(0.6), SampleKind::Tick);
        match next {
            TickOutcome::Changed(change) => {
                assert_eq!(change.previous_index, Some(0));
                assert_eq!(change.current_index, Some(1));
                assert_eq!(change.time, 0.6);
            }
            other => panic!("expected change, got {:?}", other),
        }
    }

    #[test]
    fn test_silence_reports_none_once() {
        let mut scheduler = scheduler();
        scheduler.sample(Ok(0.6), SampleKind::Tick);

        let gap = scheduler.sample(Ok(1.2), SampleKind::Tick);
        assert_eq!(changed_to(&gap), Some(None));

        let still_gap = scheduler.sample(Ok(1.25), SampleKind::Tick);
        assert!(matches!(still_gap, TickOutcome::Unchanged { .. }));
    }

    #[test]
    fn test_idle_while_paused() {
        let mut scheduler = scheduler();
        scheduler.set_playing(false);

        assert!(matches!(
            scheduler.sample(Ok(0.1), SampleKind::Tick),
            TickOutcome::Idle
        ));
        assert_eq!(scheduler.last_time(), None);
    }

    #[test]
    fn test_seek_resolves_while_paused() {
        let mut scheduler = scheduler();
        scheduler.set_playing(false);

        let outcome = scheduler.sample(Ok(1.7), SampleKind::Seek);
        assert_eq!(changed_to(&outcome), Some(Some("friend")));
        assert_eq!(scheduler.current_word().unwrap().text, "friend");
    }

    #[test]
    fn test_tiny_advance_is_skipped() {
        let mut scheduler = scheduler();
        scheduler.sample(Ok(0.1), SampleKind::Tick);

        assert!(matches!(
            scheduler.sample(Ok(0.1005), SampleKind::Tick),
            TickOutcome::Skipped
        ));
        assert!(matches!(
            scheduler.sample(Ok(0.1005), SampleKind::Seek),
            TickOutcome::Unchanged { .. }
        ));
    }

    #[test]
    fn test_rewind_is_handled_like_seek() {
        let mut scheduler = scheduler();
        scheduler.sample(Ok(1.7), SampleKind::Tick);

        let outcome = scheduler.sample(Ok(0.1), SampleKind::Tick);
        assert_eq!(changed_to(&outcome), Some(Some("Hello")));
        assert_eq!(scheduler.last_time(), Some(0.1));
    }

    #[test]
    fn test_failures_degrade_then_recover() {
        let mut scheduler = scheduler();
        let limit = scheduler.config().degraded_after;

        for n in 1..=limit {
            let outcome = scheduler.sample(
                Err(PlayerError::SourceUnavailable("detached".to_string())),
                SampleKind::Tick,
            );
            match outcome {
                TickOutcome::Failed { consecutive, .. } => assert_eq!(consecutive, n),
                other => panic!("expected failure, got {:?}", other),
            }
        }
        assert!(scheduler.is_degraded());

        let outcome = scheduler.sample(Ok(0.1), SampleKind::Tick);
        assert_eq!(changed_to(&outcome), Some(Some("Hello")));
        assert!(!scheduler.is_degraded());
        assert_eq!(scheduler.consecutive_failures(), 0);
    }

    #[test]
    fn test_non_finite_and_negative_readings_fail() {
        let mut scheduler = scheduler();

        for bad in [f64::NAN, f64::INFINITY, -0.5] {
            assert!(matches!(
                scheduler.sample(Ok(bad), SampleKind::Tick),
                TickOutcome::Failed {
                    error: PlayerError::SourceUnavailable(_),
                    ..
                }
            ));
        }
        assert_eq!(scheduler.current_index(), None);
    }

    #[test]
    fn test_replace_index_clears_current() {
        let mut scheduler = scheduler();
        scheduler.sample(Ok(0.1), SampleKind::Tick);

        let cleared = scheduler
            .replace_index(WordIndex::new(IndexConfig::default()))
            .unwrap();

        assert_eq!(cleared.previous_index, Some(0));
        assert_eq!(cleared.current_index, None);
        assert_eq!(scheduler.current_index(), None);
        assert!(scheduler.replace_index(WordIndex::new(IndexConfig::default())).is_none());
    }

    #[test]
    fn test_monitor_records_samples() {
        let mut scheduler = scheduler().with_monitor(TickMonitor::new());

        scheduler.sample(Ok(0.1), SampleKind::Tick);
        scheduler.sample(Ok(0.2), SampleKind::Tick);
        scheduler.sample(Ok(0.6), SampleKind::Tick);

        let stats = scheduler.take_monitor().unwrap().stop();
        assert_eq!(stats.samples, 3);
        assert_eq!(stats.changes, 2);
    }
}
