use std::collections::VecDeque;
use std::time::{Duration, Instant};

const DEFAULT_WINDOW: usize = 512;

/// How a single scheduler sample ended, for accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleRecord {
    Changed,
    Unchanged,
    Skipped,
    Failed,
}

/// Snapshot of the tick monitor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickStats {
    pub samples: u64,
    pub changes: u64,
    pub skipped: u64,
    pub failures: u64,
    pub mean_latency: Duration,
    pub p75_latency: Duration,
    pub max_latency: Duration,
    pub running_for: Duration,
}

/// Records how long each scheduler sample took to resolve.
///
/// Purely observational. Nothing is recorded unless the monitor has been
/// started, and the latency window is bounded.
#[derive(Debug)]
pub struct TickMonitor {
    started_at: Option<Instant>,
    stopped_after: Duration,
    window: usize,
    latencies: VecDeque<Duration>,
    samples: u64,
    changes: u64,
    skipped: u64,
    failures: u64,
}

impl TickMonitor {
    pub fn new() -> Self {
        Self::with_window(DEFAULT_WINDOW)
    }

    pub fn with_window(window: usize) -> Self {
        Self {
            started_at: None,
            stopped_after: Duration::ZERO,
            window: window.max(1),
            latencies: VecDeque::new(),
            samples: 0,
            changes: 0,
            skipped: 0,
            failures: 0,
        }
    }

    pub fn start(&mut self) {
        if self.started_at.is_none() {
            self.started_at = Some(Instant::now());
        }
    }

    /// Stop recording and return the final statistics.
    pub fn stop(&mut self) -> TickStats {
        if let Some(started) = self.started_at.take() {
            self.stopped_after += started.elapsed();
        }
        self.stats()
    }

    pub fn is_running(&self) -> bool {
        self.started_at.is_some()
    }

    pub fn record(&mut self, record: SampleRecord, latency: Duration) {
        if !self.is_running() {
            return;
        }

        self.samples += 1;
        match record {
            SampleRecord::Changed => self.changes += 1,
            SampleRecord::Skipped => self.skipped += 1,
            SampleRecord::Failed => self.failures += 1,
            SampleRecord::Unchanged => {}
        }

        self.latencies.push_back(latency);
        while self.latencies.len() > self.window {
            self.latencies.pop_front();
        }
    }

    pub fn stats(&self) -> TickStats {
        let running_for = self.stopped_after
            + self
                .started_at
                .map(|started| started.elapsed())
                .unwrap_or_default();

        if self.latencies.is_empty() {
            return TickStats {
                samples: self.samples,
                changes: self.changes,
                skipped: self.skipped,
                failures: self.failures,
                running_for,
                ..Default::default()
            };
        }

        let mut sorted: Vec<Duration> = self.latencies.iter().copied().collect();
        sorted.sort();

        let total: Duration = sorted.iter().sum();
        let p75_index = ((sorted.len() as f64 * 0.75) as usize).min(sorted.len() - 1);

        TickStats {
            samples: self.samples,
            changes: self.changes,
            skipped: self.skipped,
            failures: self.failures,
            mean_latency: total / sorted.len() as u32,
            p75_latency: sorted[p75_index],
            max_latency: sorted[sorted.len() - 1],
            running_for,
        }
    }
}

impl Default for TickMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_ignores_records_until_started() {
        let mut monitor = TickMonitor::new();
        monitor.record(SampleRecord::Changed, ms(1));

        assert_eq!(monitor.stats().samples, 0);
    }

    #[test]
    fn test_counts_and_latency_summary() {
        let mut monitor = TickMonitor::new();
        monitor.start();

        monitor.record(SampleRecord::Changed, ms(1));
        monitor.record(SampleRecord::Unchanged, ms(2));
        monitor.record(SampleRecord::Skipped, ms(3));
        monitor.record(SampleRecord::Failed, ms(10));

        let stats = monitor.stop();
        assert_eq!(stats.samples, 4);
        assert_eq!(stats.changes, 1);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.failures, 1);
        assert_eq!(stats.mean_latency, ms(4));
        assert_eq!(stats.p75_latency, ms(10));
        assert_eq!(stats.max_latency, ms(10));
        assert!(!monitor.is_running());
    }

    #[test]
    fn test_window_is_bounded() {
        let mut monitor = TickMonitor::with_window(2);
        monitor.start();

        monitor.record(SampleRecord::Unchanged, ms(100));
        monitor.record(SampleRecord::Unchanged, ms(1));
        monitor.record(SampleRecord::Unchanged, ms(1));

        let stats = monitor.stats();
        assert_eq!(stats.samples, 3);
        assert_eq!(stats.max_latency, ms(1));
    }

    #[test]
    fn test_stopped_monitor_stops_recording() {
        let mut monitor = TickMonitor::new();
        monitor.start();
        monitor.record(SampleRecord::Changed, ms(1));
        monitor.stop();
        monitor.record(SampleRecord::Changed, ms(1));

        assert_eq!(monitor.stats().samples, 1);
    }
}
