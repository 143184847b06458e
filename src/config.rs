use crate::error::{PlayerError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// How the scheduler is woken up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TickMode {
    /// Fixed-interval timer at the target tick interval.
    #[default]
    Timer,
    /// Display-rate frame callbacks, throttled to the target tick interval.
    Frame,
}

impl std::fmt::Display for TickMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TickMode::Timer => write!(f, "timer"),
            TickMode::Frame => write!(f, "frame"),
        }
    }
}

impl std::str::FromStr for TickMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "timer" => Ok(TickMode::Timer),
            "frame" => Ok(TickMode::Frame),
            _ => Err(format!("Unknown tick mode: {}. Use 'timer' or 'frame'", s)),
        }
    }
}

/// Tuning for the word-timing index. All times are in seconds.
///
/// The scores are heuristics; only their ordering matters
/// (containment > proximity > common word > very short word).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Words shorter than this are short words.
    pub short_threshold: f64,
    /// Words with at most this many characters are short words.
    pub max_short_chars: usize,
    /// Width of a coarse bucket.
    pub coarse_bucket: f64,
    /// Width of a fine bucket.
    pub fine_bucket: f64,
    /// Offset of the neighbouring fine probes.
    pub fine_probe_offset: f64,
    /// Offset of the neighbouring coarse probes.
    pub coarse_probe_offset: f64,
    /// Words shorter than this get the wide expansion and the short bonus.
    pub very_short_duration: f64,
    pub wide_expansion: f64,
    pub narrow_expansion: f64,
    pub containment_score: f64,
    pub proximity_weight: f64,
    pub common_bonus: f64,
    pub very_short_bonus: f64,
    /// A fine-index candidate must score strictly above this.
    pub min_confidence: f64,
    pub short_tolerance: f64,
    pub normal_tolerance: f64,
    /// Nearest-neighbour fallback reach.
    pub nearest_fallback: f64,
    /// Longest word a transcript may contain, in seconds.
    pub max_word_duration: f64,
    pub cache_capacity: usize,
    /// Rounding step of the recent-lookup cache key.
    pub cache_resolution: f64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            short_threshold: 0.2,
            max_short_chars: 2,
            coarse_bucket: 0.1,
            fine_bucket: 0.002,
            fine_probe_offset: 0.002,
            coarse_probe_offset: 0.005,
            very_short_duration: 0.1,
            wide_expansion: 0.1,
            narrow_expansion: 0.05,
            containment_score: 100.0,
            proximity_weight: 50.0,
            common_bonus: 30.0,
            very_short_bonus: 20.0,
            min_confidence: 50.0,
            short_tolerance: 0.1,
            normal_tolerance: 0.05,
            nearest_fallback: 0.2,
            max_word_duration: 30.0,
            cache_capacity: 10,
            cache_resolution: 0.01,
        }
    }
}

/// Cadence and failure handling of the timing scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub tick_mode: TickMode,
    /// Target interval between samples (milliseconds).
    pub tick_interval_ms: u64,
    /// Frame callback interval used by `TickMode::Frame` (milliseconds).
    pub frame_interval_ms: u64,
    /// Ordinary samples closer than this to the previous one are skipped.
    pub min_time_delta: f64,
    /// A backwards jump larger than this is handled like a seek.
    pub rewind_epsilon: f64,
    /// Consecutive failed samples before the degraded notice.
    pub degraded_after: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_mode: TickMode::default(),
            tick_interval_ms: 33,
            frame_interval_ms: 16,
            min_time_delta: 0.001,
            rewind_epsilon: 0.25,
            degraded_after: 5,
        }
    }
}

impl SchedulerConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }
}

/// Bounds on waiting for the audio source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    pub seek_timeout_ms: u64,
    pub ready_timeout_ms: u64,
    /// A seek is confirmed once the source reports a time this close to the target.
    pub seek_tolerance: f64,
    /// Poll interval while waiting for seek confirmation (milliseconds).
    pub seek_poll_ms: u64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            seek_timeout_ms: 3000,
            ready_timeout_ms: 5000,
            seek_tolerance: 0.05,
            seek_poll_ms: 100,
        }
    }
}

impl PlaybackConfig {
    pub fn seek_timeout(&self) -> Duration {
        Duration::from_millis(self.seek_timeout_ms)
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }

    pub fn seek_poll(&self) -> Duration {
        Duration::from_millis(self.seek_poll_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub index: IndexConfig,
    pub scheduler: SchedulerConfig,
    pub playback: PlaybackConfig,
    pub vocabulary_path: Option<PathBuf>,
}

impl Config {
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        // Load from config file if it exists
        if let Some(config_path) = Self::config_file_path() {
            if config_path.exists() {
                let contents = std::fs::read_to_string(&config_path)?;
                config = Self::from_toml(&contents)?;
            }
        }

        config.apply_env();
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str::<Config>(contents)?)
    }

    fn apply_env(&mut self) {
        if let Ok(mode) = std::env::var("LINGUASPACE_TICK_MODE") {
            if let Ok(m) = mode.parse() {
                self.scheduler.tick_mode = m;
            }
        }
        if let Ok(interval) = std::env::var("LINGUASPACE_TICK_INTERVAL_MS") {
            if let Ok(ms) = interval.parse() {
                self.scheduler.tick_interval_ms = ms;
            }
        }
        if let Ok(timeout) = std::env::var("LINGUASPACE_SEEK_TIMEOUT_MS") {
            if let Ok(ms) = timeout.parse() {
                self.playback.seek_timeout_ms = ms;
            }
        }
        if let Ok(path) = std::env::var("LINGUASPACE_VOCAB_PATH") {
            self.vocabulary_path = Some(PathBuf::from(path));
        }
    }

    pub fn validate(&self) -> Result<()> {
        let interval = self.scheduler.tick_interval_ms;
        if !(16..=200).contains(&interval) {
            return Err(PlayerError::Config(format!(
                "Tick interval must be between 16 and 200ms, got {}ms",
                interval
            )));
        }

        if self.scheduler.frame_interval_ms == 0 {
            return Err(PlayerError::Config(
                "Frame interval must be greater than 0".to_string(),
            ));
        }

        if self.index.coarse_bucket <= 0.0 || self.index.fine_bucket <= 0.0 {
            return Err(PlayerError::Config(
                "Bucket widths must be greater than 0".to_string(),
            ));
        }

        let index = &self.index;
        if !(index.containment_score > index.proximity_weight
            && index.proximity_weight > index.common_bonus
            && index.common_bonus > index.very_short_bonus
            && index.very_short_bonus >= 0.0)
        {
            return Err(PlayerError::Config(
                "Index scores must rank containment > proximity > common word > very short word"
                    .to_string(),
            ));
        }

        if self.index.max_word_duration <= 0.0 {
            return Err(PlayerError::Config(
                "max_word_duration must be greater than 0".to_string(),
            ));
        }

        if self.index.cache_resolution <= 0.0 {
            return Err(PlayerError::Config(
                "Cache resolution must be greater than 0".to_string(),
            ));
        }

        if self.index.cache_capacity == 0 {
            return Err(PlayerError::Config(
                "Cache capacity must be greater than 0".to_string(),
            ));
        }

        if self.playback.seek_timeout_ms == 0 || self.playback.ready_timeout_ms == 0 {
            return Err(PlayerError::Config(
                "Playback timeouts must be greater than 0".to_string(),
            ));
        }

        if self.scheduler.degraded_after == 0 {
            return Err(PlayerError::Config(
                "degraded_after must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// Where the vocabulary lives when no explicit path is configured.
    pub fn vocabulary_path(&self) -> Option<PathBuf> {
        self.vocabulary_path.clone().or_else(|| {
            dirs::data_dir().map(|p| p.join("linguaspace").join("vocabulary.json"))
        })
    }

    fn config_file_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("linguaspace").join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_mode_parsing() {
        assert_eq!("timer".parse::<TickMode>().unwrap(), TickMode::Timer);
        assert_eq!("FRAME".parse::<TickMode>().unwrap(), TickMode::Frame);
        assert!("vsync".parse::<TickMode>().is_err());
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.scheduler.tick_mode, TickMode::Timer);
        assert_eq!(config.scheduler.tick_interval_ms, 33);
        assert_eq!(config.index.cache_capacity, 10);
        assert_eq!(config.playback.seek_tolerance, 0.05);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml(
            r#"
            [scheduler]
            tick_mode = "frame"
            tick_interval_ms = 50

            [index]
            min_confidence = 40.0
            "#,
        )
        .unwrap();

        assert_eq!(config.scheduler.tick_mode, TickMode::Frame);
        assert_eq!(config.scheduler.tick_interval_ms, 50);
        assert_eq!(config.scheduler.degraded_after, 5);
        assert_eq!(config.index.min_confidence, 40.0);
        assert_eq!(config.index.short_threshold, 0.2);
    }

    #[test]
    fn test_validate_tick_interval_bounds() {
        let mut config = Config::default();
        config.scheduler.tick_interval_ms = 5;
        assert!(config.validate().is_err());

        config.scheduler.tick_interval_ms = 67;
        assert!(config.validate().is_ok());

        config.scheduler.tick_interval_ms = 500;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_cache() {
        let mut config = Config::default();
        config.index.cache_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_score_ranking() {
        let mut config = Config::default();
        config.index.common_bonus = 20.0;
        config.index.very_short_bonus = 30.0;
        assert!(matches!(config.validate(), Err(PlayerError::Config(_))));

        let mut config = Config::default();
        config.index.proximity_weight = 150.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        assert!(Config::from_toml("scheduler = 3").is_err());
    }
}
