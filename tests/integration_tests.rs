//! Integration tests for linguaspace
//!
//! These tests drive the index, scheduler and loop controller together the
//! way a player does, without a running session.

use linguaspace::config::{Config, IndexConfig, SchedulerConfig, TickMode};
use linguaspace::highlight::{HighlightAction, HighlightProjector, HighlightState};
use linguaspace::index::WordIndex;
use linguaspace::playback::{AudioSource, LoopController, LoopUpdate, SimulatedSource};
use linguaspace::scheduler::{SampleKind, TickOutcome, TimingScheduler};
use linguaspace::transcript::{find_sentence, Transcript, Word};
use linguaspace::PlayerError;
use rstest::rstest;
use std::sync::Arc;

const DEMO_TRANSCRIPT: &str = r#"{
  "segments": [
    {
      "words": [
        {"type": "word", "text": "Welcome", "start": 0.0, "end": 0.5},
        {"type": "spacing", "text": " "},
        {"type": "word", "text": "to", "start": 0.5, "end": 0.6},
        {"type": "spacing", "text": " "},
        {"type": "word", "text": "LinguaSpace", "start": 0.6, "end": 1.4},
        {"type": "punctuation", "text": "."},
        {"type": "spacing", "text": " "},
        {"type": "word", "text": "This", "start": 1.5, "end": 1.7},
        {"type": "spacing", "text": " "},
        {"type": "word", "text": "is", "start": 1.7, "end": 1.8},
        {"type": "spacing", "text": " "},
        {"type": "word", "text": "a", "start": 1.8, "end": 1.85},
        {"type": "spacing", "text": " "},
        {"type": "word", "text": "demo", "start": 1.85, "end": 2.3},
        {"type": "punctuation", "text": "."}
      ]
    }
  ]
}"#;

/// One sentence spanning 0-5s, followed by silence.
const COUNTING_TRANSCRIPT: &str = r#"{
  "segments": [
    {
      "words": [
        {"type": "word", "text": "One", "start": 0.0, "end": 0.8},
        {"type": "spacing", "text": " "},
        {"type": "word", "text": "two", "start": 1.0, "end": 1.8},
        {"type": "spacing", "text": " "},
        {"type": "word", "text": "three", "start": 2.0, "end": 2.8},
        {"type": "spacing", "text": " "},
        {"type": "word", "text": "four", "start": 3.0, "end": 3.8},
        {"type": "spacing", "text": " "},
        {"type": "word", "text": "five.", "start": 4.0, "end": 5.0}
      ]
    }
  ]
}"#;

fn build(json: &str) -> (Arc<Transcript>, WordIndex) {
    let transcript = Transcript::from_json(json).unwrap();
    let index = WordIndex::from_words(transcript.words().unwrap(), IndexConfig::default()).unwrap();
    (Arc::new(transcript), index)
}

// ============================================================================
// Transcript Loading Tests
// ============================================================================

mod transcript_tests {
    use super::*;

    #[test]
    fn test_demo_transcript_loads() {
        let transcript = Transcript::from_json(DEMO_TRANSCRIPT).unwrap();
        assert_eq!(transcript.word_count(), 7);

        let words = transcript.words().unwrap();
        assert_eq!(words[3].text, "This");
        assert_eq!(words[3].token_index, 7);
        assert_eq!(words[5].text, "a");
    }

    #[test]
    fn test_missing_timestamp_is_fatal() {
        let json = r#"{"segments": [{"words": [{"type": "word", "text": "oops", "start": 1.0}]}]}"#;

        assert!(matches!(
            Transcript::from_json(json),
            Err(PlayerError::InvalidTranscript(_))
        ));
    }

    #[test]
    fn test_spacing_without_timestamps_is_fine() {
        let json = r#"{"segments": [{"words": [
            {"type": "spacing", "text": " "},
            {"type": "word", "text": "ok", "start": 0.0, "end": 0.3}
        ]}]}"#;

        assert_eq!(Transcript::from_json(json).unwrap().word_count(), 1);
    }

    #[test]
    fn test_malformed_json_is_rejected() {
        assert!(matches!(
            Transcript::from_json("{\"segments\": ["),
            Err(PlayerError::InvalidTranscript(_))
        ));
    }
}

// ============================================================================
// Word Lookup Tests
// ============================================================================

mod lookup_tests {
    use super::*;

    fn short_words_index() -> WordIndex {
        let words = vec![
            Word::new("to", 0.50, 0.60, 0),
            Word::new("is", 1.50, 1.60, 1),
            Word::new("a", 1.60, 1.65, 2),
        ];
        WordIndex::from_words(words, IndexConfig::default()).unwrap()
    }

    #[rstest]
    #[case(0.55, Some("to"))]
    #[case(1.625, Some("a"))]
    #[case(5.0, None)]
    fn test_short_word_scenario(#[case] t: f64, #[case] expected: Option<&str>) {
        let mut index = short_words_index();
        assert_eq!(index.query(t).map(|w| w.text.as_str()), expected);
    }

    #[test]
    fn test_short_word_seen_at_5ms_sampling() {
        let mut index = short_words_index();

        let hits = (0..=10)
            .map(|k| 1.60 + k as f64 * 0.005)
            .filter(|&t| index.query(t).map(|w| w.index) == Some(2))
            .count();

        assert!(hits >= 1);
    }

    #[test]
    fn test_every_demo_word_found_inside_its_interval() {
        let (_, mut index) = build(DEMO_TRANSCRIPT);
        let words = index.words().to_vec();

        for word in words {
            let found = index.query(word.center()).unwrap();
            assert!(
                found.contains(word.center()),
                "{} resolved to {} at {:.3}",
                word.text,
                found.text,
                word.center()
            );
        }
    }

    #[test]
    fn test_far_times_resolve_to_none() {
        let (_, mut index) = build(DEMO_TRANSCRIPT);

        assert!(index.query(2.6).is_none());
        assert!(index.query(100.0).is_none());
    }

    #[test]
    fn test_repeated_queries_agree() {
        let (_, mut index) = build(DEMO_TRANSCRIPT);

        for t in [0.05, 0.55, 1.01, 1.82, 2.2, 3.0] {
            let first = index.query(t).map(|w| w.index);
            let second = index.query(t).map(|w| w.index);
            assert_eq!(first, second);
            assert_eq!(index.lookup(t).map(|w| w.index), first);
        }
    }
}

// ============================================================================
// Sentence Tests
// ============================================================================

mod sentence_tests {
    use super::*;

    #[test]
    fn test_sentence_around_is() {
        let (transcript, index) = build(DEMO_TRANSCRIPT);
        let is = index.lookup(1.75).unwrap();
        assert_eq!(is.text, "is");

        let sentence = find_sentence(&transcript, is).unwrap();

        assert_eq!(sentence.start, 1.5);
        assert_eq!(sentence.end, 2.3);
        assert_eq!(sentence.start_word_index, 3);
        assert_eq!(sentence.end_word_index, 6);
    }

    #[test]
    fn test_attached_period_closes_sentence() {
        let (transcript, index) = build(COUNTING_TRANSCRIPT);

        let sentence = find_sentence(&transcript, index.word(2).unwrap()).unwrap();

        assert_eq!((sentence.start, sentence.end), (0.0, 5.0));
    }
}

// ============================================================================
// Scheduler + Loop Tests
// ============================================================================

mod playback_flow_tests {
    use super::*;

    struct Player {
        scheduler: TimingScheduler,
        looping: LoopController,
        highlight: HighlightState,
        source: SimulatedSource,
    }

    impl Player {
        fn new(json: &str) -> Self {
            let (transcript, index) = build(json);
            let mut scheduler = TimingScheduler::new(index, SchedulerConfig::default());
            scheduler.set_playing(true);
            Self {
                scheduler,
                looping: LoopController::new(transcript),
                highlight: HighlightState::new(),
                source: SimulatedSource::new(12.0),
            }
        }

        fn sample(&mut self, t: f64, kind: SampleKind) -> Option<HighlightAction> {
            match self.scheduler.sample(Ok(t), kind) {
                TickOutcome::Changed(change) => {
                    self.looping.on_word_changed(&change, &self.source);
                    Some(self.highlight.project(&change))
                }
                _ => None,
            }
        }
    }

    #[test]
    fn test_seek_back_inside_loop_keeps_bounds() {
        let mut player = Player::new(COUNTING_TRANSCRIPT);
        player.sample(0.5, SampleKind::Tick);
        let armed = player.looping.set_looping(true, &player.source);
        assert!(matches!(armed, LoopUpdate::Armed(s) if s.start == 0.0 && s.end == 5.0));

        // Silence at 10s clears the highlight but not the loop.
        let at_ten = player.sample(10.0, SampleKind::Tick);
        assert_eq!(at_ten, Some(HighlightAction::Clear { cleared: 0 }));
        assert_eq!(player.source.loop_bounds(), Some((0.0, 5.0)));

        // The seek resolves immediately rather than waiting for a tick.
        let at_two = player.sample(2.0, SampleKind::Seek);
        assert!(matches!(at_two, Some(HighlightAction::Highlight { index: 2, .. })));
        assert_eq!(player.scheduler.last_time(), Some(2.0));
        assert_eq!(player.source.loop_bounds(), Some((0.0, 5.0)));
        assert_eq!(player.looping.sentence().map(|s| (s.start, s.end)), Some((0.0, 5.0)));
    }

    #[test]
    fn test_loop_follows_into_next_sentence() {
        let mut player = Player::new(DEMO_TRANSCRIPT);
        player.sample(0.2, SampleKind::Tick);
        player.looping.set_looping(true, &player.source);
        assert_eq!(player.source.loop_bounds(), Some((0.0, 1.4)));

        player.sample(1.6, SampleKind::Tick);
        assert_eq!(player.source.loop_bounds(), Some((1.5, 2.3)));

        player.looping.set_looping(false, &player.source);
        assert_eq!(player.source.loop_bounds(), None);
    }

    #[test]
    fn test_highlight_tracks_every_transition_once() {
        let mut player = Player::new(DEMO_TRANSCRIPT);
        let mut highlighted = Vec::new();

        let mut t = 0.0;
        while t < 2.5 {
            if let Some(HighlightAction::Highlight { index, .. }) = player.sample(t, SampleKind::Tick) {
                highlighted.push(index);
            }
            t += 0.033;
        }

        assert_eq!(highlighted, vec![0, 1, 2, 3, 4, 5, 6]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_containment_while_playing() {
        let mut player = Player::new(DEMO_TRANSCRIPT);
        player.source.play().unwrap();
        tokio::time::advance(std::time::Duration::from_millis(1600)).await;

        let t = player.source.current_time().unwrap();
        player.sample(t, SampleKind::Tick);
        player.looping.set_looping(true, &player.source);
        let (start, end) = player.source.loop_bounds().unwrap();
        assert_eq!((start, end), (1.5, 2.3));

        let epsilon = 0.05;
        for _ in 0..200 {
            tokio::time::advance(std::time::Duration::from_millis(33)).await;
            let t = player.source.current_time().unwrap();
            assert!(t >= start - epsilon && t <= end + epsilon, "escaped loop at {:.3}", t);
            player.sample(t, SampleKind::Tick);
        }
        assert_eq!(player.source.loop_bounds(), Some((start, end)));
    }
}

// ============================================================================
// Config Tests
// ============================================================================

mod config_tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml(
            r#"
            [scheduler]
            tick_mode = "frame"
            tick_interval_ms = 50

            [index]
            short_threshold = 0.15
            "#,
        )
        .unwrap();

        assert_eq!(config.scheduler.tick_mode, TickMode::Frame);
        assert_eq!(config.scheduler.tick_interval_ms, 50);
        assert_eq!(config.scheduler.degraded_after, 5);
        assert_eq!(config.index.short_threshold, 0.15);
        assert_eq!(config.playback.seek_tolerance, 0.05);
        assert_ok!(config.validate());
    }

    #[test]
    fn test_tick_interval_bounds() {
        let mut config = Config::default();
        config.scheduler.tick_interval_ms = 5;
        assert!(matches!(config.validate(), Err(PlayerError::Config(_))));

        config.scheduler.tick_interval_ms = 200;
        assert_ok!(config.validate());

        config.playback.seek_timeout_ms = 0;
        assert_err!(config.validate());
    }
}
