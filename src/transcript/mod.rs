pub mod sentence;

pub use sentence::{find_sentence, Sentence};

use crate::error::{PlayerError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Words that are flagged as short regardless of their measured duration.
pub const COMMON_SHORT_WORDS: &[&str] = &[
    "a", "an", "the", "to", "of", "in", "on", "at", "by", "for", "is", "it", "or", "as", "we",
    "be", "my", "so", "up", "no", "if", "he", "me", "do", "go", "us", "am", "oh", "hi", "ok",
];

/// Whether `text` (case-insensitive) is one of [`COMMON_SHORT_WORDS`].
pub fn is_common_short_word(text: &str) -> bool {
    let lower = text.trim().to_lowercase();
    COMMON_SHORT_WORDS.contains(&lower.as_str())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Word,
    Spacing,
    #[serde(other)]
    Other,
}

/// A raw transcript token as it appears in the JSON document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    #[serde(rename = "type")]
    pub kind: TokenKind,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<f64>,
}

impl Token {
    pub fn word(text: &str, start: f64, end: f64) -> Self {
        Self {
            kind: TokenKind::Word,
            text: text.to_string(),
            start: Some(start),
            end: Some(end),
        }
    }

    pub fn spacing() -> Self {
        Self {
            kind: TokenKind::Spacing,
            text: " ".to_string(),
            start: None,
            end: None,
        }
    }

    pub fn punctuation(text: &str) -> Self {
        Self {
            kind: TokenKind::Other,
            text: text.to_string(),
            start: None,
            end: None,
        }
    }

    pub fn is_word(&self) -> bool {
        self.kind == TokenKind::Word
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    #[serde(default)]
    pub words: Vec<Token>,
}

/// A loaded transcript: segments of word, spacing and punctuation tokens.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    #[serde(default)]
    pub segments: Vec<Segment>,
}

impl Transcript {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let transcript: Transcript = serde_json::from_str(json)
            .map_err(|e| PlayerError::InvalidTranscript(format!("malformed JSON: {e}")))?;
        // Surface missing timestamps at load time rather than at index build.
        transcript.words()?;
        Ok(transcript)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let transcript = Self::from_json(&contents)?;
        debug!(
            "Loaded transcript {:?}: {} segments, {} words",
            path,
            transcript.segments.len(),
            transcript.word_count()
        );
        Ok(transcript)
    }

    pub fn is_empty(&self) -> bool {
        self.word_count() == 0
    }

    pub fn word_count(&self) -> usize {
        self.segments
            .iter()
            .flat_map(|s| s.words.iter())
            .filter(|t| t.is_word())
            .count()
    }

    /// Extract the word-type tokens in transcript order.
    ///
    /// Fails when a word token lacks `start` or `end`.
    pub fn words(&self) -> Result<Vec<Word>> {
        let mut words = Vec::new();

        for (segment_index, segment) in self.segments.iter().enumerate() {
            for (token_index, token) in segment.words.iter().enumerate() {
                if !token.is_word() {
                    continue;
                }

                let (start, end) = match (token.start, token.end) {
                    (Some(start), Some(end)) => (start, end),
                    _ => {
                        return Err(PlayerError::InvalidTranscript(format!(
                            "word '{}' (segment {}, token {}) is missing start/end",
                            token.text, segment_index, token_index
                        )))
                    }
                };

                words.push(
                    Word::new(&token.text, start, end, words.len())
                        .at(segment_index, token_index),
                );
            }
        }

        Ok(words)
    }
}

/// One timed word of the transcript.
#[derive(Debug, Clone, PartialEq)]
pub struct Word {
    pub text: String,
    pub start: f64,
    pub end: f64,
    /// Position among word-type tokens only.
    pub index: usize,
    pub segment_index: usize,
    /// Position of the token inside its segment, spacing included.
    pub token_index: usize,
    /// Set by `WordIndex::build`.
    pub is_short: bool,
    /// Set by `WordIndex::build`.
    pub is_common: bool,
}

impl Word {
    pub fn new(text: &str, start: f64, end: f64, index: usize) -> Self {
        Self {
            text: text.to_string(),
            start,
            end,
            index,
            segment_index: 0,
            token_index: index,
            is_short: false,
            is_common: false,
        }
    }

    pub fn at(mut self, segment_index: usize, token_index: usize) -> Self {
        self.segment_index = segment_index;
        self.token_index = token_index;
        self
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    pub fn center(&self) -> f64 {
        (self.start + self.end) / 2.0
    }

    pub fn contains(&self, t: f64) -> bool {
        t >= self.start && t <= self.end
    }

    /// Distance from `t` to the nearer edge of the word.
    pub fn edge_distance(&self, t: f64) -> f64 {
        (t - self.start).abs().min((t - self.end).abs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "segments": [
            { "words": [
                { "type": "word", "text": "Hello", "start": 0.0, "end": 0.4 },
                { "type": "spacing", "text": " " },
                { "type": "word", "text": "world", "start": 0.45, "end": 0.9 },
                { "type": "punctuation", "text": "." }
            ] },
            { "words": [
                { "type": "word", "text": "Again", "start": 1.2, "end": 1.6 }
            ] }
        ]
    }"#;

    #[test]
    fn test_parse_transcript() {
        let transcript = Transcript::from_json(SAMPLE).unwrap();

        assert_eq!(transcript.segments.len(), 2);
        assert_eq!(transcript.segments[0].words[1].kind, TokenKind::Spacing);
        assert_eq!(transcript.segments[0].words[3].kind, TokenKind::Other);
        assert_eq!(transcript.word_count(), 3);
    }

    #[test]
    fn test_words_skip_non_word_tokens() {
        let transcript = Transcript::from_json(SAMPLE).unwrap();
        let words = transcript.words().unwrap();

        let texts: Vec<&str> = words.iter().map(|w| w.text.as_str()).collect();
        assert_eq!(texts, vec!["Hello", "world", "Again"]);

        assert_eq!(words[1].index, 1);
        assert_eq!(words[1].segment_index, 0);
        assert_eq!(words[1].token_index, 2);
        assert_eq!(words[2].index, 2);
        assert_eq!(words[2].segment_index, 1);
        assert_eq!(words[2].token_index, 0);
    }

    #[test]
    fn test_missing_timestamp_is_invalid() {
        let json = r#"{ "segments": [ { "words": [ { "type": "word", "text": "oops", "start": 1.0 } ] } ] }"#;

        let err = Transcript::from_json(json).unwrap_err();
        assert!(matches!(err, PlayerError::InvalidTranscript(_)));
        assert!(err.to_string().contains("oops"));
    }

    #[test]
    fn test_spacing_without_timestamps_is_fine() {
        let json = r#"{ "segments": [ { "words": [ { "type": "spacing", "text": " " } ] } ] }"#;

        let transcript = Transcript::from_json(json).unwrap();
        assert!(transcript.is_empty());
    }

    #[test]
    fn test_malformed_json_is_invalid_transcript() {
        let err = Transcript::from_json("{ not json").unwrap_err();
        assert!(matches!(err, PlayerError::InvalidTranscript(_)));
    }

    #[test]
    fn test_common_short_words() {
        assert!(is_common_short_word("The"));
        assert!(is_common_short_word(" ok "));
        assert!(!is_common_short_word("demo"));
    }

    #[test]
    fn test_word_geometry() {
        let word = Word::new("is", 1.5, 1.6, 0);

        assert!((word.center() - 1.55).abs() < 1e-9);
        assert!(word.contains(1.5));
        assert!(word.contains(1.6));
        assert!(!word.contains(1.61));
        assert!((word.edge_distance(1.7) - 0.1).abs() < 1e-9);
    }
}
