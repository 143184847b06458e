use super::{AudioSource, PlaybackLoop};
use crate::highlight::WordChanged;
use crate::transcript::{find_sentence, Sentence, Transcript, Word};
use std::sync::Arc;
use tracing::{debug, info};

/// What a loop controller call did to the source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoopUpdate {
    /// Loop bounds were (re)instructed to the source.
    Armed(Sentence),
    Cleared,
    /// The existing loop, if any, stays as is.
    Kept,
    /// Looping is on but there is no current word to anchor it to yet.
    Pending,
}

/// Keeps playback inside the sentence around the current word.
pub struct LoopController {
    transcript: Arc<Transcript>,
    active: bool,
    sentence: Option<Sentence>,
    current: Option<Word>,
}

impl LoopController {
    pub fn new(transcript: Arc<Transcript>) -> Self {
        Self {
            transcript,
            active: false,
            sentence: None,
            current: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn sentence(&self) -> Option<&Sentence> {
        self.sentence.as_ref()
    }

    /// The loop currently instructed to the source.
    pub fn playback_loop(&self) -> Option<PlaybackLoop> {
        self.sentence.map(|sentence| PlaybackLoop {
            start: sentence.start,
            end: sentence.end,
            active: self.active,
        })
    }

    pub fn set_looping(&mut self, enabled: bool, source: &dyn AudioSource) -> LoopUpdate {
        if !enabled {
            let was_armed = self.sentence.take().is_some();
            self.active = false;
            source.clear_loop();
            if was_armed {
                info!("Sentence loop cleared");
            }
            return LoopUpdate::Cleared;
        }

        self.active = true;
        match self.current.clone() {
            Some(word) => self.arm(&word, source),
            None => {
                debug!("Looping enabled with no current word, waiting for one");
                LoopUpdate::Pending
            }
        }
    }

    /// Track the current word and re-arm when playback has left the sentence.
    ///
    /// A change to no word keeps whatever loop is armed.
    pub fn on_word_changed(&mut self, change: &WordChanged, source: &dyn AudioSource) -> LoopUpdate {
        let Some(word) = &change.word else {
            return LoopUpdate::Kept;
        };
        self.current = Some(word.clone());

        if !self.active {
            return LoopUpdate::Kept;
        }

        match self.sentence {
            Some(sentence) if sentence.contains(change.time) => LoopUpdate::Kept,
            _ => self.arm(word, source),
        }
    }

    /// Switch to a new transcript, dropping any loop tied to the old one.
    pub fn reset(&mut self, transcript: Arc<Transcript>, source: &dyn AudioSource) -> LoopUpdate {
        self.transcript = transcript;
        self.current = None;
        if self.sentence.take().is_some() {
            source.clear_loop();
            return LoopUpdate::Cleared;
        }
        if self.active {
            LoopUpdate::Pending
        } else {
            LoopUpdate::Kept
        }
    }

    fn arm(&mut self, word: &Word, source: &dyn AudioSource) -> LoopUpdate {
        let Some(sentence) = find_sentence(&self.transcript, word) else {
            debug!("No sentence found around word {}", word.index);
            return LoopUpdate::Pending;
        };

        if self.sentence == Some(sentence) {
            return LoopUpdate::Kept;
        }

        source.set_loop_bounds(sentence.start, sentence.end);
        self.sentence = Some(sentence);
        info!(
            "Sentence loop armed: {:.2}s - {:.2}s (words {}..={})",
            sentence.start, sentence.end, sentence.start_word_index, sentence.end_word_index
        );
        LoopUpdate::Armed(sentence)
    }
}
