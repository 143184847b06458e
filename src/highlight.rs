// Highlight projection

use crate::transcript::Word;
use crate::vocabulary::VocabularyStore;

/// The resolved word changed between two samples.
#[derive(Debug, Clone, PartialEq)]
pub struct WordChanged {
    pub previous_index: Option<usize>,
    pub current_index: Option<usize>,
    /// `None` means silence or a non-word span.
    pub word: Option<Word>,
    /// Playback time of the sample that produced the change.
    pub time: f64,
}

/// What a projector did with a change.
#[derive(Debug, Clone, PartialEq)]
pub enum HighlightAction {
    Highlight {
        index: usize,
        /// Previously highlighted word to un-highlight.
        cleared: Option<usize>,
        /// Set when the highlighted word moved to another segment.
        segment: Option<usize>,
    },
    Clear {
        cleared: usize,
    },
    Unchanged,
}

/// Consumer of `WordChanged` events.
///
/// Implementations must be idempotent: a repeated `current` is a no-op.
pub trait HighlightProjector {
    fn project(&mut self, change: &WordChanged) -> HighlightAction;
}

/// Reference projector tracking what is highlighted.
#[derive(Debug, Default, Clone)]
pub struct HighlightState {
    word: Option<usize>,
    segment: Option<usize>,
}

impl HighlightState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn highlighted(&self) -> Option<usize> {
        self.word
    }

    pub fn active_segment(&self) -> Option<usize> {
        self.segment
    }
}

impl HighlightProjector for HighlightState {
    fn project(&mut self, change: &WordChanged) -> HighlightAction {
        match &change.word {
            Some(word) if self.word == Some(word.index) => HighlightAction::Unchanged,
            Some(word) => {
                let cleared = self.word.replace(word.index);
                let segment = (self.segment != Some(word.segment_index))
                    .then_some(word.segment_index);
                self.segment = Some(word.segment_index);
                HighlightAction::Highlight {
                    index: word.index,
                    cleared,
                    segment,
                }
            }
            None => match self.word.take() {
                Some(cleared) => {
                    self.segment = None;
                    HighlightAction::Clear { cleared }
                }
                None => HighlightAction::Unchanged,
            },
        }
    }
}

/// How a word should be decorated when rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WordDecoration {
    pub saved: bool,
    pub color: Option<String>,
}

/// Vocabulary-driven decoration; never consulted by the timing core.
pub fn decorate(word: &Word, vocabulary: &dyn VocabularyStore) -> WordDecoration {
    match vocabulary.get(&word.text) {
        Some(entry) => WordDecoration {
            saved: true,
            color: Some(entry.color.clone()),
        },
        None => WordDecoration {
            saved: false,
            color: None,
        },
    }
}
