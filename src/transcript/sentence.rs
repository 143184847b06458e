use super::{Token, Transcript, Word};

/// A run of words between sentence-terminal punctuation, within one segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sentence {
    pub start: f64,
    pub end: f64,
    /// Global word index of the first word.
    pub start_word_index: usize,
    /// Global word index of the last word.
    pub end_word_index: usize,
    pub segment_index: usize,
}

impl Sentence {
    pub fn contains(&self, t: f64) -> bool {
        t >= self.start && t <= self.end
    }
}

/// Whether a token closes a sentence (`.`, `!` or `?`, ignoring closing quotes).
pub fn ends_sentence(text: &str) -> bool {
    let trimmed = text
        .trim_end()
        .trim_end_matches(['"', '\'', ')', '\u{201d}', '\u{2019}']);
    trimmed.ends_with(['.', '!', '?'])
}

/// Find the sentence enclosing `word`.
///
/// Punctuation tokens and word tokens ending in punctuation both close a
/// sentence. Returns `None` when `word` does not point at a timed word token
/// of `transcript`.
pub fn find_sentence(transcript: &Transcript, word: &Word) -> Option<Sentence> {
    let segment = transcript.segments.get(word.segment_index)?;
    let tokens = &segment.words;
    let anchor = word.token_index;

    if !tokens.get(anchor).is_some_and(Token::is_word) {
        return None;
    }

    // Walk back until the previous sentence's terminal.
    let mut first = anchor;
    for j in (0..anchor).rev() {
        let token = &tokens[j];
        if ends_sentence(&token.text) {
            break;
        }
        if token.is_word() {
            first = j;
        }
    }

    // Walk forward to this sentence's terminal.
    let mut last = anchor;
    for (j, token) in tokens.iter().enumerate().skip(anchor) {
        if token.is_word() {
            last = j;
        }
        if ends_sentence(&token.text) {
            break;
        }
    }

    let start = tokens[first].start?;
    let end = tokens[last].end?;

    let word_base = word.index.checked_sub(words_before(tokens, anchor))?;

    Some(Sentence {
        start,
        end,
        start_word_index: word_base + words_before(tokens, first),
        end_word_index: word_base + words_before(tokens, last),
        segment_index: word.segment_index,
    })
}

fn words_before(tokens: &[Token], position: usize) -> usize {
    tokens[..position].iter().filter(|t| t.is_word()).count()
}
