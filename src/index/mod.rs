//! Time → word lookup over a built transcript.
//!
//! Two bucket maps back the lookup: a coarse one covering every word's real
//! interval, and a fine one covering short words over a widened window so a
//! sampler running at 30-60ms intervals still lands on them. A sorted list
//! of words serves as the final nearest-neighbour fallback.

mod cache;

use crate::config::IndexConfig;
use crate::error::{PlayerError, Result};
use crate::transcript::{is_common_short_word, Word};
use cache::RecentLookups;
use std::collections::HashMap;
use tracing::{debug, info};

/// Summary of a built index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexStats {
    pub total_words: usize,
    pub short_words: usize,
    pub common_short_words: usize,
    pub average_duration: f64,
    pub shortest_word: Option<Word>,
    pub coarse_buckets: usize,
    pub fine_buckets: usize,
    pub recent_entries: usize,
}

pub struct WordIndex {
    config: IndexConfig,
    /// Sorted by start, ties in input order.
    words: Vec<Word>,
    /// Global word index → position in `words`.
    positions: HashMap<usize, usize>,
    coarse: HashMap<i64, Vec<usize>>,
    fine: HashMap<i64, Vec<usize>>,
    recent: RecentLookups,
}

impl WordIndex {
    /// An empty index: every query resolves to none.
    pub fn new(config: IndexConfig) -> Self {
        let recent = RecentLookups::new(config.cache_capacity);
        Self {
            config,
            words: Vec::new(),
            positions: HashMap::new(),
            coarse: HashMap::new(),
            fine: HashMap::new(),
            recent,
        }
    }

    pub fn from_words(words: Vec<Word>, config: IndexConfig) -> Result<Self> {
        let mut index = Self::new(config);
        index.build(words)?;
        Ok(index)
    }

    /// Replace the index contents with `words`.
    ///
    /// On error the index is left empty, never partially built.
    pub fn build(&mut self, words: Vec<Word>) -> Result<()> {
        self.words.clear();
        self.positions.clear();
        self.coarse.clear();
        self.fine.clear();
        self.recent.clear();

        for word in &words {
            validate_word(word, self.config.max_word_duration)?;
        }

        let mut words = words;
        for word in &mut words {
            self.classify(word);
        }
        words.sort_by(|a, b| a.start.total_cmp(&b.start));

        let coarse_scale = 1.0 / self.config.coarse_bucket;
        let fine_scale = 1.0 / self.config.fine_bucket;

        for (position, word) in words.iter().enumerate() {
            self.positions.insert(word.index, position);

            let first = (word.start * coarse_scale).floor() as i64;
            let last = (word.end * coarse_scale).floor() as i64;
            for key in first..=last {
                self.coarse.entry(key).or_default().push(position);
            }

            if word.is_short {
                let expansion = if word.duration() < self.config.very_short_duration {
                    self.config.wide_expansion
                } else {
                    self.config.narrow_expansion
                };
                let lo = (word.start - expansion).max(0.0);
                let hi = word.end + expansion;

                let first = (lo * fine_scale).round() as i64;
                let last = (hi * fine_scale).round() as i64;
                for key in first..=last {
                    self.fine.entry(key).or_default().push(position);
                }
            }
        }

        self.words = words;

        let stats = self.stats();
        info!(
            "Word index built: {} words, {} short ({} common), {} fine buckets",
            stats.total_words, stats.short_words, stats.common_short_words, stats.fine_buckets
        );

        Ok(())
    }

    fn classify(&self, word: &mut Word) {
        word.is_common = is_common_short_word(&word.text);
        word.is_short = word.duration() < self.config.short_threshold
            || word.text.chars().count() <= self.config.max_short_chars
            || word.is_common;
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Words in start order.
    pub fn words(&self) -> &[Word] {
        &self.words
    }

    /// Look up a word by its global index.
    pub fn word(&self, index: usize) -> Option<&Word> {
        self.positions.get(&index).map(|&p| &self.words[p])
    }

    /// Resolve the word spoken at `t`, going through the recent-lookup cache.
    pub fn query(&mut self, t: f64) -> Option<&Word> {
        if !t.is_finite() {
            return None;
        }

        let key = (t * (1.0 / self.config.cache_resolution)).round() as i64;
        let position = match self.recent.get(key) {
            Some(cached) => cached,
            None => {
                let resolved = self.resolve(t);
                self.recent.insert(key, resolved);
                resolved
            }
        };

        position.map(|p| &self.words[p])
    }

    /// Resolve the word spoken at `t` without consulting or filling the cache.
    pub fn lookup(&self, t: f64) -> Option<&Word> {
        if !t.is_finite() {
            return None;
        }
        self.resolve(t).map(|p| &self.words[p])
    }

    /// Drop the recent-lookup cache.
    pub fn clear_recent(&mut self) {
        self.recent.clear();
    }

    fn resolve(&self, t: f64) -> Option<usize> {
        self.resolve_fine(t)
            .or_else(|| self.resolve_coarse(t))
            .or_else(|| self.resolve_nearest(t))
    }

    fn resolve_fine(&self, t: f64) -> Option<usize> {
        let scale = 1.0 / self.config.fine_bucket;
        let offset = self.config.fine_probe_offset;

        let mut candidates: Vec<usize> = [t - offset, t, t + offset]
            .iter()
            .filter_map(|probe| self.fine.get(&((probe * scale).round() as i64)))
            .flatten()
            .copied()
            .collect();

        if candidates.is_empty() {
            return None;
        }

        candidates.sort_unstable_by_key(|&p| self.words[p].index);
        candidates.dedup();

        let mut best: Option<(usize, f64)> = None;
        for position in candidates {
            let score = self.score(&self.words[position], t);
            match best {
                Some((_, best_score)) if score <= best_score => {}
                _ => best = Some((position, score)),
            }
        }

        best.filter(|(_, score)| *score > self.config.min_confidence)
            .map(|(position, _)| position)
    }

    /// Confidence that `word` is the one being spoken at `t`.
    fn score(&self, word: &Word, t: f64) -> f64 {
        let mut score = 0.0;

        if word.contains(t) {
            score += self.config.containment_score;
        }

        let distance = (t - word.center()).abs();
        score += (1.0 - distance).max(0.0) * self.config.proximity_weight;

        if word.is_common {
            score += self.config.common_bonus;
        }

        if word.duration() < self.config.very_short_duration {
            score += self.config.very_short_bonus;
        }

        score
    }

    fn resolve_coarse(&self, t: f64) -> Option<usize> {
        let scale = 1.0 / self.config.coarse_bucket;
        let offset = self.config.coarse_probe_offset;

        for probe in [t, t - offset, t + offset] {
            let key = (probe * scale).floor() as i64;
            if let Some(bucket) = self.coarse.get(&key) {
                if let Some(&first) = bucket.first() {
                    let exact = bucket.iter().copied().find(|&p| self.words[p].contains(t));
                    return Some(exact.unwrap_or(first));
                }
            }
        }

        None
    }

    fn resolve_nearest(&self, t: f64) -> Option<usize> {
        if self.words.is_empty() {
            return None;
        }

        let after = self.words.partition_point(|w| w.start <= t);
        let neighbours = [after.checked_sub(1), Some(after).filter(|&p| p < self.words.len())];

        for position in neighbours.into_iter().flatten() {
            let word = &self.words[position];
            let tolerance = if word.is_short {
                self.config.short_tolerance
            } else {
                self.config.normal_tolerance
            };
            if t >= word.start - tolerance && t <= word.end + tolerance {
                return Some(position);
            }
        }

        let nearest = neighbours
            .into_iter()
            .flatten()
            .min_by(|&a, &b| {
                self.words[a]
                    .edge_distance(t)
                    .total_cmp(&self.words[b].edge_distance(t))
            })?;

        if self.words[nearest].edge_distance(t) < self.config.nearest_fallback {
            debug!("Nearest-word fallback at {:.3}s", t);
            Some(nearest)
        } else {
            None
        }
    }

    pub fn stats(&self) -> IndexStats {
        let short_words = self.words.iter().filter(|w| w.is_short).count();
        let common_short_words = self
            .words
            .iter()
            .filter(|w| w.is_short && w.is_common)
            .count();
        let average_duration = if self.words.is_empty() {
            0.0
        } else {
            self.words.iter().map(Word::duration).sum::<f64>() / self.words.len() as f64
        };

        IndexStats {
            total_words: self.words.len(),
            short_words,
            common_short_words,
            average_duration,
            shortest_word: self.short_words().into_iter().next().cloned(),
            coarse_buckets: self.coarse.len(),
            fine_buckets: self.fine.len(),
            recent_entries: self.recent.len(),
        }
    }

    /// Short words, shortest first.
    pub fn short_words(&self) -> Vec<&Word> {
        let mut short: Vec<&Word> = self.words.iter().filter(|w| w.is_short).collect();
        short.sort_by(|a, b| a.duration().total_cmp(&b.duration()));
        short
    }
}

fn validate_word(word: &Word, max_duration: f64) -> Result<()> {
    if !word.start.is_finite() || !word.end.is_finite() {
        return Err(PlayerError::InvalidTranscript(format!(
            "word '{}' (#{}) has a non-finite timestamp",
            word.text, word.index
        )));
    }

    if word.start < 0.0 {
        return Err(PlayerError::InvalidTranscript(format!(
            "word '{}' (#{}) starts before zero ({:.3}s)",
            word.text, word.index, word.start
        )));
    }

    if word.end < word.start {
        return Err(PlayerError::InvalidTranscript(format!(
            "word '{}' (#{}) ends before it starts ({:.3}s < {:.3}s)",
            word.text, word.index, word.end, word.start
        )));
    }

    // Bucket filling is linear in duration.
    if word.duration() > max_duration {
        return Err(PlayerError::InvalidTranscript(format!(
            "word '{}' (#{}) lasts {:.3}s, longer than {:.1}s",
            word.text,
            word.index,
            word.duration(),
            max_duration
        )));
    }

    Ok(())
}
