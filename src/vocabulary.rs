use crate::error::{PlayerError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const EXPORT_VERSION: &str = "1.0";

/// Highlight colours and the category each one stands for.
pub const COLOR_CATEGORIES: &[(&str, &str)] = &[
    ("#FF6B6B", "Important"),
    ("#FFA500", "Review"),
    ("#FFD700", "New"),
    ("#4CAF50", "Known"),
    ("#2196F3", "Grammar"),
    ("#9C27B0", "Advanced"),
    ("#FF69B4", "Favorite"),
];

pub fn category_for_color(color: &str) -> &'static str {
    COLOR_CATEGORIES
        .iter()
        .find(|(c, _)| c.eq_ignore_ascii_case(color))
        .map(|(_, category)| *category)
        .unwrap_or("Unknown")
}

/// Keys are lowercase with surrounding whitespace removed.
pub fn normalize(word: &str) -> String {
    word.trim().to_lowercase()
}

/// Read-only view of saved words, as needed for rendering.
pub trait VocabularyStore {
    fn get(&self, word: &str) -> Option<&WordEntry>;

    fn is_saved(&self, word: &str) -> bool {
        self.get(word).is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Occurrence {
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub context: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WordEntry {
    pub color: String,
    pub category: String,
    #[serde(rename = "addedDate")]
    pub added_at: DateTime<Utc>,
    #[serde(default)]
    pub occurrences: Vec<Occurrence>,
    #[serde(default)]
    pub context: Option<String>,
}

/// Totals per category and the span of dates words were saved on.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct VocabularyStats {
    pub total: usize,
    pub categories: BTreeMap<String, usize>,
    pub oldest: Option<DateTime<Utc>>,
    pub newest: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VocabularyExport {
    version: String,
    export_date: DateTime<Utc>,
    word_count: usize,
    words: BTreeMap<String, WordEntry>,
}

/// Vocabulary persisted as a JSON object keyed by normalized word.
#[derive(Debug, Default)]
pub struct JsonVocabulary {
    path: Option<PathBuf>,
    words: BTreeMap<String, WordEntry>,
}

impl JsonVocabulary {
    /// Open the vocabulary at `path`.
    ///
    /// A missing file is an empty vocabulary; so is an unreadable one, with
    /// a warning, so a corrupt file never blocks playback.
    pub fn open(path: &Path) -> Self {
        let words = match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(words) => words,
                Err(e) => {
                    warn!("Ignoring unreadable vocabulary {:?}: {}", path, e);
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                warn!("Could not read vocabulary {:?}: {}", path, e);
                BTreeMap::new()
            }
        };

        debug!("Opened vocabulary {:?} with {} words", path, words.len());
        Self {
            path: Some(path.to_path_buf()),
            words,
        }
    }

    /// A vocabulary that is never written to disk.
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &WordEntry)> {
        self.words.iter().map(|(word, entry)| (word.as_str(), entry))
    }

    /// Save `word` with `color`, or update it if already saved.
    ///
    /// Re-adding keeps the earlier occurrences and appends a new one.
    /// Returns `Ok(false)` for an empty word.
    pub fn add(&mut self, word: &str, color: &str, context: Option<&str>) -> Result<bool> {
        let key = normalize(word);
        if key.is_empty() {
            return Ok(false);
        }

        let now = Utc::now();
        let context = context.map(str::to_string);
        let mut occurrences = self
            .words
            .remove(&key)
            .map(|previous| previous.occurrences)
            .unwrap_or_default();
        occurrences.push(Occurrence {
            timestamp: now,
            context: context.clone(),
        });

        self.words.insert(
            key.clone(),
            WordEntry {
                color: color.to_string(),
                category: category_for_color(color).to_string(),
                added_at: now,
                occurrences,
                context,
            },
        );
        self.save()?;

        info!("Saved '{}' as {}", key, category_for_color(color));
        Ok(true)
    }

    pub fn remove(&mut self, word: &str) -> Result<bool> {
        if self.words.remove(&normalize(word)).is_none() {
            return Ok(false);
        }
        self.save()?;
        Ok(true)
    }

    pub fn by_color(&self, color: &str) -> Vec<(&str, &WordEntry)> {
        self.entries()
            .filter(|(_, entry)| entry.color.eq_ignore_ascii_case(color))
            .collect()
    }

    pub fn stats(&self) -> VocabularyStats {
        let mut stats = VocabularyStats {
            total: self.words.len(),
            ..Default::default()
        };
        for entry in self.words.values() {
            *stats.categories.entry(entry.category.clone()).or_default() += 1;
            stats.oldest = Some(stats.oldest.map_or(entry.added_at, |t| t.min(entry.added_at)));
            stats.newest = Some(stats.newest.map_or(entry.added_at, |t| t.max(entry.added_at)));
        }
        stats
    }

    /// Words or categories containing `query`, case-insensitively.
    /// An empty query matches everything.
    pub fn search(&self, query: &str) -> Vec<(&str, &WordEntry)> {
        let query = normalize(query);
        self.entries()
            .filter(|(word, entry)| {
                query.is_empty()
                    || word.contains(&query)
                    || entry.category.to_lowercase().contains(&query)
            })
            .collect()
    }

    /// The `limit` most recently saved words, newest first.
    pub fn recent(&self, limit: usize) -> Vec<(&str, &WordEntry)> {
        let mut entries: Vec<_> = self.entries().collect();
        entries.sort_by(|(_, a), (_, b)| b.added_at.cmp(&a.added_at));
        entries.truncate(limit);
        entries
    }

    /// How often each word was saved, most frequent first.
    pub fn frequency(&self) -> Vec<(&str, usize)> {
        let mut counts: Vec<_> = self
            .entries()
            .map(|(word, entry)| (word, entry.occurrences.len().max(1)))
            .collect();
        counts.sort_by(|a, b| b.1.cmp(&a.1));
        counts
    }

    /// Forget every word. Returns how many were removed.
    pub fn clear(&mut self) -> Result<usize> {
        let removed = self.words.len();
        self.words.clear();
        self.save()?;
        info!("Cleared {} vocabulary words", removed);
        Ok(removed)
    }

    /// Write to the backing file, if any.
    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(&self.words)?)?;
        debug!("Wrote {} vocabulary words to {:?}", self.words.len(), path);
        Ok(())
    }

    /// Serialize all words with export metadata.
    pub fn export(&self) -> Result<String> {
        let export = VocabularyExport {
            version: EXPORT_VERSION.to_string(),
            export_date: Utc::now(),
            word_count: self.words.len(),
            words: self.words.clone(),
        };
        Ok(serde_json::to_string_pretty(&export)?)
    }

    /// Merge an export into this vocabulary; imported entries win.
    ///
    /// Returns the number of words imported.
    pub fn import(&mut self, json: &str) -> Result<usize> {
        let export: VocabularyExport = serde_json::from_str(json)
            .map_err(|e| PlayerError::Vocabulary(format!("invalid export: {e}")))?;

        let count = export.words.len();
        for (word, entry) in export.words {
            let key = normalize(&word);
            if !key.is_empty() {
                self.words.insert(key, entry);
            }
        }
        self.save()?;

        info!("Imported {} words ({} total)", count, self.words.len());
        Ok(count)
    }
}

impl VocabularyStore for JsonVocabulary {
    fn get(&self, word: &str) -> Option<&WordEntry> {
        self.words.get(&normalize(word))
    }
}
