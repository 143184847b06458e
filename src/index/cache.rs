use std::collections::VecDeque;

/// FIFO memo of recent lookups, misses included.
///
/// Keys are query times rounded to the cache resolution, so re-polls within
/// the same step skip the bucket probes entirely.
#[derive(Debug, Clone)]
pub(crate) struct RecentLookups {
    capacity: usize,
    entries: VecDeque<(i64, Option<usize>)>,
}

impl RecentLookups {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: VecDeque::with_capacity(capacity.max(1) + 1),
        }
    }

    /// `Some(result)` on a hit, where `result` may itself be a cached miss.
    pub(crate) fn get(&self, key: i64) -> Option<Option<usize>> {
        self.entries
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, value)| *value)
    }

    pub(crate) fn insert(&mut self, key: i64, value: Option<usize>) {
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            entry.1 = value;
            return;
        }

        self.entries.push_back((key, value));
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
