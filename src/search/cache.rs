// logcore - search/cache.rs
//
// C11: SearchResultsCache — bounded cache of previous search results keyed
// by (pattern, flags, line range), so `FilteredLogData::run_search` can
// restore a result set instantly instead of re-scanning.
//
// Despite the "LRU" label in the component table (spec §2), §4.11 spells
// out the eviction policy as strict FIFO of insertion order; this
// implementation follows the explicit algorithm over the summary name
// (see DESIGN.md).

use std::collections::{HashMap, VecDeque};

use crate::search::bitmap::SearchResultBitmap;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub pattern: String,
    pub case_sensitive: bool,
    pub inverse: bool,
    pub boolean: bool,
    pub plain_text: bool,
    pub start_line: u64,
    pub end_line: u64,
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub matches: SearchResultBitmap,
    pub max_length: usize,
}

#[derive(Debug)]
pub struct SearchResultsCache {
    capacity: usize,
    total_lines: usize,
    order: VecDeque<CacheKey>,
    entries: HashMap<CacheKey, CacheEntry>,
}

impl SearchResultsCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            total_lines: 0,
            order: VecDeque::new(),
            entries: HashMap::new(),
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    /// Insert `entry`, evicting the oldest entries (other than the one just
    /// inserted) until the total matched-line count is back under capacity.
    pub fn insert(&mut self, key: CacheKey, entry: CacheEntry) {
        if let Some(old) = self.entries.remove(&key) {
            self.total_lines -= old.matches.cardinality();
            self.order.retain(|k| k != &key);
        }

        self.total_lines += entry.matches.cardinality();
        self.order.push_back(key.clone());
        self.entries.insert(key, entry);

        while self.total_lines > self.capacity && self.order.len() > 1 {
            if let Some(oldest) = self.order.pop_front() {
                if let Some(evicted) = self.entries.remove(&oldest) {
                    self.total_lines -= evicted.matches.cardinality();
                }
            }
        }
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.entries.clear();
        self.total_lines = 0;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(pattern: &str, start: u64, end: u64) -> CacheKey {
        CacheKey {
            pattern: pattern.to_string(),
            case_sensitive: true,
            inverse: false,
            boolean: false,
            plain_text: false,
            start_line: start,
            end_line: end,
        }
    }

    fn entry(lines: &[u64]) -> CacheEntry {
        let mut matches = SearchResultBitmap::new();
        for &l in lines {
            matches.add(l);
        }
        CacheEntry { matches, max_length: 10 }
    }

    #[test]
    fn get_returns_what_was_inserted() {
        let mut cache = SearchResultsCache::new(100);
        cache.insert(key("abc", 0, 100), entry(&[1, 2, 3]));
        let got = cache.get(&key("abc", 0, 100)).unwrap();
        assert_eq!(got.matches.cardinality(), 3);
    }

    #[test]
    fn evicts_oldest_first_when_over_capacity() {
        let mut cache = SearchResultsCache::new(5);
        cache.insert(key("a", 0, 10), entry(&[1, 2, 3]));
        cache.insert(key("b", 0, 10), entry(&[4, 5, 6]));
        assert!(cache.get(&key("a", 0, 10)).is_none());
        assert!(cache.get(&key("b", 0, 10)).is_some());
    }

    #[test]
    fn reinserting_same_key_does_not_double_count() {
        let mut cache = SearchResultsCache::new(10);
        cache.insert(key("a", 0, 10), entry(&[1, 2]));
        cache.insert(key("a", 0, 10), entry(&[1, 2, 3]));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&key("a", 0, 10)).unwrap().matches.cardinality(), 3);
    }
}
