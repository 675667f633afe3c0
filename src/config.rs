// logcore - config.rs
//
// In-memory engine tunables. Mirrors the teacher's constants+TOML-validate
// pattern (see core::profile's parse-then-compile shape): a `Deserialize`
// struct with every field optional, folded onto `EngineConfig::default()`
// so a host application can override only what it cares about.
//
// The engine never reads this from disk itself — the spec is explicit that
// persisted configuration is a front-end concern (§6); this module only
// turns an already-loaded TOML string into tunables.

use crate::util::constants;
use serde::Deserialize;

/// Tunables that shape how the indexer and search engine behave.
///
/// Every field has a literal default matching the spec; `EngineConfig` is
/// cheap to clone and is typically constructed once per `LogData`/
/// `FilteredLogData` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Bytes read per block by the indexer's reader stage.
    pub index_block_size: usize,
    /// Read-ahead budget, in bytes, for the indexer's reader stage.
    pub index_read_buffer_size: usize,
    /// Lines per search chunk.
    pub search_chunk_size: usize,
    /// Matcher thread count. `None` means "use available parallelism".
    pub matcher_threads: Option<usize>,
    /// Whether parallel matching is enabled at all (spec §4.9: "1 if
    /// parallel disabled").
    pub parallel_search: bool,
    /// Cap, in total matched lines across all entries, on the search
    /// results cache (C11).
    pub search_cache_capacity: usize,
    /// File-watcher debounce window, in milliseconds.
    pub watcher_debounce_ms: u64,
    /// File-watcher polling fallback interval, in milliseconds.
    pub watcher_poll_interval_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            index_block_size: constants::INDEX_BLOCK_SIZE,
            index_read_buffer_size: constants::INDEX_READ_BUFFER_SIZE,
            search_chunk_size: constants::DEFAULT_CHUNK_SIZE,
            matcher_threads: None,
            parallel_search: true,
            search_cache_capacity: constants::DEFAULT_SEARCH_CACHE_CAPACITY,
            watcher_debounce_ms: constants::WATCHER_DEBOUNCE_MS,
            watcher_poll_interval_ms: constants::WATCHER_POLL_INTERVAL_MS,
        }
    }
}

impl EngineConfig {
    /// Number of matcher threads to actually spin up: 1 when parallel search
    /// is disabled, else the configured count or available parallelism
    /// (spec §4.9 parameter M), capped at `MAX_MATCHER_THREADS`.
    pub fn effective_matcher_threads(&self) -> usize {
        if !self.parallel_search {
            return 1;
        }
        let n = self.matcher_threads.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        });
        n.clamp(1, constants::MAX_MATCHER_THREADS)
    }

    /// Prefetch window, in chunks: `3 * M` per spec §4.9.
    pub fn prefetch_chunks(&self) -> usize {
        constants::PREFETCH_CHUNK_MULTIPLIER * self.effective_matcher_threads()
    }

    /// Build a config by overlaying a TOML document onto the default.
    /// Unknown keys are ignored; missing keys keep the default value.
    pub fn from_toml_str(toml_content: &str) -> Result<Self, toml::de::Error> {
        let raw: RawEngineConfig = toml::from_str(toml_content)?;
        Ok(raw.into_config())
    }
}

/// Raw TOML deserialisation target — every field optional, folded onto
/// `EngineConfig::default()` by `into_config`.
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
struct RawEngineConfig {
    index_block_size: Option<usize>,
    index_read_buffer_size: Option<usize>,
    search_chunk_size: Option<usize>,
    matcher_threads: Option<usize>,
    parallel_search: Option<bool>,
    search_cache_capacity: Option<usize>,
    watcher_debounce_ms: Option<u64>,
    watcher_poll_interval_ms: Option<u64>,
}

impl RawEngineConfig {
    fn into_config(self) -> EngineConfig {
        let default = EngineConfig::default();
        EngineConfig {
            index_block_size: self.index_block_size.unwrap_or(default.index_block_size),
            index_read_buffer_size: self
                .index_read_buffer_size
                .unwrap_or(default.index_read_buffer_size),
            search_chunk_size: self.search_chunk_size.unwrap_or(default.search_chunk_size),
            matcher_threads: self.matcher_threads.or(default.matcher_threads),
            parallel_search: self.parallel_search.unwrap_or(default.parallel_search),
            search_cache_capacity: self
                .search_cache_capacity
                .unwrap_or(default.search_cache_capacity),
            watcher_debounce_ms: self
                .watcher_debounce_ms
                .unwrap_or(default.watcher_debounce_ms),
            watcher_poll_interval_ms: self
                .watcher_poll_interval_ms
                .unwrap_or(default.watcher_poll_interval_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_spec_literals() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.index_block_size, 1024 * 1024);
        assert_eq!(cfg.search_chunk_size, 5_000);
    }

    #[test]
    fn toml_overlay_keeps_unset_defaults() {
        let cfg = EngineConfig::from_toml_str("search-chunk-size = 1000\n").unwrap();
        assert_eq!(cfg.search_chunk_size, 1000);
        assert_eq!(cfg.index_block_size, EngineConfig::default().index_block_size);
    }

    #[test]
    fn parallel_disabled_forces_single_thread() {
        let mut cfg = EngineConfig::default();
        cfg.parallel_search = false;
        assert_eq!(cfg.effective_matcher_threads(), 1);
        assert_eq!(cfg.prefetch_chunks(), 3);
    }
}
