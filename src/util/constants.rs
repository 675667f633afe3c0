// logcore - util/constants.rs
//
// Single source of truth for all named constants, limits, and defaults.
// Mirrors the literal defaults called out by the spec (block size, chunk
// size, debounce, ...).

/// Current crate version (updated by release tooling).
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

// =============================================================================
// Indexing (C4)
// =============================================================================

/// Fixed block size read by the indexer's reader stage, in bytes.
pub const INDEX_BLOCK_SIZE: usize = 1024 * 1024; // 1 MiB

/// Read-ahead budget for the indexer's reader stage, in bytes. The reader
/// must not advance more than `INDEX_READ_BUFFER_SIZE / INDEX_BLOCK_SIZE`
/// blocks ahead of the parser.
pub const INDEX_READ_BUFFER_SIZE: usize = 8 * 1024 * 1024; // 8 MiB

/// Tab stop width used when computing tab-expanded display length.
pub const TAB_STOP: usize = 8;

/// Number of leading bytes sniffed by the encoding detector.
pub const ENCODING_SNIFF_SIZE: usize = 64 * 1024; // 64 KiB

// =============================================================================
// Search (C9)
// =============================================================================

/// Default number of lines per search chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 5_000;

/// Prefetch window expressed as a multiple of the matcher thread count.
pub const PREFETCH_CHUNK_MULTIPLIER: usize = 3;

/// Upper bound on matcher threads when parallel search is enabled and the
/// caller did not pin a specific count; falls back to available parallelism.
pub const MAX_MATCHER_THREADS: usize = 32;

// =============================================================================
// Search-results cache (C11)
// =============================================================================

/// Default cap on the total number of matching lines held across all cached
/// entries before the oldest entries are evicted (FIFO).
pub const DEFAULT_SEARCH_CACHE_CAPACITY: usize = 1_000_000;

// =============================================================================
// File watcher (C12)
// =============================================================================

/// Debounce window for coalescing file-change notifications.
pub const WATCHER_DEBOUNCE_MS: u64 = 500;

/// Polling fallback interval, used alongside OS notifications as a backstop.
pub const WATCHER_POLL_INTERVAL_MS: u64 = 1_000;

/// How often the watcher's background thread wakes to check its stop flag.
pub const WATCHER_CANCEL_CHECK_INTERVAL_MS: u64 = 100;

// =============================================================================
// Logging
// =============================================================================

/// Default log level when neither `RUST_LOG` nor an explicit level is given.
pub const DEFAULT_LOG_LEVEL: &str = "info";
