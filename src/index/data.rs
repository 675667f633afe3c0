// logcore - index/data.rs
//
// C2: IndexingData — the thread-safe aggregate the indexing worker mutates
// and every facade (LogData, SearchEngine) reads from.
//
// Thread-safety follows the spec's two-accessor rule: a shared `read`/
// `snapshot` path (many concurrent readers) and an exclusive `mutate` path
// (the indexing worker only). Lock ordering relative to the rest of the
// engine is IndexingData -> Marks -> SearchData; nothing in this module
// ever takes a second lock while holding its own.

use std::sync::RwLock;

use crate::index::encoding::Encoding;
use crate::index::line_positions::LinePositionArray;

/// Cheap copy of the hot scalar fields, taken under the read lock in one
/// call so callers decoding strings or computing line counts don't hold the
/// lock across that work (spec-supplement: see SPEC_FULL.md "IndexingData
/// snapshot").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexingSnapshot {
    pub indexed_size: u64,
    pub line_count: usize,
    pub max_length: usize,
    pub content_hash: u64,
    pub encoding_guess: Option<Encoding>,
    pub forced_encoding: Option<Encoding>,
}

impl IndexingSnapshot {
    pub fn effective_encoding(&self) -> Encoding {
        self.forced_encoding
            .or(self.encoding_guess)
            .unwrap_or(Encoding::LocaleDefault)
    }
}

#[derive(Debug, Default)]
struct State {
    lines: LinePositionArray,
    indexed_size: u64,
    max_length: usize,
    content_hash: u64,
    encoding_guess: Option<Encoding>,
    forced_encoding: Option<Encoding>,
}

impl State {
    fn snapshot(&self) -> IndexingSnapshot {
        IndexingSnapshot {
            indexed_size: self.indexed_size,
            line_count: self.lines.size(),
            max_length: self.max_length,
            content_hash: self.content_hash,
            encoding_guess: self.encoding_guess,
            forced_encoding: self.forced_encoding,
        }
    }
}

#[derive(Debug, Default)]
pub struct IndexingData {
    inner: RwLock<State>,
}

impl IndexingData {
    pub fn new() -> Self {
        Self::default()
    }

    /// The read accessor: a cheap scalar snapshot taken under a shared lock.
    pub fn snapshot(&self) -> IndexingSnapshot {
        self.inner.read().expect("IndexingData lock poisoned").snapshot()
    }

    /// Byte offset and exclusive end offset of line `i`'s payload (excluding
    /// its terminator), or `None` if `i` is out of range. Takes the shared
    /// lock for the duration of this one lookup.
    pub fn line_bounds(&self, i: usize, line_terminator_width: usize) -> Option<(u64, u64)> {
        let guard = self.inner.read().expect("IndexingData lock poisoned");
        let end = guard.lines.at(i)?;
        let start = guard.lines.line_start(i);
        let payload_end = end.saturating_sub(line_terminator_width as u64).max(start);
        Some((start, payload_end))
    }

    pub fn line_count(&self) -> usize {
        self.inner.read().expect("IndexingData lock poisoned").lines.size()
    }

    /// The mutate accessor: exclusive, used only by the indexing worker.
    /// `block` is the raw bytes just read, `max_len_in_batch` is the widest
    /// expanded-column length found while scanning it, `positions` the line
    /// terminators found in it, and `detected_encoding` the encoding sniffed
    /// from it (only meaningful on the very first batch).
    pub fn add_all(
        &self,
        block: &[u8],
        max_len_in_batch: usize,
        positions: &LinePositionArray,
        detected_encoding: Option<Encoding>,
    ) {
        let mut guard = self.inner.write().expect("IndexingData lock poisoned");
        guard.content_hash = rolling_hash(guard.content_hash, block);
        guard.indexed_size += block.len() as u64;
        if max_len_in_batch > guard.max_length {
            guard.max_length = max_len_in_batch;
        }
        guard.lines.append_batch(positions);
        if guard.encoding_guess.is_none() {
            guard.encoding_guess = detected_encoding;
        }
    }

    /// Reset to the empty state. Called at the start of a full re-index.
    pub fn clear(&self) {
        let mut guard = self.inner.write().expect("IndexingData lock poisoned");
        *guard = State::default();
    }

    /// Pin the display/decode encoding regardless of what was (or will be)
    /// detected. Persists across `clear()` calls performed for partial
    /// re-indexing but is itself reset by a full re-index via `clear()`.
    pub fn force_encoding(&self, encoding: Encoding) {
        self.inner.write().expect("IndexingData lock poisoned").forced_encoding = Some(encoding);
    }

    /// Explicitly set the detected-encoding guess, overwriting any prior
    /// guess. Distinct from the implicit "first batch wins" behaviour inside
    /// `add_all`.
    pub fn set_encoding_guess(&self, encoding: Encoding) {
        self.inner.write().expect("IndexingData lock poisoned").encoding_guess = Some(encoding);
    }

    pub fn set_fake_final_lf(&self, value: bool) {
        self.inner
            .write()
            .expect("IndexingData lock poisoned")
            .lines
            .set_fake_final_lf(value);
    }

    /// Called once at EOF: if the file has trailing bytes past the last
    /// recorded terminator, record a synthetic entry at `file_size + 1` so
    /// the last (unterminated) line stays addressable (spec §4.4 step 3).
    /// A no-op if the file already ends cleanly on a terminator.
    pub fn finalize_fake_final_lf(&self, file_size: u64) {
        let mut guard = self.inner.write().expect("IndexingData lock poisoned");
        let last_real = if guard.lines.fake_final_lf() {
            guard.lines.size().checked_sub(2).and_then(|i| guard.lines.at(i)).unwrap_or(0)
        } else {
            guard.lines.size().checked_sub(1).and_then(|i| guard.lines.at(i)).unwrap_or(0)
        };
        if last_real < file_size {
            guard.lines.append(file_size + 1);
            guard.lines.set_fake_final_lf(true);
        }
    }
}

/// FNV-1a rolling hash, folded across successive blocks. Used by
/// `IndexingEngine::ChangeCheck` to cheaply tell "file grew but unchanged
/// prefix" apart from "file was truncated/rewritten" without re-reading the
/// whole thing.
pub(crate) fn rolling_hash(seed: u64, block: &[u8]) -> u64 {
    const FNV_PRIME: u64 = 0x100_0000_01b3;
    let mut hash = if seed == 0 { 0xcbf2_9ce4_8422_2325 } else { seed };
    for &byte in block {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}
