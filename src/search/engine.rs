// logcore - search/engine.rs
//
// C9: SearchEngine + SearchData.
//
// Pipeline mirrors the indexing engine's reader/parser/progress shape
// (index::engine), generalised to three roles: a serial chunk reader, a
// pool of M matcher threads, and a serial combiner. `std::thread::scope`
// lets the pipeline borrow the caller's `LineSource`/`RegularExpression`
// directly instead of wrapping them in `Arc<dyn ... + 'static>`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use crossbeam_channel::bounded;

use crate::search::bitmap::SearchResultBitmap;
use crate::search::pattern::RegularExpression;
use crate::util::text::display_width;

/// Capability a search can run over: a read-only, line-indexed byte source.
/// `LogData` implements this; the engine never depends on the concrete
/// facade type (Design Notes §9, "inheritance hierarchy -> capability
/// abstraction").
pub trait LineSource: Sync {
    /// Highest line index currently indexed (exclusive upper bound).
    fn nb_lines(&self) -> u64;
    /// Raw (undecoded) bytes for up to `count` lines starting at `start`.
    /// May return fewer than `count` entries if the source doesn't have
    /// that many lines yet.
    fn get_lines_raw(&self, start: u64, count: u64) -> Vec<Vec<u8>>;
    /// Decode one raw line through the display codec, expanding nothing.
    fn decode_line(&self, raw: &[u8]) -> String;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchSnapshot {
    pub nb_matches: usize,
    pub max_length: usize,
    pub nb_lines_processed: u64,
}

#[derive(Debug, Clone)]
pub struct DrainResult {
    pub new_matches: SearchResultBitmap,
    pub max_length: usize,
    pub nb_lines_processed: u64,
}

#[derive(Debug, Default)]
struct SearchState {
    matches: SearchResultBitmap,
    new_matches: SearchResultBitmap,
    max_length: usize,
    nb_lines_processed: u64,
}

/// Thread-safe aggregate owned by one `FilteredLogData`. Mutated only by
/// the combiner thread of whatever search is currently running; read from
/// the caller thread via `snapshot`/`drain`.
#[derive(Debug, Default)]
pub struct SearchData {
    inner: RwLock<SearchState>,
}

impl SearchData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> SearchSnapshot {
        let guard = self.inner.read().expect("SearchData lock poisoned");
        SearchSnapshot {
            nb_matches: guard.matches.cardinality(),
            max_length: guard.max_length,
            nb_lines_processed: guard.nb_lines_processed,
        }
    }

    /// Every matching line found so far, in ascending order. Cheap to call
    /// but clones the bitmap; used by `FilteredLogData`'s read-shape methods.
    pub fn matches(&self) -> SearchResultBitmap {
        self.inner.read().expect("SearchData lock poisoned").matches.clone()
    }

    /// Take the matches accumulated since the last drain, clearing them.
    pub fn drain(&self) -> DrainResult {
        let mut guard = self.inner.write().expect("SearchData lock poisoned");
        let new_matches = std::mem::take(&mut guard.new_matches);
        DrainResult {
            new_matches,
            max_length: guard.max_length,
            nb_lines_processed: guard.nb_lines_processed,
        }
    }

    pub fn clear(&self) {
        let mut guard = self.inner.write().expect("SearchData lock poisoned");
        *guard = SearchState::default();
    }

    /// Drop any recorded match with `line >= from_line_inclusive`. Used by
    /// `start_update` before rescanning the previously-last-seen line.
    pub fn remove_from(&self, from_line_inclusive: u64) {
        let mut guard = self.inner.write().expect("SearchData lock poisoned");
        guard.matches.remove_from(from_line_inclusive);
        guard.new_matches.remove_from(from_line_inclusive);
    }

    /// Install a previously-computed result set outright, bypassing a scan
    /// (spec §4.10 `runSearch`: a `SearchResultsCache` hit installs the
    /// cached bitmap directly instead of starting the engine).
    pub fn install(&self, matches: SearchResultBitmap, max_length: usize, nb_lines_processed: u64) {
        let mut guard = self.inner.write().expect("SearchData lock poisoned");
        guard.new_matches = matches.clone();
        guard.matches = matches;
        guard.max_length = max_length;
        guard.nb_lines_processed = nb_lines_processed;
    }

    fn merge_partial(&self, partial: PartialResult) {
        let mut guard = self.inner.write().expect("SearchData lock poisoned");
        guard.matches.or_with(&partial.matches);
        guard.new_matches.or_with(&partial.matches);
        if partial.max_length > guard.max_length {
            guard.max_length = partial.max_length;
        }
        let advanced_to = partial.chunk_start + partial.processed_lines;
        if advanced_to > guard.nb_lines_processed {
            guard.nb_lines_processed = advanced_to;
        }
    }
}

struct Chunk {
    start: u64,
    raw_lines: Vec<Vec<u8>>,
}

struct PartialResult {
    chunk_start: u64,
    matches: SearchResultBitmap,
    max_length: usize,
    processed_lines: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchProgress {
    pub nb_matches: usize,
    pub percent: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchOutcome {
    Completed,
    Interrupted,
}

pub struct SearchEngine {
    chunk_size: u64,
    matcher_threads: usize,
    prefetch_chunks: usize,
}

impl SearchEngine {
    pub fn new(chunk_size: u64, matcher_threads: usize, prefetch_chunks: usize) -> Self {
        Self {
            chunk_size,
            matcher_threads: matcher_threads.max(1),
            prefetch_chunks: prefetch_chunks.max(1),
        }
    }

    /// C9 `startFull`: clear accumulated results, then scan `[start_line,
    /// end_line)` from the beginning.
    pub fn start_full(
        &self,
        source: &(dyn LineSource + Sync),
        pattern: &RegularExpression,
        start_line: u64,
        end_line: u64,
        data: &SearchData,
        cancel: &Arc<AtomicBool>,
        progress: impl FnMut(SearchProgress),
    ) -> SearchOutcome {
        data.clear();
        self.scan(source, pattern, start_line, end_line, data, cancel, progress)
    }

    /// C9 `startUpdate`: resume at `max(lastProcessed, resumeFrom) - 1`,
    /// rescanning (and discarding any stale match on) the last previously
    /// seen line in case it was incomplete at the time.
    pub fn start_update(
        &self,
        source: &(dyn LineSource + Sync),
        pattern: &RegularExpression,
        end_line: u64,
        resume_from: u64,
        data: &SearchData,
        cancel: &Arc<AtomicBool>,
        progress: impl FnMut(SearchProgress),
    ) -> SearchOutcome {
        let last_processed = data.snapshot().nb_lines_processed;
        let start_line = last_processed.max(resume_from).saturating_sub(1);
        data.remove_from(start_line);
        self.scan(source, pattern, start_line, end_line, data, cancel, progress)
    }

    fn scan(
        &self,
        source: &(dyn LineSource + Sync),
        pattern: &RegularExpression,
        start_line: u64,
        end_line: u64,
        data: &SearchData,
        cancel: &Arc<AtomicBool>,
        mut progress: impl FnMut(SearchProgress),
    ) -> SearchOutcome {
        if end_line <= start_line {
            return SearchOutcome::Completed;
        }

        let (chunk_tx, chunk_rx) = bounded::<Chunk>(self.prefetch_chunks);
        let (result_tx, result_rx) = bounded::<PartialResult>(self.prefetch_chunks * self.matcher_threads);

        let total = end_line - start_line;
        let mut last_percent: u8 = 0;
        let mut last_nb_matches: usize = 0;
        let mut interrupted = false;

        std::thread::scope(|scope| {
            let reader_cancel = Arc::clone(cancel);
            let chunk_size = self.chunk_size;
            scope.spawn(move || {
                let mut cursor = start_line;
                while cursor < end_line {
                    if reader_cancel.load(Ordering::Relaxed) {
                        break;
                    }
                    let take = (end_line - cursor).min(chunk_size);
                    let raw = source.get_lines_raw(cursor, take);
                    if raw.is_empty() {
                        break;
                    }
                    let n = raw.len() as u64;
                    let chunk = Chunk { start: cursor, raw_lines: raw };
                    if chunk_tx.send(chunk).is_err() {
                        break;
                    }
                    cursor += n;
                }
                // chunk_tx dropped here, closing the channel.
            });

            for _ in 0..self.matcher_threads {
                let rx = chunk_rx.clone();
                let tx = result_tx.clone();
                let matcher = pattern.create_matcher();
                let worker_cancel = Arc::clone(cancel);
                scope.spawn(move || {
                    for chunk in rx.iter() {
                        if worker_cancel.load(Ordering::Relaxed) {
                            break;
                        }
                        let mut bitmap = SearchResultBitmap::new();
                        let mut max_length = 0usize;
                        for (i, raw) in chunk.raw_lines.iter().enumerate() {
                            let line = source.decode_line(raw);
                            if matcher.has_match(&line) {
                                bitmap.add(chunk.start + i as u64);
                                max_length = max_length.max(display_width(&line));
                            }
                        }
                        let processed_lines = chunk.raw_lines.len() as u64;
                        let partial = PartialResult {
                            chunk_start: chunk.start,
                            matches: bitmap,
                            max_length,
                            processed_lines,
                        };
                        if tx.send(partial).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(result_tx);
            drop(chunk_rx);

            for partial in result_rx.iter() {
                data.merge_partial(partial);
                if cancel.load(Ordering::Relaxed) {
                    interrupted = true;
                }

                let snap = data.snapshot();
                let processed_in_range = snap.nb_lines_processed.saturating_sub(start_line).min(total);
                let percent = ((100 * processed_in_range) / total) as u8;
                if percent > last_percent || snap.nb_matches > last_nb_matches {
                    last_percent = percent;
                    last_nb_matches = snap.nb_matches;
                    progress(SearchProgress { nb_matches: snap.nb_matches, percent });
                }
            }
        });

        if interrupted {
            return SearchOutcome::Interrupted;
        }

        if last_percent < 100 {
            progress(SearchProgress { nb_matches: data.snapshot().nb_matches, percent: 100 });
        }
        SearchOutcome::Completed
    }
}
