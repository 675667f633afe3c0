// logcore - filtered_log_data.rs
//
// C10: FilteredLogData — a composite, line-indexed view over one LogData
// that merges search matches (C9) and marks (C6) under a visibility mode.
// Owns the SearchEngine/SearchData pair for this view and a background
// worker thread, mirroring LogData's own worker/queue shape (src/log_data.rs)
// generalised from "one pending indexing op" to "one pending search job".
//
// Parent reference: the spec calls this a "weak collaborator (non-owning)"
// of its LogData. A borrowed `&'a LogData` would model that precisely, but
// this type's background worker thread needs `'static` closures — so the
// relationship is implemented as `Arc<LogData>` instead (see DESIGN.md).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

use crate::config::EngineConfig;
use crate::log_data::LogData;
use crate::marks::{Mark, Marks};
use crate::search::{
    CacheEntry, CacheKey, RegularExpression, SearchData, SearchEngine, SearchOutcome, SearchProgress,
    SearchResultBitmap, SearchResultsCache,
};
use crate::util::error::EngineError;

/// Which lines a `FilteredLogData` presents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    MatchesOnly,
    MarksOnly,
    MarksAndMatches,
}

/// Tag on a filtered-index entry in `MarksAndMatches` visibility. A line
/// that is both a mark and a match is tagged `Mark` and appears once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilteredLineType {
    Match,
    Mark,
}

#[derive(Debug, Clone, Copy)]
struct CombinedItem {
    line: u64,
    kind: FilteredLineType,
}

#[derive(Debug, Default)]
struct CombinedCache {
    items: Vec<CombinedItem>,
    dirty: bool,
}

#[derive(Debug, Clone)]
struct ActiveSearch {
    regex: RegularExpression,
    pattern_text: String,
    case_sensitive: bool,
    inverse: bool,
    boolean: bool,
    plain_text: bool,
    start_line: u64,
    end_line: u64,
}

impl ActiveSearch {
    fn cache_key(&self) -> CacheKey {
        CacheKey {
            pattern: self.pattern_text.clone(),
            case_sensitive: self.case_sensitive,
            inverse: self.inverse,
            boolean: self.boolean,
            plain_text: self.plain_text,
            start_line: self.start_line,
            end_line: self.end_line,
        }
    }
}

enum SearchJob {
    Full(ActiveSearch),
    Update { end_line: u64 },
}

struct Shared {
    source: Arc<LogData>,
    engine: SearchEngine,
    search_data: SearchData,
    marks: Mutex<Marks>,
    marks_max_length: Mutex<usize>,
    visibility: Mutex<Visibility>,
    combined: Mutex<CombinedCache>,
    cache: Mutex<SearchResultsCache>,
    active_search: Mutex<Option<ActiveSearch>>,
    pending: Mutex<Option<SearchJob>>,
    current_cancel: Mutex<Option<Arc<AtomicBool>>>,
    wake: Condvar,
    wake_lock: Mutex<()>,
    shutdown: AtomicBool,
    progress_tx: std::sync::mpsc::Sender<SearchProgress>,
    finished_tx: std::sync::mpsc::Sender<SearchOutcome>,
}

fn enqueue(shared: &Arc<Shared>, job: SearchJob) {
    *shared.pending.lock().expect("pending lock poisoned") = Some(job);
    let _guard = shared.wake_lock.lock().expect("wake lock poisoned");
    shared.wake.notify_one();
}

fn wait_for_next_job(shared: &Shared) -> Option<SearchJob> {
    let mut guard = shared.wake_lock.lock().expect("wake lock poisoned");
    loop {
        if let Some(job) = shared.pending.lock().expect("pending lock poisoned").take() {
            return Some(job);
        }
        if shared.shutdown.load(Ordering::Relaxed) {
            return None;
        }
        guard = shared.wake.wait(guard).expect("wake condvar poisoned");
    }
}

fn mark_combined_dirty(shared: &Shared) {
    shared.combined.lock().expect("combined lock poisoned").dirty = true;
}

/// Cache policy (spec §4.10): once a search completes and covers the
/// requested range end to end, insert/refresh the cache entry and evict
/// the oldest entries until the total cached match count is back under
/// the configured cap.
fn maybe_cache_insert(shared: &Arc<Shared>, active: &ActiveSearch) {
    let snap = shared.search_data.snapshot();
    if snap.nb_lines_processed < active.end_line {
        return;
    }
    let entry = CacheEntry {
        matches: shared.search_data.matches(),
        max_length: snap.max_length,
    };
    shared.cache.lock().expect("cache lock poisoned").insert(active.cache_key(), entry);
}

fn execute(shared: &Arc<Shared>, job: SearchJob) {
    match job {
        SearchJob::Full(active) => {
            let cancel = Arc::new(AtomicBool::new(false));
            *shared.current_cancel.lock().expect("cancel lock poisoned") = Some(Arc::clone(&cancel));

            let progress_tx = shared.progress_tx.clone();
            let outcome = shared.engine.start_full(
                shared.source.as_ref(),
                &active.regex,
                active.start_line,
                active.end_line,
                &shared.search_data,
                &cancel,
                |p| {
                    let _ = progress_tx.send(p);
                },
            );

            *shared.current_cancel.lock().expect("cancel lock poisoned") = None;
            mark_combined_dirty(shared);
            let _ = shared.finished_tx.send(outcome);

            if outcome == SearchOutcome::Completed {
                maybe_cache_insert(shared, &active);
                *shared.active_search.lock().expect("active search lock poisoned") = Some(active);
            }
        }
        SearchJob::Update { end_line } => {
            let active = shared.active_search.lock().expect("active search lock poisoned").clone();
            let Some(mut active) = active else {
                return;
            };

            let cancel = Arc::new(AtomicBool::new(false));
            *shared.current_cancel.lock().expect("cancel lock poisoned") = Some(Arc::clone(&cancel));

            let progress_tx = shared.progress_tx.clone();
            let outcome = shared.engine.start_update(
                shared.source.as_ref(),
                &active.regex,
                end_line,
                0,
                &shared.search_data,
                &cancel,
                |p| {
                    let _ = progress_tx.send(p);
                },
            );

            *shared.current_cancel.lock().expect("cancel lock poisoned") = None;
            mark_combined_dirty(shared);
            let _ = shared.finished_tx.send(outcome);

            if outcome == SearchOutcome::Completed {
                active.end_line = end_line.max(active.end_line);
                maybe_cache_insert(shared, &active);
                *shared.active_search.lock().expect("active search lock poisoned") = Some(active);
            }
        }
    }
}

fn run_worker(shared: Arc<Shared>) {
    loop {
        let Some(job) = wait_for_next_job(&shared) else {
            return;
        };
        execute(&shared, job);
    }
}

fn rebuild_combined(matches: &SearchResultBitmap, marks: &Marks) -> Vec<CombinedItem> {
    let mut out = Vec::with_capacity(matches.cardinality() + marks.size());
    let mut match_iter = matches.iter().peekable();
    let mut mark_iter = marks.lines().peekable();
    loop {
        match (match_iter.peek().copied(), mark_iter.peek().copied()) {
            (None, None) => break,
            (Some(m), None) => {
                out.push(CombinedItem { line: m, kind: FilteredLineType::Match });
                match_iter.next();
            }
            (None, Some(k)) => {
                out.push(CombinedItem { line: k, kind: FilteredLineType::Mark });
                mark_iter.next();
            }
            (Some(m), Some(k)) => match m.cmp(&k) {
                std::cmp::Ordering::Less => {
                    out.push(CombinedItem { line: m, kind: FilteredLineType::Match });
                    match_iter.next();
                }
                std::cmp::Ordering::Greater => {
                    out.push(CombinedItem { line: k, kind: FilteredLineType::Mark });
                    mark_iter.next();
                }
                std::cmp::Ordering::Equal => {
                    // A line that is both a match and a mark is tagged Mark
                    // and counted once (spec §8 scenario 4).
                    out.push(CombinedItem { line: k, kind: FilteredLineType::Mark });
                    match_iter.next();
                    mark_iter.next();
                }
            },
        }
    }
    out
}

/// A composite, line-indexed view over a `LogData`: the current search's
/// matches, the user's marks, or both, depending on `Visibility`.
pub struct FilteredLogData {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
    progress_events: Mutex<crate::events::EventQueue<SearchProgress>>,
    finished_events: Mutex<crate::events::EventQueue<SearchOutcome>>,
}

impl FilteredLogData {
    pub fn new(source: Arc<LogData>, config: &EngineConfig) -> Self {
        let mut progress_events = crate::events::EventQueue::empty();
        let mut finished_events = crate::events::EventQueue::empty();
        let progress_tx = progress_events.attach();
        let finished_tx = finished_events.attach();

        let engine = SearchEngine::new(
            config.search_chunk_size as u64,
            config.effective_matcher_threads(),
            config.prefetch_chunks(),
        );

        let shared = Arc::new(Shared {
            source,
            engine,
            search_data: SearchData::new(),
            marks: Mutex::new(Marks::new()),
            marks_max_length: Mutex::new(0),
            visibility: Mutex::new(Visibility::MatchesOnly),
            combined: Mutex::new(CombinedCache::default()),
            cache: Mutex::new(SearchResultsCache::new(config.search_cache_capacity)),
            active_search: Mutex::new(None),
            pending: Mutex::new(None),
            current_cancel: Mutex::new(None),
            wake: Condvar::new(),
            wake_lock: Mutex::new(()),
            shutdown: AtomicBool::new(false),
            progress_tx,
            finished_tx,
        });

        let worker = {
            let shared = Arc::clone(&shared);
            thread::spawn(move || run_worker(shared))
        };

        Self {
            shared,
            worker: Some(worker),
            progress_events: Mutex::new(progress_events),
            finished_events: Mutex::new(finished_events),
        }
    }

    /// Compile `pattern` and start (or instantly restore from cache) a full
    /// search over `[start, end)`, defaulting to the whole file.
    pub fn run_search(
        &self,
        pattern: &str,
        case_sensitive: bool,
        inverse: bool,
        boolean: bool,
        plain_text: bool,
        start: Option<u64>,
        end: Option<u64>,
    ) -> Result<(), EngineError> {
        let regex = RegularExpression::compile(pattern, case_sensitive, inverse, boolean, plain_text)?;

        let start_line = start.unwrap_or(0);
        let end_line = end.unwrap_or_else(|| self.shared.source.get_nb_line());

        let active = ActiveSearch {
            regex,
            pattern_text: pattern.to_string(),
            case_sensitive,
            inverse,
            boolean,
            plain_text,
            start_line,
            end_line,
        };

        self.interrupt_search();

        if let Some(entry) = self.shared.cache.lock().expect("cache lock poisoned").get(&active.cache_key()).cloned() {
            self.shared.search_data.install(entry.matches, entry.max_length, end_line);
            mark_combined_dirty(&self.shared);
            *self.shared.active_search.lock().expect("active search lock poisoned") = Some(active);
            let _ = self.shared.finished_tx.send(SearchOutcome::Completed);
            let _ = self.shared.progress_tx.send(SearchProgress {
                nb_matches: self.shared.search_data.snapshot().nb_matches,
                percent: 100,
            });
            return Ok(());
        }

        enqueue(&self.shared, SearchJob::Full(active));
        Ok(())
    }

    /// Resume the current search up to `end` (defaulting to the source's
    /// current line count). A no-op if no search has been started.
    pub fn update_search(&self, end: Option<u64>) {
        if self.shared.active_search.lock().expect("active search lock poisoned").is_none() {
            return;
        }
        let end_line = end.unwrap_or_else(|| self.shared.source.get_nb_line());
        enqueue(&self.shared, SearchJob::Update { end_line });
    }

    pub fn interrupt_search(&self) {
        if let Some(flag) = &*self.shared.current_cancel.lock().expect("cancel lock poisoned") {
            flag.store(true, Ordering::Relaxed);
        }
    }

    pub fn clear_search(&self) {
        self.interrupt_search();
        self.shared.search_data.clear();
        *self.shared.active_search.lock().expect("active search lock poisoned") = None;
        mark_combined_dirty(&self.shared);
    }

    pub fn add_mark(&self, line: u64, ch: Option<char>) {
        self.shared.marks.lock().expect("marks lock poisoned").add(line, ch);
        let line_len = self.shared.source.get_line_length(line).unwrap_or(0);
        let mut max_len = self.shared.marks_max_length.lock().expect("marks max length lock poisoned");
        if line_len > *max_len {
            *max_len = line_len;
        }
        mark_combined_dirty(&self.shared);
    }

    pub fn delete_mark(&self, line: u64) -> bool {
        let removed = self.shared.marks.lock().expect("marks lock poisoned").remove(line);
        if removed {
            self.recompute_marks_max_length_if_needed();
            mark_combined_dirty(&self.shared);
        }
        removed
    }

    pub fn delete_mark_by_char(&self, ch: char) -> bool {
        let removed = self.shared.marks.lock().expect("marks lock poisoned").remove_by_char(ch);
        if removed {
            self.recompute_marks_max_length_if_needed();
            mark_combined_dirty(&self.shared);
        }
        removed
    }

    fn recompute_marks_max_length_if_needed(&self) {
        let marks = self.shared.marks.lock().expect("marks lock poisoned");
        let max = marks
            .lines()
            .filter_map(|l| self.shared.source.get_line_length(l))
            .max()
            .unwrap_or(0);
        *self.shared.marks_max_length.lock().expect("marks max length lock poisoned") = max;
    }

    pub fn clear_marks(&self) {
        self.shared.marks.lock().expect("marks lock poisoned").clear();
        *self.shared.marks_max_length.lock().expect("marks max length lock poisoned") = 0;
        mark_combined_dirty(&self.shared);
    }

    pub fn get_marks(&self) -> Vec<Mark> {
        self.shared.marks.lock().expect("marks lock poisoned").iter().copied().collect()
    }

    pub fn set_visibility(&self, mode: Visibility) {
        *self.shared.visibility.lock().expect("visibility lock poisoned") = mode;
        mark_combined_dirty(&self.shared);
    }

    fn visibility(&self) -> Visibility {
        *self.shared.visibility.lock().expect("visibility lock poisoned")
    }

    fn combined(&self) -> Vec<CombinedItem> {
        let mut guard = self.shared.combined.lock().expect("combined lock poisoned");
        if guard.dirty || guard.items.is_empty() {
            let matches = self.shared.search_data.matches();
            let marks = self.shared.marks.lock().expect("marks lock poisoned");
            guard.items = rebuild_combined(&matches, &marks);
            guard.dirty = false;
        }
        guard.items.clone()
    }

    pub fn get_nb_line(&self) -> u64 {
        match self.visibility() {
            Visibility::MatchesOnly => self.shared.search_data.snapshot().nb_matches as u64,
            Visibility::MarksOnly => self.shared.marks.lock().expect("marks lock poisoned").size() as u64,
            Visibility::MarksAndMatches => self.combined().len() as u64,
        }
    }

    pub fn get_matching_line_number(&self, filtered_index: u64) -> Option<u64> {
        match self.visibility() {
            Visibility::MatchesOnly => self.shared.search_data.matches().nth(filtered_index as usize),
            Visibility::MarksOnly => self
                .shared
                .marks
                .lock()
                .expect("marks lock poisoned")
                .get_marked_line_by_index(filtered_index as usize),
            Visibility::MarksAndMatches => self.combined().get(filtered_index as usize).map(|it| it.line),
        }
    }

    pub fn get_line_index_number(&self, absolute_line: u64) -> Option<u64> {
        match self.visibility() {
            Visibility::MatchesOnly => self.shared.search_data.matches().index_of(absolute_line).map(|i| i as u64),
            Visibility::MarksOnly => self
                .shared
                .marks
                .lock()
                .expect("marks lock poisoned")
                .iter()
                .position(|m| m.line == absolute_line)
                .map(|i| i as u64),
            Visibility::MarksAndMatches => {
                self.combined().iter().position(|it| it.line == absolute_line).map(|i| i as u64)
            }
        }
    }

    pub fn filtered_line_type_by_index(&self, filtered_index: u64) -> Option<FilteredLineType> {
        match self.visibility() {
            Visibility::MatchesOnly => {
                (filtered_index < self.get_nb_line()).then_some(FilteredLineType::Match)
            }
            Visibility::MarksOnly => (filtered_index < self.get_nb_line()).then_some(FilteredLineType::Mark),
            Visibility::MarksAndMatches => self.combined().get(filtered_index as usize).map(|it| it.kind),
        }
    }

    pub fn get_line_string(&self, filtered_index: u64) -> Option<String> {
        let abs = self.get_matching_line_number(filtered_index)?;
        self.shared.source.get_line_string(abs)
    }

    pub fn get_expanded_line_string(&self, filtered_index: u64) -> Option<String> {
        let abs = self.get_matching_line_number(filtered_index)?;
        self.shared.source.get_expanded_line_string(abs)
    }

    pub fn get_lines(&self, first: u64, count: u64) -> Vec<String> {
        (first..first.saturating_add(count)).filter_map(|i| self.get_line_string(i)).collect()
    }

    pub fn get_expanded_lines(&self, first: u64, count: u64) -> Vec<String> {
        (first..first.saturating_add(count)).filter_map(|i| self.get_expanded_line_string(i)).collect()
    }

    pub fn get_line_length(&self, filtered_index: u64) -> Option<usize> {
        let abs = self.get_matching_line_number(filtered_index)?;
        self.shared.source.get_line_length(abs)
    }

    pub fn get_max_length(&self) -> usize {
        match self.visibility() {
            Visibility::MatchesOnly => self.shared.search_data.snapshot().max_length,
            Visibility::MarksOnly => *self.shared.marks_max_length.lock().expect("marks max length lock poisoned"),
            Visibility::MarksAndMatches => {
                let search_max = self.shared.search_data.snapshot().max_length;
                let marks_max = *self.shared.marks_max_length.lock().expect("marks max length lock poisoned");
                search_max.max(marks_max)
            }
        }
    }

    pub fn drain_progress(&self) -> Vec<SearchProgress> {
        self.progress_events.lock().expect("progress events lock poisoned").drain()
    }

    pub fn drain_finished(&self) -> Vec<SearchOutcome> {
        self.finished_events.lock().expect("finished events lock poisoned").drain()
    }
}

impl Drop for FilteredLogData {
    fn drop(&mut self) {
        self.interrupt_search();
        self.shared.shutdown.store(true, Ordering::Relaxed);
        {
            let _guard = self.shared.wake_lock.lock().expect("wake lock poisoned");
            self.shared.wake.notify_one();
        }
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;

    fn attached_log(contents: &[u8]) -> (Arc<LogData>, tempfile::TempPath) {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents).unwrap();
        f.flush().unwrap();
        let path = f.into_temp_path();

        let config = EngineConfig::default();
        let log = Arc::new(LogData::new(&config, None));
        log.attach(&path);
        for _ in 0..200 {
            if !log.drain_finished().is_empty() {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        (log, path)
    }

    fn wait_for_search(view: &FilteredLogData) -> SearchOutcome {
        for _ in 0..200 {
            let finished = view.drain_finished();
            if let Some(outcome) = finished.into_iter().next() {
                return outcome;
            }
            thread::sleep(Duration::from_millis(10));
        }
        panic!("searchFinished never arrived");
    }

    fn numbered_lines(n: usize, marker_every: usize, marker: &str) -> Vec<u8> {
        let mut out = String::new();
        for i in 0..n {
            if i % marker_every == 4 {
                out.push_str(&format!("row {i:03} {marker}\n"));
            } else {
                out.push_str(&format!("row {i:03} plain\n"));
            }
        }
        out.into_bytes()
    }

    #[test]
    fn matches_only_search_finds_lines_and_cache_hit_is_instant() {
        let (log, _path) = attached_log(&numbered_lines(100, 10, "NEEDLE"));
        let config = EngineConfig::default();
        let view = FilteredLogData::new(Arc::clone(&log), &config);

        view.run_search("NEEDLE", true, false, false, false, None, None).unwrap();
        assert_eq!(wait_for_search(&view), SearchOutcome::Completed);
        assert_eq!(view.get_nb_line(), 10);
        assert_eq!(view.get_matching_line_number(0), Some(4));
        assert_eq!(view.get_matching_line_number(9), Some(94));

        // Same pattern over the same range should be served from the
        // cache: the finished event is posted synchronously from
        // `run_search` itself, so it's available immediately.
        view.run_search("NEEDLE", true, false, false, false, None, None).unwrap();
        let finished = view.drain_finished();
        assert_eq!(finished, vec![SearchOutcome::Completed]);
        assert_eq!(view.get_nb_line(), 10);
    }

    #[test]
    fn marks_and_matches_merge_tags_overlap_as_mark() {
        let (log, _path) = attached_log(&numbered_lines(100, 10, "NEEDLE"));
        let config = EngineConfig::default();
        let view = FilteredLogData::new(Arc::clone(&log), &config);

        view.run_search("NEEDLE", true, false, false, false, None, None).unwrap();
        wait_for_search(&view);

        for line in [10, 25, 44] {
            view.add_mark(line, None);
        }
        view.set_visibility(Visibility::MarksAndMatches);

        let expected = vec![4, 10, 14, 24, 25, 34, 44, 54, 64, 74, 84, 94];
        let got: Vec<u64> = (0..view.get_nb_line()).map(|i| view.get_matching_line_number(i).unwrap()).collect();
        assert_eq!(got, expected);

        for (i, line) in expected.iter().enumerate() {
            let expected_kind = if [10, 25, 44].contains(line) {
                FilteredLineType::Mark
            } else {
                FilteredLineType::Match
            };
            assert_eq!(view.filtered_line_type_by_index(i as u64), Some(expected_kind));
        }
    }

    #[test]
    fn clear_search_resets_matches_only_view() {
        let (log, _path) = attached_log(&numbered_lines(20, 10, "NEEDLE"));
        let config = EngineConfig::default();
        let view = FilteredLogData::new(Arc::clone(&log), &config);

        view.run_search("NEEDLE", true, false, false, false, None, None).unwrap();
        wait_for_search(&view);
        assert_eq!(view.get_nb_line(), 2);

        view.clear_search();
        assert_eq!(view.get_nb_line(), 0);
    }
}
