// logcore - log_data.rs
//
// C5: LogData — the public façade over a single file's IndexingData. Owns
// a background worker thread (grounded on the teacher's one-thread-per-tail
// shape in `app::tail`), an at-most-one-pending operation queue with
// Full > Partial > ChangeCheck precedence, and the `loadingProgressed` /
// `loadingFinished` / `fileChanged` event queues a caller drains from its
// own thread.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::SystemTime;

use crate::config::EngineConfig;
use crate::events::EventQueue;
use crate::index::{decode_encoding, Encoding, IndexingData, IndexingEngine, IndexingOperation, IndexingOutcome};
use crate::search::LineSource;
use crate::util::error::{FileChangeKind, LoadingStatus};
use crate::util::text::{display_width, expand_tabs};
use crate::watcher::FileWatcher;

fn precedence(op: IndexingOperation) -> u8 {
    match op {
        IndexingOperation::Full => 2,
        IndexingOperation::Partial => 1,
        IndexingOperation::ChangeCheck => 0,
    }
}

struct Shared {
    data: IndexingData,
    engine: IndexingEngine,
    path: Mutex<Option<PathBuf>>,
    forced_encoding: Mutex<Option<Encoding>>,
    display_encoding: Mutex<Option<Encoding>>,
    pending: Mutex<Option<IndexingOperation>>,
    current_cancel: Mutex<Option<Arc<AtomicBool>>>,
    wake: Condvar,
    wake_lock: Mutex<()>,
    shutdown: AtomicBool,
    watcher: Option<Arc<FileWatcher>>,
    watcher_registered: AtomicBool,
    progress_tx: std::sync::mpsc::Sender<u8>,
    finished_tx: std::sync::mpsc::Sender<LoadingStatus>,
    change_tx: std::sync::mpsc::Sender<FileChangeKind>,
}

/// Enqueue `op`, replacing any lower- or equal-precedence pending operation
/// (spec §4.5: "at most one is pending; a newer enqueue replaces any
/// pending one of lesser precedence").
fn enqueue(shared: &Arc<Shared>, op: IndexingOperation) {
    {
        let mut pending = shared.pending.lock().expect("pending lock poisoned");
        let replace = match *pending {
            None => true,
            Some(existing) => precedence(op) >= precedence(existing),
        };
        if replace {
            *pending = Some(op);
        }
    }
    let _guard = shared.wake_lock.lock().expect("wake lock poisoned");
    shared.wake.notify_one();
}

fn wait_for_next_op(shared: &Shared) -> Option<IndexingOperation> {
    let mut guard = shared.wake_lock.lock().expect("wake lock poisoned");
    loop {
        if let Some(op) = shared.pending.lock().expect("pending lock poisoned").take() {
            return Some(op);
        }
        if shared.shutdown.load(Ordering::Relaxed) {
            return None;
        }
        guard = shared.wake.wait(guard).expect("wake condvar poisoned");
    }
}

fn execute(shared: &Arc<Shared>, op: IndexingOperation) {
    let path = shared.path.lock().expect("path lock poisoned").clone();
    let Some(path) = path else { return };

    match op {
        IndexingOperation::Full | IndexingOperation::Partial => {
            let cancel = Arc::new(AtomicBool::new(false));
            *shared.current_cancel.lock().expect("cancel lock poisoned") = Some(Arc::clone(&cancel));

            let forced = if op == IndexingOperation::Full {
                *shared.forced_encoding.lock().expect("forced encoding lock poisoned")
            } else {
                None
            };

            let progress_tx = shared.progress_tx.clone();
            let outcome = shared.engine.run(op, &shared.data, &path, &cancel, forced, |p| {
                let _ = progress_tx.send(p);
            });

            *shared.current_cancel.lock().expect("cancel lock poisoned") = None;

            if let IndexingOutcome::Loading(status) = outcome {
                let _ = shared.finished_tx.send(status);
                if status == LoadingStatus::Successful {
                    register_with_watcher(shared, &path);
                }
            }
        }
        IndexingOperation::ChangeCheck => {
            let kind = crate::index::engine::check_change(&shared.data, &path);
            let _ = shared.change_tx.send(kind);
            match kind {
                FileChangeKind::Truncated => enqueue(shared, IndexingOperation::Full),
                FileChangeKind::DataAdded => enqueue(shared, IndexingOperation::Partial),
                FileChangeKind::Unchanged => {}
            }
        }
    }
}

fn register_with_watcher(shared: &Arc<Shared>, path: &Path) {
    let Some(watcher) = &shared.watcher else { return };
    if shared.watcher_registered.swap(true, Ordering::Relaxed) {
        return;
    }
    let weak = Arc::downgrade(shared);
    watcher.add_file(
        path.to_path_buf(),
        Arc::new(move || {
            if let Some(shared) = weak.upgrade() {
                enqueue(&shared, IndexingOperation::ChangeCheck);
            }
        }),
    );
}

fn run_worker(shared: Arc<Shared>) {
    loop {
        let Some(op) = wait_for_next_op(&shared) else {
            return;
        };
        execute(&shared, op);
    }
}

/// Owns one file's index and coordinates a single background worker thread
/// that runs Full/Partial/ChangeCheck operations against it. Safe to read
/// from any thread while indexing runs concurrently (spec §4.5): every
/// getter goes through `IndexingData`'s shared-lock snapshot/line-bounds
/// accessors.
pub struct LogData {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
    progress_events: Mutex<EventQueue<u8>>,
    finished_events: Mutex<EventQueue<LoadingStatus>>,
    change_events: Mutex<EventQueue<FileChangeKind>>,
}

impl LogData {
    pub fn new(config: &EngineConfig, watcher: Option<Arc<FileWatcher>>) -> Self {
        let mut progress_events = EventQueue::empty();
        let mut finished_events = EventQueue::empty();
        let mut change_events = EventQueue::empty();

        let progress_tx = progress_events.attach();
        let finished_tx = finished_events.attach();
        let change_tx = change_events.attach();

        let mut engine = IndexingEngine::new();
        engine.block_size = config.index_block_size;
        engine.read_buffer_size = config.index_read_buffer_size;

        let shared = Arc::new(Shared {
            data: IndexingData::new(),
            engine,
            path: Mutex::new(None),
            forced_encoding: Mutex::new(None),
            display_encoding: Mutex::new(None),
            pending: Mutex::new(None),
            current_cancel: Mutex::new(None),
            wake: Condvar::new(),
            wake_lock: Mutex::new(()),
            shutdown: AtomicBool::new(false),
            watcher,
            watcher_registered: AtomicBool::new(false),
            progress_tx,
            finished_tx,
            change_tx,
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
            change_events: Mutex::new(change_events),
        }
    }

    /// Attach to `path` and enqueue a Full index of it.
    pub fn attach(&self, path: impl AsRef<Path>) {
        let path = path.as_ref().to_path_buf();
        *self.shared.path.lock().expect("path lock poisoned") = Some(path);
        enqueue(&self.shared, IndexingOperation::Full);
    }

    /// Cancel any running operation and enqueue a Full re-index, optionally
    /// pinning the codec used while scanning.
    pub fn reload(&self, forced_codec: Option<Encoding>) {
        if let Some(enc) = forced_codec {
            *self.shared.forced_encoding.lock().expect("forced encoding lock poisoned") = Some(enc);
        }
        self.interrupt_loading();
        enqueue(&self.shared, IndexingOperation::Full);
    }

    /// Set the cancellation flag of whatever operation is currently running,
    /// if any. A no-op if nothing is running.
    pub fn interrupt_loading(&self) {
        if let Some(flag) = &*self.shared.current_cancel.lock().expect("cancel lock poisoned") {
            flag.store(true, Ordering::Relaxed);
        }
    }

    /// Change the codec used to decode line bytes for future `getLine*`
    /// calls. If `codec` has a different byte width than the one indexing
    /// used, a Full reload is required (the line-terminator/width scan
    /// depends on it) rather than just a display-time reinterpretation.
    pub fn set_display_encoding(&self, codec: Encoding) {
        let current_width = self.shared.data.snapshot().effective_encoding().char_width();
        *self.shared.display_encoding.lock().expect("display encoding lock poisoned") = Some(codec);
        if codec.char_width() != current_width {
            self.reload(Some(codec));
        }
    }

    fn display_or_detected_encoding(&self) -> Encoding {
        self.shared
            .display_encoding
            .lock()
            .expect("display encoding lock poisoned")
            .unwrap_or_else(|| self.shared.data.snapshot().effective_encoding())
    }

    fn line_terminator_width(&self) -> usize {
        self.shared.data.snapshot().effective_encoding().line_terminator_width()
    }

    fn raw_line_bytes(&self, i: u64) -> Option<Vec<u8>> {
        let width = self.line_terminator_width();
        let (start, end) = self.shared.data.line_bounds(i as usize, width)?;
        let path = self.shared.path.lock().expect("path lock poisoned").clone()?;
        // A fresh handle per read, per the shared-resource policy in spec §5:
        // concurrent readers must never share a `File`'s seek cursor with
        // the indexing worker or each other.
        let mut file = File::open(path).ok()?;
        file.seek(SeekFrom::Start(start)).ok()?;
        let mut buf = vec![0u8; (end - start) as usize];
        file.read_exact(&mut buf).ok()?;
        Some(buf)
    }

    pub fn get_line_string(&self, i: u64) -> Option<String> {
        let bytes = self.raw_line_bytes(i)?;
        Some(decode_encoding(self.display_or_detected_encoding(), &bytes))
    }

    pub fn get_expanded_line_string(&self, i: u64) -> Option<String> {
        self.get_line_string(i).map(|s| expand_tabs(&s))
    }

    pub fn get_lines(&self, first: u64, count: u64) -> Vec<String> {
        (first..first.saturating_add(count)).filter_map(|i| self.get_line_string(i)).collect()
    }

    pub fn get_expanded_lines(&self, first: u64, count: u64) -> Vec<String> {
        (first..first.saturating_add(count)).filter_map(|i| self.get_expanded_line_string(i)).collect()
    }

    pub fn get_nb_line(&self) -> u64 {
        self.shared.data.line_count() as u64
    }

    pub fn get_max_length(&self) -> usize {
        self.shared.data.snapshot().max_length
    }

    pub fn get_line_length(&self, i: u64) -> Option<usize> {
        self.get_line_string(i).map(|s| display_width(&s))
    }

    pub fn get_file_size(&self) -> u64 {
        self.shared.data.snapshot().indexed_size
    }

    pub fn get_last_modified_date(&self) -> Option<SystemTime> {
        let path = self.shared.path.lock().expect("path lock poisoned").clone()?;
        std::fs::metadata(path).ok()?.modified().ok()
    }

    pub fn get_detected_encoding(&self) -> Encoding {
        self.shared.data.snapshot().effective_encoding()
    }

    pub fn drain_progress(&self) -> Vec<u8> {
        self.progress_events.lock().expect("progress events lock poisoned").drain()
    }

    pub fn drain_finished(&self) -> Vec<LoadingStatus> {
        self.finished_events.lock().expect("finished events lock poisoned").drain()
    }

    pub fn drain_file_changes(&self) -> Vec<FileChangeKind> {
        self.change_events.lock().expect("change events lock poisoned").drain()
    }
}

impl LineSource for LogData {
    fn nb_lines(&self) -> u64 {
        self.get_nb_line()
    }

    fn get_lines_raw(&self, start: u64, count: u64) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        for i in start..start.saturating_add(count) {
            match self.raw_line_bytes(i) {
                Some(bytes) => out.push(bytes),
                None => break,
            }
        }
        out
    }

    fn decode_line(&self, raw: &[u8]) -> String {
        decode_encoding(self.display_or_detected_encoding(), raw)
    }
}

impl Drop for LogData {
    fn drop(&mut self) {
        self.interrupt_loading();
        self.shared.shutdown.store(true, Ordering::Relaxed);
        {
            let _guard = self.shared.wake_lock.lock().expect("wake lock poisoned");
            self.shared.wake.notify_one();
        }
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
        if let Some(path) = self.shared.path.lock().expect("path lock poisoned").clone() {
            if self.shared.watcher_registered.load(Ordering::Relaxed) {
                if let Some(watcher) = &self.shared.watcher {
                    watcher.remove_file(&path);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;

    fn write_temp(contents: &[u8]) -> tempfile::TempPath {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents).unwrap();
        f.flush().unwrap();
        f.into_temp_path()
    }

    fn wait_for_finish(log: &LogData) -> LoadingStatus {
        for _ in 0..200 {
            let finished = log.drain_finished();
            if let Some(status) = finished.into_iter().next() {
                return status;
            }
            thread::sleep(Duration::from_millis(10));
        }
        panic!("loadingFinished never arrived");
    }

    #[test]
    fn attach_indexes_and_reads_lines_back() {
        let path = write_temp(b"alpha\nbeta\ngamma\n");
        let config = EngineConfig::default();
        let log = LogData::new(&config, None);
        log.attach(&path);
        assert_eq!(wait_for_finish(&log), LoadingStatus::Successful);

        assert_eq!(log.get_nb_line(), 3);
        assert_eq!(log.get_line_string(0).as_deref(), Some("alpha"));
        assert_eq!(log.get_line_string(1).as_deref(), Some("beta"));
        assert_eq!(log.get_line_string(2).as_deref(), Some("gamma"));
        assert_eq!(log.get_line_string(3), None);
        assert_eq!(log.get_lines(0, 2), vec!["alpha".to_string(), "beta".to_string()]);
    }

    #[test]
    fn expanded_line_string_expands_tabs() {
        let path = write_temp(b"a\tb\n");
        let config = EngineConfig::default();
        let log = LogData::new(&config, None);
        log.attach(&path);
        wait_for_finish(&log);

        let expanded = log.get_expanded_line_string(0).unwrap();
        assert_eq!(expanded, "a       b");
        assert_eq!(log.get_line_length(0), Some(9));
    }

    #[test]
    fn reload_after_growth_reflects_new_lines() {
        let path = write_temp(b"one\ntwo\n");
        let config = EngineConfig::default();
        let log = LogData::new(&config, None);
        log.attach(&path);
        wait_for_finish(&log);
        assert_eq!(log.get_nb_line(), 2);

        {
            let mut f = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(b"three\n").unwrap();
        }
        log.reload(None);
        wait_for_finish(&log);
        assert_eq!(log.get_nb_line(), 3);
        assert_eq!(log.get_line_string(2).as_deref(), Some("three"));
    }

    #[test]
    fn line_source_impl_matches_log_data_view() {
        let path = write_temp(b"x\ny\n");
        let config = EngineConfig::default();
        let log = LogData::new(&config, None);
        log.attach(&path);
        wait_for_finish(&log);

        let source: &dyn LineSource = &log;
        assert_eq!(source.nb_lines(), 2);
        let raw = source.get_lines_raw(0, 2);
        assert_eq!(raw.len(), 2);
        assert_eq!(source.decode_line(&raw[0]), "x");
    }
}
