// logcore - watcher/mod.rs
//
// C12: FileWatcher — tells registered listeners a watched file's content
// may have changed. Grounded on the teacher's directory-watch shape (a
// background thread draining an OS notification channel, debounced before
// it reaches anything that matters) plus a coarse polling thread as a
// backstop for filesystems the OS layer can miss (network mounts, some
// container overlays).
//
// Listeners are plain `Fn` callbacks rather than queued events: the only
// caller is `LogData`, which turns the callback straight into an
// `IndexingOperation::ChangeCheck` enqueue — a cheap, lock-ordering-safe
// bit of internal plumbing, not user code, so the "never call back while
// holding a lock" rule that governs `EventQueue` doesn't apply here.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::RecvTimeoutError;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime};

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tracing::warn;

use crate::util::constants;

pub type ChangeCallback = Arc<dyn Fn() + Send + Sync>;

/// `(size, mtime)` pair the polling fallback compares on each tick. Spec
/// §4.12 requires both: a truncate-then-rewrite that lands back on the same
/// length within one poll interval still changes mtime.
type SizeAndMtime = (u64, Option<SystemTime>);

fn stat(path: &Path) -> Option<SizeAndMtime> {
    let meta = std::fs::metadata(path).ok()?;
    Some((meta.len(), meta.modified().ok()))
}

struct WatchEntry {
    callback: ChangeCallback,
    last_seen: Mutex<Option<SizeAndMtime>>,
}

struct Shared {
    watched: Mutex<HashMap<PathBuf, Arc<WatchEntry>>>,
    pending: Mutex<HashMap<PathBuf, Instant>>,
    shutdown: AtomicBool,
}

fn flush_due(shared: &Shared, debounce: Duration) {
    let now = Instant::now();
    let due: Vec<PathBuf> = {
        let pending = shared.pending.lock().expect("watcher pending lock poisoned");
        pending
            .iter()
            .filter(|(_, seen)| now.duration_since(**seen) >= debounce)
            .map(|(p, _)| p.clone())
            .collect()
    };
    for path in due {
        shared.pending.lock().expect("watcher pending lock poisoned").remove(&path);
        let entry = shared.watched.lock().expect("watcher watched lock poisoned").get(&path).cloned();
        if let Some(entry) = entry {
            (entry.callback)();
        }
    }
}

fn run_debounce_loop(
    shared: Arc<Shared>,
    rx: std::sync::mpsc::Receiver<notify::Result<notify::Event>>,
    debounce: Duration,
) {
    loop {
        if shared.shutdown.load(Ordering::Relaxed) {
            return;
        }
        match rx.recv_timeout(Duration::from_millis(constants::WATCHER_CANCEL_CHECK_INTERVAL_MS)) {
            Ok(Ok(event)) => {
                let watched = shared.watched.lock().expect("watcher watched lock poisoned");
                let mut pending = shared.pending.lock().expect("watcher pending lock poisoned");
                for path in event.paths {
                    if watched.contains_key(&path) {
                        pending.insert(path, Instant::now());
                    }
                }
            }
            Ok(Err(e)) => warn!(error = %e, "file watcher event error"),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => return,
        }
        flush_due(&shared, debounce);
    }
}

fn run_poll_loop(shared: Arc<Shared>, poll_interval: Duration, debounce: Duration) {
    let mut last_poll = Instant::now();
    loop {
        if shared.shutdown.load(Ordering::Relaxed) {
            return;
        }
        thread::sleep(Duration::from_millis(constants::WATCHER_CANCEL_CHECK_INTERVAL_MS));
        if last_poll.elapsed() < poll_interval {
            continue;
        }
        last_poll = Instant::now();

        let snapshot: Vec<(PathBuf, Arc<WatchEntry>)> = shared
            .watched
            .lock()
            .expect("watcher watched lock poisoned")
            .iter()
            .map(|(p, e)| (p.clone(), Arc::clone(e)))
            .collect();

        for (path, entry) in snapshot {
            let current = stat(&path);
            let mut last = entry.last_seen.lock().expect("watch entry lock poisoned");
            if *last != current {
                *last = current;
                drop(last);
                shared
                    .pending
                    .lock()
                    .expect("watcher pending lock poisoned")
                    .insert(path, Instant::now());
            }
        }

        flush_due(&shared, debounce);
    }
}

/// Watches a set of files and debounces their change notifications.
///
/// A single `FileWatcher` can be shared (constructor-injected as an
/// `Arc<FileWatcher>`) across every `LogData` in a process, or a host can
/// give each `LogData` its own — the spec leaves the choice open (see
/// DESIGN.md); nothing here assumes either.
pub struct FileWatcher {
    shared: Arc<Shared>,
    os_watcher: Mutex<Option<RecommendedWatcher>>,
    debounce_thread: Mutex<Option<JoinHandle<()>>>,
    poll_thread: Mutex<Option<JoinHandle<()>>>,
}

impl FileWatcher {
    pub fn new(debounce_ms: u64, poll_interval_ms: u64) -> Self {
        let shared = Arc::new(Shared {
            watched: Mutex::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
            shutdown: AtomicBool::new(false),
        });

        let (tx, rx) = std::sync::mpsc::channel::<notify::Result<notify::Event>>();
        let os_watcher = RecommendedWatcher::new(move |res| {
            let _ = tx.send(res);
        }, notify::Config::default())
        .map_err(|e| warn!(error = %e, "OS file watcher unavailable, relying on polling fallback"))
        .ok();

        let debounce = Duration::from_millis(debounce_ms);
        let debounce_thread = thread::spawn({
            let shared = Arc::clone(&shared);
            move || run_debounce_loop(shared, rx, debounce)
        });

        let poll_interval = Duration::from_millis(poll_interval_ms);
        let poll_thread = thread::spawn({
            let shared = Arc::clone(&shared);
            move || run_poll_loop(shared, poll_interval, debounce)
        });

        Self {
            shared,
            os_watcher: Mutex::new(os_watcher),
            debounce_thread: Mutex::new(Some(debounce_thread)),
            poll_thread: Mutex::new(Some(poll_thread)),
        }
    }

    /// Register `path`; `on_change` fires at most once per debounce window
    /// once the file's size or modification time changes. Re-registering the
    /// same path replaces its callback.
    pub fn add_file(&self, path: PathBuf, on_change: ChangeCallback) {
        if let Some(w) = self.os_watcher.lock().expect("watcher mutex poisoned").as_mut() {
            let _ = w.watch(&path, RecursiveMode::NonRecursive);
        }
        let last_seen = stat(&path);
        let entry = Arc::new(WatchEntry {
            callback: on_change,
            last_seen: Mutex::new(last_seen),
        });
        self.shared
            .watched
            .lock()
            .expect("watcher watched lock poisoned")
            .insert(path, entry);
    }

    pub fn remove_file(&self, path: &Path) {
        if let Some(w) = self.os_watcher.lock().expect("watcher mutex poisoned").as_mut() {
            let _ = w.unwatch(path);
        }
        self.shared.watched.lock().expect("watcher watched lock poisoned").remove(path);
        self.shared.pending.lock().expect("watcher pending lock poisoned").remove(path);
    }

    pub fn is_watching(&self, path: &Path) -> bool {
        self.shared.watched.lock().expect("watcher watched lock poisoned").contains_key(path)
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::Relaxed);
        if let Some(h) = self.debounce_thread.lock().expect("watcher mutex poisoned").take() {
            let _ = h.join();
        }
        if let Some(h) = self.poll_thread.lock().expect("watcher mutex poisoned").take() {
            let _ = h.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[test]
    fn add_file_registers_and_remove_file_unregisters() {
        let watcher = FileWatcher::new(10, 20);
        let path = tempfile::NamedTempFile::new().unwrap().into_temp_path();
        let path: PathBuf = path.to_path_buf();
        watcher.add_file(path.clone(), Arc::new(|| {}));
        assert!(watcher.is_watching(&path));
        watcher.remove_file(&path);
        assert!(!watcher.is_watching(&path));
    }

    #[test]
    fn polling_fallback_detects_growth() {
        let watcher = FileWatcher::new(10, 20);
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let path = file.path().to_path_buf();

        let seen = Arc::new(AtomicUsize::new(0));
        let seen_for_cb = Arc::clone(&seen);
        watcher.add_file(path, Arc::new(move || {
            seen_for_cb.fetch_add(1, Ordering::Relaxed);
        }));

        file.write_all(b"more data\n").unwrap();
        file.flush().unwrap();

        for _ in 0..50 {
            if seen.load(Ordering::Relaxed) > 0 {
                break;
            }
            thread::sleep(Duration::from_millis(20));
        }
        assert!(seen.load(Ordering::Relaxed) > 0, "polling fallback never fired");
    }

    /// Same byte length, different mtime: polling must still treat this as
    /// a change (spec §4.12's `(size, mTime)` pair), not rely on size alone.
    #[test]
    fn polling_fallback_detects_same_size_rewrite_via_mtime() {
        let watcher = FileWatcher::new(10, 20);
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"aaaa").unwrap();
        file.flush().unwrap();
        let path = file.path().to_path_buf();

        let seen = Arc::new(AtomicUsize::new(0));
        let seen_for_cb = Arc::clone(&seen);
        watcher.add_file(path.clone(), Arc::new(move || {
            seen_for_cb.fetch_add(1, Ordering::Relaxed);
        }));

        // Rewrite with the same length but push the mtime well into the
        // future so the comparison can't depend on filesystem timestamp
        // granularity lining up with how fast the test runs.
        file.as_file().set_len(0).unwrap();
        use std::io::Seek;
        file.as_file_mut().seek(std::io::SeekFrom::Start(0)).unwrap();
        file.write_all(b"bbbb").unwrap();
        file.flush().unwrap();
        let future = SystemTime::now() + Duration::from_secs(3600);
        file.as_file().set_modified(future).unwrap();

        for _ in 0..50 {
            if seen.load(Ordering::Relaxed) > 0 {
                break;
            }
            thread::sleep(Duration::from_millis(20));
        }
        assert!(seen.load(Ordering::Relaxed) > 0, "same-size rewrite via mtime never detected");
    }
}
