// logcore - index/engine.rs
//
// C4: IndexingEngine — streams a file in fixed-size blocks, finds line
// terminators, tracks tab-expanded line width, and folds the result into
// an IndexingData. Grounded on the teacher's `app::tail::run_tail_watcher`
// shape: a bounded producer/consumer pipeline with a shared cancellation
// flag polled at every block boundary, run from a thread the facade owns.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{bounded, Receiver};

use crate::index::data::IndexingData;
use crate::index::encoding::{self, Encoding};
use crate::index::line_positions::LinePositionArray;
use crate::util::constants;
use crate::util::error::{FileChangeKind, LoadingStatus};

/// The three operations `LogData` can enqueue against an `IndexingEngine`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexingOperation {
    Full,
    Partial,
    ChangeCheck,
}

/// Outcome of running an operation through the engine. `ChangeCheck` never
/// produces `Loading`; `Full`/`Partial` never produce `Changed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexingOutcome {
    Loading(LoadingStatus),
    Changed(FileChangeKind),
}

/// Stateless entry point: the indexing worker thread constructs one of
/// these and calls `run` once per operation it was handed.
#[derive(Debug, Default)]
pub struct IndexingEngine {
    pub block_size: usize,
    pub read_buffer_size: usize,
}

impl IndexingEngine {
    pub fn new() -> Self {
        Self {
            block_size: constants::INDEX_BLOCK_SIZE,
            read_buffer_size: constants::INDEX_READ_BUFFER_SIZE,
        }
    }

    fn prefetch_blocks(&self) -> usize {
        (self.read_buffer_size / self.block_size).max(1)
    }

    /// Run one operation against `data`, reporting progress (0..=100,
    /// monotonic) through `progress` as it goes. `forced_encoding` is only
    /// consulted for `Full`.
    pub fn run(
        &self,
        op: IndexingOperation,
        data: &IndexingData,
        path: &Path,
        cancel: &Arc<AtomicBool>,
        forced_encoding: Option<Encoding>,
        mut progress: impl FnMut(u8),
    ) -> IndexingOutcome {
        match op {
            IndexingOperation::Full => {
                data.clear();
                if let Some(enc) = forced_encoding {
                    data.force_encoding(enc);
                }
                IndexingOutcome::Loading(self.index_from(data, path, 0, cancel, &mut progress))
            }
            IndexingOperation::Partial => {
                let start = data.snapshot().indexed_size;
                IndexingOutcome::Loading(self.index_from(data, path, start, cancel, &mut progress))
            }
            IndexingOperation::ChangeCheck => {
                IndexingOutcome::Changed(check_change(data, path))
            }
        }
    }

    fn index_from(
        &self,
        data: &IndexingData,
        path: &Path,
        start_offset: u64,
        cancel: &Arc<AtomicBool>,
        progress: &mut dyn FnMut(u8),
    ) -> LoadingStatus {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(_) => {
                // spec §7 FileOpenError: treat as empty, locale-default encoding.
                data.clear();
                data.set_encoding_guess(Encoding::LocaleDefault);
                progress(100);
                return LoadingStatus::Successful;
            }
        };

        let file_size = match file.metadata() {
            Ok(m) => m.len(),
            Err(_) => {
                data.clear();
                data.set_encoding_guess(Encoding::LocaleDefault);
                progress(100);
                return LoadingStatus::Successful;
            }
        };

        if file_size <= start_offset {
            // Nothing new since the last indexing pass.
            progress(100);
            return LoadingStatus::Successful;
        }

        let rx = spawn_reader(
            path.to_path_buf(),
            start_offset,
            self.block_size,
            self.prefetch_blocks(),
            Arc::clone(cancel),
        );

        let existing = data.snapshot();
        let mut encoding_known: Option<Encoding> = existing.forced_encoding.or_else(|| {
            if start_offset == 0 {
                None
            } else {
                Some(existing.effective_encoding())
            }
        });

        let mut scan = ScanState::default();
        let mut last_percent: u8 = 0;
        let mut status = LoadingStatus::Successful;

        for msg in rx.iter() {
            if cancel.load(Ordering::Relaxed) {
                status = LoadingStatus::Interrupted;
                break;
            }

            match msg {
                ReaderMessage::Block { offset, bytes } => {
                    let mut detected_for_batch = None;
                    if encoding_known.is_none() {
                        let sniff_len = bytes.len().min(constants::ENCODING_SNIFF_SIZE);
                        let detected = encoding::detect(&bytes[..sniff_len]);
                        encoding_known = Some(detected.encoding);
                        detected_for_batch = Some(detected.encoding);
                    }
                    let width = encoding_known.unwrap().char_width();
                    let lf_offset = if encoding_known.unwrap().is_little_endian() {
                        0
                    } else {
                        width.saturating_sub(1)
                    };

                    let positions = scan.consume(offset, &bytes, width, lf_offset);
                    data.add_all(&bytes, scan.running_max, &positions, detected_for_batch);

                    let percent = if file_size == 0 {
                        100
                    } else {
                        ((100u64 * data.snapshot().indexed_size) / file_size).min(100) as u8
                    };
                    if percent > last_percent {
                        last_percent = percent;
                        progress(percent);
                    }
                }
                ReaderMessage::Eof => break,
                ReaderMessage::Err(_) => {
                    status = LoadingStatus::Interrupted;
                    break;
                }
            }
        }

        if status == LoadingStatus::Successful {
            data.finalize_fake_final_lf(file_size);
            if last_percent < 100 {
                progress(100);
            }
        }

        status
    }
}

#[derive(Default)]
struct ScanState {
    /// Bytes held back because they didn't complete a `char_width` unit at
    /// the end of the previous block.
    pending: Vec<u8>,
    pending_start: u64,
    /// Running tab-expanded display column within the line currently being
    /// scanned; carried across block boundaries.
    col: usize,
    /// Running high-water mark of `col` at every terminator seen so far in
    /// this operation; monotonic, fed straight into `IndexingData::add_all`.
    running_max: usize,
}

impl ScanState {
    fn consume(&mut self, block_offset: u64, block: &[u8], char_width: usize, lf_trailing_offset: usize) -> LinePositionArray {
        let mut combined = std::mem::take(&mut self.pending);
        let combined_start = if combined.is_empty() { block_offset } else { self.pending_start };
        combined.extend_from_slice(block);

        let full_units = combined.len() / char_width;
        let consumed = full_units * char_width;

        let mut positions = LinePositionArray::new();
        for i in 0..full_units {
            let unit = &combined[i * char_width..(i + 1) * char_width];
            let abs_unit_start = combined_start + (i * char_width) as u64;
            let is_lf = if char_width == 1 {
                unit[0] == b'\n'
            } else {
                unit[lf_trailing_offset] == b'\n'
                    && unit.iter().enumerate().all(|(j, &b)| j == lf_trailing_offset || b == 0)
            };
            let is_tab = if char_width == 1 {
                unit[0] == b'\t'
            } else {
                unit.iter().enumerate().all(|(j, &b)| {
                    if j == lf_trailing_offset {
                        b == b'\t'
                    } else {
                        b == 0
                    }
                })
            };

            if is_lf {
                positions.append(abs_unit_start + char_width as u64);
                if self.col > self.running_max {
                    self.running_max = self.col;
                }
                self.col = 0;
            } else if is_tab {
                self.col = ((self.col / constants::TAB_STOP) + 1) * constants::TAB_STOP;
            } else {
                self.col += 1;
            }
        }

        if self.col > self.running_max {
            self.running_max = self.col;
        }

        self.pending = combined[consumed..].to_vec();
        self.pending_start = combined_start + consumed as u64;
        positions
    }
}

enum ReaderMessage {
    Block { offset: u64, bytes: Vec<u8> },
    Eof,
    Err(std::io::Error),
}

fn spawn_reader(
    path: std::path::PathBuf,
    start_offset: u64,
    block_size: usize,
    prefetch_blocks: usize,
    cancel: Arc<AtomicBool>,
) -> Receiver<ReaderMessage> {
    let (tx, rx) = bounded::<ReaderMessage>(prefetch_blocks);
    thread::spawn(move || {
        let mut file = match File::open(&path) {
            Ok(f) => f,
            Err(e) => {
                let _ = tx.send(ReaderMessage::Err(e));
                return;
            }
        };
        if let Err(e) = file.seek(SeekFrom::Start(start_offset)) {
            let _ = tx.send(ReaderMessage::Err(e));
            return;
        }

        let mut offset = start_offset;
        let mut buf = vec![0u8; block_size];
        loop {
            if cancel.load(Ordering::Relaxed) {
                return;
            }
            match file.read(&mut buf) {
                Ok(0) => {
                    let _ = tx.send(ReaderMessage::Eof);
                    return;
                }
                Ok(n) => {
                    let bytes = buf[..n].to_vec();
                    let block_offset = offset;
                    offset += n as u64;
                    if tx.send(ReaderMessage::Block { offset: block_offset, bytes }).is_err() {
                        return;
                    }
                }
                Err(e) => {
                    let _ = tx.send(ReaderMessage::Err(e));
                    return;
                }
            }
        }
    });
    rx
}

/// C4 ChangeCheck: compares the file's current first `indexed_size` bytes
/// against the stored rolling hash without re-indexing anything.
pub fn check_change(data: &IndexingData, path: &Path) -> FileChangeKind {
    let snapshot = data.snapshot();
    let stored_size = snapshot.indexed_size;

    let file = match File::open(path) {
        Ok(f) => f,
        Err(_) => return FileChangeKind::Truncated,
    };
    let current_size = match file.metadata() {
        Ok(m) => m.len(),
        Err(_) => return FileChangeKind::Truncated,
    };

    if current_size < stored_size {
        return FileChangeKind::Truncated;
    }
    if stored_size == 0 {
        return if current_size == 0 {
            FileChangeKind::Unchanged
        } else {
            FileChangeKind::DataAdded
        };
    }

    let mut file = file;
    let mut remaining = stored_size;
    let mut buf = vec![0u8; constants::INDEX_BLOCK_SIZE.min(stored_size as usize).max(1)];
    let mut hash: u64 = 0;
    while remaining > 0 {
        let to_read = (buf.len() as u64).min(remaining) as usize;
        match file.read(&mut buf[..to_read]) {
            Ok(0) => return FileChangeKind::Truncated,
            Ok(n) => {
                hash = crate::index::data::rolling_hash(hash, &buf[..n]);
                remaining -= n as u64;
            }
            Err(_) => return FileChangeKind::Truncated,
        }
    }

    if hash != snapshot.content_hash {
        return FileChangeKind::Truncated;
    }

    if current_size > stored_size {
        FileChangeKind::DataAdded
    } else {
        FileChangeKind::Unchanged
    }
}
