// logcore - tests/e2e_engine.rs
//
// End-to-end tests driving the public facades (LogData, FilteredLogData,
// FileWatcher) against real temp files on the real filesystem — no mocks.
// These cover the scenario walkthroughs in spec.md §8: small-file search,
// grow-then-truncate, boolean search, marks+matches merge, incremental
// search resume, and cache hits, exercised through the crate's own public
// API rather than its internals.

use std::io::Write;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use logcore::{EngineConfig, FilteredLogData, LoadingStatus, LogData, Visibility};

fn write_temp(contents: &[u8]) -> tempfile::TempPath {
    let mut f = tempfile::NamedTempFile::new().unwrap();
    f.write_all(contents).unwrap();
    f.flush().unwrap();
    f.into_temp_path()
}

fn wait_for_load(log: &LogData) -> LoadingStatus {
    for _ in 0..300 {
        if let Some(status) = log.drain_finished().into_iter().next() {
            return status;
        }
        thread::sleep(Duration::from_millis(10));
    }
    panic!("loadingFinished never arrived");
}

fn wait_for_search(view: &FilteredLogData) -> logcore::search::SearchOutcome {
    for _ in 0..300 {
        if let Some(outcome) = view.drain_finished().into_iter().next() {
            return outcome;
        }
        thread::sleep(Duration::from_millis(10));
    }
    panic!("searchFinished never arrived");
}

// =============================================================================
// Small-file simple search (spec §8 scenario 1)
// =============================================================================

#[test]
fn e2e_small_file_simple_search() {
    let path = write_temp(b"alpha\nbeta NEEDLE\ngamma\ndelta NEEDLE\n");
    let config = EngineConfig::default();
    let log = Arc::new(LogData::new(&config, None));
    log.attach(&path);
    assert_eq!(wait_for_load(&log), LoadingStatus::Successful);
    assert_eq!(log.get_nb_line(), 4);

    let view = FilteredLogData::new(Arc::clone(&log), &config);
    view.run_search("NEEDLE", true, false, false, false, None, None).unwrap();
    assert_eq!(wait_for_search(&view), logcore::search::SearchOutcome::Completed);

    assert_eq!(view.get_nb_line(), 2);
    assert_eq!(view.get_matching_line_number(0), Some(1));
    assert_eq!(view.get_matching_line_number(1), Some(3));
    assert_eq!(view.get_line_string(0).as_deref(), Some("beta NEEDLE"));
}

// =============================================================================
// Grow then truncate (spec §8 scenario 2, via attach + a registered FileWatcher)
// =============================================================================

#[test]
fn e2e_grow_then_truncate_reflected_via_reload() {
    let path = write_temp(b"one\ntwo\n");
    let config = EngineConfig::default();
    let log = LogData::new(&config, None);
    log.attach(&path);
    assert_eq!(wait_for_load(&log), LoadingStatus::Successful);
    assert_eq!(log.get_nb_line(), 2);

    {
        let mut f = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        f.write_all(b"three\nfour\n").unwrap();
    }
    log.reload(None);
    assert_eq!(wait_for_load(&log), LoadingStatus::Successful);
    assert_eq!(log.get_nb_line(), 4);
    assert_eq!(log.get_line_string(3).as_deref(), Some("four"));

    // Truncate the file down to a single short line and re-index: the old
    // index must not leave stale lines behind.
    std::fs::write(&path, b"only\n").unwrap();
    log.reload(None);
    assert_eq!(wait_for_load(&log), LoadingStatus::Successful);
    assert_eq!(log.get_nb_line(), 1);
    assert_eq!(log.get_line_string(0).as_deref(), Some("only"));
}

// =============================================================================
// FileWatcher drives LogData's ChangeCheck -> Partial pipeline on its own
// =============================================================================

#[test]
fn e2e_watcher_triggers_reindex_without_explicit_reload() {
    let path = write_temp(b"first\n");
    let watcher = Arc::new(logcore::watcher::FileWatcher::new(20, 30));
    let config = EngineConfig::default();
    let log = LogData::new(&config, Some(Arc::clone(&watcher)));
    log.attach(&path);
    assert_eq!(wait_for_load(&log), LoadingStatus::Successful);
    assert_eq!(log.get_nb_line(), 1);

    {
        let mut f = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        f.write_all(b"second\n").unwrap();
    }

    for _ in 0..200 {
        if log.get_nb_line() == 2 {
            break;
        }
        thread::sleep(Duration::from_millis(20));
    }
    assert_eq!(log.get_nb_line(), 2);
}

// =============================================================================
// Boolean search (spec §8 scenario 3)
// =============================================================================

#[test]
fn e2e_boolean_search_combines_atoms() {
    let path = write_temp(b"apple pie\nbanana split\napple and banana\nneither\n");
    let config = EngineConfig::default();
    let log = Arc::new(LogData::new(&config, None));
    log.attach(&path);
    wait_for_load(&log);

    let view = FilteredLogData::new(Arc::clone(&log), &config);
    view.run_search(r#""apple" & "banana""#, true, false, true, false, None, None)
        .unwrap();
    wait_for_search(&view);

    assert_eq!(view.get_nb_line(), 1);
    assert_eq!(view.get_line_string(0).as_deref(), Some("apple and banana"));
}

// =============================================================================
// Marks + matches merge (spec §8 scenario 4)
// =============================================================================

#[test]
fn e2e_marks_and_matches_merge() {
    let mut contents = String::new();
    for i in 0..40u32 {
        if i % 10 == 4 {
            contents.push_str(&format!("line {i:03} NEEDLE\n"));
        } else {
            contents.push_str(&format!("line {i:03} plain\n"));
        }
    }
    let path = write_temp(contents.as_bytes());
    let config = EngineConfig::default();
    let log = Arc::new(LogData::new(&config, None));
    log.attach(&path);
    wait_for_load(&log);

    let view = FilteredLogData::new(Arc::clone(&log), &config);
    view.run_search("NEEDLE", true, false, false, false, None, None).unwrap();
    wait_for_search(&view);

    view.add_mark(10, None);
    view.set_visibility(Visibility::MarksAndMatches);

    let expected = [4u64, 10, 14, 24, 34];
    let got: Vec<u64> = (0..view.get_nb_line()).map(|i| view.get_matching_line_number(i).unwrap()).collect();
    assert_eq!(got, expected);
    assert_eq!(view.filtered_line_type_by_index(1), Some(logcore::FilteredLineType::Mark));
    assert_eq!(view.filtered_line_type_by_index(0), Some(logcore::FilteredLineType::Match));
}

// =============================================================================
// Incremental search resume (spec §8 scenario 5)
// =============================================================================

#[test]
fn e2e_update_search_picks_up_appended_matches() {
    let path = write_temp(b"one NEEDLE\ntwo\nthree\n");
    let config = EngineConfig::default();
    let log = Arc::new(LogData::new(&config, None));
    log.attach(&path);
    wait_for_load(&log);

    let view = FilteredLogData::new(Arc::clone(&log), &config);
    view.run_search("NEEDLE", true, false, false, false, None, None).unwrap();
    wait_for_search(&view);
    assert_eq!(view.get_nb_line(), 1);

    {
        let mut f = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        f.write_all(b"four NEEDLE\nfive\n").unwrap();
    }
    log.reload(None);
    wait_for_load(&log);

    view.update_search(None);
    wait_for_search(&view);
    assert_eq!(view.get_nb_line(), 2);
    assert_eq!(view.get_matching_line_number(1), Some(3));
}

// =============================================================================
// Cache hit restores a prior result set instantly (spec §8 scenario 6, §4.10/4.11)
// =============================================================================

#[test]
fn e2e_repeated_search_is_served_from_cache() {
    let mut contents = String::new();
    for i in 0..200u32 {
        if i % 20 == 0 {
            contents.push_str(&format!("row {i:04} NEEDLE\n"));
        } else {
            contents.push_str(&format!("row {i:04} plain\n"));
        }
    }
    let path = write_temp(contents.as_bytes());
    let config = EngineConfig::default();
    let log = Arc::new(LogData::new(&config, None));
    log.attach(&path);
    wait_for_load(&log);

    let view = FilteredLogData::new(Arc::clone(&log), &config);
    view.run_search("NEEDLE", true, false, false, false, None, None).unwrap();
    wait_for_search(&view);
    let nb_first = view.get_nb_line();
    assert_eq!(nb_first, 10);

    view.clear_search();
    assert_eq!(view.get_nb_line(), 0);

    // Re-running the identical search should restore the cached bitmap and
    // post a synchronous `searchFinished` without a background scan.
    view.run_search("NEEDLE", true, false, false, false, None, None).unwrap();
    let finished = view.drain_finished();
    assert_eq!(finished, vec![logcore::search::SearchOutcome::Completed]);
    assert_eq!(view.get_nb_line(), 10);
}
