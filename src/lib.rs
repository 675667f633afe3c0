// logcore - lib.rs
//
// Library entry point. This crate is the core engine only: indexing,
// searching, marks, and the filtered view. No GUI, no persistence, no IPC
// live here (see spec's non-goals) — those are front-end concerns that
// build on top of the facades re-exported below.

pub mod config;
pub mod events;
pub mod filtered_log_data;
pub mod index;
pub mod log_data;
pub mod marks;
pub mod search;
pub mod util;
pub mod watcher;

pub use config::EngineConfig;
pub use filtered_log_data::{FilteredLineType, FilteredLogData, Visibility};
pub use log_data::LogData;
pub use marks::Marks;
pub use util::error::{EngineError, FileChangeKind, LoadingStatus, RegexError, Result};
