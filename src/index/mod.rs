// logcore - index/mod.rs
//
// Indexing subsystem: turns a raw file on disk into an addressable sequence
// of lines (C1-C4).

pub mod data;
pub mod encoding;
pub mod engine;
pub mod line_positions;

pub use data::{IndexingData, IndexingSnapshot};
pub use encoding::{decode as decode_encoding, detect as detect_encoding, DetectedEncoding, Encoding};
pub use engine::{IndexingEngine, IndexingOperation, IndexingOutcome};
pub use line_positions::LinePositionArray;
