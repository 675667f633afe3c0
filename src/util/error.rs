// logcore - util/error.rs
//
// Typed error hierarchy with context-preserving error chains.
// No string-based error propagation; every failure keeps its causal chain
// for diagnostic logging, and terminal failures never panic — they convert
// to one of the status/result values named in the spec's error table.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Top-level error type for engine operations that can fail synchronously
/// (as opposed to surfacing as a terminal event on a progress channel).
#[derive(Debug)]
pub enum EngineError {
    /// `RegularExpression` compilation failed (spec §7 `InvalidRegex`).
    InvalidRegex(RegexError),

    /// I/O error with path context.
    Io {
        path: PathBuf,
        operation: &'static str,
        source: io::Error,
    },
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidRegex(e) => write!(f, "invalid regular expression: {e}"),
            Self::Io {
                path,
                operation,
                source,
            } => write!(
                f,
                "I/O error during {operation} on '{}': {source}",
                path.display()
            ),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidRegex(e) => Some(e),
            Self::Io { source, .. } => Some(source),
        }
    }
}

impl From<RegexError> for EngineError {
    fn from(e: RegexError) -> Self {
        Self::InvalidRegex(e)
    }
}

// ---------------------------------------------------------------------------
// Regex / boolean-expression compile errors (C8)
// ---------------------------------------------------------------------------

/// Errors produced while compiling a `RegularExpression` pattern.
#[derive(Debug)]
pub enum RegexError {
    /// A scalar sub-pattern (or the whole pattern, in non-boolean mode)
    /// failed to compile.
    InvalidPattern {
        pattern: String,
        source: regex::Error,
    },

    /// A boolean-mode pattern has an odd number of `"` delimiters, or an
    /// unescaped quote left open at end of input.
    UnbalancedQuotes,

    /// A boolean-mode expression references a token that is neither a known
    /// atom id nor one of the supported operators `!`, `&`, `|`, `(`, `)`.
    UnknownToken { token: String },

    /// A boolean-mode expression is syntactically malformed (e.g. a dangling
    /// operator, an empty sub-expression, or mismatched parentheses).
    MalformedExpression { reason: String },
}

impl fmt::Display for RegexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidPattern { pattern, source } => {
                write!(f, "pattern '{pattern}' failed to compile: {source}")
            }
            Self::UnbalancedQuotes => write!(f, "boolean expression has unbalanced quotes"),
            Self::UnknownToken { token } => {
                write!(f, "boolean expression references unknown token '{token}'")
            }
            Self::MalformedExpression { reason } => {
                write!(f, "boolean expression is malformed: {reason}")
            }
        }
    }
}

impl std::error::Error for RegexError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidPattern { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Convenience alias for fallible engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

// ---------------------------------------------------------------------------
// Terminal statuses (spec §7) — not `Error` types, but the outcome codes
// carried by `loadingFinished` / `searchFinished` events.
// ---------------------------------------------------------------------------

/// Outcome of an indexing operation, delivered via `loadingFinished`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadingStatus {
    Successful,
    Interrupted,
    /// Allocation failure partway through indexing. Not producible by this
    /// implementation (safe Rust has no catchable OOM path) but kept in the
    /// enum so the interface matches spec §7 exactly.
    NoMemory,
}

/// Classification of a file on disk relative to what was last indexed,
/// produced by `IndexingEngine::check_change` and delivered via `LogData`'s
/// `fileChanged` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileChangeKind {
    Unchanged,
    DataAdded,
    Truncated,
}
