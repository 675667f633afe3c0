// logcore - util/logging.rs
//
// Structured logging, opt-in for library consumers.
//
// This crate is a library: it never installs a global subscriber on its
// own behalf. Callers (a host application, or this crate's own test
// binaries) call `init` once at startup if they want the engine's
// `tracing::debug!`/`warn!` calls rendered somewhere.
//
// Activation priority: `RUST_LOG` env var > explicit `level` argument >
// `constants::DEFAULT_LOG_LEVEL`.

use tracing_subscriber::EnvFilter;

/// Initialise the logging subsystem.
///
/// `level` is an explicit filter directive (e.g. `"debug"`); pass `None` to
/// fall back to the default. Safe to call more than once from tests — a
/// failed re-install (subscriber already set) is ignored.
pub fn init(level: Option<&str>) {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if let Some(level) = level {
        EnvFilter::new(level)
    } else {
        EnvFilter::new(super::constants::DEFAULT_LOG_LEVEL)
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .compact()
        .try_init();

    tracing::debug!(version = super::constants::APP_VERSION, "logging initialised");
}
