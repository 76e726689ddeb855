//! Logger setup.
//!
//! Opt-in `tracing` subscriber initialization for binaries and tests that
//! want to see the crate's diagnostics. Libraries embedding taskloop should
//! install their own subscriber instead; nothing in the crate requires one.
//!
//! # Usage
//!
//! ```rust
//! taskloop::util::logger::init();
//! tracing::info!("hello");
//! ```

use std::sync::Once;

use tracing_subscriber::filter::LevelFilter;

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

static INIT: Once = Once::new();

/// Initialize logging at `Info`.
pub fn init() {
    init_with_level(LogLevel::Info);
}

/// Initialize logging at the given level. Safe to call more than once; only
/// the first call installs a subscriber, and an externally-installed
/// subscriber wins.
pub fn init_with_level(level: LogLevel) {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(LevelFilter::from(level))
            .with_target(false)
            .try_init();
    });
}
