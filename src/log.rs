//! Logging initialization (SPEC_FULL §2 ambient stack). The device logs
//! through the `log` facade throughout (`error.rs::fatal`/`soft`,
//! `device/mod.rs`, `abi.rs`); this module only offers an opt-in default
//! logger for embedders that haven't installed one of their own, mirroring
//! the teacher's dev-dependency on `pretty_env_logger` in its test/example
//! binaries rather than wiring a logger into the library itself.

use std::sync::Once;

static INIT: Once = Once::new();

/// Installs `pretty_env_logger` at the configured level filter if, and only
/// if, no logger has been installed yet. Safe to call more than once or
/// concurrently with the host's own `log::set_logger` — `Once` makes this a
/// no-op on every call after the first, and `log::set_logger` itself is
/// idempotent-safe (returns `Err` silently if a logger already won the
/// race).
pub fn init_default(level_filter: &str) {
    INIT.call_once(|| {
        let filter = level_filter.parse().unwrap_or(log::LevelFilter::Warn);
        let _ = pretty_env_logger::formatted_builder()
            .filter_level(filter)
            .try_init();
    });
}
