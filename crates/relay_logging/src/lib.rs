#![deny(missing_docs)]
//! Shared logging utilities for the summary relay workspace.
//!
//! This crate provides the `relay_*` logging macros used across the codebase
//! and a minimal test initializer for the global logger. Library crates never
//! install a logger themselves; the binary (or a test) does.

/// Logs a trace-level message using the global logging facade.
#[macro_export]
macro_rules! relay_trace {
    ($($arg:tt)*) => {{
        log::trace!($($arg)*);
    }};
}

/// Logs an info-level message using the global logging facade.
#[macro_export]
macro_rules! relay_info {
    ($($arg:tt)*) => {{
        log::info!($($arg)*);
    }};
}

/// Logs a debug-level message using the global logging facade.
#[macro_export]
macro_rules! relay_debug {
    ($($arg:tt)*) => {{
        log::debug!($($arg)*);
    }};
}

/// Logs a warn-level message using the global logging facade.
#[macro_export]
macro_rules! relay_warn {
    ($($arg:tt)*) => {{
        log::warn!($($arg)*);
    }};
}

/// Logs an error-level message using the global logging facade.
#[macro_export]
macro_rules! relay_error {
    ($($arg:tt)*) => {{
        log::error!($($arg)*);
    }};
}

/// Truncates a payload for log output so streamed summaries do not flood the log.
///
/// Cuts on a character boundary and appends an ellipsis when shortened.
pub fn truncate_for_log(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

/// Initializes a simple terminal logger for use in unit tests.
///
/// This safely no-ops if another logger has already been initialized.
pub fn initialize_for_tests() {
    use simplelog::{ColorChoice, CombinedLogger, Config, TermLogger, TerminalMode};

    // Use debug level in debug builds, info in release builds.
    let level = if cfg!(debug_assertions) {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    // Ignore the error if a logger was already set by another test.
    let _ = CombinedLogger::init(vec![TermLogger::new(
        level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )]);
}

#[cfg(test)]
mod tests {
    use super::truncate_for_log;

    #[test]
    fn truncate_keeps_short_text() {
        assert_eq!(truncate_for_log("abc", 5), "abc");
    }

    #[test]
    fn truncate_cuts_on_char_boundary() {
        assert_eq!(truncate_for_log("日本語テキスト", 3), "日本語...");
    }
}
