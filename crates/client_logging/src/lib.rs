#![deny(missing_docs)]
//! Shared logging utilities for the document-audit client workspace.
//!
//! This crate provides the `client_*` logging macros used across the codebase.
//! Every line is prefixed with the context label of the emitting thread so
//! that output from several simulated browser tabs can be told apart.

use std::cell::RefCell;

thread_local! {
    /// Thread-local label identifying the tab (or test) that is logging.
    static CONTEXT_LABEL: RefCell<String> = RefCell::new(String::from("main"));
}

/// Sets the context label for the current thread.
/// Hosts call this once after the tab identity is known.
pub fn set_context_label(label: impl Into<String>) {
    let label = label.into();
    CONTEXT_LABEL.with(|v| *v.borrow_mut() = label);
}

/// Retrieves the context label for the current thread.
/// Returns `"main"` if no label has been set.
pub fn context_label() -> String {
    CONTEXT_LABEL.with(|v| v.borrow().clone())
}

/// Logs a trace-level message prefixed with the context label.
#[macro_export]
macro_rules! client_trace {
    ($($arg:tt)*) => {{
        log::trace!("[{}] {}", $crate::context_label(), format_args!($($arg)*));
    }};
}

/// Logs a debug-level message prefixed with the context label.
#[macro_export]
macro_rules! client_debug {
    ($($arg:tt)*) => {{
        log::debug!("[{}] {}", $crate::context_label(), format_args!($($arg)*));
    }};
}

/// Logs an info-level message prefixed with the context label.
#[macro_export]
macro_rules! client_info {
    ($($arg:tt)*) => {{
        log::info!("[{}] {}", $crate::context_label(), format_args!($($arg)*));
    }};
}

/// Logs a warn-level message prefixed with the context label.
#[macro_export]
macro_rules! client_warn {
    ($($arg:tt)*) => {{
        log::warn!("[{}] {}", $crate::context_label(), format_args!($($arg)*));
    }};
}

/// Logs an error-level message prefixed with the context label.
#[macro_export]
macro_rules! client_error {
    ($($arg:tt)*) => {{
        log::error!("[{}] {}", $crate::context_label(), format_args!($($arg)*));
    }};
}

/// Initializes a terminal logger for use in integration tests.
///
/// This safely no-ops if another logger has already been initialized.
pub fn initialize_for_tests() {
    use simplelog::{ColorChoice, CombinedLogger, ConfigBuilder, TermLogger, TerminalMode};

    let level = if cfg!(debug_assertions) {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    // wiremock and hyper are chatty at debug level.
    let config = ConfigBuilder::new()
        .add_filter_ignore_str("hyper")
        .add_filter_ignore_str("wiremock")
        .build();

    let _ = CombinedLogger::init(vec![TermLogger::new(
        level,
        config,
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )]);
}

