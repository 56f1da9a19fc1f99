//! Diagnostics stream: the plain stdout trace contract, mirrored through the `log` facade.
//!
//! The stdout format is part of the external contract and is written directly rather than
//! routed through `log`, since its exact prefix/line shape must not drift with logger
//! configuration; every call also emits the matching `log` record so the binary composes with
//! normal Rust log collection.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};

/// Whether `-v`/`verbose` is in effect. DBG-level lines are suppressed on stdout unless set.
static VERBOSE: AtomicBool = AtomicBool::new(false);

/// Sets the process-wide verbosity flag; call once at startup before the VM runs.
pub fn set_verbose(verbose: bool) {
    VERBOSE.store(verbose, Ordering::Relaxed);
}

fn verbose() -> bool {
    VERBOSE.load(Ordering::Relaxed)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Error,
    FatalError,
    Warning,
    Debug,
    Internal,
}

impl Level {
    fn prefix(self) -> &'static str {
        match self {
            Level::Error => "error: ",
            Level::FatalError => "fatal error: ",
            Level::Warning => "warning: ",
            Level::Debug => "[dbg] ",
            Level::Internal => "internal: ",
        }
    }
}

/// Emits one diagnostic line to stdout with its level prefix, and mirrors it through `log`.
///
/// `Level::Debug` is suppressed on stdout unless [`set_verbose`] was called with `true`; it is
/// always mirrored through `log::debug!` so `RUST_LOG` can pick it up independently.
pub fn emit(level: Level, message: &str) {
    if level != Level::Debug || verbose() {
        let mut out = std::io::stdout();
        let _ = writeln!(out, "{}{}", level.prefix(), message);
    }
    match level {
        Level::Error | Level::FatalError => log::error!("{}", message),
        Level::Warning => log::warn!("{}", message),
        Level::Debug | Level::Internal => log::debug!("{}", message),
    }
}

/// Emits a `MULTI_PART` diagnostic line with no trailing newline, so a subsequent `more` call can
/// continue it on the same line.
pub fn begin_multi_part(level: Level, message: &str) {
    if level != Level::Debug || verbose() {
        let mut out = std::io::stdout();
        let _ = write!(out, "{}{}", level.prefix(), message);
    }
    log::debug!("{}", message);
}

/// Continues a line previously opened with [`begin_multi_part`].
pub fn more(message: &str) {
    let mut out = std::io::stdout();
    let _ = write!(out, "{}", message);
}

/// Closes a line previously opened with [`begin_multi_part`]/[`more`].
pub fn end_multi_part() {
    println!();
}

/// Flushes the interpreter's print-machinery scratch buffer as unprefixed stdout text (what
/// ENDPRINT/ENDPRINTBOLD produce), mirrored through `log` at info level.
pub fn flush_print(buffer: &str) {
    println!("{}", buffer);
    log::info!("{}", buffer);
}

/// Flushes the scratch buffer as a debug-level diagnostic (what ENDLOG produces).
pub fn flush_log(buffer: &str) {
    emit(Level::Debug, buffer);
}
