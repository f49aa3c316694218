//! Author-facing diagnostics.
//!
//! Malformed markup and deprecated usage are reported through [`warn`], which
//! only emits in debug mode and only once per distinct message. Errors thrown
//! by effectful author code (init, watch, run, event actions) are reported
//! through [`report`] and are always emitted.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;

use crate::error::Error;

thread_local! {
    static DEBUG: Cell<bool> = const { Cell::new(cfg!(debug_assertions)) };
    static SEEN: RefCell<HashSet<String>> = RefCell::new(HashSet::new());
}

/// Enable or disable debug diagnostics on this thread.
pub fn set_debug(enabled: bool) {
    DEBUG.with(|debug| debug.set(enabled));
}

pub fn is_debug() -> bool {
    DEBUG.with(Cell::get)
}

/// Emit a debug-only warning, once per message.
pub fn warn(message: impl Into<String>) {
    if !is_debug() {
        return;
    }
    let message = message.into();
    let first = SEEN.with(|seen| seen.borrow_mut().insert(message.clone()));
    if first {
        tracing::warn!(target: "isle::diagnostics", "{message}");
    }
}

/// Report an error from author code to the host's unhandled-error channel.
pub fn report(error: &Error) {
    tracing::error!(target: "isle::diagnostics", error = %error, "uncaught error in directive callback");
}


#[cfg(test)]
mod tests {
    use super::capture::capture;
    use super::*;

    #[test]
    fn warnings_are_deduplicated() {
        set_debug(true);
        let (_, captured) = capture(|| {
            warn("diagnostics test: duplicated");
            warn("diagnostics test: duplicated");
            warn("diagnostics test: other");
        });
        assert_eq!(
            captured.warnings(),
            vec!["diagnostics test: duplicated", "diagnostics test: other"]
        );
    }

    #[test]
    fn warnings_are_silent_outside_debug() {
        set_debug(false);
        let (_, captured) = capture(|| warn("diagnostics test: silent"));
        set_debug(true);
        assert!(captured.warnings().is_empty());
    }

    #[test]
    fn errors_are_always_reported() {
        set_debug(false);
        let (_, captured) = capture(|| report(&Error::action("boom")));
        set_debug(true);
        assert_eq!(captured.errors(), 1);
    }
}
