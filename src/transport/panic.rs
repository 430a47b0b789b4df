// src/transport/panic.rs

//! Panic capture.
//!
//! `catch_unwind` only hands back the payload; by then the stack is gone.
//! The hook installed here runs *before* unwinding starts and stores the
//! message, location and a forced backtrace in a thread-local slot that the
//! catching side picks up.

use std::backtrace::Backtrace;
use std::cell::{Cell, RefCell};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Once;

use super::failure::{RemoteFailure, panic_message};

/// Diagnostic snapshot taken inside the panic hook.
#[derive(Debug, Clone)]
pub struct CapturedPanic {
    pub message: String,
    pub location: Option<String>,
    pub backtrace: String,
}

impl CapturedPanic {
    /// Human-readable trace text, in the shape of the default panic output.
    pub fn render(&self) -> String {
        let location = self.location.as_deref().unwrap_or("<unknown>");
        format!(
            "panicked at {location}:\n{}\n\nstack backtrace:\n{}",
            self.message, self.backtrace
        )
    }
}

thread_local! {
    static LAST_PANIC: RefCell<Option<CapturedPanic>> = const { RefCell::new(None) };
    static CAPTURE_DEPTH: Cell<usize> = const { Cell::new(0) };
}

static HOOK: Once = Once::new();

/// Install the capturing panic hook (idempotent).
///
/// Panics outside a [`catch_panic`] scope still reach the previous hook, so
/// the default "thread panicked" output is unchanged for them.
pub fn install_capture_hook() {
    HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            let captured = CapturedPanic {
                message: panic_message(info.payload()),
                location: info
                    .location()
                    .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column())),
                backtrace: Backtrace::force_capture().to_string(),
            };
            LAST_PANIC.with(|slot| *slot.borrow_mut() = Some(captured));

            if CAPTURE_DEPTH.with(Cell::get) == 0 {
                previous(info);
            }
        }));
    });
}

/// Look at the most recent capture on this thread without consuming it.
pub fn peek_captured() -> Option<CapturedPanic> {
    LAST_PANIC.with(|slot| slot.borrow().clone())
}

fn take_captured() -> Option<CapturedPanic> {
    LAST_PANIC.with(|slot| slot.borrow_mut().take())
}

/// Run `f`, converting a panic into a [`RemoteFailure`] carrying the trace
/// recorded by the hook.
pub fn catch_panic<F, R>(f: F) -> Result<R, RemoteFailure>
where
    F: FnOnce() -> R,
{
    install_capture_hook();
    take_captured();

    CAPTURE_DEPTH.with(|d| d.set(d.get() + 1));
    let result = panic::catch_unwind(AssertUnwindSafe(f));
    CAPTURE_DEPTH.with(|d| d.set(d.get() - 1));

    result.map_err(|payload| RemoteFailure::from_panic(payload.as_ref(), take_captured()))
}
