//! Switch for property validation on assignment.
//!
//! The switch is process-wide. Scoped changes go through [`validate`],
//! which returns a guard restoring the previous state when dropped; explicit
//! changes go through [`set_validation`].

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::trace;

static VALIDATION_ON: AtomicBool = AtomicBool::new(true);

pub fn validation_on() -> bool {
    VALIDATION_ON.load(Ordering::SeqCst)
}

/// Turns validation on or off until changed again.
pub fn set_validation(on: bool) {
    trace!(on, "property validation set");
    VALIDATION_ON.store(on, Ordering::SeqCst);
}

/// Restores the validation state captured when it was created.
#[must_use = "validation reverts as soon as the guard is dropped"]
#[derive(Debug)]
pub struct ValidationGuard {
    prior: bool,
}

impl Drop for ValidationGuard {
    fn drop(&mut self) {
        trace!(on = self.prior, "property validation restored");
        VALIDATION_ON.store(self.prior, Ordering::SeqCst);
    }
}

/// Sets validation to `on` for the lifetime of the returned guard.
pub fn validate(on: bool) -> ValidationGuard {
    trace!(on, "property validation scoped");
    let prior = VALIDATION_ON.swap(on, Ordering::SeqCst);
    ValidationGuard { prior }
}

/// Runs `f` with validation off. The prior state comes back even if `f`
/// panics.
pub fn without_property_validation<R>(f: impl FnOnce() -> R) -> R {
    let _guard = validate(false);
    f()
}
