//! Cooperative cancellation for long expansions.
//!
//! The expander polls an [`Interrupt`] before every generated occurrence, so a
//! pathological rule running up to the horizon cap can still be abandoned by
//! the caller's deadline or cancellation flag.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub trait Interrupt: Sync {
    fn is_interrupted(&self) -> bool;
}

/// Never interrupts. The default for synchronous callers.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverInterrupt;

impl Interrupt for NeverInterrupt {
    fn is_interrupted(&self) -> bool {
        false
    }
}

pub(crate) static NEVER: NeverInterrupt = NeverInterrupt;

impl Interrupt for AtomicBool {
    fn is_interrupted(&self) -> bool {
        self.load(Ordering::Relaxed)
    }
}

/// Interrupts once a wall-clock instant has passed.
#[derive(Debug, Clone, Copy)]
pub struct Deadline(Instant);

impl Deadline {
    pub fn at(instant: Instant) -> Self {
        Deadline(instant)
    }

    pub fn after(budget: Duration) -> Self {
        Deadline(Instant::now() + budget)
    }
}

impl Interrupt for Deadline {
    fn is_interrupted(&self) -> bool {
        Instant::now() >= self.0
    }
}

impl<T: Interrupt + ?Sized> Interrupt for &T {
    fn is_interrupted(&self) -> bool {
        (**self).is_interrupted()
    }
}

impl<T: Interrupt + ?Sized + Send> Interrupt for Arc<T> {
    fn is_interrupted(&self) -> bool {
        (**self).is_interrupted()
    }
}

/// Either signal interrupts.
impl<A: Interrupt, B: Interrupt> Interrupt for (A, B) {
    fn is_interrupted(&self) -> bool {
        self.0.is_interrupted() || self.1.is_interrupted()
    }
}
