//! Per-context preemption controller
//!
//! Driven by the periodic timer interrupt: while an interrupt-checking scope
//! is active, each tick increments a counter; past the threshold the
//! controller requests an out-of-band interrupt into the engine. The engine
//! consumes the request at its next safe point and asks the kernel to
//! preempt. Outside a scope the controller is inert, so preemption can never
//! land in bookkeeping code.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Consecutive timer ticks inside a scope before an interrupt is requested
pub const PREEMPT_TICK_THRESHOLD: u32 = 7;

/// Tick counter and interrupt-request flag for one execution context
pub struct InterruptController {
    enabled: AtomicBool,
    tick_counter: AtomicU32,
    requested: AtomicBool,
}

impl InterruptController {
    /// Create a disabled controller
    pub fn new() -> Self {
        Self {
            enabled: AtomicBool::new(false),
            tick_counter: AtomicU32::new(0),
            requested: AtomicBool::new(false),
        }
    }

    /// Periodic tick from the timer interrupt path
    ///
    /// No-op unless an [`InterruptScope`] is active. Once the counter
    /// exceeds [`PREEMPT_TICK_THRESHOLD`], requests an interrupt and resets
    /// the counter.
    pub fn timer_tick(&self) {
        if !self.enabled.load(Ordering::Acquire) {
            return;
        }

        let ticks = self.tick_counter.fetch_add(1, Ordering::Relaxed) + 1;
        if ticks > PREEMPT_TICK_THRESHOLD {
            self.requested.store(true, Ordering::Release);
            self.tick_counter.store(0, Ordering::Relaxed);
        }
    }

    /// Consume a pending interrupt request (engine safe points)
    pub fn take_request(&self) -> bool {
        self.requested.swap(false, Ordering::AcqRel)
    }

    /// Whether an interrupt-checking scope is currently active
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }
}

impl Default for InterruptController {
    fn default() -> Self {
        Self::new()
    }
}

/// Scoped region in which timer ticks may request preemption
///
/// Entered only around script evaluation and callback invocation. Entering
/// resets the tick counter; leaving disables the controller again.
pub struct InterruptScope<'a> {
    controller: &'a InterruptController,
}

impl<'a> InterruptScope<'a> {
    /// Enable interrupt checking for the duration of the returned guard
    pub fn enter(controller: &'a InterruptController) -> Self {
        controller.tick_counter.store(0, Ordering::Relaxed);
        controller.enabled.store(true, Ordering::Release);
        Self { controller }
    }
}

impl Drop for InterruptScope<'_> {
    fn drop(&mut self) {
        self.controller.enabled.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_controller_ignores_ticks() {
        let controller = InterruptController::new();
        for _ in 0..100 {
            controller.timer_tick();
        }
        assert!(!controller.take_request());
    }

    #[test]
    fn test_request_after_threshold_exceeded() {
        let controller = InterruptController::new();
        let _scope = InterruptScope::enter(&controller);

        // threshold ticks alone are not enough
        for _ in 0..PREEMPT_TICK_THRESHOLD {
            controller.timer_tick();
        }
        assert!(!controller.take_request());

        // one more tick crosses it
        controller.timer_tick();
        assert!(controller.take_request());

        // request is consumed exactly once
        assert!(!controller.take_request());
    }

    #[test]
    fn test_counter_resets_after_request() {
        let controller = InterruptController::new();
        let _scope = InterruptScope::enter(&controller);

        for _ in 0..=PREEMPT_TICK_THRESHOLD {
            controller.timer_tick();
        }
        assert!(controller.take_request());

        // a single tick after the reset must not re-request
        controller.timer_tick();
        assert!(!controller.take_request());
    }

    #[test]
    fn test_scope_enables_and_disables() {
        let controller = InterruptController::new();
        assert!(!controller.is_enabled());

        {
            let _scope = InterruptScope::enter(&controller);
            assert!(controller.is_enabled());
        }

        assert!(!controller.is_enabled());
        controller.timer_tick();
        assert!(!controller.take_request());
    }

    #[test]
    fn test_scope_entry_resets_counter() {
        let controller = InterruptController::new();

        {
            let _scope = InterruptScope::enter(&controller);
            for _ in 0..PREEMPT_TICK_THRESHOLD {
                controller.timer_tick();
            }
        }

        // a fresh scope starts counting from zero
        let _scope = InterruptScope::enter(&controller);
        controller.timer_tick();
        assert!(!controller.take_request());
    }
}
