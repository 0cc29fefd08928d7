//! Wake/cancel protocol shared between the scheduler task and external
//! callers (signal handlers, file watchers, push listeners).
//!
//! A wake request either cancels a sleep in progress or is remembered as a
//! single pending bypass consumed by the very next sleep attempt. It never
//! aborts an in-flight source poll.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;

#[derive(Default)]
pub(crate) struct WakeState {
    /// Set by `wakeup(force = true)`; consumed at the top of the next cycle
    /// to clear the last-shown source.
    force_reset: AtomicBool,
    /// Set by `wakeup` while no sleep is pending; consumed by exactly one
    /// subsequent sleep attempt.
    skip_next_sleep: AtomicBool,
    /// Token for the sleep currently in progress, if any.
    pending_sleep: Mutex<Option<CancellationToken>>,
}

impl WakeState {
    pub(crate) fn wakeup(&self, force: bool) {
        if force {
            self.force_reset.store(true, Ordering::SeqCst);
        }
        let pending = self
            .pending_sleep
            .lock()
            .expect("wake state mutex poisoned");
        match pending.as_ref() {
            Some(token) => token.cancel(),
            None => self.skip_next_sleep.store(true, Ordering::SeqCst),
        }
    }

    pub(crate) fn take_force_reset(&self) -> bool {
        self.force_reset.swap(false, Ordering::SeqCst)
    }

    pub(crate) fn take_skip(&self) -> bool {
        self.skip_next_sleep.swap(false, Ordering::SeqCst)
    }

    /// Register the token for a sleep that is about to begin.
    pub(crate) fn arm(&self, token: CancellationToken) {
        *self
            .pending_sleep
            .lock()
            .expect("wake state mutex poisoned") = Some(token);
    }

    /// Clear the pending-sleep slot once the wait has ended, elapsed or
    /// cancelled alike.
    pub(crate) fn disarm(&self) {
        *self
            .pending_sleep
            .lock()
            .expect("wake state mutex poisoned") = None;
    }
}

/// Cloneable control surface for a running rotation.
///
/// `wakeup` is the sole externally triggerable control during a run;
/// `shutdown` is the only supported graceful-exit path.
#[derive(Clone)]
pub struct RotatorHandle {
    pub(crate) wake: Arc<WakeState>,
    pub(crate) cancel: CancellationToken,
}

impl RotatorHandle {
    /// Request an out-of-band refresh: end the current sleep early, or skip
    /// the next one if the scheduler is mid-poll. With `force = true` the
    /// next cycle treats every source as changed.
    pub fn wakeup(&self, force: bool) {
        self.wake.wakeup(force);
    }

    /// End the run loop; the scheduler tears everything down and returns.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}
