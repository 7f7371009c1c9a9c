//! Single-slot, cancellable one-shot timer.
//!
//! Each scheduled action waits on its own worker thread. Cancelling drops the
//! slot's sender, which wakes the worker immediately and discards the action.
//! An action that has already started running is not interrupted.
//!
//! Every schedule gets a fresh generation number, passed to the action when it
//! fires. Owners that guard the timer with a lock should re-check
//! [`DelayTimer::complete`] under that lock before acting, so a cancel that
//! raced the firing still wins.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

const TIMER_THREAD_NAME: &str = "hall-delay-timer";

#[derive(Debug)]
struct PendingTimer {
    generation: u64,
    // Dropping this is the cancellation signal.
    _cancel: mpsc::Sender<()>,
}

#[derive(Debug, Default)]
pub struct DelayTimer {
    slot: Option<PendingTimer>,
    generation: u64,
}

impl DelayTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces whatever is pending with `action`, run after `delay`.
    ///
    /// Returns the generation of the new timer, or `None` if no worker thread
    /// could be started (the slot is left empty).
    pub fn schedule<F>(&mut self, delay: Duration, action: F) -> Option<u64>
    where
        F: FnOnce(u64) + Send + 'static,
    {
        self.cancel();

        self.generation = self.generation.wrapping_add(1);
        let generation = self.generation;
        let (cancel_tx, cancel_rx) = mpsc::channel::<()>();

        let spawned = thread::Builder::new()
            .name(TIMER_THREAD_NAME.to_string())
            .spawn(move || match cancel_rx.recv_timeout(delay) {
                Err(RecvTimeoutError::Timeout) => action(generation),
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                    tracing::trace!(generation, "Delay timer cancelled");
                }
            });

        match spawned {
            Ok(_) => {
                self.slot = Some(PendingTimer {
                    generation,
                    _cancel: cancel_tx,
                });
                Some(generation)
            }
            Err(err) => {
                tracing::warn!(error = %err, "Failed to start delay timer thread");
                None
            }
        }
    }

    /// Cancels the pending timer, if any. Returns whether one was pending.
    pub fn cancel(&mut self) -> bool {
        self.slot.take().is_some()
    }

    pub fn is_pending(&self) -> bool {
        self.slot.is_some()
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.slot
            .as_ref()
            .map(|pending| pending.generation == generation)
            .unwrap_or(false)
    }

    /// Clears the slot if `generation` is still the pending timer.
    ///
    /// Returns `false` when the timer was cancelled or superseded, in which
    /// case the caller must not act.
    pub fn complete(&mut self, generation: u64) -> bool {
        if self.is_current(generation) {
            self.slot = None;
            true
        } else {
            false
        }
    }
}
