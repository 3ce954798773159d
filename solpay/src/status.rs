//! Checkout-session status tracking.
//!
//! A payment attempt moves `Pending -> Processing -> Completed | Failed`.
//! The machine guarantees that the terminal callbacks fire exactly once per
//! attempt no matter how many poller ticks or submission paths race to
//! report an outcome, and [`PaymentStatusMachine::reset`] re-arms it for a
//! retry.

use solana_signature::Signature;
use std::sync::Mutex;

use crate::error::PaymentError;

/// Where a payment attempt currently stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentStatus {
    /// No attempt in flight.
    Pending,
    /// Submitted or awaiting on-chain detection.
    Processing,
    /// Settled on chain.
    Completed {
        /// Signature of the confirming transaction.
        signature: Signature,
    },
    /// The attempt ended without a confirmation.
    Failed {
        /// Human-readable reason, suitable for display.
        message: String,
    },
}

impl PaymentStatus {
    /// Whether this is a terminal state for the current attempt.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Failed { .. })
    }
}

type StatusCallback = Box<dyn Fn(&PaymentStatus) + Send + Sync>;

struct Inner {
    status: PaymentStatus,
    terminal_fired: bool,
}

/// Tracks one checkout session's status and notifies on transitions.
pub struct PaymentStatusMachine {
    inner: Mutex<Inner>,
    on_change: StatusCallback,
}

impl std::fmt::Debug for PaymentStatusMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentStatusMachine")
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl Default for PaymentStatusMachine {
    fn default() -> Self {
        Self::new(|_| {})
    }
}

impl PaymentStatusMachine {
    /// Creates a machine in `Pending`, invoking `on_change` on every
    /// transition that takes effect.
    pub fn new(on_change: impl Fn(&PaymentStatus) + Send + Sync + 'static) -> Self {
        Self {
            inner: Mutex::new(Inner {
                status: PaymentStatus::Pending,
                terminal_fired: false,
            }),
            on_change: Box::new(on_change),
        }
    }

    /// Current status.
    pub fn status(&self) -> PaymentStatus {
        self.lock().status.clone()
    }

    /// Marks the attempt in flight. No-op once a terminal state is reached.
    pub fn processing(&self) {
        let mut inner = self.lock();
        if inner.status.is_terminal() {
            return;
        }
        if inner.status != PaymentStatus::Processing {
            inner.status = PaymentStatus::Processing;
            let status = inner.status.clone();
            drop(inner);
            (self.on_change)(&status);
        }
    }

    /// Records a confirmed payment. Only the first terminal report per
    /// attempt takes effect.
    pub fn complete(&self, signature: Signature) {
        self.finish(PaymentStatus::Completed { signature });
    }

    /// Records a failed attempt. Only the first terminal report per
    /// attempt takes effect.
    pub fn fail(&self, error: &PaymentError) {
        self.finish(PaymentStatus::Failed {
            message: error.to_string(),
        });
    }

    /// Re-arms the machine for a fresh attempt.
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.status = PaymentStatus::Pending;
        inner.terminal_fired = false;
        let status = inner.status.clone();
        drop(inner);
        (self.on_change)(&status);
    }

    fn finish(&self, terminal: PaymentStatus) {
        let mut inner = self.lock();
        if inner.terminal_fired {
            tracing::debug!(?terminal, "terminal status already reported, dropping");
            return;
        }
        inner.terminal_fired = true;
        inner.status = terminal.clone();
        drop(inner);
        (self.on_change)(&terminal);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // Callbacks run outside the lock, so poisoning only happens if a
        // caller panics mid-transition; recover the state regardless.
        self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_lifecycle_transitions() {
        let machine = PaymentStatusMachine::default();
        assert_eq!(machine.status(), PaymentStatus::Pending);

        machine.processing();
        assert_eq!(machine.status(), PaymentStatus::Processing);

        let signature = Signature::default();
        machine.complete(signature);
        assert_eq!(machine.status(), PaymentStatus::Completed { signature });
    }

    #[test]
    fn test_terminal_fires_exactly_once() {
        let fired = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&fired);
        let machine = PaymentStatusMachine::new(move |status| {
            if status.is_terminal() {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        machine.processing();
        machine.complete(Signature::default());
        machine.fail(&PaymentError::PollTimeout { attempts: 60 });
        machine.complete(Signature::default());

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(matches!(machine.status(), PaymentStatus::Completed { .. }));
    }

    #[test]
    fn test_processing_after_terminal_is_ignored() {
        let machine = PaymentStatusMachine::default();
        machine.fail(&PaymentError::PollTimeout { attempts: 60 });
        machine.processing();
        assert!(matches!(machine.status(), PaymentStatus::Failed { .. }));
    }

    #[test]
    fn test_reset_rearms_terminal_reporting() {
        let fired = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&fired);
        let machine = PaymentStatusMachine::new(move |status| {
            if status.is_terminal() {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        machine.complete(Signature::default());
        machine.reset();
        assert_eq!(machine.status(), PaymentStatus::Pending);
        machine.complete(Signature::default());

        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_racing_terminal_reports_from_threads() {
        let fired = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&fired);
        let machine = Arc::new(PaymentStatusMachine::new(move |status| {
            if status.is_terminal() {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        }));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let machine = Arc::clone(&machine);
                std::thread::spawn(move || {
                    if i % 2 == 0 {
                        machine.complete(Signature::default());
                    } else {
                        machine.fail(&PaymentError::PollTimeout { attempts: 60 });
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("thread joins");
        }

        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
