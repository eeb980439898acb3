//! Scoped "do not terminate" signalling.
//!
//! Every long-running engine operation holds a [`CriticalGuard`] for its
//! whole lifetime. The host reads [`TerminationSignal::allows_termination`]
//! (or watches it) before quitting. Guards release on drop, so error paths
//! and panics restore terminability without explicit calls.

use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;

#[derive(Debug)]
struct Shared {
    held: Mutex<usize>,
    allow_tx: watch::Sender<bool>,
}

impl Shared {
    // The count and the published value only change together, under this lock.
    fn held(&self) -> MutexGuard<'_, usize> {
        self.held.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Host-facing view of in-flight critical operations
#[derive(Debug, Clone)]
pub struct TerminationSignal {
    shared: Arc<Shared>,
}

impl Default for TerminationSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl TerminationSignal {
    pub fn new() -> Self {
        let (allow_tx, _) = watch::channel(true);
        Self {
            shared: Arc::new(Shared {
                held: Mutex::new(0),
                allow_tx,
            }),
        }
    }

    /// Mark the start of an operation that must not be interrupted
    pub fn begin_critical(&self, label: &str) -> CriticalGuard {
        let mut held = self.shared.held();
        *held += 1;
        self.shared.allow_tx.send_replace(false);
        log::debug!("Critical section '{}' started ({} held)", label, *held);
        drop(held);
        CriticalGuard {
            shared: Arc::clone(&self.shared),
            label: label.to_string(),
        }
    }

    pub fn allows_termination(&self) -> bool {
        *self.shared.held() == 0
    }

    pub fn held_count(&self) -> usize {
        *self.shared.held()
    }

    /// Receiver that flips whenever the first guard is taken or the last one released
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.shared.allow_tx.subscribe()
    }

    /// Resolve once no guard is held
    pub async fn wait_until_allowed(&self) {
        let mut rx = self.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|allowed| *allowed).await;
    }
}

/// Held for the duration of a critical operation
#[derive(Debug)]
#[must_use = "the critical section ends as soon as the guard is dropped"]
pub struct CriticalGuard {
    shared: Arc<Shared>,
    label: String,
}

impl Drop for CriticalGuard {
    fn drop(&mut self) {
        let mut held = self.shared.held();
        *held = held.saturating_sub(1);
        if *held == 0 {
            self.shared.allow_tx.send_replace(true);
        }
        log::debug!(
            "Critical section '{}' finished ({} held)",
            self.label,
            *held
        );
    }
}
