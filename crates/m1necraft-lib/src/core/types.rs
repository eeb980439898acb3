use std::sync::Arc;
use tokio::sync::watch;

/// Progress reporter for fetch and extract operations.
/// Implementations forward fractions to the UI or to a bundle's progress cell.
pub trait ProgressReporter: Send + Sync {
    /// Set completion in [0, 1]
    fn set_fraction(&self, fraction: f64);

    /// Update bytes transferred; unknown totals leave the fraction untouched
    fn update_bytes(&self, transferred: u64, total: Option<u64>) {
        if let Some(total) = total.filter(|t| *t > 0) {
            self.set_fraction(transferred as f64 / total as f64);
        }
    }

    /// Set a short status message
    fn set_message(&self, _message: &str) {}

    /// Check if operation has been cancelled
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// A progress reporter that does nothing (silent).
/// Useful for background verification or tests.
pub struct SilentProgressReporter;

impl ProgressReporter for SilentProgressReporter {
    fn set_fraction(&self, _fraction: f64) {}
}

/// Maps a child operation's [0, 1] onto `[offset, offset + span]` of a parent
pub struct ScaledReporter {
    inner: Arc<dyn ProgressReporter>,
    offset: f64,
    span: f64,
}

impl ScaledReporter {
    pub fn new(inner: Arc<dyn ProgressReporter>, offset: f64, span: f64) -> Self {
        Self {
            inner,
            offset,
            span,
        }
    }

    /// First or second half of a parent's range
    pub fn half(inner: Arc<dyn ProgressReporter>, second: bool) -> Self {
        Self::new(inner, if second { 0.5 } else { 0.0 }, 0.5)
    }
}

impl ProgressReporter for ScaledReporter {
    fn set_fraction(&self, fraction: f64) {
        self.inner
            .set_fraction(self.offset + fraction.clamp(0.0, 1.0) * self.span);
    }

    fn set_message(&self, message: &str) {
        self.inner.set_message(message);
    }

    fn is_cancelled(&self) -> bool {
        self.inner.is_cancelled()
    }
}

/// Cancellation token wrapper
#[derive(Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    pub fn new(rx: watch::Receiver<bool>) -> Self {
        Self { rx }
    }

    /// Token plus the sender that cancels it
    pub fn pair() -> (watch::Sender<bool>, Self) {
        let (tx, rx) = watch::channel(false);
        (tx, Self::new(rx))
    }

    /// A token that is never cancelled
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self::new(rx)
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }
}
