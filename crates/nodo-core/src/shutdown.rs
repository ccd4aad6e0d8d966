use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// ShutdownSignal: cooperative cancellation of the daemon's periodic loops
// ---------------------------------------------------------------------------

/// Watch-based shutdown coordinator.
///
/// Each periodic task holds a [`ShutdownListener`] and `select!`s on
/// [`ShutdownListener::cancelled`] alongside its timer. A listener created
/// after `trigger()` resolves immediately, so late-spawned loops still stop.
///
/// ```ignore
/// let shutdown = ShutdownSignal::new();
/// let mut listener = shutdown.subscribe();
///
/// tokio::select! {
///     _ = listener.cancelled() => { /* stop */ }
///     _ = tick() => {}
/// }
/// ```
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn subscribe(&self) -> ShutdownListener {
        ShutdownListener {
            rx: self.tx.subscribe(),
        }
    }

    /// Check if shutdown has been triggered (non-blocking).
    pub fn is_shutting_down(&self) -> bool {
        *self.tx.borrow()
    }

    /// Trigger shutdown for all listeners.
    pub fn trigger(&self) {
        let first = self.tx.send_if_modified(|stopped| {
            if *stopped {
                false
            } else {
                *stopped = true;
                true
            }
        });
        if first {
            info!("shutdown signal triggered");
        } else {
            warn!("shutdown already triggered");
        }
    }

    /// Number of listeners currently alive.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving half handed to each cancellable task.
#[derive(Debug, Clone)]
pub struct ShutdownListener {
    rx: watch::Receiver<bool>,
}

impl ShutdownListener {
    /// Resolves once shutdown has been triggered.
    pub async fn cancelled(&mut self) {
        // An Err means every sender is gone, which is shutdown as well.
        let _ = self.rx.wait_for(|stopped| *stopped).await;
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
