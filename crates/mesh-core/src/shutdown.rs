//! Shared shutdown signal for the reader, writer and runtime loop.
//!
//! One `ShutdownSignal` is created per runtime and cloned into every thread of
//! control. Whichever component fails first raises it. The transport threads
//! poll [`ShutdownSignal::is_raised`] at their timeout boundary, while async
//! code can await [`ShutdownSignal::raised`] and wake up immediately.

use std::sync::Arc;
use tokio::sync::watch;

/// A cloneable, raise-once shutdown flag.
///
/// All clones observe the same state. Raising is idempotent.
///
/// # Example
///
/// ```
/// use mesh_core::shutdown::ShutdownSignal;
///
/// let signal = ShutdownSignal::new();
/// let observer = signal.clone();
///
/// assert!(signal.raise());
/// assert!(observer.is_raised());
/// assert!(!observer.raise()); // already raised
/// ```
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    state: Arc<watch::Sender<bool>>,
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownSignal {
    /// Create a new, lowered signal.
    pub fn new() -> Self {
        let (state, _) = watch::channel(false);
        Self {
            state: Arc::new(state),
        }
    }

    /// Raise the signal.
    ///
    /// Returns `true` if this call was the one that raised it.
    pub fn raise(&self) -> bool {
        !self.state.send_replace(true)
    }

    /// Check if the signal has been raised.
    pub fn is_raised(&self) -> bool {
        *self.state.borrow()
    }

    /// Wait until the signal is raised.
    ///
    /// Returns immediately if it already is.
    pub async fn raised(&self) {
        let mut rx = self.state.subscribe();
        // The sender lives in `self`, so `wait_for` can only return once raised.
        let _ = rx.wait_for(|raised| *raised).await;
    }

    /// Return an error if the signal has been raised.
    pub fn check(&self) -> Result<(), ShutdownRequested> {
        if self.is_raised() {
            Err(ShutdownRequested)
        } else {
            Ok(())
        }
    }
}

/// Error returned when work is refused because shutdown was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownRequested;

impl std::fmt::Display for ShutdownRequested {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Shutdown was requested")
    }
}

impl std::error::Error for ShutdownRequested {}

impl From<ShutdownRequested> for crate::error::MeshError {
    fn from(_: ShutdownRequested) -> Self {
        crate::error::MeshError::Disconnected
    }
}
