//! Cooperative cancellation

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{Result, StoopError};

/// Shared flag checked by the engine between stages.
///
/// Cancellation is cooperative: a running Argon2id derivation finishes, and
/// the call is abandoned at the next checkpoint without producing output.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Returns `ErrorKind::Cancelled` once [`CancelToken::cancel`] was called.
    pub fn checkpoint(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(StoopError::cancelled())
        } else {
            Ok(())
        }
    }
}
