use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::SyncError;

/// Token for cooperative cancellation between assets.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Ok to continue, `SyncError::Cancelled` once cancellation was requested.
    pub fn check(&self) -> Result<(), SyncError> {
        if self.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancellation_token() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        assert!(token.check().is_ok());

        let shared = token.clone();
        shared.cancel();
        assert!(token.is_cancelled());
        assert!(matches!(token.check(), Err(SyncError::Cancelled)));
    }
}
