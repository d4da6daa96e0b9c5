use std::sync::Arc;
use tokio::sync::watch;

use super::error::{ProbeError, Result};

/// Shared cancellation flag for one test run. Cloned into every
/// sub-operation; once fired it stays fired for the rest of the run.
#[derive(Debug, Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Checkpoint: errors out if the token has fired.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(ProbeError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Resolves once the token fires; raced against in-flight transfers
    /// so a cancel aborts them at the transport level.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        if rx.wait_for(|cancelled| *cancelled).await.is_err() {
            // The sender lives in self, so this arm is unreachable; never
            // resolve spuriously.
            std::future::pending::<()>().await;
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}
