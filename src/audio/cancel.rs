//! Cancel-with-cause tokens.
//!
//! Every command that interrupts playback cancels the live token with a
//! reason. The transfer loop polls the token between chunks and reports the
//! reason back, so the worker can tell a pause (keep the resume point) from
//! a skip (forget it).

use std::sync::{Arc, OnceLock};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CancelCause {
    Pause,
    Next,
    Previous,
}

/// Shared cancellation flag carrying the reason of the first cancel.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cause: Arc<OnceLock<CancelCause>>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel the token. Only the first cause is kept; later calls are no-ops.
    pub fn cancel(&self, cause: CancelCause) {
        let _ = self.cause.set(cause);
    }

    pub fn cause(&self) -> Option<CancelCause> {
        self.cause.get().copied()
    }
}
