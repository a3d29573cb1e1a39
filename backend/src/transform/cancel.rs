//! Per-call cancellation handle.
//!
//! Every pipeline entry point takes an explicit `&Cancellation`. Nothing in
//! the engine stores a shared token, so concurrent calls on one
//! [`FieldTransformation`](super::FieldTransformation) cannot race.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Message carried by a row's failure when its run was cancelled.
pub const CANCELLED_MESSAGE: &str = "The operation was cancelled";

/// Cooperative cancellation flag, cheap to clone and share with a caller.
#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    flag: Arc<AtomicBool>,
}

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_state() {
        let handle = Cancellation::new();
        let observer = handle.clone();
        assert!(!observer.is_cancelled());
        handle.cancel();
        assert!(observer.is_cancelled());
        assert!(!Cancellation::new().is_cancelled());
    }
}
