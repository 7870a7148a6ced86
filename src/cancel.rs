//! Cooperative cancellation
//!
//! The host decides when to stop (a deadline, a UI action); the engine polls
//! the token at pair, rule and step boundaries and returns partial results.

#[cfg(test)]
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cloneable stop flag shared between the host and a running call.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    /// Checks left before the token raises itself
    #[cfg(test)]
    budget: Option<Arc<AtomicUsize>>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token that reports "not cancelled" for the first `checks` polls and
    /// raises itself on the next one.
    #[cfg(test)]
    pub(crate) fn after_checks(checks: usize) -> Self {
        Self {
            budget: Some(Arc::new(AtomicUsize::new(checks))),
            ..Self::default()
        }
    }

    /// Request that running work stop at its next check point.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        #[cfg(test)]
        if let Some(budget) = &self.budget {
            if budget
                .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
                .is_err()
            {
                self.cancel();
            }
        }
        self.flag.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_flag() {
        let token = CancelToken::new();
        let handle = token.clone();
        assert!(!token.is_cancelled());
        handle.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_cancel_from_thread() {
        let token = CancelToken::new();
        let handle = token.clone();
        std::thread::spawn(move || handle.cancel()).join().unwrap();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_after_checks_trips_once_budget_is_spent() {
        let token = CancelToken::after_checks(3);
        let handle = token.clone();
        assert!(!token.is_cancelled());
        assert!(!handle.is_cancelled());
        assert!(!token.is_cancelled());
        assert!(handle.is_cancelled());
        assert!(token.is_cancelled());
    }
}
