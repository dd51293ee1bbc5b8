//! Single-fire completion state for one task

use std::sync::atomic::{AtomicBool, Ordering};

/// Ensures a task's finalization logic runs exactly once.
///
/// Any signal source (worker reply, process exit, fault, timeout) claims
/// finalization through [`settle`](Self::settle); the first caller wins
/// and every later call is a no-op, whatever the arrival order or
/// duplication of events.
#[derive(Debug, Default)]
pub struct CompletionGuard {
    settled: AtomicBool,
}

impl CompletionGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the right to finalize. Returns `true` for the first caller
    /// only.
    pub fn settle(&self) -> bool {
        !self.settled.swap(true, Ordering::SeqCst)
    }

    /// Whether finalization has already been claimed.
    pub fn is_settled(&self) -> bool {
        self.settled.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn test_first_settle_wins() {
        let guard = CompletionGuard::new();
        assert!(!guard.is_settled());
        assert!(guard.settle());
        assert!(!guard.settle());
        assert!(guard.is_settled());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_racing_settles_yield_exactly_one_winner() {
        let guard = Arc::new(CompletionGuard::new());
        let winners = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..32 {
            let guard = guard.clone();
            let winners = winners.clone();
            handles.push(tokio::spawn(async move {
                if guard.settle() {
                    winners.fetch_add(1, Ordering::SeqCst);
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(winners.load(Ordering::SeqCst), 1);
    }
}
