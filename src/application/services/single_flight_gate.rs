use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use tokio::sync::Mutex;

/// Process-wide binary lock serializing access to the speech model.
///
/// Waiters are suspended, never rejected, and admitted in the order they
/// started waiting. The lock is released when the critical section finishes,
/// whether it returns an error or unwinds.
#[derive(Debug, Default)]
pub struct SingleFlightGate {
    lock: Mutex<()>,
    waiting: AtomicUsize,
}

impl SingleFlightGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn run<F, Fut, T>(&self, critical_section: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let queued_at = Instant::now();
        let ticket = WaitTicket::enter(&self.waiting);
        let _guard = self.lock.lock().await;
        drop(ticket);

        tracing::debug!(
            waited_ms = u64::try_from(queued_at.elapsed().as_millis()).unwrap_or(u64::MAX),
            still_waiting = self.waiting(),
            "Single-flight gate acquired"
        );

        critical_section().await
    }

    /// Number of callers currently suspended on the gate.
    pub fn waiting(&self) -> usize {
        self.waiting.load(Ordering::SeqCst)
    }
}

/// Keeps the waiter count honest when a queued request is dropped.
struct WaitTicket<'a>(&'a AtomicUsize);

impl<'a> WaitTicket<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for WaitTicket<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}
