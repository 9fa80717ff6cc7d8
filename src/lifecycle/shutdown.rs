//! In-flight request tracking for graceful shutdown.

use std::sync::Arc;

use tokio::sync::watch;

use crate::observability::metrics;

/// Counts requests currently inside the dispatcher.
///
/// Cloning shares the count.
#[derive(Debug, Clone)]
pub struct InFlightTracker {
    count: Arc<watch::Sender<usize>>,
}

impl InFlightTracker {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(0);
        Self { count: Arc::new(tx) }
    }

    /// Record a new request. Returns a guard that decrements on drop.
    pub fn track(&self) -> RequestGuard {
        self.count.send_modify(|count| *count += 1);
        metrics::set_in_flight(self.count());
        RequestGuard {
            count: Arc::clone(&self.count),
        }
    }

    pub fn count(&self) -> usize {
        *self.count.borrow()
    }
}

impl Default for InFlightTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Guard for one in-flight request.
/// Decrements the count when dropped, including on panic unwind.
#[derive(Debug)]
pub struct RequestGuard {
    count: Arc<watch::Sender<usize>>,
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        self.count.send_modify(|count| *count = count.saturating_sub(1));
        metrics::set_in_flight(*self.count.borrow());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracker_counts() {
        let tracker = InFlightTracker::new();
        assert_eq!(tracker.count(), 0);

        let guard1 = tracker.track();
        assert_eq!(tracker.count(), 1);

        let guard2 = tracker.clone().track();
        assert_eq!(tracker.count(), 2);

        drop(guard1);
        assert_eq!(tracker.count(), 1);

        drop(guard2);
        assert_eq!(tracker.count(), 0);
    }
}
