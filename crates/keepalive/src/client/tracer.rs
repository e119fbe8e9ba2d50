use std::sync::atomic::{AtomicUsize, Ordering};

use crate::client::Origin;

/// Observer notified each time the pool hands out an already-pooled connection.
///
/// Called synchronously from [`ConnectionPool::acquire`](crate::client::ConnectionPool::acquire),
/// once per reuse and never for a fresh dial, so implementations should return quickly.
pub trait ReuseTracer: Send + Sync {
    fn on_reuse(&self, origin: &Origin);
}

impl<F> ReuseTracer for F
where
    F: Fn(&Origin) + Send + Sync,
{
    fn on_reuse(&self, origin: &Origin) {
        self(origin)
    }
}

/// Counts reuse events.
#[derive(Debug, Default)]
pub struct ReuseCounter {
    count: AtomicUsize,
}

impl ReuseCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    /// Resets the counter, returning the count it held.
    pub fn reset(&self) -> usize {
        self.count.swap(0, Ordering::AcqRel)
    }
}

impl ReuseTracer for ReuseCounter {
    fn on_reuse(&self, _origin: &Origin) {
        self.count.fetch_add(1, Ordering::AcqRel);
    }
}
