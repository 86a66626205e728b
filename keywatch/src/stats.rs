use std::sync::atomic::{AtomicUsize, Ordering};

/// Statistics for a `KeyWatch` consumer
#[derive(Debug, Default)]
pub(crate) struct KeyWatchStats {
    /// Counter for how many values have been delivered and installed
    deliveries: AtomicUsize,
}

impl KeyWatchStats {
    /// Gets the number of values delivered so far
    pub(crate) fn deliveries(&self) -> usize {
        self.deliveries.load(Ordering::Relaxed)
    }

    /// Increments the delivery counter and returns the previous value
    pub(crate) fn increment_deliveries(&self) -> usize {
        self.deliveries.fetch_add(1, Ordering::SeqCst)
    }
}
