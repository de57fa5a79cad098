// Published parameters plus retrain bookkeeping for one learned model

use std::collections::VecDeque;
use std::sync::Arc;

/// Current parameters of a model and its retrain cadence.
///
/// Parameters are shared as `Arc<P>` and replaced wholesale on publish, so a
/// reader holding a previous handle never sees a half-written fit.
#[derive(Debug, Clone)]
pub struct ModelState<P> {
    params: Arc<P>,
    pending: usize,
    version: u64,
    failed_fits: u64,
}

impl<P> ModelState<P> {
    pub fn new(prior: P) -> Self {
        Self {
            params: Arc::new(prior),
            pending: 0,
            version: 0,
            failed_fits: 0,
        }
    }

    pub fn params(&self) -> &P {
        &self.params
    }

    /// Shared handle to the live parameters
    pub fn shared(&self) -> Arc<P> {
        Arc::clone(&self.params)
    }

    pub fn record_observation(&mut self) {
        self.pending += 1;
    }

    pub fn pending(&self) -> usize {
        self.pending
    }

    pub fn retrain_due(&self, interval: usize) -> bool {
        self.pending >= interval
    }

    /// Swap in freshly fitted parameters
    pub fn publish(&mut self, params: P) {
        self.params = Arc::new(params);
        self.pending = 0;
        self.version += 1;
    }

    /// Record a failed fit; live parameters stay as they were
    pub fn reject(&mut self) {
        self.pending = 0;
        self.failed_fits += 1;
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn failed_fits(&self) -> u64 {
        self.failed_fits
    }
}

/// FIFO training buffer with a hard cap
#[derive(Debug, Clone)]
pub struct ExampleBuffer<T> {
    capacity: usize,
    items: VecDeque<T>,
}

impl<T> ExampleBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            items: VecDeque::with_capacity(capacity.min(4096)),
        }
    }

    pub fn push(&mut self, item: T) {
        if self.items.len() == self.capacity {
            self.items.pop_front();
        }
        self.items.push_back(item);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_swaps_params() {
        let mut state = ModelState::new(1.0_f64);
        let before = state.shared();
        state.record_observation();
        state.record_observation();
        assert!(state.retrain_due(2));

        state.publish(2.0);
        assert_eq!(*before, 1.0);
        assert_eq!(*state.params(), 2.0);
        assert_eq!(state.version(), 1);
        assert_eq!(state.pending(), 0);
    }

    #[test]
    fn test_reject_keeps_params() {
        let mut state = ModelState::new(1.0_f64);
        state.record_observation();
        state.reject();
        assert_eq!(*state.params(), 1.0);
        assert_eq!(state.failed_fits(), 1);
        assert_eq!(state.version(), 0);
    }

    #[test]
    fn test_buffer_is_bounded() {
        let mut buffer = ExampleBuffer::new(3);
        for i in 0..5 {
            buffer.push(i);
        }
        assert_eq!(buffer.iter().copied().collect::<Vec<_>>(), vec![2, 3, 4]);
    }
}
