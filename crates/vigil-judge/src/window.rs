use std::collections::VecDeque;

/// One `(value, timestamp)` sample held by a [`SlidingWindow`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub value: f64,
    pub timestamp: i64,
}

/// Samples reserved up front; larger windows grow on demand.
const INITIAL_CAPACITY: usize = 64;

/// Newest-first history of one metric identity, capped at `limit` samples.
#[derive(Debug, Clone)]
pub struct SlidingWindow {
    limit: usize,
    data: VecDeque<Sample>,
}

impl SlidingWindow {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            data: VecDeque::with_capacity(limit.min(INITIAL_CAPACITY)),
        }
    }

    /// Pushes a sample at the front and truncates to the limit.
    ///
    /// Returns `false` without modifying the window when the sample is older
    /// than the newest one held.
    pub fn push(&mut self, value: f64, timestamp: i64) -> bool {
        if let Some(newest) = self.data.front() {
            if timestamp < newest.timestamp {
                return false;
            }
        }
        self.data.push_front(Sample { value, timestamp });
        self.data.truncate(self.limit);
        true
    }

    pub fn is_full(&self) -> bool {
        self.data.len() >= self.limit
    }

    /// Values newest-first.
    pub fn values(&self) -> Vec<f64> {
        self.data.iter().map(|s| s.value).collect()
    }

    pub fn newest(&self) -> Option<&Sample> {
        self.data.front()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_newest_first_and_truncates() {
        let mut w = SlidingWindow::new(2);
        assert!(w.push(1.0, 1));
        assert!(!w.is_full());
        assert!(w.push(2.0, 2));
        assert!(w.push(3.0, 3));
        assert!(w.is_full());
        assert_eq!(w.values(), vec![3.0, 2.0]);
        assert_eq!(w.newest().map(|s| s.timestamp), Some(3));
    }

    #[test]
    fn rejects_out_of_order_samples() {
        let mut w = SlidingWindow::new(3);
        assert!(w.push(1.0, 10));
        assert!(!w.push(2.0, 9));
        assert_eq!(w.len(), 1);
        assert!(w.push(3.0, 10));
        assert_eq!(w.values(), vec![3.0, 1.0]);
    }
}
