//! Bounded record of recent execution durations.

use std::collections::VecDeque;
use std::time::Duration;

/// One entry per minute for a day at a 1-minute cadence.
pub const HISTORY_CAPACITY: usize = 1440;

/// Fixed-capacity ring of execution durations; the oldest entry is evicted
/// on overflow. Entries may be `None` when a duration could not be measured.
#[derive(Debug, Clone)]
pub struct ExecutionHistory {
    entries: VecDeque<Option<Duration>>,
    capacity: usize,
}

impl ExecutionHistory {
    pub fn new() -> Self {
        Self::with_capacity(HISTORY_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, entry: Option<Duration>) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Oldest-first iterator over the recorded entries.
    pub fn iter(&self) -> impl Iterator<Item = &Option<Duration>> {
        self.entries.iter()
    }

    /// Mean over the non-`None` entries; zero when there are none.
    pub fn average(&self) -> Duration {
        let (sum, count) = self
            .entries
            .iter()
            .flatten()
            .fold((Duration::ZERO, 0u32), |(sum, n), d| (sum + *d, n + 1));
        if count == 0 {
            return Duration::ZERO;
        }
        sum / count
    }
}

impl Default for ExecutionHistory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_oldest_after_capacity() {
        let mut history = ExecutionHistory::new();
        for i in 0..=HISTORY_CAPACITY as u64 {
            history.push(Some(Duration::from_millis(i)));
        }
        assert_eq!(history.len(), HISTORY_CAPACITY);
        // The very first entry (0 ms) is gone; the newest (1440 ms) is kept.
        assert_eq!(history.iter().next(), Some(&Some(Duration::from_millis(1))));
        assert_eq!(
            history.iter().last(),
            Some(&Some(Duration::from_millis(HISTORY_CAPACITY as u64)))
        );
    }

    #[test]
    fn average_skips_missing_entries() {
        let mut history = ExecutionHistory::with_capacity(4);
        history.push(Some(Duration::from_millis(100)));
        history.push(None);
        history.push(Some(Duration::from_millis(300)));
        assert_eq!(history.average(), Duration::from_millis(200));
    }

    #[test]
    fn average_is_zero_when_empty_or_all_missing() {
        let mut history = ExecutionHistory::new();
        assert_eq!(history.average(), Duration::ZERO);
        history.push(None);
        history.push(None);
        assert_eq!(history.average(), Duration::ZERO);
    }
}
