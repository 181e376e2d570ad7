use std::ops::Range;
use std::time::Duration;

pub const DEFAULT_BATCH_SIZE: usize = 2000;
pub const DEFAULT_BATCH_DELAY: Duration = Duration::from_millis(16);

/// How a large feature set is sliced into renderer appends.
///
/// Slices are contiguous and in source order; the pause between slices gives
/// the single-threaded host a chance to run other tasks.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BatchPlan {
    size: usize,
    delay: Duration,
}

impl BatchPlan {
    /// A zero size is treated as one feature per batch.
    pub fn new(size: usize, delay: Duration) -> Self {
        Self {
            size: size.max(1),
            delay,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// `ceil(total / size)`; zero for an empty set.
    pub fn batch_count(&self, total: usize) -> usize {
        total.div_ceil(self.size)
    }

    pub fn ranges(&self, total: usize) -> impl Iterator<Item = Range<usize>> + '_ {
        (0..self.batch_count(total)).map(move |i| {
            let start = i * self.size;
            start..(start + self.size).min(total)
        })
    }
}

impl Default for BatchPlan {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_SIZE, DEFAULT_BATCH_DELAY)
    }
}
