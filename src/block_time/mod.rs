//! Block time estimation.
//!
//! The node status endpoint only reports the latest height, so block times are
//! approximated from the wall-clock instants at which new heights are observed.
//! The [IntervalEstimator] keeps a bounded FIFO history of those deltas and
//! derives rolling statistics from it.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Default number of intervals retained by an [IntervalEstimator].
pub const DEFAULT_HISTORY_SIZE: usize = 100;

/// Minimum number of samples before the block time may be considered stable.
pub const MIN_STABLE_SAMPLES: usize = 10;

/// Maximum spread `(max - min) / average` of a stable block time.
const STABILITY_THRESHOLD: f64 = 0.5;

/// A chain height seen at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockObservation {
    /// The reported latest height
    pub height: u64,
    /// When the height was observed
    pub timestamp: Instant,
}

/// Rolling statistics over the interval history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IntervalStats {
    /// Arithmetic mean of all intervals
    pub average: Duration,
    /// Shortest interval
    pub min: Duration,
    /// Longest interval
    pub max: Duration,
}

/// Bounded history of time deltas between consecutive observed heights.
///
/// Observations with a height at or below the current baseline are ignored,
/// which makes [IntervalEstimator::update] idempotent against duplicate or
/// out-of-order reports.
#[derive(Debug, Clone)]
pub struct IntervalEstimator {
    /// The last accepted observation
    baseline: Option<BlockObservation>,
    /// Recorded intervals, oldest first
    history: VecDeque<Duration>,
    /// Maximum history length
    capacity: usize,
}

impl Default for IntervalEstimator {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_SIZE)
    }
}

impl IntervalEstimator {
    /// Creates an empty estimator. A capacity of zero falls back to
    /// [DEFAULT_HISTORY_SIZE].
    pub fn new(capacity: usize) -> Self {
        let capacity = if capacity == 0 {
            DEFAULT_HISTORY_SIZE
        } else {
            capacity
        };

        Self {
            baseline: None,
            history: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Feeds a new observation. Returns the interval recorded by this call, if any.
    pub fn update(&mut self, height: u64, timestamp: Instant) -> Option<Duration> {
        let observation = BlockObservation { height, timestamp };

        let baseline = match self.baseline {
            Some(baseline) => baseline,
            None => {
                self.baseline = Some(observation);
                return None;
            }
        };

        if height <= baseline.height {
            return None;
        }

        let delta = timestamp.saturating_duration_since(baseline.timestamp);
        if self.history.len() == self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(delta);
        self.baseline = Some(observation);

        Some(delta)
    }

    /// Mean of the recorded intervals, zero when empty.
    pub fn average_interval(&self) -> Duration {
        if self.history.is_empty() {
            return Duration::ZERO;
        }

        let total: u128 = self.history.iter().map(Duration::as_nanos).sum();
        nanos_to_duration(total / self.history.len() as u128)
    }

    /// The most recently recorded interval, zero when empty.
    pub fn latest_interval(&self) -> Duration {
        self.history.back().copied().unwrap_or_default()
    }

    /// Average, minimum and maximum in a single pass. All zero when empty.
    pub fn stats(&self) -> IntervalStats {
        let mut intervals = self.history.iter().copied();
        let first = match intervals.next() {
            Some(first) => first,
            None => return IntervalStats::default(),
        };

        let mut min = first;
        let mut max = first;
        let mut total = first.as_nanos();
        for interval in intervals {
            min = min.min(interval);
            max = max.max(interval);
            total += interval.as_nanos();
        }

        IntervalStats {
            average: nanos_to_duration(total / self.history.len() as u128),
            min,
            max,
        }
    }

    /// Whether the block time has settled. Requires at least
    /// [MIN_STABLE_SAMPLES] intervals; fewer is never stable.
    pub fn is_stable(&self) -> bool {
        if self.history.len() < MIN_STABLE_SAMPLES {
            return false;
        }

        let stats = self.stats();
        if stats.average.is_zero() {
            return false;
        }

        let spread = (stats.max - stats.min).as_secs_f64() / stats.average.as_secs_f64();
        spread < STABILITY_THRESHOLD
    }

    /// Number of blocks expected within `duration` at the current average.
    pub fn estimate_blocks_in(&self, duration: Duration) -> u64 {
        let average = self.average_interval();
        if average.is_zero() {
            return 0;
        }

        u64::try_from(duration.as_nanos() / average.as_nanos()).unwrap_or(u64::MAX)
    }

    /// Time expected for `block_count` blocks at the current average.
    pub fn estimate_time_for(&self, block_count: u64) -> Duration {
        let average = self.average_interval();
        if average.is_zero() {
            return Duration::ZERO;
        }

        nanos_to_duration(average.as_nanos().saturating_mul(block_count as u128))
    }

    /// Replaces the history with a single externally known interval.
    /// The baseline observation is kept.
    pub fn seed(&mut self, interval: Duration) {
        self.history.clear();
        self.history.push_back(interval);
    }

    /// Clears the history and the baseline.
    pub fn reset(&mut self) {
        self.history.clear();
        self.baseline = None;
    }

    /// The last accepted observation.
    pub fn baseline(&self) -> Option<BlockObservation> {
        self.baseline
    }

    /// Number of recorded intervals.
    pub fn len(&self) -> usize {
        self.history.len()
    }

    /// Whether no interval has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Maximum number of retained intervals.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

fn nanos_to_duration(nanos: u128) -> Duration {
    Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
}
