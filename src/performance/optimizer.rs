//! Interval optimizer.
//!
//! Deterministic policy over a [`PerformanceRecord`]:
//!
//! | success rate | mean duration | action |
//! |---|---|---|
//! | `>= high` | `< fast` | interval × `decrease_factor`, clamped to the task minimum |
//! | `< low` | any | interval × `increase_factor`, clamped to the task maximum |
//! | otherwise | | unchanged |
//!
//! Results are rounded to whole seconds and always land inside the task's
//! [`IntervalBounds`].

use crate::config::OptimizerConfig;
use crate::performance::PerformanceRecord;
use std::time::Duration;

/// Inclusive `[min, max]` range a task's interval may occupy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntervalBounds {
    min: Duration,
    max: Duration,
}

impl IntervalBounds {
    /// Bounds for a task registered with `interval`.
    ///
    /// The minimum defaults to `floor` and is never below it; the maximum
    /// defaults to `ceiling` and is never above it. Both are widened to
    /// include the registered interval so registration never moves it.
    pub fn for_task(
        interval: Duration,
        min: Option<Duration>,
        max: Option<Duration>,
        floor: Duration,
        ceiling: Duration,
    ) -> Self {
        let min = min.unwrap_or(floor).max(floor).min(interval);
        let max = max.unwrap_or(ceiling).min(ceiling).max(interval);
        Self { min, max }
    }

    /// Lower bound.
    pub fn min(&self) -> Duration {
        self.min
    }

    /// Upper bound.
    pub fn max(&self) -> Duration {
        self.max
    }

    /// Clamp `interval` into the bounds.
    pub fn clamp(&self, interval: Duration) -> Duration {
        interval.clamp(self.min, self.max)
    }
}

/// What the optimizer decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntervalAdjustment {
    /// Task runs more often.
    Tightened {
        /// Previous interval.
        from: Duration,
        /// New interval.
        to: Duration,
    },
    /// Task runs less often.
    Loosened {
        /// Previous interval.
        from: Duration,
        /// New interval.
        to: Duration,
    },
    /// No change.
    Unchanged,
}

impl IntervalAdjustment {
    /// New interval, if it changed.
    pub fn new_interval(&self) -> Option<Duration> {
        match self {
            Self::Tightened { to, .. } | Self::Loosened { to, .. } => Some(*to),
            Self::Unchanged => None,
        }
    }
}

/// Stateless interval policy.
#[derive(Debug, Clone)]
pub struct IntervalOptimizer {
    min_samples: u64,
    fast_threshold: Duration,
    high_success_rate: f64,
    low_success_rate: f64,
    decrease_factor: f64,
    increase_factor: f64,
}

impl Default for IntervalOptimizer {
    fn default() -> Self {
        Self::new(&OptimizerConfig::default())
    }
}

impl IntervalOptimizer {
    /// Build from the `[optimizer]` config section.
    pub fn new(config: &OptimizerConfig) -> Self {
        Self {
            min_samples: config.min_samples,
            fast_threshold: Duration::from_millis(config.fast_threshold_ms),
            high_success_rate: config.high_success_rate,
            low_success_rate: config.low_success_rate,
            decrease_factor: config.decrease_factor,
            increase_factor: config.increase_factor,
        }
    }

    /// Decide the next interval for a task currently at `current`.
    pub fn adjust(
        &self,
        record: &PerformanceRecord,
        current: Duration,
        bounds: IntervalBounds,
    ) -> IntervalAdjustment {
        if record.total() < self.min_samples {
            return IntervalAdjustment::Unchanged;
        }

        let rate = record.success_rate();
        let fast = record
            .mean_duration()
            .is_some_and(|mean| mean < self.fast_threshold);

        if rate < self.low_success_rate {
            let to = bounds.clamp(scale(current, self.increase_factor)).max(current);
            if to > current {
                return IntervalAdjustment::Loosened { from: current, to };
            }
        } else if rate >= self.high_success_rate && fast {
            let to = bounds.clamp(scale(current, self.decrease_factor)).min(current);
            if to < current {
                return IntervalAdjustment::Tightened { from: current, to };
            }
        }
        IntervalAdjustment::Unchanged
    }
}

fn scale(interval: Duration, factor: f64) -> Duration {
    let secs = (interval.as_secs_f64() * factor).round();
    if secs.is_finite() && secs >= 0.0 {
        Duration::from_secs(secs as u64)
    } else {
        interval
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::scheduler::tasks::TaskRunOutcome;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    fn bounds(interval: u64) -> IntervalBounds {
        IntervalBounds::for_task(secs(interval), None, None, secs(60), secs(86_400))
    }

    fn record_with(successes: u32, failures: u32, duration: Duration) -> PerformanceRecord {
        let mut record = PerformanceRecord::new(20, secs(600));
        for _ in 0..successes {
            record.record(TaskRunOutcome::Success, duration);
        }
        for _ in 0..failures {
            record.record(TaskRunOutcome::Failure, duration);
        }
        record
    }

    #[test]
    fn fast_reliable_task_is_tightened() {
        let optimizer = IntervalOptimizer::default();
        let record = record_with(18, 2, secs(2));
        let adjustment = optimizer.adjust(&record, secs(600), bounds(600));
        assert_eq!(
            adjustment,
            IntervalAdjustment::Tightened {
                from: secs(600),
                to: secs(480)
            }
        );
    }

    #[test]
    fn tightening_stops_at_task_minimum() {
        let optimizer = IntervalOptimizer::default();
        let record = record_with(20, 0, secs(1));
        let b = IntervalBounds::for_task(secs(100), Some(secs(90)), None, secs(60), secs(86_400));

        let first = optimizer.adjust(&record, secs(100), b);
        assert_eq!(first.new_interval(), Some(secs(90)));
        assert_eq!(
            optimizer.adjust(&record, secs(90), b),
            IntervalAdjustment::Unchanged
        );
    }

    #[test]
    fn slow_reliable_task_is_unchanged() {
        let optimizer = IntervalOptimizer::default();
        let record = record_with(20, 0, secs(30));
        assert_eq!(
            optimizer.adjust(&record, secs(600), bounds(600)),
            IntervalAdjustment::Unchanged
        );
    }

    #[test]
    fn middling_success_rate_is_unchanged() {
        let optimizer = IntervalOptimizer::default();
        let record = record_with(6, 4, secs(1));
        assert_eq!(
            optimizer.adjust(&record, secs(600), bounds(600)),
            IntervalAdjustment::Unchanged
        );
    }

    #[test]
    fn failing_task_is_loosened_and_capped() {
        let optimizer = IntervalOptimizer::default();
        let record = record_with(1, 9, secs(1));

        assert_eq!(
            optimizer.adjust(&record, secs(600), bounds(600)),
            IntervalAdjustment::Loosened {
                from: secs(600),
                to: secs(900)
            }
        );

        let near_cap = secs(80_000);
        assert_eq!(
            optimizer.adjust(&record, near_cap, bounds(600)).new_interval(),
            Some(secs(86_400))
        );
        assert_eq!(
            optimizer.adjust(&record, secs(86_400), bounds(600)),
            IntervalAdjustment::Unchanged
        );
    }

    #[test]
    fn too_few_samples_never_adjust() {
        let optimizer = IntervalOptimizer::default();
        let record = record_with(0, 4, secs(1));
        assert_eq!(
            optimizer.adjust(&record, secs(600), bounds(600)),
            IntervalAdjustment::Unchanged
        );
    }

    #[test]
    fn repeated_adjustments_stay_within_bounds() {
        let optimizer = IntervalOptimizer::default();
        let b = bounds(1800);

        let good = record_with(20, 0, secs(1));
        let mut interval = secs(1800);
        for _ in 0..100 {
            if let Some(next) = optimizer.adjust(&good, interval, b).new_interval() {
                interval = next;
            }
            assert!(interval >= b.min() && interval <= b.max());
        }
        assert_eq!(interval, secs(60));

        let bad = record_with(0, 20, secs(1));
        for _ in 0..100 {
            if let Some(next) = optimizer.adjust(&bad, interval, b).new_interval() {
                interval = next;
            }
            assert!(interval >= b.min() && interval <= b.max());
        }
        assert_eq!(interval, secs(86_400));
    }

    #[test]
    fn bounds_include_registered_interval() {
        // A task registered below the safety floor is never tightened further.
        let b = IntervalBounds::for_task(secs(10), None, None, secs(60), secs(86_400));
        assert_eq!(b.min(), secs(10));
        let optimizer = IntervalOptimizer::default();
        let record = record_with(20, 0, secs(1));
        assert_eq!(
            optimizer.adjust(&record, secs(10), b),
            IntervalAdjustment::Unchanged
        );

        // An explicit minimum below the floor is raised to the floor.
        let b = IntervalBounds::for_task(secs(600), Some(secs(5)), None, secs(60), secs(86_400));
        assert_eq!(b.min(), secs(60));

        // An explicit maximum above the ceiling is lowered to it.
        let b = IntervalBounds::for_task(secs(600), None, Some(secs(999_999)), secs(60), secs(86_400));
        assert_eq!(b.max(), secs(86_400));
    }
}
