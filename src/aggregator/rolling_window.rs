//! Rolling window of request outcomes
//!
//! This module provides the RollingWindow which keeps the outcome (upstream error or
//! not) of the last N requests in a fixed-capacity FIFO buffer and computes the
//! error rate over them.

use std::collections::VecDeque;
use std::num::NonZeroUsize;

/// Fixed-capacity FIFO of request outcomes
///
/// Stores one boolean per observed request (`true` = upstream 5xx). When capacity is
/// reached, the oldest outcome is evicted before the new one is appended. The error
/// count is maintained on every push so the rate is computed without scanning.
#[derive(Debug, Clone)]
pub struct RollingWindow {
    /// Outcomes in arrival order, oldest at the front
    outcomes: VecDeque<bool>,
    /// Maximum number of outcomes retained
    capacity: usize,
    /// Number of `true` outcomes currently in the window
    error_count: usize,
}

impl RollingWindow {
    /// Create an empty window holding at most `capacity` outcomes
    ///
    /// # Examples
    ///
    /// ```
    /// use pool_watcher::aggregator::RollingWindow;
    /// use std::num::NonZeroUsize;
    ///
    /// let mut window = RollingWindow::new(NonZeroUsize::new(4).unwrap());
    /// assert_eq!(window.error_rate(), None);
    ///
    /// window.push(true);
    /// window.push(false);
    /// assert_eq!(window.error_rate(), Some(50.0));
    /// ```
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            outcomes: VecDeque::with_capacity(capacity.get()),
            capacity: capacity.get(),
            error_count: 0,
        }
    }

    /// Append an outcome, evicting the oldest one if the window is full
    pub fn push(&mut self, is_error: bool) {
        if self.outcomes.len() == self.capacity {
            if let Some(true) = self.outcomes.pop_front() {
                self.error_count -= 1;
            }
        }

        self.outcomes.push_back(is_error);
        if is_error {
            self.error_count += 1;
        }
    }

    /// Percentage of errors in the window, in `[0, 100]`
    ///
    /// Returns `None` for an empty window. Callers treat that as "no data" and never
    /// alert on it.
    pub fn error_rate(&self) -> Option<f64> {
        if self.outcomes.is_empty() {
            return None;
        }

        Some(100.0 * self.error_count as f64 / self.outcomes.len() as f64)
    }

    /// Number of outcomes currently held
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Configured capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of error outcomes currently held
    pub fn error_count(&self) -> usize {
        self.error_count
    }

    /// Iterate outcomes from oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = bool> + '_ {
        self.outcomes.iter().copied()
    }
}


// Property-based tests
#[cfg(test)]
mod property_tests {
    use super::*;
    use quickcheck::TestResult;
    use quickcheck_macros::quickcheck;

    #[quickcheck]
    fn prop_size_is_min_of_capacity_and_pushes(capacity: u8, outcomes: Vec<bool>) -> TestResult {
        let Some(capacity) = NonZeroUsize::new(capacity as usize) else {
            return TestResult::discard();
        };

        let mut window = RollingWindow::new(capacity);
        for outcome in &outcomes {
            window.push(*outcome);
        }

        TestResult::from_bool(window.len() == capacity.get().min(outcomes.len()))
    }

    #[quickcheck]
    fn prop_window_holds_most_recent_outcomes(capacity: u8, outcomes: Vec<bool>) -> TestResult {
        let Some(capacity) = NonZeroUsize::new(capacity as usize) else {
            return TestResult::discard();
        };

        let mut window = RollingWindow::new(capacity);
        for outcome in &outcomes {
            window.push(*outcome);
        }

        let skip = outcomes.len().saturating_sub(capacity.get());
        let expected: Vec<bool> = outcomes[skip..].to_vec();
        let held: Vec<bool> = window.iter().collect();

        TestResult::from_bool(held == expected)
    }

    #[quickcheck]
    fn prop_error_rate_matches_recount(capacity: u8, outcomes: Vec<bool>) -> TestResult {
        let Some(capacity) = NonZeroUsize::new(capacity as usize) else {
            return TestResult::discard();
        };

        let mut window = RollingWindow::new(capacity);
        for outcome in &outcomes {
            window.push(*outcome);
        }

        let recount = window.iter().filter(|&is_error| is_error).count();
        let rate_ok = match window.error_rate() {
            None => window.is_empty(),
            Some(rate) => {
                (0.0..=100.0).contains(&rate)
                    && (rate - 100.0 * recount as f64 / window.len() as f64).abs() < 1e-9
            }
        };

        TestResult::from_bool(recount == window.error_count() && rate_ok)
    }
}
