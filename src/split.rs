//! Order-preserving train/validation/test splits and rolling windows.
//!
//! Nothing here shuffles: every partition is a contiguous block and the
//! blocks appear in chronological order.

use crate::error::{Result, WalkForwardError};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Index ranges of a three-way chronological split.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitIndices {
    pub train: Range<usize>,
    pub validation: Range<usize>,
    pub test: Range<usize>,
}

impl SplitIndices {
    /// Training and validation together, for a final refit before testing.
    pub fn train_and_validation(&self) -> Range<usize> {
        self.train.start..self.validation.end
    }
}

/// Train/validation/test splitter that respects temporal ordering.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesSplitter {
    test_fraction: f64,
    validation_fraction: f64,
}

impl Default for TimeSeriesSplitter {
    fn default() -> Self {
        Self {
            test_fraction: 0.2,
            validation_fraction: 0.1,
        }
    }
}

impl TimeSeriesSplitter {
    /// Create a splitter.
    ///
    /// `test_fraction` must lie in (0, 1), `validation_fraction` in [0, 1), and
    /// their sum must stay below 1.
    pub fn new(test_fraction: f64, validation_fraction: f64) -> Result<Self> {
        if !(test_fraction > 0.0 && test_fraction < 1.0) {
            return Err(WalkForwardError::config(format!(
                "test_fraction must be in (0, 1), got {}",
                test_fraction
            )));
        }
        if !(0.0..1.0).contains(&validation_fraction) {
            return Err(WalkForwardError::config(format!(
                "validation_fraction must be in [0, 1), got {}",
                validation_fraction
            )));
        }
        if test_fraction + validation_fraction >= 1.0 {
            return Err(WalkForwardError::config(format!(
                "test_fraction + validation_fraction must be < 1, got {}",
                test_fraction + validation_fraction
            )));
        }
        Ok(Self {
            test_fraction,
            validation_fraction,
        })
    }

    pub fn test_fraction(&self) -> f64 {
        self.test_fraction
    }

    pub fn validation_fraction(&self) -> f64 {
        self.validation_fraction
    }

    /// Compute cut points for `n` rows.
    ///
    /// `cut_test = floor(n * (1 - test))`, `cut_val = floor(cut_test * (1 - val))`.
    pub fn split_indices(&self, n: usize) -> Result<SplitIndices> {
        let cut_test = (n as f64 * (1.0 - self.test_fraction)).floor() as usize;
        let cut_val = (cut_test as f64 * (1.0 - self.validation_fraction)).floor() as usize;

        let indices = SplitIndices {
            train: 0..cut_val,
            validation: cut_val..cut_test,
            test: cut_test..n,
        };

        if indices.train.is_empty() || indices.test.is_empty() {
            return Err(WalkForwardError::config(format!(
                "{} rows are too few for test_fraction {} and validation_fraction {}",
                n, self.test_fraction, self.validation_fraction
            )));
        }
        if self.validation_fraction > 0.0 && indices.validation.is_empty() {
            return Err(WalkForwardError::config(format!(
                "{} rows leave an empty validation partition",
                n
            )));
        }
        Ok(indices)
    }

    /// Split a slice into (train, validation, test).
    pub fn split<'a, T>(&self, data: &'a [T]) -> Result<(&'a [T], &'a [T], &'a [T])> {
        let idx = self.split_indices(data.len())?;
        Ok((
            &data[idx.train],
            &data[idx.validation],
            &data[idx.test],
        ))
    }
}

/// A train/test window over row indices, `[train_start, train_end)` and
/// `[test_start, test_end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub train_start: usize,
    pub train_end: usize,
    pub test_start: usize,
    pub test_end: usize,
}

impl Window {
    pub fn train_len(&self) -> usize {
        self.train_end - self.train_start
    }

    pub fn test_len(&self) -> usize {
        self.test_end - self.test_start
    }

    pub fn train_range(&self) -> Range<usize> {
        self.train_start..self.train_end
    }

    pub fn test_range(&self) -> Range<usize> {
        self.test_start..self.test_end
    }
}

/// Plan rolling windows over `n` rows.
///
/// Starts at `current = train_window` and advances by `step` while
/// `current + test_window <= n`. Windows are returned as planned; size
/// checks belong to the caller.
pub fn rolling_windows(n: usize, train_window: usize, test_window: usize, step: usize) -> Vec<Window> {
    let mut windows = Vec::new();
    if step == 0 || test_window == 0 {
        return windows;
    }

    let mut current = train_window;
    while current + test_window <= n {
        windows.push(Window {
            train_start: current.saturating_sub(train_window),
            train_end: current,
            test_start: current,
            test_end: (current + test_window).min(n),
        });
        current += step;
    }
    windows
}
