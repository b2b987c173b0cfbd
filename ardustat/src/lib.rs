//! Cycle segmentation and capacity/energy integration for Ardustat logs.
//!
//! An Ardustat log is a space-delimited text file with one sample per row. Three
//! columns matter: elapsed time in milliseconds, cell voltage in volts and cell
//! current in milliamps. [`load_trace`] turns such a file into a [`Trace`] and
//! [`segment_and_integrate`] splits the trace into charge and discharge
//! [`HalfCycle`]s wherever the current changes sign, integrating each one into a
//! capacity (mAh) and an energy figure (mWh, reported as "power").
//!
//! Samples after the last sign change are never part of a half-cycle: the trailing
//! segment has no closing boundary and is dropped. The number of dropped samples
//! is reported in [`AnalysisResult::discarded_samples`].

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

mod cycles;
mod integrate;
mod trace;

pub use cycles::{boundary, segment_and_integrate, AnalysisResult, CycleKind, HalfCycle};
pub use integrate::trapezoid;
pub use trace::{load_trace, parse_trace, Trace, MS_PER_HOUR};

#[derive(Error, Debug)]
pub enum ArdustatError {
    #[error("malformed input on line {line}: {reason}")]
    MalformedInput { line: usize, reason: String },
    #[error("input contains no data rows")]
    EmptyInput,
    #[error("insufficient data: {samples} sample(s), at least 2 required")]
    InsufficientData { samples: usize },
    #[error("trace columns differ in length (time {time}, voltage {voltage}, current {current})")]
    LengthMismatch {
        time: usize,
        voltage: usize,
        current: usize,
    },
    #[error("invalid column layout: {0}")]
    InvalidLayout(String),
    #[error("failed to read input: {0}")]
    Io(#[from] std::io::Error),
}

/// Column holding the elapsed time in milliseconds.
pub const DEFAULT_TIME_INDEX: usize = 0;
/// Column holding the cell voltage in volts.
pub const DEFAULT_VOLTAGE_INDEX: usize = 5;
/// Column holding the cell current in milliamps.
pub const DEFAULT_CURRENT_INDEX: usize = 8;

/// Zero-based field positions of the three columns read from each row.
///
/// Fields missing from a deserialized layout keep their default position.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ColumnLayout {
    pub time_index: usize,
    pub voltage_index: usize,
    pub current_index: usize,
}

impl Default for ColumnLayout {
    fn default() -> Self {
        Self {
            time_index: DEFAULT_TIME_INDEX,
            voltage_index: DEFAULT_VOLTAGE_INDEX,
            current_index: DEFAULT_CURRENT_INDEX,
        }
    }
}

impl ColumnLayout {
    pub fn new(time_index: usize, voltage_index: usize, current_index: usize) -> Self {
        Self {
            time_index,
            voltage_index,
            current_index,
        }
    }

    /// Rejects layouts that read two quantities from the same column.
    pub fn validate(&self) -> Result<(), ArdustatError> {
        let distinct: HashSet<usize> = [self.time_index, self.voltage_index, self.current_index]
            .into_iter()
            .collect();
        if distinct.len() != 3 {
            return Err(ArdustatError::InvalidLayout(format!(
                "time={}, voltage={}, current={} must name distinct columns",
                self.time_index, self.voltage_index, self.current_index
            )));
        }
        Ok(())
    }

    /// Minimum number of fields a row needs to carry every configured column.
    pub fn min_fields(&self) -> usize {
        self.time_index
            .max(self.voltage_index)
            .max(self.current_index)
            + 1
    }
}

/// Load a log and run the full cycle analysis on it.
pub fn analyze_file(
    path: impl AsRef<Path>,
    layout: &ColumnLayout,
) -> Result<(Trace, AnalysisResult), ArdustatError> {
    let trace = load_trace(path, layout)?;
    let result = segment_and_integrate(&trace)?;
    Ok((trace, result))
}
