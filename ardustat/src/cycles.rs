//! Half-cycle segmentation and per-cycle integration.
//!
//! The scan walks every adjacent pair of current samples. A strict sign change
//! closes the open segment: negative to positive closes a charge half-cycle,
//! positive to negative a discharge half-cycle. Zero current never closes a
//! segment. The final sample is only ever looked at as the successor of its
//! neighbour, so it and everything still open when the scan ends are dropped.

use ndarray::{s, Array1};
use serde::{Serialize, Serializer};
use tracing::debug;

use crate::integrate::trapezoid;
use crate::{ArdustatError, Trace};

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CycleKind {
    Charge,
    Discharge,
}

impl CycleKind {
    pub fn label(self) -> &'static str {
        match self {
            CycleKind::Charge => "charge",
            CycleKind::Discharge => "discharge",
        }
    }
}

/// Kind of half-cycle closed between two consecutive current samples, if any.
pub fn boundary(current: f64, next: f64) -> Option<CycleKind> {
    if current < 0.0 && next > 0.0 {
        Some(CycleKind::Charge)
    } else if current > 0.0 && next < 0.0 {
        Some(CycleKind::Discharge)
    } else {
        None
    }
}

/// One bounded charge or discharge segment with its integrated figures.
#[derive(Clone, Debug, Serialize)]
pub struct HalfCycle {
    pub kind: CycleKind,
    /// Index of the first sample in the source trace.
    pub start_index: usize,
    #[serde(serialize_with = "as_seq")]
    pub time: Array1<f64>,
    #[serde(serialize_with = "as_seq")]
    pub voltage: Array1<f64>,
    /// Absolute current, mA.
    #[serde(serialize_with = "as_seq")]
    pub current: Array1<f64>,
    /// Integral of current over time, mAh.
    pub capacity: f64,
    /// Integral of voltage times current over time, mWh. An energy, not a power.
    pub power: f64,
}

impl HalfCycle {
    fn integrate(trace: &Trace, segment: &Segment) -> Self {
        let (start, stop) = (segment.start, segment.end + 1);
        let time = trace.time().slice(s![start..stop]).to_owned();
        let voltage = trace.voltage().slice(s![start..stop]).to_owned();
        let current = trace.current().slice(s![start..stop]).mapv(f64::abs);

        let instantaneous = &voltage * &current;
        let capacity = trapezoid(current.view(), time.view());
        let power = trapezoid(instantaneous.view(), time.view());

        Self {
            kind: segment.kind,
            start_index: segment.start,
            time,
            voltage,
            current,
            capacity,
            power,
        }
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    /// Index of the last sample in the source trace.
    pub fn end_index(&self) -> usize {
        self.start_index + self.len().saturating_sub(1)
    }

    pub fn start_time(&self) -> f64 {
        self.time.first().copied().unwrap_or(0.0)
    }

    pub fn end_time(&self) -> f64 {
        self.time.last().copied().unwrap_or(0.0)
    }

    pub fn duration_hours(&self) -> f64 {
        self.end_time() - self.start_time()
    }
}

fn as_seq<S: Serializer>(values: &Array1<f64>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(values.iter())
}

/// Half-cycles of one trace, split by kind, with their figures in cycle order.
#[derive(Clone, Debug, Default, Serialize)]
pub struct AnalysisResult {
    pub charge: Vec<HalfCycle>,
    pub discharge: Vec<HalfCycle>,
    pub charge_capacity: Vec<f64>,
    pub charge_power: Vec<f64>,
    pub discharge_capacity: Vec<f64>,
    pub discharge_power: Vec<f64>,
    /// Samples left in the open segment when the scan ended.
    pub discarded_samples: usize,
}

impl AnalysisResult {
    /// All half-cycles, charge and discharge interleaved in chronological order.
    pub fn cycles(&self) -> Vec<&HalfCycle> {
        let mut all: Vec<&HalfCycle> = self.charge.iter().chain(self.discharge.iter()).collect();
        all.sort_by_key(|cycle| cycle.start_index);
        all
    }

    pub fn cycle_count(&self) -> usize {
        self.charge.len() + self.discharge.len()
    }

    fn push(&mut self, cycle: HalfCycle) {
        match cycle.kind {
            CycleKind::Charge => {
                self.charge_capacity.push(cycle.capacity);
                self.charge_power.push(cycle.power);
                self.charge.push(cycle);
            }
            CycleKind::Discharge => {
                self.discharge_capacity.push(cycle.capacity);
                self.discharge_power.push(cycle.power);
                self.discharge.push(cycle);
            }
        }
    }
}

/// Inclusive sample range closed by a boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Segment {
    kind: CycleKind,
    start: usize,
    end: usize,
}

/// Boundary scan state: where the open segment starts and what has been closed.
#[derive(Debug, Default)]
struct Segmenter {
    open_start: usize,
    closed: Vec<Segment>,
}

impl Segmenter {
    /// Feed sample `index` together with its successor's current.
    fn step(&mut self, index: usize, current: f64, next: f64) {
        if let Some(kind) = boundary(current, next) {
            self.closed.push(Segment {
                kind,
                start: self.open_start,
                end: index,
            });
            self.open_start = index + 1;
        }
    }

    /// Closed segments and the number of samples that never got a closing boundary.
    fn finish(self, len: usize) -> (Vec<Segment>, usize) {
        (self.closed, len.saturating_sub(self.open_start))
    }
}

/// Split `trace` into half-cycles and integrate each one.
pub fn segment_and_integrate(trace: &Trace) -> Result<AnalysisResult, ArdustatError> {
    if trace.len() < 2 {
        return Err(ArdustatError::InsufficientData {
            samples: trace.len(),
        });
    }

    let mut segmenter = Segmenter::default();
    for (index, pair) in trace.current().windows(2).into_iter().enumerate() {
        segmenter.step(index, pair[0], pair[1]);
    }
    let (segments, discarded) = segmenter.finish(trace.len());

    let mut result = AnalysisResult {
        discarded_samples: discarded,
        ..AnalysisResult::default()
    };
    for segment in &segments {
        let cycle = HalfCycle::integrate(trace, segment);
        debug!(
            kind = cycle.kind.label(),
            start = segment.start,
            end = segment.end,
            capacity_mah = cycle.capacity,
            power_mwh = cycle.power,
            "half-cycle closed"
        );
        result.push(cycle);
    }

    if discarded > 0 {
        debug!(
            discarded,
            "dropping trailing samples with no closing sign change"
        );
    }

    Ok(result)
}
