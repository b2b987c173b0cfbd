use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind};
use std::path::Path;

use ndarray::Array1;

use crate::{ArdustatError, ColumnLayout};

/// Milliseconds per hour; raw timestamps are divided by this after anchoring.
pub const MS_PER_HOUR: f64 = 3_600_000.0;

/// Aligned time (h), voltage (V) and current (mA) samples from one log.
///
/// All three columns have the same length and index `i` refers to the same
/// instant in each of them. Current keeps its sign.
#[derive(Clone, Debug, PartialEq)]
pub struct Trace {
    time: Array1<f64>,
    voltage: Array1<f64>,
    current: Array1<f64>,
}

impl Trace {
    pub fn new(
        time: Vec<f64>,
        voltage: Vec<f64>,
        current: Vec<f64>,
    ) -> Result<Self, ArdustatError> {
        if time.len() != voltage.len() || time.len() != current.len() {
            return Err(ArdustatError::LengthMismatch {
                time: time.len(),
                voltage: voltage.len(),
                current: current.len(),
            });
        }
        Ok(Self {
            time: Array1::from_vec(time),
            voltage: Array1::from_vec(voltage),
            current: Array1::from_vec(current),
        })
    }

    pub fn time(&self) -> &Array1<f64> {
        &self.time
    }

    pub fn voltage(&self) -> &Array1<f64> {
        &self.voltage
    }

    pub fn current(&self) -> &Array1<f64> {
        &self.current
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    /// Span between the first and last sample, in hours.
    pub fn duration_hours(&self) -> f64 {
        match (self.time.first(), self.time.last()) {
            (Some(start), Some(end)) => end - start,
            _ => 0.0,
        }
    }
}

/// Open `path` and parse it with [`parse_trace`].
pub fn load_trace(path: impl AsRef<Path>, layout: &ColumnLayout) -> Result<Trace, ArdustatError> {
    let file = File::open(path.as_ref())?;
    parse_trace(BufReader::new(file), layout)
}

/// Parse space-delimited rows into a [`Trace`].
///
/// Fields are split on single spaces, so consecutive spaces produce empty fields.
/// Every row, blank ones included, must carry all configured columns. Time is
/// shifted so the first sample sits at zero and converted from milliseconds to hours.
pub fn parse_trace<R: BufRead>(reader: R, layout: &ColumnLayout) -> Result<Trace, ArdustatError> {
    layout.validate()?;
    let min_fields = layout.min_fields();

    let mut raw_time = Vec::new();
    let mut voltage = Vec::new();
    let mut current = Vec::new();

    for (idx, line) in reader.lines().enumerate() {
        let line_no = idx + 1;
        let line = line.map_err(|err| match err.kind() {
            ErrorKind::InvalidData => ArdustatError::MalformedInput {
                line: line_no,
                reason: "row is not valid UTF-8".to_string(),
            },
            _ => ArdustatError::Io(err),
        })?;
        let row = line.trim_end_matches('\r');
        let fields: Vec<&str> = row.split(' ').collect();
        if fields.len() < min_fields {
            return Err(ArdustatError::MalformedInput {
                line: line_no,
                reason: format!(
                    "expected at least {} fields, found {}",
                    min_fields,
                    fields.len()
                ),
            });
        }
        raw_time.push(parse_field(&fields, layout.time_index, "time", line_no)?);
        voltage.push(parse_field(&fields, layout.voltage_index, "voltage", line_no)?);
        current.push(parse_field(&fields, layout.current_index, "current", line_no)?);
    }

    let t0 = *raw_time.first().ok_or(ArdustatError::EmptyInput)?;
    let time = raw_time.iter().map(|t| (t - t0) / MS_PER_HOUR).collect();
    Trace::new(time, voltage, current)
}

fn parse_field(
    fields: &[&str],
    index: usize,
    name: &str,
    line: usize,
) -> Result<f64, ArdustatError> {
    let raw = fields[index].trim();
    raw.parse::<f64>()
        .map_err(|_| ArdustatError::MalformedInput {
            line,
            reason: format!("{} field {:?} (column {}) is not a number", name, raw, index),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use std::io::Cursor;

    fn parse(text: &str) -> Result<Trace, ArdustatError> {
        parse_trace(Cursor::new(text), &ColumnLayout::default())
    }

    #[test]
    fn time_is_anchored_and_converted_to_hours() {
        let trace = parse(
            "5000 a b c d 3.7 e f 10\n\
             3605000 a b c d 3.6 e f -10\n",
        )
        .unwrap();
        assert_eq!(trace.time(), &array![0.0, 1.0]);
        assert_eq!(trace.voltage(), &array![3.7, 3.6]);
        assert_eq!(trace.current(), &array![10.0, -10.0]);
        assert!((trace.duration_hours() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn short_row_reports_line_number() {
        let err = parse("0 a b c d 3.7 e f 10\n1000 a b c d 3.7\n").unwrap_err();
        match err {
            ArdustatError::MalformedInput { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn non_numeric_field_is_malformed() {
        let err = parse("0 a b c d volts e f 10\n").unwrap_err();
        assert!(matches!(err, ArdustatError::MalformedInput { line: 1, .. }));
    }

    #[test]
    fn empty_input_is_rejected() {
        assert!(matches!(parse(""), Err(ArdustatError::EmptyInput)));
    }

    #[test]
    fn blank_row_is_malformed() {
        let err = parse("0 . . . . 3.7 . . 100\n\n1000 . . . . 3.6 . . -50\n").unwrap_err();
        assert!(matches!(err, ArdustatError::MalformedInput { line: 2, .. }));

        let err = parse("\n  \n").unwrap_err();
        assert!(matches!(err, ArdustatError::MalformedInput { line: 1, .. }));
    }

    #[test]
    fn crlf_line_endings_are_stripped() {
        let trace = parse("0 a b c d 3.7 e f 10\r\n1000 a b c d 3.6 e f 20\r\n").unwrap();
        assert_eq!(trace.len(), 2);
        assert_eq!(trace.current(), &array![10.0, 20.0]);
    }

    #[test]
    fn invalid_utf8_row_is_malformed() {
        let mut bytes = b"0 a b c d 3.7 e f 10\n1000 ".to_vec();
        bytes.extend_from_slice(&[0xff, 0xfe]);
        bytes.extend_from_slice(b" b c d 3.6 e f 20\n");
        let err = parse_trace(Cursor::new(bytes), &ColumnLayout::default()).unwrap_err();
        assert!(matches!(err, ArdustatError::MalformedInput { line: 2, .. }));
    }

    #[test]
    fn extra_trailing_fields_are_ignored() {
        let trace = parse("0 a b c d 3.7 e f 10 extra 99\n").unwrap();
        assert_eq!(trace.len(), 1);
    }

    #[test]
    fn mismatched_columns_are_rejected() {
        let err = Trace::new(vec![0.0, 1.0], vec![3.7], vec![1.0, 2.0]).unwrap_err();
        assert!(matches!(
            err,
            ArdustatError::LengthMismatch {
                time: 2,
                voltage: 1,
                current: 2
            }
        ));
    }
}
