use ndarray::ArrayView1;

/// Trapezoidal integral of `y` sampled at abscissae `x`.
///
/// Fewer than two samples give the empty sum, 0.0. Both views are expected to
/// have the same length; extra samples on the longer one are ignored.
pub fn trapezoid(y: ArrayView1<f64>, x: ArrayView1<f64>) -> f64 {
    if y.len() < 2 || x.len() < 2 {
        return 0.0;
    }
    x.windows(2)
        .into_iter()
        .zip(y.windows(2))
        .map(|(xw, yw)| (xw[1] - xw[0]) * (yw[0] + yw[1]) / 2.0)
        .sum()
}
