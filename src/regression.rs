//! Least-squares fitting collaborator for the regression reducer.

/// Ordinary least-squares fit of `y = b0 + b1*x` over the given points,
/// evaluated at `x`. Returns the prediction and the coefficients
/// `[intercept, slope]`. A degenerate fit (fewer than two points, or no
/// variance in x) yields `None` rather than a fabricated line.
pub fn fit_and_predict(points: &[(f64, f64)], x: f64) -> Option<(f64, Vec<f64>)> {
    if points.len() < 2 {
        return None;
    }
    let n = points.len() as f64;
    let mean_x = points.iter().map(|(x, _)| x).sum::<f64>() / n;
    let mean_y = points.iter().map(|(_, y)| y).sum::<f64>() / n;
    let mut sxx = 0.0;
    let mut sxy = 0.0;
    for (px, py) in points {
        sxx += (px - mean_x) * (px - mean_x);
        sxy += (px - mean_x) * (py - mean_y);
    }
    if sxx == 0.0 {
        return None;
    }
    let slope = sxy / sxx;
    let intercept = mean_y - slope * mean_x;
    Some((intercept + slope * x, vec![intercept, slope]))
}
