//! Percentiles and weighted averages.

/// Percentile `q` (in [0, 100]) of `values`, interpolating linearly between
/// order statistics. NaN values are ignored; an empty input gives NaN.
pub fn percentile(values: &[f64], q: f64) -> f64 {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    sorted.sort_by(f64::total_cmp);
    percentile_sorted(&sorted, q)
}

/// Several percentiles of the same values, sorting once.
pub fn percentiles(values: &[f64], qs: &[f64]) -> Vec<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    sorted.sort_by(f64::total_cmp);
    qs.iter().map(|&q| percentile_sorted(&sorted, q)).collect()
}

fn percentile_sorted(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        n => {
            let rank = (q.clamp(0.0, 100.0) / 100.0) * (n - 1) as f64;
            let lo = rank.floor() as usize;
            let hi = rank.ceil() as usize;
            let frac = rank - lo as f64;
            sorted[lo] + (sorted[hi] - sorted[lo]) * frac
        }
    }
}

/// Weighted mean of `(value, weight)` pairs.
///
/// Pairs with zero weight are skipped, so a sub-model with nothing behind it
/// does not drag the average. NaN when the remaining weight is zero.
pub fn weighted_average(pairs: &[(f64, f64)]) -> f64 {
    let (sum, weight) = pairs
        .iter()
        .filter(|(_, w)| *w != 0.0)
        .fold((0.0, 0.0), |(s, t), &(v, w)| (s + v * w, t + w));
    if weight == 0.0 {
        f64::NAN
    } else {
        sum / weight
    }
}
