//! Null-aware numeric kernels shared by the indicator, liquidity and return stages.
//!
//! Every kernel takes one entity's series in time order and returns a series of the same
//! length. `None` in the output means there was not enough defined history.

/// Values of the window ending at `end` (inclusive), or `None` when the window is short or
/// holds a null.
fn full_window(values: &[Option<f64>], end: usize, window: usize) -> Option<Vec<f64>> {
    if window == 0 || end + 1 < window {
        return None;
    }
    values[end + 1 - window..=end].iter().copied().collect()
}

/// Simple moving average requiring `window` defined values.
pub fn rolling_mean(values: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|end| {
            let slice = full_window(values, end, window)?;
            Some(slice.iter().sum::<f64>() / window as f64)
        })
        .collect()
}

/// Rolling population standard deviation requiring `window` defined values.
pub fn rolling_std(values: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|end| {
            let slice = full_window(values, end, window)?;
            let mean = slice.iter().sum::<f64>() / window as f64;
            let variance = slice
                .iter()
                .map(|value| {
                    let diff = value - mean;
                    diff * diff
                })
                .sum::<f64>()
                / window as f64;
            Some(variance.max(0.0).sqrt())
        })
        .collect()
}

/// Wilder's smoothing: an exponential average with `alpha = 1 / length`, seeded with the
/// simple average of the first `length` defined values. Nulls are skipped without decaying
/// the state.
pub fn wilder_smoothing(values: &[Option<f64>], length: usize) -> Vec<Option<f64>> {
    if length == 0 {
        return vec![None; values.len()];
    }

    let alpha = 1.0 / length as f64;
    let mut seed_sum = 0.0;
    let mut seen = 0usize;
    let mut state: Option<f64> = None;

    values
        .iter()
        .map(|value| {
            let value = (*value)?;
            match state {
                Some(previous) => {
                    state = Some(previous + alpha * (value - previous));
                }
                None => {
                    seed_sum += value;
                    seen += 1;
                    if seen == length {
                        state = Some(seed_sum / length as f64);
                    }
                }
            }
            state
        })
        .collect()
}

/// Exponential moving average with `alpha = 2 / (span + 1)`, seeded with the simple
/// average of the first `span` defined values.
pub fn ema(values: &[Option<f64>], span: usize) -> Vec<Option<f64>> {
    if span == 0 {
        return vec![None; values.len()];
    }

    let alpha = 2.0 / (span as f64 + 1.0);
    let mut seed_sum = 0.0;
    let mut seen = 0usize;
    let mut state: Option<f64> = None;

    values
        .iter()
        .map(|value| {
            let value = (*value)?;
            match state {
                Some(previous) => {
                    let next = previous + alpha * (value - previous);
                    state = Some(next);
                    state
                }
                None => {
                    seed_sum += value;
                    seen += 1;
                    if seen == span {
                        state = Some(seed_sum / span as f64);
                    }
                    state
                }
            }
        })
        .collect()
}

/// Z-score every defined value against the mean and sample standard deviation of the whole
/// series. Returns all nulls when fewer than two values are defined or the spread is zero.
pub fn standardize(values: &[Option<f64>]) -> Vec<Option<f64>> {
    let defined: Vec<f64> = values.iter().flatten().copied().collect();
    if defined.len() < 2 {
        return vec![None; values.len()];
    }

    let mean = defined.iter().sum::<f64>() / defined.len() as f64;
    let variance = defined
        .iter()
        .map(|value| {
            let diff = value - mean;
            diff * diff
        })
        .sum::<f64>()
        / (defined.len() as f64 - 1.0);
    let std = variance.sqrt();

    if std <= f64::EPSILON {
        return vec![None; values.len()];
    }

    values
        .iter()
        .map(|value| value.map(|v| (v - mean) / std))
        .collect()
}

/// Empirical quantile of the defined values with linear interpolation between order
/// statistics.
pub fn quantile(values: &[Option<f64>], q: f64) -> Option<f64> {
    let mut sorted: Vec<f64> = values.iter().flatten().copied().collect();
    if sorted.is_empty() || !(0.0..=1.0).contains(&q) {
        return None;
    }
    sorted.sort_by(f64::total_cmp);

    let position = q * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = position - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * fraction)
}

/// Clip defined values into `[lower, upper]`.
pub fn clip(values: &[Option<f64>], lower: f64, upper: f64) -> Vec<Option<f64>> {
    values
        .iter()
        .map(|value| value.map(|v| v.max(lower).min(upper)))
        .collect()
}
