use approx::assert_abs_diff_eq;

use panelforge::rolling::{
    clip, ema, quantile, rolling_mean, rolling_std, standardize, wilder_smoothing,
};

fn defined(values: &[f64]) -> Vec<Option<f64>> {
    values.iter().copied().map(Some).collect()
}

#[test]
fn rolling_mean_and_std_need_a_full_window() {
    let values = defined(&[1.0, 2.0, 3.0, 4.0]);

    let mean = rolling_mean(&values, 3);
    assert_eq!(mean, vec![None, None, Some(2.0), Some(3.0)]);

    let std = rolling_std(&values, 3);
    assert!(std[1].is_none());
    assert_abs_diff_eq!(std[2].unwrap(), (2.0f64 / 3.0).sqrt(), epsilon = 1e-12);

    let gapped = vec![Some(1.0), None, Some(3.0), Some(4.0), Some(5.0)];
    assert_eq!(
        rolling_mean(&gapped, 2),
        vec![None, None, None, Some(3.5), Some(4.5)]
    );
}

#[test]
fn wilder_smoothing_seeds_with_simple_average() {
    let values = defined(&[1.0, 2.0, 3.0, 10.0]);
    let smoothed = wilder_smoothing(&values, 3);

    assert_eq!(smoothed[..2], [None, None]);
    assert_abs_diff_eq!(smoothed[2].unwrap(), 2.0, epsilon = 1e-12);
    assert_abs_diff_eq!(smoothed[3].unwrap(), 2.0 + (10.0 - 2.0) / 3.0, epsilon = 1e-12);

    let gapped = vec![Some(4.0), None, Some(8.0), Some(2.0)];
    let smoothed = wilder_smoothing(&gapped, 2);
    assert_eq!(smoothed[..2], [None, None]);
    assert_abs_diff_eq!(smoothed[2].unwrap(), 6.0, epsilon = 1e-12);
    assert_abs_diff_eq!(smoothed[3].unwrap(), 4.0, epsilon = 1e-12);
}

#[test]
fn ema_seeds_with_simple_average() {
    let values = defined(&[1.0, 2.0, 3.0, 4.0]);
    let smoothed = ema(&values, 3);

    assert_eq!(smoothed[..2], [None, None]);
    assert_abs_diff_eq!(smoothed[2].unwrap(), 2.0, epsilon = 1e-12);
    assert_abs_diff_eq!(smoothed[3].unwrap(), 3.0, epsilon = 1e-12);
}

#[test]
fn standardize_uses_sample_deviation_and_rejects_flat_series() {
    let values = vec![None, Some(1.0), Some(2.0), Some(3.0)];
    let z = standardize(&values);

    assert_eq!(z[0], None);
    assert_abs_diff_eq!(z[1].unwrap(), -1.0, epsilon = 1e-12);
    assert_abs_diff_eq!(z[2].unwrap(), 0.0, epsilon = 1e-12);
    assert_abs_diff_eq!(z[3].unwrap(), 1.0, epsilon = 1e-12);

    assert!(standardize(&defined(&[5.0, 5.0, 5.0])).iter().all(Option::is_none));
    assert!(standardize(&[Some(1.0)]).iter().all(Option::is_none));
}

#[test]
fn quantile_interpolates_linearly_and_clip_bounds_values() {
    let values = defined(&[-0.5, 0.01, 0.02, 0.03, 5.0]);

    assert_eq!(quantile(&values, 0.0), Some(-0.5));
    assert_eq!(quantile(&values, 1.0), Some(5.0));
    assert_abs_diff_eq!(quantile(&values, 0.125).unwrap(), -0.245, epsilon = 1e-12);
    assert_eq!(quantile(&[None], 0.5), None);

    let clipped = clip(&values, 0.01, 0.03);
    assert_eq!(
        clipped,
        vec![Some(0.01), Some(0.01), Some(0.02), Some(0.03), Some(0.03)]
    );
}
