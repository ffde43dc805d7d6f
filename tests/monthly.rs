mod common;

use approx::assert_abs_diff_eq;

use common::{bar, date, month_ends, monthly_panel};
use panelforge::indicators::{DOLLAR_VOLUME, with_dollar_volume};
use panelforge::monthly::{aggregate_monthly, month_end, month_index};
use panelforge::panel::{ADJUSTED_CLOSE, Frequency, OHLCV_COLUMNS, Panel};

#[test]
fn month_helpers_follow_the_calendar() {
    assert_eq!(month_end(date(2024, 2, 10)), date(2024, 2, 29));
    assert_eq!(month_end(date(2023, 12, 1)), date(2023, 12, 31));
    assert_eq!(
        month_index(date(2024, 1, 31)) - month_index(date(2023, 12, 1)),
        1
    );
}

#[test]
fn dollar_volume_is_averaged_and_other_columns_keep_the_last_value() -> anyhow::Result<()> {
    let panel = Panel::from_observations(vec![
        bar(date(2024, 1, 2), "AAA", 10.0, 1_000_000),
        bar(date(2024, 1, 15), "AAA", 20.0, 1_000_000),
        bar(date(2024, 1, 31), "AAA", 30.0, 2_000_000),
        bar(date(2024, 2, 1), "AAA", 40.0, 1_000_000),
        bar(date(2024, 2, 29), "AAA", 50.0, 1_000_000),
        bar(date(2024, 1, 10), "BBB", 5.0, 1_000_000),
    ])?;
    let mut panel = with_dollar_volume(&panel)?;
    let signal = (0..panel.len()).map(|row| Some(row as f64)).collect();
    panel.with_column("signal", signal)?;

    let monthly = aggregate_monthly(&panel)?;

    assert_eq!(monthly.frequency(), Frequency::Monthly);
    assert_eq!(monthly.len(), 3);
    assert_eq!(
        monthly.timestamps(),
        &[date(2024, 1, 31), date(2024, 1, 31), date(2024, 2, 29)]
    );
    for column in ["open", "high", "low", "close", "volume"] {
        assert!(!monthly.has_column(column), "{column} should be dropped");
    }
    assert!(monthly.has_column(ADJUSTED_CLOSE));

    let january_volume = (10.0 + 20.0 + 60.0) / 3.0;
    assert_abs_diff_eq!(
        monthly.value(date(2024, 1, 31), "AAA", DOLLAR_VOLUME).unwrap(),
        january_volume,
        epsilon = 1e-12
    );
    assert_eq!(
        monthly.value(date(2024, 1, 31), "AAA", ADJUSTED_CLOSE),
        Some(30.0)
    );
    assert_eq!(
        monthly.value(date(2024, 2, 29), "AAA", ADJUSTED_CLOSE),
        Some(50.0)
    );
    assert_eq!(
        monthly.value(date(2024, 1, 31), "BBB", ADJUSTED_CLOSE),
        Some(5.0)
    );

    // Row order in the source panel is (timestamp, entity): AAA's January rows are 0, 2, 3.
    assert_eq!(monthly.value(date(2024, 1, 31), "AAA", "signal"), Some(3.0));
    Ok(())
}

#[test]
fn last_value_skips_trailing_nulls_and_incomplete_months_are_dropped() -> anyhow::Result<()> {
    let mut panel = Panel::from_observations(vec![
        bar(date(2024, 1, 5), "AAA", 10.0, 100),
        bar(date(2024, 1, 20), "AAA", 11.0, 100),
        bar(date(2024, 2, 5), "AAA", 12.0, 100),
    ])?;
    panel.with_column("signal", vec![Some(1.0), None, None])?;

    let monthly = aggregate_monthly(&panel)?;

    assert_eq!(monthly.len(), 1);
    assert_eq!(monthly.timestamps(), &[date(2024, 1, 31)]);
    assert_eq!(monthly.value(date(2024, 1, 31), "AAA", "signal"), Some(1.0));
    assert_eq!(
        monthly.value(date(2024, 1, 31), "AAA", ADJUSTED_CLOSE),
        Some(11.0)
    );
    Ok(())
}

#[test]
fn aggregation_is_idempotent_on_a_monthly_panel() -> anyhow::Result<()> {
    let months = month_ends(2022, 11, 4);
    let rows: Vec<_> = months
        .iter()
        .enumerate()
        .flat_map(|(i, month)| {
            [
                (*month, "AAA", 10.0 + i as f64, 3.5 * i as f64 + 1.0),
                (*month, "BBB", 20.0 - i as f64, 0.25 + i as f64),
            ]
        })
        .collect();
    let panel = monthly_panel(&rows);

    let once = aggregate_monthly(&panel)?;
    let twice = aggregate_monthly(&once)?;

    for aggregated in [&once, &twice] {
        assert_eq!(aggregated.timestamps(), panel.timestamps());
        assert_eq!(aggregated.entity_ids(), panel.entity_ids());
        assert_eq!(aggregated.column(DOLLAR_VOLUME), panel.column(DOLLAR_VOLUME));
        assert_eq!(aggregated.column(ADJUSTED_CLOSE), panel.column(ADJUSTED_CLOSE));
    }
    assert!(OHLCV_COLUMNS.iter().all(|c| *c == ADJUSTED_CLOSE || !once.has_column(c)));
    Ok(())
}
