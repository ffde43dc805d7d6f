//! Resampling of a native-frequency panel to one row per entity per calendar month.

use chrono::{Datelike, NaiveDate};
use rayon::prelude::*;

use crate::indicators::DOLLAR_VOLUME;
use crate::logging::log_event;
use crate::panel::{CLOSE, Column, Frequency, HIGH, LOW, OPEN, Panel, PanelResult, VOLUME};

/// Raw columns that do not survive aggregation.
pub const DROPPED_COLUMNS: [&str; 5] = [OPEN, HIGH, LOW, CLOSE, VOLUME];

/// Columns averaged over the month; everything else keeps its last observed value.
pub const MEAN_COLUMNS: [&str; 1] = [DOLLAR_VOLUME];

/// Months elapsed since year zero; consecutive calendar months differ by one.
pub fn month_index(date: NaiveDate) -> i32 {
    date.year() * 12 + date.month0() as i32
}

/// Last calendar day of the month containing `date`.
pub fn month_end(date: NaiveDate) -> NaiveDate {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|first| first.pred_opt())
        .unwrap_or(date)
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), value| (sum + value, count + 1));
    (count > 0).then(|| sum / count as f64)
}

/// Aggregate to month-end rows: `dollar_volume` by mean, every other kept column by its
/// last defined value in the month. OHLC and volume are dropped and rows left with any
/// null are removed.
pub fn aggregate_monthly(panel: &Panel) -> PanelResult<Panel> {
    let kept: Vec<&str> = panel
        .column_names()
        .into_iter()
        .filter(|name| !DROPPED_COLUMNS.contains(name))
        .collect();
    let sources = kept
        .iter()
        .map(|name| panel.require_column(name))
        .collect::<PanelResult<Vec<_>>>()?;
    let timestamps = panel.timestamps();

    let buckets: Vec<(NaiveDate, String, Vec<Option<f64>>)> = panel
        .partitions()
        .par_iter()
        .flat_map_iter(|partition| {
            let mut rows = Vec::new();
            for bucket in partition
                .rows
                .chunk_by(|a, b| month_index(timestamps[*a]) == month_index(timestamps[*b]))
            {
                let values = kept
                    .iter()
                    .zip(&sources)
                    .map(|(name, source)| {
                        if MEAN_COLUMNS.contains(name) {
                            mean(bucket.iter().filter_map(|&row| source[row]))
                        } else {
                            bucket.iter().rev().find_map(|&row| source[row])
                        }
                    })
                    .collect();
                rows.push((
                    month_end(timestamps[bucket[0]]),
                    partition.entity_id.to_string(),
                    values,
                ));
            }
            rows
        })
        .collect();

    let mut month_ends = Vec::with_capacity(buckets.len());
    let mut entity_ids = Vec::with_capacity(buckets.len());
    let mut columns: Vec<Vec<Option<f64>>> = vec![Vec::with_capacity(buckets.len()); kept.len()];
    for (month, entity_id, values) in buckets {
        month_ends.push(month);
        entity_ids.push(entity_id);
        for (column, value) in columns.iter_mut().zip(values) {
            column.push(value);
        }
    }

    let columns = kept
        .iter()
        .zip(columns)
        .map(|(name, values)| Column::new(*name, values))
        .collect();
    let aggregated = Panel::from_parts(month_ends, entity_ids, columns, Frequency::Monthly)?;
    let complete = aggregated.drop_incomplete();

    log_event(
        file!(),
        "MonthlyAggregator",
        "aggregate_monthly",
        "monthly",
        line!(),
        &format!(
            "Aggregated {} rows into {} monthly rows ({} incomplete months dropped)",
            panel.len(),
            complete.len(),
            aggregated.len() - complete.len()
        ),
        None,
    );

    Ok(complete)
}
