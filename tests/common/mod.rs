#![allow(dead_code)]

use chrono::{Datelike, NaiveDate, Weekday};

use panelforge::indicators::DOLLAR_VOLUME;
use panelforge::monthly::month_end;
use panelforge::panel::{ADJUSTED_CLOSE, Column, Frequency, Observation, Panel};

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid calendar date")
}

pub fn bar(timestamp: NaiveDate, entity_id: &str, close: f64, volume: u64) -> Observation {
    Observation {
        timestamp,
        entity_id: entity_id.to_string(),
        open: close * 0.99,
        high: close * 1.02,
        low: close * 0.98,
        close,
        adjusted_close: close,
        volume,
    }
}

/// Trending prices with an oscillation so windows never have zero spread.
pub fn wavy_prices(len: usize, base: f64, phase: f64) -> Vec<f64> {
    (0..len)
        .map(|i| base + 0.1 * i as f64 + 3.0 * (i as f64 * 0.7 + phase).sin())
        .collect()
}

pub fn business_days(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    start
        .iter_days()
        .take_while(|day| *day <= end)
        .filter(|day| !matches!(day.weekday(), Weekday::Sat | Weekday::Sun))
        .collect()
}

pub fn month_ends(start_year: i32, start_month: u32, count: u32) -> Vec<NaiveDate> {
    (0..count)
        .map(|offset| {
            let index = start_month - 1 + offset;
            let year = start_year + (index / 12) as i32;
            month_end(date(year, index % 12 + 1, 1))
        })
        .collect()
}

/// Daily panel for one entity over consecutive calendar days.
pub fn daily_panel(entity_id: &str, prices: &[f64]) -> Panel {
    let start = date(2020, 1, 1);
    let bars = start
        .iter_days()
        .zip(prices)
        .map(|(day, price)| bar(day, entity_id, *price, 1_000));
    Panel::from_observations(bars).expect("valid panel")
}

/// Monthly panel from `(month, entity, adjusted_close, dollar_volume)` rows.
pub fn monthly_panel(rows: &[(NaiveDate, &str, f64, f64)]) -> Panel {
    let timestamps = rows.iter().map(|row| row.0).collect();
    let entity_ids = rows.iter().map(|row| row.1.to_string()).collect();
    let columns = vec![
        Column::new(ADJUSTED_CLOSE, rows.iter().map(|row| Some(row.2)).collect()),
        Column::new(DOLLAR_VOLUME, rows.iter().map(|row| Some(row.3)).collect()),
    ];
    Panel::from_parts(timestamps, entity_ids, columns, Frequency::Monthly).expect("valid panel")
}
