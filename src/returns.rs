//! Multi-horizon winsorized returns, expressed as compounded monthly rates.

use chrono::NaiveDate;

use crate::config::ReturnConfig;
use crate::logging::log_event;
use crate::monthly::month_index;
use crate::panel::{ADJUSTED_CLOSE, Frequency, Panel, PanelResult};
use crate::rolling::{clip, quantile};

pub fn return_column(horizon: u32) -> String {
    format!("return_{horizon}m")
}

/// Percentage change against the observation exactly `horizon` calendar months earlier.
/// `months` must be ascending, as within one entity partition. A horizon too long to
/// express as a month offset has no base observation.
pub fn horizon_returns(
    months: &[NaiveDate],
    prices: &[Option<f64>],
    horizon: u32,
) -> Vec<Option<f64>> {
    let Ok(offset) = i32::try_from(horizon) else {
        return vec![None; months.len()];
    };
    months
        .iter()
        .zip(prices)
        .map(|(month, price)| {
            let target = month_index(*month).checked_sub(offset)?;
            let previous = months
                .binary_search_by_key(&target, |candidate| month_index(*candidate))
                .ok()?;
            let (current, base) = ((*price)?, prices[previous]?);
            (base != 0.0).then(|| current / base - 1.0)
        })
        .collect()
}

/// Clip to the `[cutoff, 1 - cutoff]` quantiles of the series itself.
pub fn winsorize(values: &[Option<f64>], cutoff: f64) -> Vec<Option<f64>> {
    match (quantile(values, cutoff), quantile(values, 1.0 - cutoff)) {
        (Some(lower), Some(upper)) => clip(values, lower, upper),
        _ => values.to_vec(),
    }
}

/// Convert a `horizon`-month return into its equivalent compounded monthly rate.
pub fn compound(values: &[Option<f64>], horizon: u32) -> Vec<Option<f64>> {
    let exponent = 1.0 / f64::from(horizon);
    values
        .iter()
        .map(|value| {
            let rate = (1.0 + (*value)?).powf(exponent) - 1.0;
            rate.is_finite().then_some(rate)
        })
        .collect()
}

/// Append one `return_{h}m` column per configured horizon and drop rows where any of them
/// is undefined. `adjusted_close` is consumed and does not appear in the output.
pub fn with_returns(panel: &Panel, config: &ReturnConfig) -> PanelResult<Panel> {
    panel.require_frequency("returns", Frequency::Monthly)?;
    let prices = panel.require_column(ADJUSTED_CLOSE)?;
    let timestamps = panel.timestamps();
    let horizons = &config.horizons;

    let columns = panel.transform_by_entity(horizons.len(), |partition| {
        let months: Vec<NaiveDate> = partition.rows.iter().map(|&row| timestamps[row]).collect();
        let entity_prices = partition.gather(prices);
        horizons
            .iter()
            .map(|&horizon| {
                let raw = horizon_returns(&months, &entity_prices, horizon);
                compound(&winsorize(&raw, config.cutoff), horizon)
            })
            .collect()
    });

    let mask: Vec<bool> = (0..panel.len())
        .map(|row| columns.iter().all(|column| column[row].is_some()))
        .collect();

    let mut enriched = panel.clone();
    for (&horizon, values) in horizons.iter().zip(columns) {
        enriched.with_column(return_column(horizon), values)?;
    }
    let mut complete = enriched.retain_rows(&mask);
    complete.drop_columns(&[ADJUSTED_CLOSE]);

    log_event(
        file!(),
        "ReturnCalculator",
        "with_returns",
        "returns",
        line!(),
        &format!(
            "Computed returns for horizons {horizons:?} with cutoff {}; kept {} of {} rows",
            config.cutoff,
            complete.len(),
            panel.len()
        ),
        None,
    );

    Ok(complete)
}
