//! Cross-sectional liquidity ranking and top-N filtering of a monthly panel.

use chrono::NaiveDate;

use crate::indicators::DOLLAR_VOLUME;
use crate::logging::log_event;
use crate::monthly::month_index;
use crate::panel::{Frequency, Panel, PanelResult};

/// Trailing months averaged into the liquidity score.
pub const LIQUIDITY_WINDOW: usize = 60;
pub const DOLLAR_VOLUME_5Y: &str = "dollar_volume_5y";
pub const DOLLAR_VOLUME_RANK: &str = "dollar_volume_rank";

/// Mean of the trailing `window` consecutive calendar months. A month missing from the
/// window leaves the average undefined until the window is whole again.
pub fn rolling_liquidity(
    months: &[NaiveDate],
    dollar_volume: &[Option<f64>],
    window: usize,
) -> Vec<Option<f64>> {
    (0..months.len())
        .map(|end| {
            if window == 0 || end + 1 < window {
                return None;
            }
            let start = end + 1 - window;
            let span = month_index(months[end]) - month_index(months[start]);
            if span as usize != window - 1 {
                return None;
            }
            let values: Vec<f64> = dollar_volume[start..=end].iter().copied().collect::<Option<_>>()?;
            Some(values.iter().sum::<f64>() / window as f64)
        })
        .collect()
}

/// Ordinal ranks of `scores` in descending order; `None` scores stay unranked. Equal
/// scores keep their input order, so callers pass rows sorted by entity identifier.
pub fn rank_descending(scores: &[Option<f64>]) -> Vec<Option<usize>> {
    let mut ranked: Vec<(usize, f64)> = scores
        .iter()
        .enumerate()
        .filter_map(|(position, score)| score.map(|score| (position, score)))
        .collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

    let mut ranks = vec![None; scores.len()];
    for (rank, (position, _)) in ranked.into_iter().enumerate() {
        ranks[position] = Some(rank + 1);
    }
    ranks
}

/// Append `dollar_volume_5y` and its per-month rank (1 = most liquid). Ties are broken by
/// ascending entity identifier.
pub fn rank_liquidity(panel: &Panel) -> PanelResult<Panel> {
    panel.require_frequency("liquidity", Frequency::Monthly)?;
    let dollar_volume = panel.require_column(DOLLAR_VOLUME)?;
    let timestamps = panel.timestamps();

    let average = panel.transform_column_by_entity(|partition| {
        let months: Vec<NaiveDate> = partition.rows.iter().map(|&row| timestamps[row]).collect();
        rolling_liquidity(&months, &partition.gather(dollar_volume), LIQUIDITY_WINDOW)
    });

    // Rows are sorted by (timestamp, entity_id), so each month is one contiguous run.
    let mut ranks = Vec::with_capacity(panel.len());
    let mut start = 0;
    for month in timestamps.chunk_by(|a, b| a == b) {
        let end = start + month.len();
        ranks.extend(
            rank_descending(&average[start..end])
                .into_iter()
                .map(|rank| rank.map(|rank| rank as f64)),
        );
        start = end;
    }

    let mut ranked = panel.clone();
    ranked.with_column(DOLLAR_VOLUME_5Y, average)?;
    ranked.with_column(DOLLAR_VOLUME_RANK, ranks)?;
    Ok(ranked)
}

/// Keep the `top_n` most liquid entities of every month, then drop the liquidity
/// helper columns.
pub fn filter_liquid(panel: &Panel, top_n: usize) -> PanelResult<Panel> {
    let ranked = rank_liquidity(panel)?;
    let ranks = ranked.require_column(DOLLAR_VOLUME_RANK)?;
    let mask: Vec<bool> = ranks
        .iter()
        .map(|rank| rank.is_some_and(|rank| rank <= top_n as f64))
        .collect();

    let mut filtered = ranked.retain_rows(&mask);
    filtered.drop_columns(&[DOLLAR_VOLUME, DOLLAR_VOLUME_5Y, DOLLAR_VOLUME_RANK]);

    log_event(
        file!(),
        "LiquidityFilter",
        "filter_liquid",
        "liquidity",
        line!(),
        &format!(
            "Kept {} of {} monthly rows within the top {top_n} by {LIQUIDITY_WINDOW}-month dollar volume",
            filtered.len(),
            panel.len()
        ),
        None,
    );

    Ok(filtered)
}
