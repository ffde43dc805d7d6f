mod common;

use std::collections::BTreeMap;

use chrono::NaiveDate;

use common::{daily_panel, month_ends, monthly_panel};
use panelforge::indicators::DOLLAR_VOLUME;
use panelforge::liquidity::{
    DOLLAR_VOLUME_5Y, DOLLAR_VOLUME_RANK, LIQUIDITY_WINDOW, filter_liquid, rank_descending,
    rank_liquidity,
};
use panelforge::panel::{ADJUSTED_CLOSE, Frequency, PanelError};

#[test]
fn rank_descending_is_a_total_order_with_stable_ties() {
    let ranks = rank_descending(&[Some(5.0), None, Some(9.0), Some(5.0), Some(1.0)]);
    assert_eq!(ranks, vec![Some(2), None, Some(1), Some(3), Some(4)]);
}

#[test]
fn only_the_most_liquid_entity_survives_from_the_sixtieth_month() -> anyhow::Result<()> {
    let months = month_ends(2015, 1, 61);
    let rows: Vec<_> = months
        .iter()
        .enumerate()
        .flat_map(|(i, month)| {
            [
                (*month, "A", 100.0, 50.0 + i as f64),
                (*month, "B", 100.0, 10.0 + i as f64),
            ]
        })
        .collect();
    let panel = monthly_panel(&rows);

    let filtered = filter_liquid(&panel, 1)?;

    assert_eq!(filtered.entities(), vec!["A"]);
    assert_eq!(filtered.timestamps(), &months[LIQUIDITY_WINDOW - 1..]);
    assert_eq!(filtered.timestamps_for("A"), months[LIQUIDITY_WINDOW - 1..].to_vec());
    assert!(filtered.timestamps_for("B").is_empty());
    assert!(!filtered.has_column(DOLLAR_VOLUME));
    assert!(!filtered.has_column(DOLLAR_VOLUME_5Y));
    assert!(!filtered.has_column(DOLLAR_VOLUME_RANK));
    assert!(filtered.has_column(ADJUSTED_CLOSE));
    Ok(())
}

#[test]
fn ranks_cover_one_to_k_with_entity_id_tiebreak() -> anyhow::Result<()> {
    let months = month_ends(2010, 6, 63);
    let rows: Vec<_> = months
        .iter()
        .flat_map(|month| {
            [
                (*month, "C", 1.0, 7.0),
                (*month, "A", 1.0, 3.0),
                (*month, "B", 1.0, 7.0),
                (*month, "D", 1.0, 9.0),
            ]
        })
        .collect();
    let ranked = rank_liquidity(&monthly_panel(&rows))?;

    let mut by_month: BTreeMap<NaiveDate, Vec<(String, usize)>> = BTreeMap::new();
    let ranks = ranked.column(DOLLAR_VOLUME_RANK).unwrap();
    for (row, rank) in ranks.iter().enumerate() {
        if let Some(rank) = rank {
            by_month
                .entry(ranked.timestamps()[row])
                .or_default()
                .push((ranked.entity_ids()[row].clone(), *rank as usize));
        }
    }

    assert_eq!(by_month.len(), 63 - (LIQUIDITY_WINDOW - 1));
    for (_, mut entries) in by_month {
        entries.sort_by_key(|(_, rank)| *rank);
        let order: Vec<&str> = entries.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(order, vec!["D", "B", "C", "A"]);
        let ranks: Vec<usize> = entries.iter().map(|(_, rank)| *rank).collect();
        assert_eq!(ranks, vec![1, 2, 3, 4]);
    }
    Ok(())
}

#[test]
fn filter_keeps_min_of_threshold_and_ranked_entities() -> anyhow::Result<()> {
    let months = month_ends(2012, 1, 70);
    let mut rows = Vec::new();
    for (i, month) in months.iter().enumerate() {
        rows.push((*month, "A", 1.0, 40.0));
        rows.push((*month, "B", 1.0, 30.0));
        rows.push((*month, "C", 1.0, 20.0));
        // D only joins after five years, so it has no five-year average yet.
        if i >= 10 {
            rows.push((*month, "D", 1.0, 99.0));
        }
    }
    let panel = monthly_panel(&rows);

    for top_n in [1, 2, 3, 4, 150] {
        let filtered = filter_liquid(&panel, top_n)?;
        for month in &months[LIQUIDITY_WINDOW - 1..] {
            let kept = filtered
                .timestamps()
                .iter()
                .filter(|timestamp| *timestamp == month)
                .count();
            let ranked = if *month >= months[10 + LIQUIDITY_WINDOW - 1] { 4 } else { 3 };
            assert_eq!(kept, top_n.min(ranked), "top {top_n} at {month}");
        }
    }
    Ok(())
}

#[test]
fn a_missing_month_voids_the_five_year_average() -> anyhow::Result<()> {
    let months = month_ends(2000, 1, 62);
    let rows: Vec<_> = months
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != 5)
        .map(|(_, month)| (*month, "A", 1.0, 10.0))
        .collect();
    let ranked = rank_liquidity(&monthly_panel(&rows))?;

    let averages = ranked.column(DOLLAR_VOLUME_5Y).unwrap();
    // Months 6..=65 would be needed for the first complete window after the gap.
    assert!(averages.iter().all(Option::is_none));
    Ok(())
}

#[test]
fn ranking_requires_a_monthly_panel() {
    let daily = daily_panel("A", &[1.0, 2.0, 3.0]);
    assert_eq!(daily.frequency(), Frequency::Native);
    assert!(matches!(
        filter_liquid(&daily, 10),
        Err(PanelError::FrequencyMismatch {
            expected: Frequency::Monthly,
            ..
        })
    ));
}
