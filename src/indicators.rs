//! Per-entity technical indicators.
//!
//! Each indicator reads only the history of the entity it is computed for. Windowed
//! indicators run over explicit entity partitions in parallel and are scattered back into
//! panel order; per-row indicators work directly on the aligned columns.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, IndicatorWindows};
use crate::logging::log_event;
use crate::panel::{ADJUSTED_CLOSE, CLOSE, HIGH, LOW, OPEN, Panel, PanelResult, VOLUME};
use crate::rolling::{ema, rolling_mean, rolling_std, standardize, wilder_smoothing};

pub const GARMAN_KLASS: &str = "garman_klass";
pub const RSI: &str = "rsi";
pub const BB_LOW: &str = "bb_low";
pub const BB_MID: &str = "bb_mid";
pub const BB_HIGH: &str = "bb_high";
pub const ATR: &str = "atr";
pub const MACD: &str = "macd";
pub const DOLLAR_VOLUME: &str = "dollar_volume";

/// Band width of the Bollinger envelope, in standard deviations.
pub const BOLLINGER_WIDTH: f64 = 2.0;

/// The indicators the stage knows how to compute.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorKind {
    GarmanKlass,
    Rsi,
    BollingerBands,
    Atr,
    Macd,
    DollarVolume,
}

impl IndicatorKind {
    pub const ALL: [Self; 6] = [
        Self::GarmanKlass,
        Self::Rsi,
        Self::BollingerBands,
        Self::Atr,
        Self::Macd,
        Self::DollarVolume,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::GarmanKlass => "garman_klass",
            Self::Rsi => "rsi",
            Self::BollingerBands => "bollinger_bands",
            Self::Atr => "atr",
            Self::Macd => "macd",
            Self::DollarVolume => "dollar_volume",
        }
    }

    /// Columns this indicator appends to the panel.
    pub fn output_columns(self) -> &'static [&'static str] {
        match self {
            Self::GarmanKlass => &[GARMAN_KLASS],
            Self::Rsi => &[RSI],
            Self::BollingerBands => &[BB_LOW, BB_MID, BB_HIGH],
            Self::Atr => &[ATR],
            Self::Macd => &[MACD],
            Self::DollarVolume => &[DOLLAR_VOLUME],
        }
    }
}

impl fmt::Display for IndicatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for IndicatorKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == normalized)
            .ok_or(ConfigError::UnknownIndicator(normalized))
    }
}

/// The set of indicators a run should compute, iterated in a fixed order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IndicatorSet(BTreeSet<IndicatorKind>);

impl IndicatorSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all() -> Self {
        IndicatorKind::ALL.into_iter().collect()
    }

    /// Parse indicator names, rejecting any name that is not a known indicator.
    pub fn parse<I, S>(names: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        names
            .into_iter()
            .map(|name| name.as_ref().parse::<IndicatorKind>())
            .collect()
    }

    /// Parse indicator names, skipping unknown ones with a warning instead of failing.
    pub fn lenient<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        names
            .into_iter()
            .filter_map(|name| match name.as_ref().parse::<IndicatorKind>() {
                Ok(kind) => Some(kind),
                Err(error) => {
                    log_event(
                        file!(),
                        "IndicatorSet",
                        "lenient",
                        "config.indicators",
                        line!(),
                        "Ignoring unknown indicator name",
                        Some(&error.to_string()),
                    );
                    None
                }
            })
            .collect()
    }

    pub fn insert(&mut self, kind: IndicatorKind) -> bool {
        self.0.insert(kind)
    }

    pub fn contains(&self, kind: IndicatorKind) -> bool {
        self.0.contains(&kind)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = IndicatorKind> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<IndicatorKind> for IndicatorSet {
    fn from_iter<T: IntoIterator<Item = IndicatorKind>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Garman-Klass volatility of a single bar. Null unless every price is positive.
pub fn garman_klass(
    open: &[Option<f64>],
    high: &[Option<f64>],
    low: &[Option<f64>],
    adjusted_close: &[Option<f64>],
) -> Vec<Option<f64>> {
    let drift = 2.0 * std::f64::consts::LN_2 - 1.0;
    open.iter()
        .zip(high)
        .zip(low)
        .zip(adjusted_close)
        .map(|(((open, high), low), close)| {
            let prices = [(*open)?, (*high)?, (*low)?, (*close)?];
            if prices.iter().any(|price| *price <= 0.0) {
                return None;
            }
            let [open, high, low, close] = prices;
            let range = high.ln() - low.ln();
            let body = close.ln() - open.ln();
            Some(range * range / 2.0 - drift * body * body)
        })
        .collect()
}

/// Wilder relative strength index. The first `length` observations are null.
pub fn rsi(close: &[Option<f64>], length: usize) -> Vec<Option<f64>> {
    let changes = differences(close);
    let gains: Vec<Option<f64>> = changes.iter().map(|c| c.map(|v| v.max(0.0))).collect();
    let losses: Vec<Option<f64>> = changes.iter().map(|c| c.map(|v| (-v).max(0.0))).collect();

    wilder_smoothing(&gains, length)
        .into_iter()
        .zip(wilder_smoothing(&losses, length))
        .map(|(gain, loss)| {
            let (gain, loss) = (gain?, loss?);
            let total = gain + loss;
            (total > 0.0).then(|| 100.0 * gain / total)
        })
        .collect()
}

/// Bollinger bands over `log1p(close)`, returned as `[low, mid, high]`.
pub fn bollinger_bands(close: &[Option<f64>], length: usize) -> [Vec<Option<f64>>; 3] {
    let transformed: Vec<Option<f64>> = close
        .iter()
        .map(|value| value.map(f64::ln_1p).filter(|v| v.is_finite()))
        .collect();
    let mid = rolling_mean(&transformed, length);
    let std = rolling_std(&transformed, length);

    let band = |sign: f64| -> Vec<Option<f64>> {
        mid.iter()
            .zip(&std)
            .map(|(mean, std)| Some((*mean)? + sign * BOLLINGER_WIDTH * (*std)?))
            .collect()
    };

    let low = band(-1.0);
    let high = band(1.0);
    [low, mid, high]
}

/// True range; the first bar has no previous close and is null.
pub fn true_range(
    high: &[Option<f64>],
    low: &[Option<f64>],
    close: &[Option<f64>],
) -> Vec<Option<f64>> {
    (0..high.len())
        .map(|row| {
            if row == 0 {
                return None;
            }
            let (high, low, previous) = (high[row]?, low[row]?, close[row - 1]?);
            Some(
                (high - low)
                    .max((high - previous).abs())
                    .max((low - previous).abs()),
            )
        })
        .collect()
}

/// Average true range with Wilder smoothing.
pub fn atr(
    high: &[Option<f64>],
    low: &[Option<f64>],
    close: &[Option<f64>],
    length: usize,
) -> Vec<Option<f64>> {
    wilder_smoothing(&true_range(high, low, close), length)
}

/// MACD line: a fast EMA of half the window minus a slow EMA over the full window.
pub fn macd_line(close: &[Option<f64>], length: usize) -> Vec<Option<f64>> {
    let fast = ema(close, (length / 2).max(1));
    let slow = ema(close, length);
    fast.into_iter()
        .zip(slow)
        .map(|(fast, slow)| Some(fast? - slow?))
        .collect()
}

/// Traded value in millions.
pub fn dollar_volume(adjusted_close: &[Option<f64>], volume: &[Option<f64>]) -> Vec<Option<f64>> {
    adjusted_close
        .iter()
        .zip(volume)
        .map(|(close, volume)| Some((*close)? * (*volume)? / 1_000_000.0))
        .collect()
}

fn differences(values: &[Option<f64>]) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|row| {
            if row == 0 {
                return None;
            }
            Some(values[row]? - values[row - 1]?)
        })
        .collect()
}

fn append_columns(
    panel: &Panel,
    names: &[&str],
    columns: Vec<Vec<Option<f64>>>,
    operation: &str,
    detail: &str,
) -> PanelResult<Panel> {
    let mut enriched = panel.clone();
    for (name, values) in names.iter().zip(columns) {
        enriched.with_column(*name, values)?;
    }

    log_event(
        file!(),
        "IndicatorStage",
        operation,
        "indicators",
        line!(),
        &format!("Computed {detail} -> {}", names.join(", ")),
        None,
    );

    Ok(enriched)
}

pub fn with_garman_klass(panel: &Panel) -> PanelResult<Panel> {
    let values = garman_klass(
        panel.require_column(OPEN)?,
        panel.require_column(HIGH)?,
        panel.require_column(LOW)?,
        panel.require_column(ADJUSTED_CLOSE)?,
    );
    append_columns(
        panel,
        &[GARMAN_KLASS],
        vec![values],
        "with_garman_klass",
        "Garman-Klass volatility",
    )
}

pub fn with_rsi(panel: &Panel, length: usize) -> PanelResult<Panel> {
    let close = panel.require_column(ADJUSTED_CLOSE)?;
    let values =
        panel.transform_column_by_entity(|partition| rsi(&partition.gather(close), length));
    append_columns(
        panel,
        &[RSI],
        vec![values],
        "with_rsi",
        &format!("{length}-period RSI"),
    )
}

pub fn with_bollinger_bands(panel: &Panel, length: usize) -> PanelResult<Panel> {
    let close = panel.require_column(ADJUSTED_CLOSE)?;
    let columns = panel.transform_by_entity(3, |partition| {
        bollinger_bands(&partition.gather(close), length).into()
    });
    append_columns(
        panel,
        &[BB_LOW, BB_MID, BB_HIGH],
        columns,
        "with_bollinger_bands",
        &format!("{length}-period Bollinger bands"),
    )
}

/// Append the ATR standardized over each entity's full history.
pub fn with_atr(panel: &Panel, length: usize) -> PanelResult<Panel> {
    let high = panel.require_column(HIGH)?;
    let low = panel.require_column(LOW)?;
    let close = panel.require_column(CLOSE)?;
    let values = panel.transform_column_by_entity(|partition| {
        let raw = atr(
            &partition.gather(high),
            &partition.gather(low),
            &partition.gather(close),
            length,
        );
        standardize(&raw)
    });
    append_columns(
        panel,
        &[ATR],
        vec![values],
        "with_atr",
        &format!("{length}-period normalized ATR"),
    )
}

/// Append the MACD line standardized over each entity's full history.
pub fn with_macd(panel: &Panel, length: usize) -> PanelResult<Panel> {
    let close = panel.require_column(CLOSE)?;
    let values = panel.transform_column_by_entity(|partition| {
        standardize(&macd_line(&partition.gather(close), length))
    });
    append_columns(
        panel,
        &[MACD],
        vec![values],
        "with_macd",
        &format!("{length}-period normalized MACD"),
    )
}

pub fn with_dollar_volume(panel: &Panel) -> PanelResult<Panel> {
    let values = dollar_volume(
        panel.require_column(ADJUSTED_CLOSE)?,
        panel.require_column(VOLUME)?,
    );
    append_columns(
        panel,
        &[DOLLAR_VOLUME],
        vec![values],
        "with_dollar_volume",
        "dollar volume",
    )
}

pub fn with_indicator(
    panel: &Panel,
    kind: IndicatorKind,
    windows: &IndicatorWindows,
) -> PanelResult<Panel> {
    match kind {
        IndicatorKind::GarmanKlass => with_garman_klass(panel),
        IndicatorKind::Rsi => with_rsi(panel, windows.rsi),
        IndicatorKind::BollingerBands => with_bollinger_bands(panel, windows.bollinger),
        IndicatorKind::Atr => with_atr(panel, windows.atr),
        IndicatorKind::Macd => with_macd(panel, windows.macd),
        IndicatorKind::DollarVolume => with_dollar_volume(panel),
    }
}

/// Compute every indicator in `set`, in declaration order.
pub fn with_indicators(
    panel: &Panel,
    set: &IndicatorSet,
    windows: &IndicatorWindows,
) -> PanelResult<Panel> {
    set.iter()
        .try_fold(panel.clone(), |current, kind| with_indicator(&current, kind, windows))
}
