//! The two-axis `(timestamp, entity_id)` table every stage consumes and produces.
//!
//! Rows are kept sorted by key. Numeric columns are nullable `f64` vectors aligned with the
//! key vectors; a `None` marks a value that could not be computed (short history, zero
//! variance, non-positive prices) and is filtered out by later stages.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use polars::prelude::*;
use rayon::prelude::*;
use thiserror::Error;

use crate::logging::log_event;

pub const TIMESTAMP: &str = "timestamp";
pub const ENTITY_ID: &str = "entity_id";
pub const OPEN: &str = "open";
pub const HIGH: &str = "high";
pub const LOW: &str = "low";
pub const CLOSE: &str = "close";
pub const ADJUSTED_CLOSE: &str = "adjusted_close";
pub const VOLUME: &str = "volume";

/// Price and volume columns every raw panel must carry.
pub const OHLCV_COLUMNS: [&str; 6] = [OPEN, HIGH, LOW, CLOSE, ADJUSTED_CLOSE, VOLUME];

const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// Structural errors. Malformed input aborts a run before any stage executes.
#[derive(Debug, Error)]
pub enum PanelError {
    #[error("malformed input: required column `{0}` is missing")]
    MissingColumn(String),
    #[error("malformed input: column `{0}` appears more than once after normalization")]
    DuplicateColumn(String),
    #[error("malformed input: duplicate key ({timestamp}, {entity_id})")]
    DuplicateKey {
        timestamp: NaiveDate,
        entity_id: String,
    },
    #[error("malformed input: null `{column}` at row {row}")]
    NullKey { column: &'static str, row: usize },
    #[error("malformed input: cannot interpret `{0}` as a date")]
    InvalidDate(String),
    #[error("malformed input: column `{column}` has unsupported type {dtype}")]
    UnsupportedType { column: String, dtype: String },
    #[error("column `{column}` has {actual} values but the panel has {expected} rows")]
    LengthMismatch {
        column: String,
        expected: usize,
        actual: usize,
    },
    #[error("stage `{stage}` requires a {expected:?} panel")]
    FrequencyMismatch {
        stage: &'static str,
        expected: Frequency,
    },
    #[error("polars error: {0}")]
    Polars(#[from] PolarsError),
}

pub type PanelResult<T> = Result<T, PanelError>;

/// Sampling frequency of a panel's timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frequency {
    /// Whatever the input was sampled at, typically daily bars.
    Native,
    /// One row per entity per calendar month, stamped at the month end.
    Monthly,
}

/// A single raw bar for one entity.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub timestamp: NaiveDate,
    pub entity_id: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub adjusted_close: f64,
    pub volume: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    name: String,
    values: Vec<Option<f64>>,
}

impl Column {
    pub fn new(name: impl Into<String>, values: Vec<Option<f64>>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn values(&self) -> &[Option<f64>] {
        &self.values
    }

    fn reorder(self, order: &[usize]) -> Self {
        let values = order.iter().map(|&row| self.values[row]).collect();
        Self {
            name: self.name,
            values,
        }
    }
}

/// Row indices owned by one entity, in ascending time order.
#[derive(Debug, Clone)]
pub struct Partition<'a> {
    pub entity_id: &'a str,
    pub rows: Vec<usize>,
}

impl Partition<'_> {
    /// Pull this entity's slice of a panel column.
    pub fn gather(&self, values: &[Option<f64>]) -> Vec<Option<f64>> {
        self.rows.iter().map(|&row| values[row]).collect()
    }
}

#[derive(Debug, Clone)]
pub struct Panel {
    timestamps: Vec<NaiveDate>,
    entity_ids: Vec<String>,
    columns: Vec<Column>,
    frequency: Frequency,
}

impl Panel {
    /// Build a native-frequency panel from raw bars.
    pub fn from_observations<I>(observations: I) -> PanelResult<Self>
    where
        I: IntoIterator<Item = Observation>,
    {
        let mut timestamps = Vec::new();
        let mut entity_ids = Vec::new();
        let mut values: [Vec<Option<f64>>; 6] = Default::default();

        for observation in observations {
            timestamps.push(observation.timestamp);
            entity_ids.push(observation.entity_id);
            let row = [
                observation.open,
                observation.high,
                observation.low,
                observation.close,
                observation.adjusted_close,
                observation.volume as f64,
            ];
            for (column, value) in values.iter_mut().zip(row) {
                column.push(Some(value).filter(|v| v.is_finite()));
            }
        }

        let columns = OHLCV_COLUMNS
            .iter()
            .zip(values)
            .map(|(name, values)| Column::new(*name, values))
            .collect();

        Self::from_parts(timestamps, entity_ids, columns, Frequency::Native)
    }

    /// Build a native-frequency panel from a tabulated frame.
    ///
    /// Column names are matched case-insensitively against the canonical vocabulary, so
    /// `Date`, `Ticker` and `Adj Close` are accepted for `timestamp`, `entity_id` and
    /// `adjusted_close`. Extra numeric columns are carried along untouched.
    pub fn from_frame(frame: &DataFrame) -> PanelResult<Self> {
        let mut resolved: Vec<(String, &Series)> = Vec::with_capacity(frame.width());
        for series in frame.get_columns() {
            let name = canonical_column_name(series.name());
            if resolved.iter().any(|(existing, _)| *existing == name) {
                return Err(PanelError::DuplicateColumn(name));
            }
            resolved.push((name, series));
        }

        let lookup = |name: &str| {
            resolved
                .iter()
                .find(|(candidate, _)| candidate == name)
                .map(|(_, series)| *series)
                .ok_or_else(|| PanelError::MissingColumn(name.to_string()))
        };

        for required in [TIMESTAMP, ENTITY_ID].iter().chain(OHLCV_COLUMNS.iter()) {
            if let Err(error) = lookup(*required) {
                log_event(
                    file!(),
                    "Panel",
                    "from_frame",
                    "panel.load",
                    line!(),
                    "Rejected input frame",
                    Some(&error.to_string()),
                );
                return Err(error);
            }
        }

        let timestamps = timestamps_from_series(lookup(TIMESTAMP)?)?;
        let entity_ids = entity_ids_from_series(lookup(ENTITY_ID)?)?;

        let mut columns = Vec::with_capacity(resolved.len());
        for (name, series) in &resolved {
            if name == TIMESTAMP || name == ENTITY_ID {
                continue;
            }
            if !series.dtype().is_numeric() {
                if OHLCV_COLUMNS.contains(&name.as_str()) {
                    return Err(PanelError::UnsupportedType {
                        column: name.clone(),
                        dtype: series.dtype().to_string(),
                    });
                }
                continue;
            }
            columns.push(Column::new(name.clone(), floats_from_series(series)?));
        }

        let panel = Self::from_parts(timestamps, entity_ids, columns, Frequency::Native)?;

        log_event(
            file!(),
            "Panel",
            "from_frame",
            "panel.load",
            line!(),
            &format!(
                "Built panel with {} rows across {} entities",
                panel.len(),
                panel.entities().len()
            ),
            None,
        );

        Ok(panel)
    }

    /// Assemble a panel from aligned key and column vectors, sorting rows by key.
    pub fn from_parts(
        timestamps: Vec<NaiveDate>,
        entity_ids: Vec<String>,
        columns: Vec<Column>,
        frequency: Frequency,
    ) -> PanelResult<Self> {
        let height = timestamps.len();
        if entity_ids.len() != height {
            return Err(PanelError::LengthMismatch {
                column: ENTITY_ID.to_string(),
                expected: height,
                actual: entity_ids.len(),
            });
        }
        for column in &columns {
            if column.values.len() != height {
                return Err(PanelError::LengthMismatch {
                    column: column.name.clone(),
                    expected: height,
                    actual: column.values.len(),
                });
            }
        }

        let mut order: Vec<usize> = (0..height).collect();
        order.sort_by(|&a, &b| {
            timestamps[a]
                .cmp(&timestamps[b])
                .then_with(|| entity_ids[a].cmp(&entity_ids[b]))
        });

        for pair in order.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            if timestamps[a] == timestamps[b] && entity_ids[a] == entity_ids[b] {
                let error = PanelError::DuplicateKey {
                    timestamp: timestamps[a],
                    entity_id: entity_ids[a].clone(),
                };
                log_event(
                    file!(),
                    "Panel",
                    "from_parts",
                    "panel.validate",
                    line!(),
                    "Rejected panel with non-unique key",
                    Some(&error.to_string()),
                );
                return Err(error);
            }
        }

        Ok(Self {
            timestamps: order.iter().map(|&row| timestamps[row]).collect(),
            entity_ids: order.iter().map(|&row| entity_ids[row].clone()).collect(),
            columns: columns
                .into_iter()
                .map(|column| column.reorder(&order))
                .collect(),
            frequency,
        })
    }

    /// Export to a polars frame: `timestamp` as `Date`, `entity_id` as `Utf8`, then every
    /// numeric column as nullable `Float64`.
    pub fn to_frame(&self) -> PanelResult<DataFrame> {
        let days: Vec<i32> = self.timestamps.iter().map(|date| epoch_days(*date)).collect();
        let ids: Vec<&str> = self.entity_ids.iter().map(String::as_str).collect();

        let mut series = Vec::with_capacity(self.columns.len() + 2);
        series.push(Series::new(TIMESTAMP, days).cast(&DataType::Date)?);
        series.push(Series::new(ENTITY_ID, ids));
        for column in &self.columns {
            series.push(Series::new(&column.name, column.values.as_slice()));
        }

        Ok(DataFrame::new(series)?)
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn frequency(&self) -> Frequency {
        self.frequency
    }

    pub fn timestamps(&self) -> &[NaiveDate] {
        &self.timestamps
    }

    pub fn entity_ids(&self) -> &[String] {
        &self.entity_ids
    }

    /// Distinct entity identifiers in lexicographic order.
    pub fn entities(&self) -> Vec<&str> {
        let mut entities: Vec<&str> = self.entity_ids.iter().map(String::as_str).collect();
        entities.sort_unstable();
        entities.dedup();
        entities
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(Column::name).collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|column| column.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&[Option<f64>]> {
        self.columns
            .iter()
            .find(|column| column.name == name)
            .map(Column::values)
    }

    pub fn require_column(&self, name: &str) -> PanelResult<&[Option<f64>]> {
        self.column(name)
            .ok_or_else(|| PanelError::MissingColumn(name.to_string()))
    }

    /// Position of the row keyed by `(timestamp, entity_id)`, if present.
    pub fn row_index(&self, timestamp: NaiveDate, entity_id: &str) -> Option<usize> {
        let start = self.timestamps.partition_point(|day| *day < timestamp);
        let end = self.timestamps.partition_point(|day| *day <= timestamp);
        (start..end).find(|&row| self.entity_ids[row] == entity_id)
    }

    pub fn value(&self, timestamp: NaiveDate, entity_id: &str, column: &str) -> Option<f64> {
        let row = self.row_index(timestamp, entity_id)?;
        self.column(column)?[row]
    }

    /// Timestamps observed for one entity, ascending.
    pub fn timestamps_for(&self, entity_id: &str) -> Vec<NaiveDate> {
        self.timestamps
            .iter()
            .zip(&self.entity_ids)
            .filter(|(_, entity)| entity.as_str() == entity_id)
            .map(|(timestamp, _)| *timestamp)
            .collect()
    }

    /// Append a column, replacing any existing column of the same name.
    pub fn with_column(
        &mut self,
        name: impl Into<String>,
        values: Vec<Option<f64>>,
    ) -> PanelResult<()> {
        let name = name.into();
        if values.len() != self.len() {
            return Err(PanelError::LengthMismatch {
                column: name,
                expected: self.len(),
                actual: values.len(),
            });
        }

        let values = values
            .into_iter()
            .map(|value| value.filter(|v| v.is_finite()))
            .collect();
        match self.columns.iter_mut().find(|column| column.name == name) {
            Some(existing) => existing.values = values,
            None => self.columns.push(Column { name, values }),
        }
        Ok(())
    }

    pub fn drop_columns(&mut self, names: &[&str]) {
        self.columns
            .retain(|column| !names.contains(&column.name.as_str()));
    }

    /// Keep the rows whose mask entry is `true`.
    pub fn retain_rows(&self, mask: &[bool]) -> Self {
        let keep = |row: &usize| mask.get(*row).copied().unwrap_or(false);
        let rows: Vec<usize> = (0..self.len()).filter(keep).collect();

        Self {
            timestamps: rows.iter().map(|&row| self.timestamps[row]).collect(),
            entity_ids: rows.iter().map(|&row| self.entity_ids[row].clone()).collect(),
            columns: self
                .columns
                .iter()
                .cloned()
                .map(|column| column.reorder(&rows))
                .collect(),
            frequency: self.frequency,
        }
    }

    /// Drop every row holding a null in any column.
    pub fn drop_incomplete(&self) -> Self {
        let mask: Vec<bool> = (0..self.len())
            .map(|row| self.columns.iter().all(|column| column.values[row].is_some()))
            .collect();
        self.retain_rows(&mask)
    }

    /// Split the panel into per-entity row sets, ordered by entity identifier.
    pub fn partitions(&self) -> Vec<Partition<'_>> {
        let mut groups: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
        for (row, entity_id) in self.entity_ids.iter().enumerate() {
            groups.entry(entity_id.as_str()).or_default().push(row);
        }

        groups
            .into_iter()
            .map(|(entity_id, rows)| Partition { entity_id, rows })
            .collect()
    }

    /// Run `transform` over every entity partition in parallel and scatter the `outputs`
    /// resulting columns back into panel row order.
    pub fn transform_by_entity<F>(&self, outputs: usize, transform: F) -> Vec<Vec<Option<f64>>>
    where
        F: Fn(&Partition<'_>) -> Vec<Vec<Option<f64>>> + Sync,
    {
        let partitions = self.partitions();
        let results: Vec<Vec<Vec<Option<f64>>>> = partitions.par_iter().map(&transform).collect();

        let mut merged = vec![vec![None; self.len()]; outputs];
        for (partition, columns) in partitions.iter().zip(results) {
            for (target, values) in merged.iter_mut().zip(columns) {
                for (&row, value) in partition.rows.iter().zip(values) {
                    target[row] = value;
                }
            }
        }
        merged
    }

    /// Single-column form of [`Panel::transform_by_entity`].
    pub fn transform_column_by_entity<F>(&self, transform: F) -> Vec<Option<f64>>
    where
        F: Fn(&Partition<'_>) -> Vec<Option<f64>> + Sync,
    {
        self.transform_by_entity(1, |partition| vec![transform(partition)])
            .pop()
            .unwrap_or_default()
    }

    /// Fail unless the panel has been resampled to `expected`.
    pub fn require_frequency(&self, stage: &'static str, expected: Frequency) -> PanelResult<()> {
        if self.frequency == expected {
            Ok(())
        } else {
            Err(PanelError::FrequencyMismatch { stage, expected })
        }
    }
}

/// Normalize a raw column header to the canonical lowercase vocabulary.
pub fn canonical_column_name(raw: &str) -> String {
    let normalized: String = raw
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == ' ' || c == '-' { '_' } else { c })
        .collect();

    match normalized.as_str() {
        "date" | "datetime" | "time" | "timestamp" => TIMESTAMP.to_string(),
        "ticker" | "symbol" | "entity" | "entity_id" => ENTITY_ID.to_string(),
        "adj_close" | "adjclose" | "adjusted_close" => ADJUSTED_CLOSE.to_string(),
        _ => normalized,
    }
}

pub fn epoch_days(date: NaiveDate) -> i32 {
    date.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE
}

pub fn date_from_epoch_days(days: i32) -> Option<NaiveDate> {
    NaiveDate::from_num_days_from_ce_opt(days.checked_add(UNIX_EPOCH_DAYS_FROM_CE)?)
}

fn parse_date(raw: &str) -> PanelResult<NaiveDate> {
    let trimmed = raw.trim();
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc3339(trimmed)
                .ok()
                .map(|parsed| parsed.date_naive())
        })
        .or_else(|| {
            NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|parsed| parsed.date())
        })
        .ok_or_else(|| PanelError::InvalidDate(trimmed.to_string()))
}

fn timestamps_from_series(series: &Series) -> PanelResult<Vec<NaiveDate>> {
    let physical = match series.dtype() {
        DataType::Date => series.cast(&DataType::Int32)?,
        DataType::Datetime(_, _) => series.cast(&DataType::Date)?.cast(&DataType::Int32)?,
        DataType::Utf8 => {
            return series
                .utf8()?
                .into_iter()
                .enumerate()
                .map(|(row, value)| {
                    let value = value.ok_or(PanelError::NullKey {
                        column: TIMESTAMP,
                        row,
                    })?;
                    parse_date(value)
                })
                .collect();
        }
        other => {
            return Err(PanelError::UnsupportedType {
                column: TIMESTAMP.to_string(),
                dtype: other.to_string(),
            });
        }
    };

    physical
        .i32()?
        .into_iter()
        .enumerate()
        .map(|(row, days)| {
            let days = days.ok_or(PanelError::NullKey {
                column: TIMESTAMP,
                row,
            })?;
            date_from_epoch_days(days).ok_or_else(|| PanelError::InvalidDate(days.to_string()))
        })
        .collect()
}

fn entity_ids_from_series(series: &Series) -> PanelResult<Vec<String>> {
    let text = if matches!(series.dtype(), DataType::Utf8) {
        series.clone()
    } else {
        series.cast(&DataType::Utf8)?
    };

    text.utf8()?
        .into_iter()
        .enumerate()
        .map(|(row, value)| {
            value
                .map(|id| id.trim().to_string())
                .filter(|id| !id.is_empty())
                .ok_or(PanelError::NullKey {
                    column: ENTITY_ID,
                    row,
                })
        })
        .collect()
}

fn floats_from_series(series: &Series) -> PanelResult<Vec<Option<f64>>> {
    let floats = if matches!(series.dtype(), DataType::Float64) {
        series.clone()
    } else {
        series.cast(&DataType::Float64)?
    };

    Ok(floats
        .f64()?
        .into_iter()
        .map(|value| value.filter(|v| v.is_finite()))
        .collect())
}
