use std::path::Path;

use chrono::{NaiveDate, NaiveTime};
use polars::lazy::dsl::{col, lit};
use polars::prelude::*;
use thiserror::Error;

use crate::logging::log_event;
use crate::panel::{Panel, PanelError};

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("failed to load market data: {source}")]
    Load { source: PolarsError },
    #[error("failed to transform market data: {source}")]
    Transform { source: PolarsError },
    #[error(transparent)]
    Panel(#[from] PanelError),
}

pub type DatasetResult<T> = Result<T, DatasetError>;

/// Tabulated OHLCV bars as produced by the acquisition layer, held lazily until they are
/// turned into a [`Panel`].
#[derive(Clone)]
pub struct MarketData {
    frame: LazyFrame,
}

impl MarketData {
    pub fn from_csv<P: AsRef<Path>>(path: P) -> DatasetResult<Self> {
        let path_ref = path.as_ref();
        let lazy_reader = LazyCsvReader::new(path_ref)
            .has_header(true)
            .with_try_parse_dates(true)
            .with_infer_schema_length(Some(2048));

        let frame = lazy_reader.finish().map_err(|source| {
            log_event(
                file!(),
                "MarketData",
                "from_csv",
                "dataset.load",
                line!(),
                &format!("Failed to load {}", path_ref.display()),
                Some(&source.to_string()),
            );
            DatasetError::Load { source }
        })?;

        log_event(
            file!(),
            "MarketData",
            "from_csv",
            "dataset.load",
            line!(),
            &format!("Loaded market data from {}", path_ref.display()),
            None,
        );

        Ok(Self { frame })
    }

    pub fn from_frame(frame: DataFrame) -> Self {
        Self {
            frame: frame.lazy(),
        }
    }

    /// Keep rows whose `column` falls within `[start, end]`, both days inclusive.
    pub fn filter_date_range(
        &self,
        column: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> DatasetResult<Self> {
        let mut filter_expr = col(column).is_not_null();

        if let Some(start) = start.map(|date| date.and_time(NaiveTime::MIN)) {
            filter_expr = filter_expr.and(col(column).gt_eq(lit(start)));
        }

        if let Some(end) = end.and_then(|date| date.succ_opt()) {
            filter_expr = filter_expr.and(col(column).lt(lit(end.and_time(NaiveTime::MIN))));
        }

        let filtered = self.frame.clone().filter(filter_expr);

        log_event(
            file!(),
            "MarketData",
            "filter_date_range",
            "dataset.filter",
            line!(),
            &format!("Applied date filter on column {column}"),
            None,
        );

        Ok(Self { frame: filtered })
    }

    pub fn collect(&self) -> DatasetResult<DataFrame> {
        self.frame
            .clone()
            .collect()
            .map_err(|source| DatasetError::Transform { source })
    }

    /// Materialize the frame and validate it into a native-frequency panel.
    pub fn into_panel(self) -> DatasetResult<Panel> {
        let frame = self.collect()?;
        Ok(Panel::from_frame(&frame)?)
    }
}
