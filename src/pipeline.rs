//! Orchestration of the stages: indicators, monthly aggregation, liquidity filter, returns.

use polars::prelude::DataFrame;
use thiserror::Error;

use crate::config::{ConfigError, PipelineConfig};
use crate::indicators::{DOLLAR_VOLUME, with_indicators};
use crate::liquidity::filter_liquid;
use crate::logging::log_event;
use crate::monthly::aggregate_monthly;
use crate::panel::{Panel, PanelError};
use crate::returns::with_returns;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Panel(#[from] PanelError),
}

pub type PipelineResult<T> = Result<T, PipelineError>;

/// A validated configuration ready to transform panels.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> PipelineResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run every enabled stage over `panel`. The input is left untouched.
    pub fn run(&self, panel: &Panel) -> PipelineResult<Panel> {
        let config = &self.config;

        log_event(
            file!(),
            "Pipeline",
            "run",
            "pipeline",
            line!(),
            &format!(
                "Starting run over {} rows with indicators [{}]",
                panel.len(),
                config
                    .indicators
                    .iter()
                    .map(|kind| kind.name())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            None,
        );

        let mut current = with_indicators(panel, &config.indicators, &config.windows)?;
        if config.stages.monthly {
            current = aggregate_monthly(&current)?;
        }
        if config.stages.liquidity {
            if !current.has_column(DOLLAR_VOLUME) {
                let error = ConfigError::MissingDollarVolume;
                log_event(
                    file!(),
                    "Pipeline",
                    "run",
                    "liquidity",
                    line!(),
                    "Liquidity stage enabled without dollar volume",
                    Some(&error.to_string()),
                );
                return Err(error.into());
            }
            current = filter_liquid(&current, config.liquidity.top_n)?;
        }
        if config.stages.returns {
            current = with_returns(&current, &config.returns)?;
        }

        log_event(
            file!(),
            "Pipeline",
            "run",
            "pipeline",
            line!(),
            &format!(
                "Finished run with {} rows and columns [{}]",
                current.len(),
                current.column_names().join(", ")
            ),
            None,
        );

        Ok(current)
    }

    /// Frame-in, frame-out form of [`Pipeline::run`].
    pub fn run_frame(&self, frame: &DataFrame) -> PipelineResult<DataFrame> {
        let panel = Panel::from_frame(frame)?;
        Ok(self.run(&panel)?.to_frame()?)
    }
}
