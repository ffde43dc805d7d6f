//! panelforge turns a multi-entity OHLCV panel into a feature-augmented monthly panel:
//! per-entity technical indicators, monthly resampling, cross-sectional liquidity filtering
//! and winsorized multi-horizon returns, with structured logging throughout.

pub mod config;
pub mod dataset;
pub mod indicators;
pub mod liquidity;
pub mod logging;
pub mod monthly;
pub mod panel;
pub mod pipeline;
pub mod returns;
pub mod rolling;

pub use config::{
    ConfigError, IndicatorWindows, LiquidityConfig, PipelineConfig, ReturnConfig, StageSelection,
};
pub use dataset::{DatasetError, MarketData};
pub use indicators::{IndicatorKind, IndicatorSet, with_indicators};
pub use liquidity::{filter_liquid, rank_liquidity};
pub use monthly::aggregate_monthly;
pub use panel::{Frequency, Observation, Panel, PanelError};
pub use pipeline::{Pipeline, PipelineError};
pub use returns::with_returns;

pub type Result<T> = anyhow::Result<T>;
