//! Run configuration, loadable from JSON.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::indicators::IndicatorSet;
use crate::logging::log_event;

pub const DEFAULT_WINDOW: usize = 20;
pub const DEFAULT_TOP_N: usize = 150;
pub const DEFAULT_HORIZONS: [u32; 6] = [1, 2, 3, 6, 9, 12];
/// Longest accepted return horizon in months.
pub const MAX_HORIZON: u32 = 1200;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown indicator `{0}`")]
    UnknownIndicator(String),
    #[error("window for `{0}` must be at least {1}")]
    WindowTooShort(&'static str, usize),
    #[error("at least one return horizon is required")]
    NoHorizons,
    #[error("return horizons must be positive")]
    ZeroHorizon,
    #[error("return horizon {0} exceeds the maximum of {max} months", max = MAX_HORIZON)]
    HorizonTooLong(u32),
    #[error("the liquidity stage needs `dollar_volume`; add it to `indicators` or disable the stage")]
    MissingDollarVolume,
    #[error("winsorization cutoff must lie in [0, 0.5), got {0}")]
    InvalidCutoff(f64),
    #[error("liquidity threshold must be at least 1")]
    ZeroThreshold,
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Trailing window lengths of the windowed indicators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IndicatorWindows {
    pub rsi: usize,
    pub bollinger: usize,
    pub atr: usize,
    pub macd: usize,
}

impl IndicatorWindows {
    /// Use the same window for every indicator.
    pub fn uniform(window: usize) -> Self {
        Self {
            rsi: window,
            bollinger: window,
            atr: window,
            macd: window,
        }
    }
}

impl Default for IndicatorWindows {
    fn default() -> Self {
        Self::uniform(DEFAULT_WINDOW)
    }
}

/// Which post-indicator stages run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StageSelection {
    pub monthly: bool,
    pub liquidity: bool,
    pub returns: bool,
}

impl Default for StageSelection {
    fn default() -> Self {
        Self {
            monthly: true,
            liquidity: true,
            returns: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LiquidityConfig {
    /// Number of most liquid entities kept at each month.
    pub top_n: usize,
}

impl Default for LiquidityConfig {
    fn default() -> Self {
        Self {
            top_n: DEFAULT_TOP_N,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReturnConfig {
    /// Lookback lengths in months.
    pub horizons: Vec<u32>,
    /// Lower quantile used for per-entity winsorization; the upper bound is `1 - cutoff`.
    pub cutoff: f64,
}

impl Default for ReturnConfig {
    fn default() -> Self {
        Self {
            horizons: DEFAULT_HORIZONS.to_vec(),
            cutoff: 0.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub indicators: IndicatorSet,
    pub windows: IndicatorWindows,
    pub stages: StageSelection,
    pub liquidity: LiquidityConfig,
    pub returns: ReturnConfig,
}

impl PipelineConfig {
    pub fn from_json_str(raw: &str) -> ConfigResult<Self> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path_ref = path.as_ref();
        let raw = fs::read_to_string(path_ref).inspect_err(|error| {
            log_event(
                file!(),
                "PipelineConfig",
                "from_path",
                "config.load",
                line!(),
                &format!("Failed to read {}", path_ref.display()),
                Some(&error.to_string()),
            );
        })?;

        let config = Self::from_json_str(&raw)?;

        log_event(
            file!(),
            "PipelineConfig",
            "from_path",
            "config.load",
            line!(),
            &format!("Loaded configuration from {}", path_ref.display()),
            None,
        );

        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let windows = [
            ("rsi", self.windows.rsi, 1),
            ("bollinger", self.windows.bollinger, 1),
            ("atr", self.windows.atr, 1),
            ("macd", self.windows.macd, 2),
        ];
        for (name, window, minimum) in windows {
            if window < minimum {
                return Err(ConfigError::WindowTooShort(name, minimum));
            }
        }

        if self.liquidity.top_n == 0 {
            return Err(ConfigError::ZeroThreshold);
        }
        if self.returns.horizons.is_empty() {
            return Err(ConfigError::NoHorizons);
        }
        if self.returns.horizons.contains(&0) {
            return Err(ConfigError::ZeroHorizon);
        }
        if let Some(&horizon) = self.returns.horizons.iter().find(|&&h| h > MAX_HORIZON) {
            return Err(ConfigError::HorizonTooLong(horizon));
        }
        let cutoff = self.returns.cutoff;
        if !(0.0..0.5).contains(&cutoff) {
            return Err(ConfigError::InvalidCutoff(cutoff));
        }

        Ok(())
    }
}
