use std::sync::OnceLock;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use crate::Result;

static SUBSCRIBER: OnceLock<std::result::Result<(), String>> = OnceLock::new();

#[derive(Debug, Serialize)]
pub struct LogEvent<'a> {
    pub filename: &'a str,
    pub timestamp: DateTime<Utc>,
    pub component: &'a str,
    pub operation: &'a str,
    pub stage: &'a str,
    pub line_num: u32,
    pub error: Option<&'a str>,
    pub message: &'a str,
}

/// Initialize a tracing subscriber that writes one JSON record per event.
///
/// Calling this function multiple times is safe; only the first invocation installs the
/// subscriber.
pub fn init_logging() -> Result<()> {
    let result = SUBSCRIBER.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        fmt()
            .with_env_filter(filter)
            .json()
            .with_current_span(false)
            .with_span_list(false)
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .with_target(false)
            .try_init()
            .map_err(|error| error.to_string())?;

        Ok(())
    });

    match result {
        Ok(()) => Ok(()),
        Err(message) => Err(anyhow!(message.clone())),
    }
}

/// Emit a structured pipeline event. Events carrying an error are logged at `warn`.
pub fn log_event(
    filename: &str,
    component: &str,
    operation: &str,
    stage: &str,
    line_num: u32,
    message: &str,
    error: Option<&str>,
) {
    let event = LogEvent {
        filename,
        timestamp: Utc::now(),
        component,
        operation,
        stage,
        line_num,
        error,
        message,
    };

    match (serde_json::to_string(&event), error) {
        (Ok(serialized), None) => info!(target: "panelforge", stage, json = %serialized),
        (Ok(serialized), Some(_)) => warn!(target: "panelforge", stage, json = %serialized),
        (Err(_), None) => info!(target: "panelforge", stage, message),
        (Err(_), Some(error)) => warn!(target: "panelforge", stage, message, error),
    }
}
