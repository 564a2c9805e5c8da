// =============================================================================
// Service configuration — JSON file with serde defaults
// =============================================================================
//
// All fields carry `#[serde(default)]` so that adding new fields never
// breaks loading an older config file. Candle granularities are configured
// as `"<size>:<UNIT>"` strings and validated at startup, so a bad entry
// fails the boot rather than a later bucket computation.
// =============================================================================

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::market::Granularity;

fn default_bind_addr() -> String {
    "0.0.0.0:3001".to_string()
}

fn default_feed_url() -> String {
    "wss://ws.finnhub.io/?token=demo".to_string()
}

fn default_candles() -> Vec<String> {
    [
        "1:SECOND",
        "5:SECOND",
        "10:SECOND",
        "15:SECOND",
        "30:SECOND",
        "1:MINUTE",
        "5:MINUTE",
        "10:MINUTE",
        "15:MINUTE",
        "30:MINUTE",
        "1:HOUR",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Service settings loaded from `candlestream.json` (or the path in
/// `CANDLESTREAM_CONFIG`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Address the REST API binds to.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// WebSocket URL of the upstream tick feed.
    #[serde(default = "default_feed_url")]
    pub feed_url: String,

    /// Candle widths to aggregate, as `"<size>:<UNIT>"` strings.
    #[serde(default = "default_candles")]
    pub candles: Vec<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            feed_url: default_feed_url(),
            candles: default_candles(),
        }
    }
}

impl ServiceConfig {
    /// Load from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading config");
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: ServiceConfig = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Parse and validate the configured candle widths.
    pub fn granularities(&self) -> Result<Vec<Granularity>> {
        if self.candles.is_empty() {
            bail!("config contains no candle granularities");
        }
        self.candles
            .iter()
            .map(|s| {
                s.parse()
                    .with_context(|| format!("invalid candle entry '{s}' in config"))
            })
            .collect()
    }
}

// =============================================================================
// Tests
// =============================================================================
