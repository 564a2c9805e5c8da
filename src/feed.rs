// =============================================================================
// Tick feed — WebSocket client for the upstream trade stream
// =============================================================================

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::DateTime;
use futures_util::StreamExt;
use rust_decimal::Decimal;
use serde::Deserialize;
use tokio_tungstenite::connect_async;
use tracing::{error, info, warn};

use crate::market::{MarketRegistry, Trade};

/// One tick inside a feed message: price, symbol, epoch-millisecond time.
#[derive(Debug, Deserialize)]
struct FeedTick {
    p: Decimal,
    s: String,
    t: i64,
}

/// Envelope the feed wraps every batch of ticks in.
#[derive(Debug, Deserialize)]
struct FeedBatch {
    data: Vec<FeedTick>,
}

/// Parse one feed message into trades.
///
/// Expected shape:
/// ```json
/// { "data": [ { "p": "160.38", "s": "APPL", "t": 1591587046417 } ] }
/// ```
fn parse_tick_batch(text: &str) -> Result<Vec<Trade>> {
    let batch: FeedBatch = serde_json::from_str(text).context("failed to parse feed JSON")?;
    batch
        .data
        .into_iter()
        .map(|tick| {
            let time = DateTime::from_timestamp_millis(tick.t)
                .with_context(|| format!("tick timestamp {} out of range", tick.t))?;
            Ok(Trade::new(tick.s, time, tick.p))
        })
        .collect()
}

/// Connect to the tick feed and route every parsed trade into the registry.
///
/// Runs until the stream disconnects or an error occurs, then returns so
/// that the caller (main.rs) can handle reconnection. Malformed messages
/// are logged and skipped; they never tear the stream down.
pub async fn run_feed_stream(url: &str, registry: &Arc<MarketRegistry>) -> Result<()> {
    info!(url = %url, "connecting to tick feed WebSocket");

    let (ws_stream, _response) = connect_async(url)
        .await
        .context("failed to connect to tick feed WebSocket")?;

    info!(url = %url, "tick feed WebSocket connected");
    let (_write, mut read) = ws_stream.split();

    loop {
        match read.next().await {
            Some(Ok(msg)) => {
                if let tokio_tungstenite::tungstenite::Message::Text(text) = msg {
                    match parse_tick_batch(&text) {
                        Ok(trades) => {
                            for trade in trades {
                                registry.route_trade(trade);
                            }
                        }
                        Err(e) => {
                            warn!(error = %e, "failed to parse feed message");
                        }
                    }
                }
                // Ping / Pong / Binary / Close frames are ignored --
                // tungstenite handles pong replies automatically.
            }
            Some(Err(e)) => {
                error!(error = %e, "tick feed WebSocket read error");
                return Err(e.into());
            }
            None => {
                warn!("tick feed WebSocket stream ended");
                return Ok(());
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn parses_a_tick_batch() {
        let json = r#"{
            "data": [
                { "p": "160.38", "s": "APPL", "t": 1591587046417 },
                { "p": 12, "s": "MSFT", "t": 1591587046917 }
            ]
        }"#;
        let trades = parse_tick_batch(json).expect("should parse");
        assert_eq!(trades.len(), 2);
        assert_eq!(trades[0].symbol, "APPL");
        assert_eq!(trades[0].price, dec!(160.38));
        assert_eq!(trades[0].time.timestamp_millis(), 1591587046417);
        assert_eq!(trades[1].price, dec!(12));
    }

    #[test]
    fn empty_batches_are_fine() {
        let trades = parse_tick_batch(r#"{ "data": [] }"#).unwrap();
        assert!(trades.is_empty());
    }

    #[test]
    fn malformed_messages_are_errors() {
        assert!(parse_tick_batch("not json").is_err());
        assert!(parse_tick_batch(r#"{ "data": [ { "s": "APPL" } ] }"#).is_err());
    }
}
