// =============================================================================
// MarketRegistry — symbol routing, lazy aggregator creation, query API
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;
use tracing::info;

use crate::market::aggregator::SymbolAggregator;
use crate::market::candle::Candle;
use crate::market::granularity::Granularity;
use crate::market::scheduler::CloseScheduler;
use crate::market::trade::Trade;

/// Failure modes of [`MarketRegistry::query`]. An unseen symbol is *not* an
/// error: "no trades yet" is a valid state and yields an empty sequence.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("granularity {0} is not configured")]
    UnknownGranularity(Granularity),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Top-level map from symbol to aggregator, plus the shared close scheduler.
/// Aggregators are created lazily on the first trade for a symbol, exactly
/// once, and are never removed.
pub struct MarketRegistry {
    granularities: Vec<Granularity>,
    aggregators: RwLock<HashMap<String, Arc<SymbolAggregator>>>,
    scheduler: CloseScheduler,
}

impl MarketRegistry {
    /// Must be called from within a tokio runtime (the scheduler captures it).
    pub fn new(granularities: Vec<Granularity>) -> Self {
        Self {
            granularities,
            aggregators: RwLock::new(HashMap::new()),
            scheduler: CloseScheduler::new(),
        }
    }

    /// Ingestion entry point: route a decoded trade to its symbol's
    /// aggregator, creating the aggregator (and its periodic close tasks)
    /// on first sight of the symbol.
    pub fn route_trade(&self, trade: Trade) {
        if let Some(aggregator) = self.aggregators.read().get(&trade.symbol) {
            aggregator.add_trade(&trade);
            return;
        }

        // Slow path: take the write lock and insert-if-absent, so two
        // concurrent first trades for one symbol observe the same
        // aggregator. Losing racers fall through to the winner's entry.
        let aggregator = {
            let mut map = self.aggregators.write();
            map.entry(trade.symbol.clone())
                .or_insert_with(|| {
                    info!(symbol = %trade.symbol, "first trade for symbol, creating aggregator");
                    let aggregator =
                        Arc::new(SymbolAggregator::new(&trade.symbol, &self.granularities));
                    for granularity in &self.granularities {
                        self.scheduler.schedule(aggregator.clone(), *granularity);
                    }
                    aggregator
                })
                .clone()
        };
        aggregator.add_trade(&trade);
    }

    /// Full candle sequence for a symbol at one configured granularity,
    /// including the in-progress candle. Never staler than the call itself:
    /// the read forces a synchronous close before returning.
    pub fn query(&self, symbol: &str, granularity: Granularity) -> Result<Vec<Candle>, QueryError> {
        if !self.granularities.contains(&granularity) {
            return Err(QueryError::UnknownGranularity(granularity));
        }
        let aggregator = self.aggregators.read().get(symbol).cloned();
        match aggregator {
            Some(aggregator) => Ok(aggregator.candles(granularity)?),
            None => Ok(Vec::new()),
        }
    }

    /// The fixed set of granularities this registry aggregates.
    pub fn granularities(&self) -> &[Granularity] {
        &self.granularities
    }

    /// Every symbol seen so far, in no particular order.
    pub fn known_symbols(&self) -> Vec<String> {
        self.aggregators.read().keys().cloned().collect()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::granularity::TimeUnit;
    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn seconds(g: u32) -> Granularity {
        Granularity::new(g, TimeUnit::Second).unwrap()
    }

    fn minutes(g: u32) -> Granularity {
        Granularity::new(g, TimeUnit::Minute).unwrap()
    }

    #[tokio::test]
    async fn unconfigured_granularity_is_not_found_for_any_symbol() {
        let registry = MarketRegistry::new(vec![seconds(10)]);
        let t = Utc.with_ymd_and_hms(2022, 12, 12, 12, 12, 12).unwrap();
        registry.route_trade(Trade::new("APPL", t, dec!(1)));

        // Seen and unseen symbols alike.
        assert!(matches!(
            registry.query("APPL", minutes(5)),
            Err(QueryError::UnknownGranularity(_))
        ));
        assert!(matches!(
            registry.query("MSFT", minutes(5)),
            Err(QueryError::UnknownGranularity(_))
        ));
    }

    #[tokio::test]
    async fn unseen_symbol_is_an_empty_sequence() {
        let registry = MarketRegistry::new(vec![seconds(10)]);
        let candles = registry.query("APPL", seconds(10)).unwrap();
        assert!(candles.is_empty());
        assert!(registry.known_symbols().is_empty());
    }

    #[tokio::test]
    async fn routed_trades_show_up_in_queries() {
        let registry = MarketRegistry::new(vec![seconds(10)]);
        let t = Utc.with_ymd_and_hms(2022, 12, 12, 12, 12, 12).unwrap();
        registry.route_trade(Trade::new("APPL", t, dec!(1)));
        registry.route_trade(Trade::new("APPL", t + Duration::seconds(1), dec!(2)));

        let candles = registry.query("APPL", seconds(10)).unwrap();
        assert_eq!(candles.len(), 1);
        assert_eq!(candles[0].open_price, dec!(1));
        assert_eq!(candles[0].close_price, dec!(2));
        assert_eq!(registry.known_symbols(), vec!["APPL".to_string()]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_first_trades_create_one_aggregator_per_symbol() {
        let registry = Arc::new(MarketRegistry::new(vec![minutes(1)]));
        let base = Utc.with_ymd_and_hms(2022, 12, 12, 12, 0, 0).unwrap();

        // 50 symbols x 20 trades, one producer task per symbol so each
        // symbol's trades arrive in time order, all racing on creation.
        let mut tasks = Vec::new();
        for sym in 0..50 {
            let registry = registry.clone();
            tasks.push(tokio::spawn(async move {
                let symbol = format!("SYM{sym}");
                for i in 0..20 {
                    registry.route_trade(Trade::new(
                        &symbol,
                        base + Duration::seconds(i),
                        Decimal::from(i),
                    ));
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let mut symbols = registry.known_symbols();
        symbols.sort();
        assert_eq!(symbols.len(), 50);

        // Every trade landed in the one aggregator installed for its symbol.
        for symbol in &symbols {
            let candles = registry.query(symbol, minutes(1)).unwrap();
            assert_eq!(candles.len(), 1, "{symbol}");
            assert_eq!(candles[0].open_price, dec!(0));
            assert_eq!(candles[0].close_price, dec!(19));
        }
    }
}
