// =============================================================================
// Candle + CandleBuilder — immutable OHLC snapshot and its accumulator
// =============================================================================

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::market::granularity::Granularity;
use crate::market::trade::Trade;

/// An immutable OHLC aggregate for one bucket of one granularity.
///
/// `close_time` is the time of the last trade folded into the bucket. The
/// external representation may omit it to mark a candle as not yet closed.
#[derive(Debug, Clone, PartialEq)]
pub struct Candle {
    pub granularity: Granularity,
    pub open_time: DateTime<Utc>,
    pub close_time: Option<DateTime<Utc>>,
    pub min_price: Decimal,
    pub max_price: Decimal,
    pub open_price: Decimal,
    pub close_price: Decimal,
}

/// Running state of the currently open bucket, mutable by replacement:
/// `fold` consumes the builder and returns the updated one.
///
/// `open_time` and `open_price` are fixed at creation; `close_time` and
/// `close_price` track the last folded trade. Trades must be folded in
/// non-decreasing time order; the builder does not validate this.
#[derive(Debug, Clone)]
pub struct CandleBuilder {
    granularity: Granularity,
    open_time: DateTime<Utc>,
    close_time: DateTime<Utc>,
    min_price: Decimal,
    max_price: Decimal,
    open_price: Decimal,
    close_price: Decimal,
}

impl CandleBuilder {
    /// Open a new bucket from its first trade: all four prices start at the
    /// trade's price, both times at its timestamp.
    pub fn start(granularity: Granularity, first_trade: &Trade) -> Self {
        Self {
            granularity,
            open_time: first_trade.time,
            close_time: first_trade.time,
            min_price: first_trade.price,
            max_price: first_trade.price,
            open_price: first_trade.price,
            close_price: first_trade.price,
        }
    }

    /// Fold one more trade into the bucket.
    pub fn fold(self, trade: &Trade) -> Self {
        Self {
            close_time: trade.time,
            min_price: self.min_price.min(trade.price),
            max_price: self.max_price.max(trade.price),
            close_price: trade.price,
            ..self
        }
    }

    /// The instant this bucket was anchored at. Bucket boundaries are always
    /// re-derived from this value, never advanced incrementally.
    pub fn open_time(&self) -> DateTime<Utc> {
        self.open_time
    }

    /// An immutable candle reflecting the builder's state as of the last
    /// fold. Used both to finalize a closed bucket and to serve the
    /// in-progress candle on reads.
    pub fn snapshot(&self) -> Candle {
        Candle {
            granularity: self.granularity,
            open_time: self.open_time,
            close_time: Some(self.close_time),
            min_price: self.min_price,
            max_price: self.max_price,
            open_price: self.open_price,
            close_price: self.close_price,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::granularity::TimeUnit;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2022, 12, 12, 12, 12, 12).unwrap()
    }

    fn trade(offset_secs: i64, price: Decimal) -> Trade {
        Trade::new("APPL", base_time() + Duration::seconds(offset_secs), price)
    }

    #[test]
    fn first_trade_sets_every_field() {
        let g = Granularity::new(1, TimeUnit::Minute).unwrap();
        let builder = CandleBuilder::start(g, &trade(0, dec!(3.25)));

        let candle = builder.snapshot();
        assert_eq!(candle.open_time, base_time());
        assert_eq!(candle.close_time, Some(base_time()));
        assert_eq!(candle.open_price, dec!(3.25));
        assert_eq!(candle.close_price, dec!(3.25));
        assert_eq!(candle.min_price, dec!(3.25));
        assert_eq!(candle.max_price, dec!(3.25));
    }

    #[test]
    fn fold_extends_extremes_and_replaces_close() {
        let g = Granularity::new(1, TimeUnit::Minute).unwrap();
        let candle = CandleBuilder::start(g, &trade(0, dec!(2)))
            .fold(&trade(1, dec!(5)))
            .fold(&trade(2, dec!(1)))
            .fold(&trade(3, dec!(4)))
            .snapshot();

        assert_eq!(candle.open_price, dec!(2));
        assert_eq!(candle.close_price, dec!(4));
        assert_eq!(candle.min_price, dec!(1));
        assert_eq!(candle.max_price, dec!(5));
        assert_eq!(candle.open_time, base_time());
        assert_eq!(candle.close_time, Some(base_time() + Duration::seconds(3)));
    }

    #[test]
    fn open_fields_never_change_after_creation() {
        let g = Granularity::new(10, TimeUnit::Second).unwrap();
        let builder = CandleBuilder::start(g, &trade(0, dec!(10)))
            .fold(&trade(4, dec!(20)))
            .fold(&trade(8, dec!(30)));

        assert_eq!(builder.open_time(), base_time());
        let candle = builder.snapshot();
        assert_eq!(candle.open_price, dec!(10));
        assert_eq!(candle.open_time, base_time());
    }

    #[test]
    fn snapshots_compare_structurally() {
        let g = Granularity::new(1, TimeUnit::Second).unwrap();
        let a = CandleBuilder::start(g, &trade(0, dec!(1))).snapshot();
        let b = CandleBuilder::start(g, &trade(0, dec!(1))).snapshot();
        assert_eq!(a, b);
    }
}
