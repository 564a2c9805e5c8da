use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// A single tick from the upstream feed: one price for one symbol at one
/// instant. Trades carry no ordering guarantee of their own; the aggregation
/// algorithm assumes they are folded in non-decreasing time order.
#[derive(Debug, Clone, PartialEq)]
pub struct Trade {
    pub symbol: String,
    pub time: DateTime<Utc>,
    pub price: Decimal,
}

impl Trade {
    pub fn new(symbol: impl Into<String>, time: DateTime<Utc>, price: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            time,
            price,
        }
    }
}
