pub mod aggregator;
pub mod candle;
pub mod granularity;
pub mod registry;
pub mod scheduler;
pub mod trade;

// Re-export the core types for convenient access (e.g. `use crate::market::Candle`).
pub use candle::Candle;
pub use granularity::{Granularity, TimeUnit};
pub use registry::{MarketRegistry, QueryError};
pub use trade::Trade;
