// =============================================================================
// SymbolAggregator — per-symbol candle state machine and bucket closing
// =============================================================================
//
// Owns, per configured granularity: a lock-free ingestion queue, the current
// bucket accumulator, and the append-only finalized candle sequence. Trades
// enter through `add_trade` without touching any lock; the closing pass
// (scheduled, or forced synchronously by every read) drains the queue under
// the per-granularity mutex.
//
// Thread safety:
//   - `SegQueue` accepts concurrent pushes while the closing pass pops.
//   - The `Mutex` around builder + finalized sequence serializes all closes
//     for one (symbol, granularity); different granularities never block
//     each other.
// =============================================================================

use std::collections::HashMap;

use anyhow::{Context, Result};
use crossbeam::queue::SegQueue;
use parking_lot::Mutex;
use tracing::debug;

use crate::market::candle::{Candle, CandleBuilder};
use crate::market::granularity::Granularity;
use crate::market::trade::Trade;

#[derive(Default)]
struct SlotState {
    /// Accumulator for the currently open bucket, if any trade has arrived
    /// since the last bucket closed.
    builder: Option<CandleBuilder>,
    /// Closed candles, oldest first. Never pruned within process lifetime.
    finalized: Vec<Candle>,
}

/// Queue + closing state for one granularity of one symbol.
struct Slot {
    pending: SegQueue<Trade>,
    state: Mutex<SlotState>,
}

/// Per-symbol owner of candle state for every configured granularity.
/// Created exactly once per symbol and lives for the process's lifetime.
pub struct SymbolAggregator {
    symbol: String,
    slots: HashMap<Granularity, Slot>,
}

impl SymbolAggregator {
    pub fn new(symbol: impl Into<String>, granularities: &[Granularity]) -> Self {
        let slots = granularities
            .iter()
            .map(|g| {
                (
                    *g,
                    Slot {
                        pending: SegQueue::new(),
                        state: Mutex::new(SlotState::default()),
                    },
                )
            })
            .collect();
        Self {
            symbol: symbol.into(),
            slots,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Enqueue a trade for every configured granularity. O(1) per
    /// granularity and never blocks on a closing lock, so ingestion keeps
    /// up regardless of any in-progress close.
    pub fn add_trade(&self, trade: &Trade) {
        for slot in self.slots.values() {
            slot.pending.push(trade.clone());
        }
    }

    /// Drain the ingestion queue for `granularity`, finalizing every bucket
    /// that a later trade has moved past. Invoked periodically by the
    /// scheduler and synchronously by every read.
    pub fn close_buckets(&self, granularity: Granularity) -> Result<()> {
        let slot = self.slot(granularity)?;
        let mut state = slot.state.lock();
        self.drain_locked(slot, &mut state, granularity)
    }

    /// Point-in-time candle sequence: all finalized candles plus the
    /// in-progress one, oldest first. Forces a synchronous close first, so
    /// the result reflects every trade enqueued before the call.
    pub fn candles(&self, granularity: Granularity) -> Result<Vec<Candle>> {
        let slot = self.slot(granularity)?;
        let mut state = slot.state.lock();
        self.drain_locked(slot, &mut state, granularity)?;

        let mut result = state.finalized.clone();
        if let Some(builder) = &state.builder {
            result.push(builder.snapshot());
        }
        Ok(result)
    }

    fn slot(&self, granularity: Granularity) -> Result<&Slot> {
        self.slots.get(&granularity).with_context(|| {
            format!(
                "granularity {granularity} is not tracked for symbol {}",
                self.symbol
            )
        })
    }

    /// The bucket-closing algorithm. Caller holds the slot lock.
    ///
    /// Boundaries are re-derived from the current accumulator's open time on
    /// every iteration rather than stepped incrementally, so a backlogged
    /// pass closes a long-overdue bucket into a single candle instead of
    /// drifting. Intervals with zero trades produce no candle at all: the
    /// finalized sequence may have time gaps.
    ///
    /// Trades are expected in non-decreasing time order. A late trade whose
    /// timestamp is before the current bucket's start is folded into the
    /// current bucket regardless; only the end boundary is compared.
    fn drain_locked(
        &self,
        slot: &Slot,
        state: &mut SlotState,
        granularity: Granularity,
    ) -> Result<()> {
        while let Some(trade) = slot.pending.pop() {
            let builder = match state.builder.take() {
                None => CandleBuilder::start(granularity, &trade),
                Some(builder) => {
                    let start = granularity.bucket_start(builder.open_time())?;
                    let end = granularity.bucket_end(start);
                    if trade.time < end {
                        builder.fold(&trade)
                    } else {
                        // Bucket rollover: the current accumulator closes and
                        // the trade anchors a fresh one at its own timestamp.
                        debug!(
                            symbol = %self.symbol,
                            granularity = %granularity,
                            open_time = %builder.open_time(),
                            "finalizing candle"
                        );
                        state.finalized.push(builder.snapshot());
                        CandleBuilder::start(granularity, &trade)
                    }
                }
            };
            state.builder = Some(builder);
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
