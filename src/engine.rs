//! Engine lifecycle and shard registry.
//!
//! Owns the N shards, the running flag, and the monotone counters.
//! Routing is a stable partition: `shard = symbol_id % N` for the
//! life of the engine.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::matcher::MarketCaps;
use crate::order::{Event, Order, Trade};
use crate::ring::{Reader, RingError, Writer};
use crate::shard::{Shard, SharedCounters};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine needs at least one shard")]
    NoShards,
    #[error(transparent)]
    Ring(#[from] RingError),
}

/// Construction parameters for [`MatchingEngine`].
#[derive(Clone, Copy, Debug)]
pub struct EngineConfig {
    /// Number of shards (worker threads)
    pub num_shards: usize,
    /// Capacity of every shard ring (inbox, trades, events); power of two
    pub ring_capacity: usize,
    /// Market-order sweep caps applied by every shard
    pub market_caps: MarketCaps,
    /// Pin worker i to core i (best-effort)
    pub pin_workers: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            num_shards: 4,
            ring_capacity: 4096,
            market_caps: MarketCaps::default(),
            pin_workers: false,
        }
    }
}

/// The sharded matching engine.
#[derive(Debug)]
pub struct MatchingEngine {
    shards: Vec<Shard>,
    running: AtomicBool,
    enqueued: AtomicU64,
    dropped: AtomicU64,
    shared: Arc<SharedCounters>,
}

impl MatchingEngine {
    /// Build the engine and its shards. Fails fast on a zero shard
    /// count or a non-power-of-two ring capacity.
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        if config.num_shards == 0 {
            return Err(EngineError::NoShards);
        }
        let mut shards = Vec::with_capacity(config.num_shards);
        for i in 0..config.num_shards {
            let pin = config.pin_workers.then_some(i);
            shards.push(Shard::new(config.ring_capacity, config.market_caps, pin)?);
        }
        Ok(Self {
            shards,
            running: AtomicBool::new(false),
            enqueued: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            shared: Arc::new(SharedCounters::default()),
        })
    }

    /// Start all shard workers and wait until each reports running.
    pub fn start(&self) {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        for shard in &self.shards {
            shard.start(Arc::clone(&self.shared));
        }

        self.enqueued.store(0, Ordering::Relaxed);
        self.dropped.store(0, Ordering::Relaxed);
        self.shared.processed.store(0, Ordering::Relaxed);
        self.shared.trades.store(0, Ordering::Relaxed);

        for shard in &self.shards {
            while !shard.is_running() {
                std::thread::yield_now();
            }
        }
        info!(shards = self.shards.len(), "engine started");
    }

    /// Stop and join every worker. In-flight orders are processed;
    /// anything submitted after this is counted dropped.
    pub fn shutdown(&self) {
        if self
            .running
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        for shard in &self.shards {
            shard.stop();
        }
        info!(
            processed = self.processed_count(),
            trades = self.trades_count(),
            "engine stopped"
        );
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Stable routing: `symbol_id % num_shards`.
    #[inline]
    pub fn shard_of(&self, symbol_id: u32) -> usize {
        (symbol_id as usize) % self.shards.len()
    }

    /// Route an order to its shard.
    ///
    /// Convenience for tests and single-threaded drivers: the caller
    /// must be the only thread writing that shard's inbox. A full
    /// inbox or a stopped engine counts the order as dropped.
    pub fn submit(&self, order: Order) -> bool {
        if !self.is_running() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        let shard = self.shard_of(order.symbol_id);
        if self.shards[shard].try_enqueue(order) {
            self.enqueued.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Enqueue onto a specific shard inbox (ingress producer path).
    ///
    /// A full inbox returns `false` without counting a drop - the
    /// producer spins and retries. Only a stopped engine drops.
    pub fn enqueue_to_shard(&self, shard: usize, order: Order) -> bool {
        if !self.is_running() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        if self.shards[shard].try_enqueue(order) {
            self.enqueued.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    // ========================================================================
    // Ring accessors - caller owns the SPSC contract
    // ========================================================================

    pub fn writer_for_shard(&self, shard: usize) -> Writer<Order> {
        self.shards[shard].writer()
    }

    pub fn trade_reader_for_shard(&self, shard: usize) -> Reader<Trade> {
        self.shards[shard].trade_reader()
    }

    pub fn event_reader_for_shard(&self, shard: usize) -> Reader<Event> {
        self.shards[shard].event_reader()
    }

    // ========================================================================
    // Counters
    // ========================================================================

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    pub fn enqueued_count(&self) -> u64 {
        self.enqueued.load(Ordering::Relaxed)
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn processed_count(&self) -> u64 {
        // Acquire pairs with the workers' release increment, so a
        // caller that waits on this count can drain the rings behind it
        self.shared.processed.load(Ordering::Acquire)
    }

    pub fn trades_count(&self) -> u64 {
        self.shared.trades.load(Ordering::Relaxed)
    }

    /// Trades lost to outbound ring overflow, across all shards.
    pub fn dropped_trades_count(&self) -> u64 {
        self.shards.iter().map(|s| s.dropped_trades()).sum()
    }

    /// Events lost to outbound ring overflow, across all shards.
    pub fn dropped_events_count(&self) -> u64 {
        self.shards.iter().map(|s| s.dropped_events()).sum()
    }
}

impl Drop for MatchingEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::Side;
    use crate::ring::RingError;

    fn small_engine(num_shards: usize) -> MatchingEngine {
        MatchingEngine::new(EngineConfig {
            num_shards,
            ring_capacity: 256,
            ..EngineConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_construction_errors() {
        let err = MatchingEngine::new(EngineConfig {
            num_shards: 0,
            ..EngineConfig::default()
        })
        .unwrap_err();
        assert!(matches!(err, EngineError::NoShards));

        let err = MatchingEngine::new(EngineConfig {
            num_shards: 1,
            ring_capacity: 1000, // not a power of two
            ..EngineConfig::default()
        })
        .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Ring(RingError::CapacityNotPowerOfTwo(1000))
        ));
    }

    #[test]
    fn test_routing_is_stable_modulo() {
        let engine = small_engine(4);
        for symbol in 0..64u32 {
            assert_eq!(engine.shard_of(symbol), symbol as usize % 4);
        }
    }

    #[test]
    fn test_submit_before_start_is_dropped() {
        let engine = small_engine(2);
        assert!(!engine.submit(Order::limit(1, 0, Side::Buy, 100, 1)));
        assert_eq!(engine.dropped_count(), 1);
        assert_eq!(engine.enqueued_count(), 0);
    }

    #[test]
    fn test_lifecycle_and_counters() {
        let engine = small_engine(2);
        engine.start();
        engine.start(); // idempotent
        assert!(engine.is_running());

        assert!(engine.submit(Order::limit(1, 0, Side::Sell, 100, 5)));
        assert!(engine.submit(Order::limit(2, 0, Side::Buy, 100, 5)));

        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        while engine.processed_count() < 2 {
            assert!(std::time::Instant::now() < deadline, "timed out");
            std::hint::spin_loop();
        }
        assert_eq!(engine.enqueued_count(), 2);
        assert_eq!(engine.trades_count(), 1);

        let mut reader = engine.trade_reader_for_shard(0);
        let trade = reader.try_dequeue().unwrap();
        assert_eq!(trade.price_cents, 100);

        engine.shutdown();
        assert!(!engine.is_running());

        // Shutdown-window submission drops
        assert!(!engine.submit(Order::limit(3, 0, Side::Buy, 100, 5)));
        assert_eq!(engine.dropped_count(), 1);
    }

    #[test]
    fn test_symbols_route_to_distinct_shards() {
        let engine = small_engine(2);
        engine.start();

        // Same price, opposite sides, different symbols: no cross
        assert!(engine.submit(Order::limit(1, 0, Side::Sell, 100, 5)));
        assert!(engine.submit(Order::limit(2, 1, Side::Buy, 100, 5)));

        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        while engine.processed_count() < 2 {
            assert!(std::time::Instant::now() < deadline, "timed out");
            std::hint::spin_loop();
        }
        assert_eq!(engine.trades_count(), 0);
        engine.shutdown();
    }
}
