//! Strategy-facing boundary: order gateway and strategy callbacks.
//!
//! The gateway is the only way strategy code touches the core. It
//! synthesizes `Order` records with ids from a dedicated high range so
//! strategy orders never collide with decoder-assigned ids, and pushes
//! them through the ingress coordinator on the caller's thread.

use crate::ingress::IngressCoordinator;
use crate::order::{Order, Side, Tif, Trade};

/// First id handed out by [`IngressGateway`]; decoder-assigned ids are
/// expected to stay below this.
pub const STRATEGY_ID_BASE: u64 = 1_000_000_000_000;

/// Entry points a strategy uses to submit orders.
pub trait OrderGateway {
    fn submit_new_limit(
        &mut self,
        symbol_id: u32,
        side: Side,
        price_cents: i64,
        qty: u32,
        tif: Tif,
        post_only: bool,
    ) -> u64;

    fn submit_new_market(&mut self, symbol_id: u32, side: Side, qty: u32) -> u64;

    fn submit_cancel(&mut self, symbol_id: u32, target_id: u64) -> u64;

    fn submit_replace(
        &mut self,
        symbol_id: u32,
        target_id: u64,
        new_price_cents: i64,
        new_qty: u32,
    ) -> u64;
}

/// Gateway that feeds the ingress coordinator.
///
/// Single-threaded by contract: it rides the decoder thread, so its
/// submissions interleave with feed replay on the same SPSC path.
pub struct IngressGateway<'a> {
    ingress: &'a IngressCoordinator,
    next_id: u64,
}

impl<'a> IngressGateway<'a> {
    pub fn new(ingress: &'a IngressCoordinator) -> Self {
        Self {
            ingress,
            next_id: STRATEGY_ID_BASE,
        }
    }

    #[inline]
    fn take_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

impl OrderGateway for IngressGateway<'_> {
    fn submit_new_limit(
        &mut self,
        symbol_id: u32,
        side: Side,
        price_cents: i64,
        qty: u32,
        tif: Tif,
        post_only: bool,
    ) -> u64 {
        let id = self.take_id();
        let mut order = Order::limit(id, symbol_id, side, price_cents, qty).with_tif(tif);
        if post_only {
            order = order.with_post_only();
        }
        self.ingress.submit_from_decoder(order);
        id
    }

    fn submit_new_market(&mut self, symbol_id: u32, side: Side, qty: u32) -> u64 {
        let id = self.take_id();
        self.ingress
            .submit_from_decoder(Order::market(id, symbol_id, side, qty));
        id
    }

    fn submit_cancel(&mut self, symbol_id: u32, target_id: u64) -> u64 {
        let id = self.take_id();
        self.ingress
            .submit_from_decoder(Order::cancel(id, symbol_id, target_id));
        id
    }

    fn submit_replace(
        &mut self,
        symbol_id: u32,
        target_id: u64,
        new_price_cents: i64,
        new_qty: u32,
    ) -> u64 {
        let id = self.take_id();
        self.ingress.submit_from_decoder(Order::replace(
            id,
            symbol_id,
            target_id,
            new_price_cents,
            new_qty,
        ));
        id
    }
}

// ============================================================================
// Strategy callbacks
// ============================================================================

/// Run metadata handed to a strategy once before replay.
#[derive(Clone, Copy, Debug)]
pub struct StrategyContext {
    /// Replay speed multiplier (1.0 = historical cadence)
    pub speed: f64,
}

/// What a market event is, from the strategy's point of view.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MarketEventKind {
    Add,
    Cancel,
    Replace,
    Execute,
}

/// Normalized view of a feed event with a resolved numeric symbol id.
#[derive(Clone, Copy, Debug)]
pub struct StrategyMarketEvent {
    pub kind: MarketEventKind,
    pub symbol_id: u32,
    pub ts_event_ns: u64,
    pub order_id: u64,
    pub side: Side,
    pub price_cents: i64,
    pub qty: u32,
}

/// Interface a strategy implements. The gateway is passed per
/// callback so the strategy can react inline on the replay thread.
pub trait Strategy {
    fn initialize(&mut self, _ctx: &StrategyContext) {}

    /// One call per normalized market event, replay-paced.
    fn on_market_event(&mut self, event: &StrategyMarketEvent, gateway: &mut dyn OrderGateway);

    /// One call per trade drained from the shard trade rings.
    fn on_fill(&mut self, trade: &Trade, gateway: &mut dyn OrderGateway);

    /// End-of-run cleanup/summary.
    fn on_end(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineConfig, MatchingEngine};
    use std::sync::Arc;

    fn pipeline() -> (Arc<MatchingEngine>, IngressCoordinator) {
        let engine = Arc::new(
            MatchingEngine::new(EngineConfig {
                num_shards: 2,
                ring_capacity: 256,
                ..EngineConfig::default()
            })
            .unwrap(),
        );
        engine.start();
        let ingress = IngressCoordinator::new(Arc::clone(&engine), 1, 64).unwrap();
        ingress.start();
        (engine, ingress)
    }

    fn wait_processed(engine: &MatchingEngine, n: u64) {
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        while engine.processed_count() < n {
            assert!(std::time::Instant::now() < deadline, "timed out");
            std::hint::spin_loop();
        }
    }

    #[test]
    fn test_ids_come_from_high_range_and_are_monotone() {
        let (engine, ingress) = pipeline();
        let mut gw = IngressGateway::new(&ingress);

        let a = gw.submit_new_limit(0, Side::Buy, 10_000, 5, Tif::Day, false);
        let b = gw.submit_new_limit(0, Side::Sell, 10_100, 5, Tif::Day, false);
        assert_eq!(a, STRATEGY_ID_BASE);
        assert_eq!(b, STRATEGY_ID_BASE + 1);

        wait_processed(&engine, 2);
        ingress.stop();
        engine.shutdown();
    }

    #[test]
    fn test_gateway_orders_reach_the_book() {
        let (engine, ingress) = pipeline();
        let mut gw = IngressGateway::new(&ingress);

        let maker = gw.submit_new_limit(1, Side::Sell, 10_000, 5, Tif::Day, false);
        let taker = gw.submit_new_limit(1, Side::Buy, 10_000, 5, Tif::Day, false);
        wait_processed(&engine, 2);

        let shard = engine.shard_of(1);
        let mut trades = engine.trade_reader_for_shard(shard);
        let trade = trades.try_dequeue().unwrap();
        assert_eq!(trade.sell_order_id, maker);
        assert_eq!(trade.buy_order_id, taker);

        ingress.stop();
        engine.shutdown();
    }

    #[test]
    fn test_gateway_cancel_and_replace() {
        let (engine, ingress) = pipeline();
        let mut gw = IngressGateway::new(&ingress);

        let id = gw.submit_new_limit(0, Side::Buy, 9_900, 10, Tif::Day, false);
        let repl = gw.submit_replace(0, id, 9_950, 0);
        gw.submit_cancel(0, repl);
        wait_processed(&engine, 3);

        let mut events = engine.event_reader_for_shard(0);
        let mut kinds = Vec::new();
        while let Some(ev) = events.try_dequeue() {
            kinds.push(ev.kind);
        }
        use crate::order::EventKind::*;
        assert_eq!(kinds, vec![AckNew, AckReplace, AckNew, AckCancel]);

        ingress.stop();
        engine.shutdown();
    }
}
