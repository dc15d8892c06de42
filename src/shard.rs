//! A shard: one matching worker and its rings.
//!
//! Owns the order inbox, the trade and event outboxes, and the single
//! thread that runs the matcher. All book state lives inside the
//! worker thread; the rings are the only surface other threads touch.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crate::affinity;
use crate::matcher::{Matcher, MarketCaps, Outputs};
use crate::order::{Event, Order, Trade};
use crate::ring::{Reader, Ring, RingError, Writer};

/// Engine-wide counters each worker feeds (relaxed increments).
#[derive(Debug, Default)]
pub struct SharedCounters {
    pub processed: AtomicU64,
    pub trades: AtomicU64,
}

#[derive(Debug)]
pub(crate) struct Shard {
    inbox: Arc<Ring<Order>>,
    trades: Arc<Ring<Trade>>,
    events: Arc<Ring<Event>>,
    caps: MarketCaps,
    pin_core: Option<usize>,
    running: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
    dropped_trades: Arc<AtomicU64>,
    dropped_events: Arc<AtomicU64>,
}

impl Shard {
    pub(crate) fn new(
        ring_capacity: usize,
        caps: MarketCaps,
        pin_core: Option<usize>,
    ) -> Result<Self, RingError> {
        Ok(Self {
            inbox: Arc::new(Ring::with_capacity(ring_capacity)?),
            trades: Arc::new(Ring::with_capacity(ring_capacity)?),
            events: Arc::new(Ring::with_capacity(ring_capacity)?),
            caps,
            pin_core,
            running: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
            dropped_trades: Arc::new(AtomicU64::new(0)),
            dropped_events: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Start the worker. Idempotent: a second start is a no-op.
    pub(crate) fn start(&self, shared: Arc<SharedCounters>) {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        let inbox = Arc::clone(&self.inbox);
        let trades = Arc::clone(&self.trades);
        let events = Arc::clone(&self.events);
        let running = Arc::clone(&self.running);
        let dropped_trades = Arc::clone(&self.dropped_trades);
        let dropped_events = Arc::clone(&self.dropped_events);
        let caps = self.caps;
        let pin_core = self.pin_core;

        let handle = std::thread::spawn(move || {
            if let Some(core) = pin_core {
                affinity::pin_to_core(core);
            }
            let mut matcher = Matcher::with_caps(caps);
            let mut out = Outputs::with_capacity(32);

            loop {
                match inbox.try_dequeue() {
                    Some(order) => {
                        out.clear();
                        matcher.process(&order, &mut out);
                        if !out.trades.is_empty() {
                            shared
                                .trades
                                .fetch_add(out.trades.len() as u64, Ordering::Relaxed);
                        }
                        // Outbound overflow drops the record and counts it
                        for trade in out.trades.drain(..) {
                            if trades.try_enqueue(trade).is_err() {
                                dropped_trades.fetch_add(1, Ordering::Relaxed);
                            }
                        }
                        for event in out.events.drain(..) {
                            if events.try_enqueue(event).is_err() {
                                dropped_events.fetch_add(1, Ordering::Relaxed);
                            }
                        }
                        // Release-publish after the ring writes: anyone
                        // who observes the new count can drain the
                        // outputs that produced it
                        shared.processed.fetch_add(1, Ordering::Release);
                    }
                    None => {
                        // Exit only on a miss, so in-flight orders that
                        // beat the shutdown flag are still processed
                        if !running.load(Ordering::Acquire) {
                            break;
                        }
                        std::hint::spin_loop();
                    }
                }
            }
        });

        if let Ok(mut slot) = self.worker.lock() {
            *slot = Some(handle);
        }
    }

    /// Stop the worker and join it. Idempotent.
    pub(crate) fn stop(&self) {
        if self
            .running
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        let handle = self.worker.lock().ok().and_then(|mut slot| slot.take());
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Enqueue directly onto the inbox. SPSC: one caller thread.
    #[inline]
    pub(crate) fn try_enqueue(&self, order: Order) -> bool {
        self.inbox.try_enqueue(order).is_ok()
    }

    pub(crate) fn writer(&self) -> Writer<Order> {
        Writer::new(Arc::clone(&self.inbox))
    }

    pub(crate) fn trade_reader(&self) -> Reader<Trade> {
        Reader::new(Arc::clone(&self.trades))
    }

    pub(crate) fn event_reader(&self) -> Reader<Event> {
        Reader::new(Arc::clone(&self.events))
    }

    pub(crate) fn dropped_trades(&self) -> u64 {
        self.dropped_trades.load(Ordering::Relaxed)
    }

    pub(crate) fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }
}

impl Drop for Shard {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::{EventKind, Side};

    fn spin_until<F: Fn() -> bool>(cond: F) {
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        while !cond() {
            assert!(std::time::Instant::now() < deadline, "timed out");
            std::hint::spin_loop();
        }
    }

    #[test]
    fn test_start_stop_idempotent() {
        let shard = Shard::new(64, MarketCaps::default(), None).unwrap();
        let shared = Arc::new(SharedCounters::default());
        shard.start(Arc::clone(&shared));
        shard.start(Arc::clone(&shared)); // no-op
        assert!(shard.is_running());
        shard.stop();
        shard.stop(); // no-op
        assert!(!shard.is_running());
    }

    #[test]
    fn test_worker_matches_and_emits() {
        let shard = Shard::new(64, MarketCaps::default(), None).unwrap();
        let shared = Arc::new(SharedCounters::default());
        shard.start(Arc::clone(&shared));

        assert!(shard.try_enqueue(Order::limit(1, 0, Side::Sell, 100, 5)));
        assert!(shard.try_enqueue(Order::limit(2, 0, Side::Buy, 100, 5)));

        spin_until(|| shared.processed.load(Ordering::Relaxed) == 2);
        assert_eq!(shared.trades.load(Ordering::Relaxed), 1);

        let mut trades = shard.trade_reader();
        let trade = trades.try_dequeue().unwrap();
        assert_eq!(trade.qty, 5);
        assert_eq!(trade.buy_order_id, 2);
        assert_eq!(trade.sell_order_id, 1);

        let mut events = shard.event_reader();
        let mut kinds = Vec::new();
        while let Some(ev) = events.try_dequeue() {
            kinds.push(ev.kind);
        }
        assert_eq!(kinds, vec![EventKind::AckNew, EventKind::Exec]);

        shard.stop();
    }

    #[test]
    fn test_inflight_orders_processed_before_exit() {
        let shard = Shard::new(1024, MarketCaps::default(), None).unwrap();
        let shared = Arc::new(SharedCounters::default());
        shard.start(Arc::clone(&shared));

        for i in 0..500u64 {
            while !shard.try_enqueue(Order::limit(i + 1, 0, Side::Buy, 100, 1)) {
                std::hint::spin_loop();
            }
        }
        shard.stop();
        assert_eq!(shared.processed.load(Ordering::Relaxed), 500);
    }
}
