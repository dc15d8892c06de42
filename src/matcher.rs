//! Per-shard matching core.
//!
//! Single-threaded: one matcher is owned by one shard worker and is
//! never shared. Dispatches New/Cancel/Replace against per-symbol
//! books, enforces session gating, time-in-force and post-only
//! semantics, and collects trades and events into reusable buffers
//! that the shard drains into its outbound rings.

use rustc_hash::FxHashMap;
use tracing::trace;

use crate::book::OrderBook;
use crate::order::{
    Event, EventKind, Op, Order, OrderType, Side, Tif, Trade, TradingStatus,
};

/// Safety caps for market orders sweeping a thin book.
#[derive(Clone, Copy, Debug)]
pub struct MarketCaps {
    /// Distinct price levels a single market order may sweep
    pub max_levels: u32,
    /// Total quantity a single market order may take
    pub max_qty: u32,
    /// Total notional (price * qty, in cents) a single market order may take
    pub max_notional: i64,
}

impl Default for MarketCaps {
    fn default() -> Self {
        Self {
            max_levels: 64,
            max_qty: 1_000_000,
            max_notional: 10_000_000_000, // $100M
        }
    }
}

/// Reusable output buffers for one processed order.
#[derive(Debug, Default)]
pub struct Outputs {
    pub trades: Vec<Trade>,
    pub events: Vec<Event>,
}

impl Outputs {
    pub fn with_capacity(n: usize) -> Self {
        Self {
            trades: Vec::with_capacity(n),
            events: Vec::with_capacity(n),
        }
    }

    #[inline]
    pub fn clear(&mut self) {
        self.trades.clear();
        self.events.clear();
    }
}

/// The per-shard order processor: books, session state, trade ids.
pub struct Matcher {
    books: FxHashMap<u32, OrderBook>,
    status: FxHashMap<u32, TradingStatus>,
    caps: MarketCaps,
    next_trade_id: u64,
}

impl Matcher {
    pub fn new() -> Self {
        Self::with_caps(MarketCaps::default())
    }

    pub fn with_caps(caps: MarketCaps) -> Self {
        Self {
            books: FxHashMap::default(),
            status: FxHashMap::default(),
            caps,
            next_trade_id: 0,
        }
    }

    /// Apply one order, appending any trades and events to `out`.
    ///
    /// Exactly the shard worker's step 2-4: lazily create the book,
    /// gate on session state, then dispatch by operation.
    pub fn process(&mut self, order: &Order, out: &mut Outputs) {
        let status = self
            .status
            .get(&order.symbol_id)
            .copied()
            .unwrap_or_default();
        if status != TradingStatus::Open && order.op != Op::Cancel {
            trace!(order_id = order.id, ?status, "rejected by session gate");
            out.events.push(Event::reject(order));
            return;
        }

        let book = self.books.entry(order.symbol_id).or_default();
        match order.op {
            Op::Cancel => {
                // Unknown target is a silent no-op
                if book.cancel_by_id(order.target_id).is_some() {
                    out.events.push(Event::ack(EventKind::AckCancel, order, 0, 0));
                }
            }
            Op::Replace => {
                let Some(orig) = book.cancel_by_id(order.target_id) else {
                    return;
                };
                let replacement = Order {
                    id: order.id,
                    symbol_id: order.symbol_id,
                    op: Op::New,
                    side: orig.side,
                    kind: OrderType::Limit,
                    tif: Tif::Day,
                    post_only: false,
                    price_cents: if order.new_price_cents != 0 {
                        order.new_price_cents
                    } else {
                        orig.price_cents
                    },
                    qty: if order.new_qty > 0 {
                        order.new_qty
                    } else {
                        orig.qty
                    },
                    target_id: order.target_id,
                    new_price_cents: 0,
                    new_qty: 0,
                };
                out.events.push(Event::ack(
                    EventKind::AckReplace,
                    order,
                    replacement.price_cents,
                    replacement.qty,
                ));
                // The replacement re-enters as a fresh New order: it may
                // trade if its new price crosses, and any residual joins
                // the back of its level (time priority is never kept).
                process_new_limit(book, &mut self.next_trade_id, &replacement, out);
            }
            Op::New => match order.kind {
                OrderType::Limit => {
                    process_new_limit(book, &mut self.next_trade_id, order, out)
                }
                OrderType::Market => {
                    process_new_market(book, &mut self.next_trade_id, &self.caps, order, out)
                }
            },
        }
    }

    /// Worker-local session control.
    pub fn set_status(&mut self, symbol_id: u32, status: TradingStatus) {
        self.status.insert(symbol_id, status);
    }

    pub fn status(&self, symbol_id: u32) -> TradingStatus {
        self.status.get(&symbol_id).copied().unwrap_or_default()
    }

    /// Book for a symbol, if any order ever touched it.
    pub fn book(&self, symbol_id: u32) -> Option<&OrderBook> {
        self.books.get(&symbol_id)
    }
}

impl Default for Matcher {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// New-order paths
// ============================================================================

fn process_new_limit(book: &mut OrderBook, trade_id: &mut u64, order: &Order, out: &mut Outputs) {
    if order.qty == 0 {
        out.events.push(Event::reject(order));
        return;
    }

    if order.post_only && is_marketable(book, order) {
        trace!(order_id = order.id, "post-only order would cross");
        out.events.push(Event::reject(order));
        return;
    }

    if order.tif == Tif::Fok {
        let available = match order.side {
            Side::Buy => book.available_ask_up_to(order.price_cents),
            Side::Sell => book.available_bid_down_to(order.price_cents),
        };
        if available < order.qty as u64 {
            trace!(order_id = order.id, available, "FOK not fully marketable");
            out.events.push(Event::reject(order));
            return;
        }
    }

    let remaining = match order.side {
        Side::Buy => match_limit_buy(book, trade_id, order, out),
        Side::Sell => match_limit_sell(book, trade_id, order, out),
    };

    // Day residual rests; IOC residual is discarded (FOK never has one)
    if remaining > 0 && order.tif == Tif::Day {
        match order.side {
            Side::Buy => book.add_bid(order.id, order.price_cents, remaining),
            Side::Sell => book.add_ask(order.id, order.price_cents, remaining),
        }
        out.events
            .push(Event::ack(EventKind::AckNew, order, order.price_cents, remaining));
    }
}

fn match_limit_buy(
    book: &mut OrderBook,
    trade_id: &mut u64,
    order: &Order,
    out: &mut Outputs,
) -> u32 {
    let mut remaining = order.qty;
    while remaining > 0 {
        let Some(top) = book.peek_best_ask() else { break };
        if top.price_cents > order.price_cents {
            break;
        }
        let qty = remaining.min(top.qty);
        remaining -= qty;
        *trade_id += 1;
        out.trades.push(Trade {
            trade_id: *trade_id,
            symbol_id: order.symbol_id,
            price_cents: top.price_cents,
            qty,
            buy_order_id: order.id,
            sell_order_id: top.order_id,
        });
        out.events
            .push(Event::exec(order, top.order_id, top.price_cents, qty, remaining));
        if qty == top.qty {
            let _ = book.pop_best_ask();
        } else {
            book.reduce_best_ask(qty);
        }
    }
    remaining
}

fn match_limit_sell(
    book: &mut OrderBook,
    trade_id: &mut u64,
    order: &Order,
    out: &mut Outputs,
) -> u32 {
    let mut remaining = order.qty;
    while remaining > 0 {
        let Some(top) = book.peek_best_bid() else { break };
        if top.price_cents < order.price_cents {
            break;
        }
        let qty = remaining.min(top.qty);
        remaining -= qty;
        *trade_id += 1;
        out.trades.push(Trade {
            trade_id: *trade_id,
            symbol_id: order.symbol_id,
            price_cents: top.price_cents,
            qty,
            buy_order_id: top.order_id,
            sell_order_id: order.id,
        });
        out.events
            .push(Event::exec(order, top.order_id, top.price_cents, qty, remaining));
        if qty == top.qty {
            let _ = book.pop_best_bid();
        } else {
            book.reduce_best_bid(qty);
        }
    }
    remaining
}

fn process_new_market(
    book: &mut OrderBook,
    trade_id: &mut u64,
    caps: &MarketCaps,
    order: &Order,
    out: &mut Outputs,
) {
    if order.qty == 0 {
        out.events.push(Event::reject(order));
        return;
    }

    let budget = order.qty.min(caps.max_qty);
    let mut matched: u32 = 0;
    let mut notional: i64 = 0;
    let mut levels_swept: u32 = 0;
    let mut last_price: Option<i64> = None;

    while matched < budget {
        let Some(top) = (match order.side {
            Side::Buy => book.peek_best_ask(),
            Side::Sell => book.peek_best_bid(),
        }) else {
            break;
        };

        if last_price != Some(top.price_cents) {
            levels_swept += 1;
            if levels_swept > caps.max_levels {
                break;
            }
            last_price = Some(top.price_cents);
        }

        let mut qty = (budget - matched).min(top.qty);
        // Clamp the fill so the notional cap is never exceeded
        let fill_notional = top.price_cents.saturating_mul(qty as i64);
        if notional.saturating_add(fill_notional) > caps.max_notional {
            let left = caps.max_notional - notional;
            let fit = if top.price_cents > 0 {
                (left / top.price_cents).clamp(0, u32::MAX as i64) as u32
            } else {
                qty
            };
            qty = qty.min(fit);
            if qty == 0 {
                break;
            }
        }

        matched += qty;
        notional += top.price_cents.saturating_mul(qty as i64);
        *trade_id += 1;
        let (buy_id, sell_id) = match order.side {
            Side::Buy => (order.id, top.order_id),
            Side::Sell => (top.order_id, order.id),
        };
        out.trades.push(Trade {
            trade_id: *trade_id,
            symbol_id: order.symbol_id,
            price_cents: top.price_cents,
            qty,
            buy_order_id: buy_id,
            sell_order_id: sell_id,
        });
        out.events.push(Event::exec(
            order,
            top.order_id,
            top.price_cents,
            qty,
            order.qty - matched,
        ));

        if qty == top.qty {
            let _ = match order.side {
                Side::Buy => book.pop_best_ask(),
                Side::Sell => book.pop_best_bid(),
            };
        } else {
            match order.side {
                Side::Buy => book.reduce_best_ask(qty),
                Side::Sell => book.reduce_best_bid(qty),
            };
        }
    }
    // Unfilled market quantity is dropped: market orders never rest.
}

#[inline]
fn is_marketable(book: &OrderBook, order: &Order) -> bool {
    match order.side {
        Side::Buy => book.best_ask().is_some_and(|ask| ask <= order.price_cents),
        Side::Sell => book.best_bid().is_some_and(|bid| bid >= order.price_cents),
    }
}
