//! Order, Trade and Event types shared across the engine.
//!
//! Orders are inputs from the decoder or a strategy gateway.
//! Trades and Events are outputs to consumers.

/// Order side (buy = bid, sell = ask)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum Side {
    /// Buy side (bids)
    #[default]
    Buy = 0,
    /// Sell side (asks)
    Sell = 1,
}

impl Side {
    /// Returns the opposite side
    #[inline]
    pub const fn opposite(self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

/// Operation carried by an [`Order`] record
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Op {
    /// Place a new order (default)
    #[default]
    New = 0,
    /// Cancel the order identified by `target_id`
    Cancel = 1,
    /// Cancel `target_id` and re-enter with overridden price/qty
    Replace = 2,
}

/// Order type determines matching behavior
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum OrderType {
    /// Limit order - rests in the book if not fully matched (default)
    #[default]
    Limit = 0,
    /// Market order - sweeps the opposite side, never rests
    Market = 1,
}

/// Time-in-force for limit orders
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Tif {
    /// Residual rests on the book (default)
    #[default]
    Day = 0,
    /// Immediate-or-cancel: residual is discarded after matching
    Ioc = 1,
    /// Fill-or-kill: full fill or a single reject, never partial
    Fok = 2,
}

/// Per-symbol session state. Anything but `Open` rejects all
/// operations except Cancel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum TradingStatus {
    #[default]
    Open = 0,
    Halted = 1,
    Closed = 2,
}

// ============================================================================
// Input: Order
// ============================================================================

/// The unit of input, a flat record tagged by [`Op`].
///
/// `id` is globally unique for New/Replace; Cancel and Replace refer
/// to a prior order via `target_id`. `symbol_id` is pre-resolved and
/// drives shard routing. Prices are signed cents, quantities are lots.
#[derive(Clone, Copy, Debug, Default)]
pub struct Order {
    pub id: u64,
    pub symbol_id: u32,
    pub op: Op,
    pub side: Side,
    pub kind: OrderType,
    pub tif: Tif,
    pub post_only: bool,
    pub price_cents: i64,
    pub qty: u32,
    /// Cancel/Replace: id of the resting order being targeted
    pub target_id: u64,
    /// Replace: new price (0 = keep)
    pub new_price_cents: i64,
    /// Replace: new quantity (0 = keep)
    pub new_qty: u32,
}

impl Order {
    /// Create a new limit order (most common case)
    #[inline]
    pub const fn limit(id: u64, symbol_id: u32, side: Side, price_cents: i64, qty: u32) -> Self {
        Self {
            id,
            symbol_id,
            op: Op::New,
            side,
            kind: OrderType::Limit,
            tif: Tif::Day,
            post_only: false,
            price_cents,
            qty,
            target_id: 0,
            new_price_cents: 0,
            new_qty: 0,
        }
    }

    /// Create a new market order
    #[inline]
    pub const fn market(id: u64, symbol_id: u32, side: Side, qty: u32) -> Self {
        Self {
            id,
            symbol_id,
            op: Op::New,
            side,
            kind: OrderType::Market,
            tif: Tif::Ioc,
            post_only: false,
            price_cents: 0,
            qty,
            target_id: 0,
            new_price_cents: 0,
            new_qty: 0,
        }
    }

    /// Create a cancel for `target_id`
    #[inline]
    pub const fn cancel(id: u64, symbol_id: u32, target_id: u64) -> Self {
        Self {
            id,
            symbol_id,
            op: Op::Cancel,
            side: Side::Buy,
            kind: OrderType::Limit,
            tif: Tif::Day,
            post_only: false,
            price_cents: 0,
            qty: 0,
            target_id,
            new_price_cents: 0,
            new_qty: 0,
        }
    }

    /// Create a replace for `target_id` (0 = keep the original value)
    #[inline]
    pub const fn replace(
        id: u64,
        symbol_id: u32,
        target_id: u64,
        new_price_cents: i64,
        new_qty: u32,
    ) -> Self {
        Self {
            id,
            symbol_id,
            op: Op::Replace,
            side: Side::Buy,
            kind: OrderType::Limit,
            tif: Tif::Day,
            post_only: false,
            price_cents: 0,
            qty: 0,
            target_id,
            new_price_cents,
            new_qty,
        }
    }

    /// Builder-style time-in-force override
    #[inline]
    pub const fn with_tif(mut self, tif: Tif) -> Self {
        self.tif = tif;
        self
    }

    /// Builder-style post-only flag
    #[inline]
    pub const fn with_post_only(mut self) -> Self {
        self.post_only = true;
        self
    }
}

// ============================================================================
// Output: Trade
// ============================================================================

/// An execution between an aggressor and a resting order.
///
/// `trade_id` is monotone per shard; the price is always the resting
/// (maker) side's price.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Trade {
    pub trade_id: u64,
    pub symbol_id: u32,
    pub price_cents: i64,
    pub qty: u32,
    pub buy_order_id: u64,
    pub sell_order_id: u64,
}

// ============================================================================
// Output: Event
// ============================================================================

/// Discriminant for [`Event`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum EventKind {
    #[default]
    AckNew = 0,
    AckCancel = 1,
    AckReplace = 2,
    Reject = 3,
    Exec = 4,
}

/// Which side of liquidity an Exec touched
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Liquidity {
    #[default]
    None = 0,
    Maker = 1,
    Taker = 2,
}

/// Execution-report record pushed to the per-shard event ring.
///
/// For Exec: `related_id` is the counterparty order, `qty` the last
/// fill, `remaining` the aggressor residual. For cancel/replace acks,
/// `related_id` is the targeted order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Event {
    pub kind: EventKind,
    pub order_id: u64,
    pub related_id: u64,
    pub symbol_id: u32,
    pub side: Side,
    pub price_cents: i64,
    pub qty: u32,
    pub remaining: u32,
    pub liquidity: Liquidity,
}

impl Event {
    #[inline]
    pub(crate) fn exec(order: &Order, maker_id: u64, price_cents: i64, qty: u32, remaining: u32) -> Self {
        Self {
            kind: EventKind::Exec,
            order_id: order.id,
            related_id: maker_id,
            symbol_id: order.symbol_id,
            side: order.side,
            price_cents,
            qty,
            remaining,
            liquidity: Liquidity::Taker,
        }
    }

    #[inline]
    pub(crate) fn reject(order: &Order) -> Self {
        Self {
            kind: EventKind::Reject,
            order_id: order.id,
            related_id: order.target_id,
            symbol_id: order.symbol_id,
            side: order.side,
            price_cents: order.price_cents,
            qty: order.qty,
            remaining: order.qty,
            liquidity: Liquidity::None,
        }
    }

    #[inline]
    pub(crate) fn ack(kind: EventKind, order: &Order, price_cents: i64, qty: u32) -> Self {
        Self {
            kind,
            order_id: order.id,
            related_id: order.target_id,
            symbol_id: order.symbol_id,
            side: order.side,
            price_cents,
            qty,
            remaining: 0,
            liquidity: Liquidity::None,
        }
    }
}
