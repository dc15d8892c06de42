//! # Shardbook
//!
//! A sharded, lock-free limit order matching engine for simulation and
//! backtesting of high-frequency trading strategies.
//!
//! ## Design Principles
//!
//! - **Single-Writer Shards**: each shard's books belong to exactly one
//!   worker thread (no locks on the hot path)
//! - **SPSC Everywhere**: every cross-thread hop is a bounded
//!   single-producer/single-consumer ring with acquire/release counters
//! - **Stable Routing**: `shard = symbol_id % N`, `producer = shard % K`,
//!   a partition that keeps every ring single-writer
//! - **Exact Integers**: prices in signed cents, quantities in lots
//!
//! ## Architecture
//!
//! ```text
//! [Decoder] -> [Mailbox p] -> [Producer p] -> [Shard inbox s] -> [Worker s]
//!                                                                    |
//!                                                   [Trade ring s] [Event ring s]
//! ```

pub mod affinity;
pub mod arena;
pub mod book;
pub mod engine;
pub mod gateway;
pub mod ingress;
pub mod level;
pub mod matcher;
pub mod order;
pub mod replay;
pub mod ring;
pub mod shard;

// Re-exports for convenience
pub use book::{OrderBook, RestingOrder, TopOfBook};
pub use engine::{EngineConfig, EngineError, MatchingEngine};
pub use gateway::{
    IngressGateway, MarketEventKind, OrderGateway, Strategy, StrategyContext,
    StrategyMarketEvent, STRATEGY_ID_BASE,
};
pub use ingress::IngressCoordinator;
pub use matcher::{MarketCaps, Matcher, Outputs};
pub use order::{
    Event, EventKind, Liquidity, Op, Order, OrderType, Side, Tif, Trade, TradingStatus,
};
pub use replay::{
    FeedAction, FeedEvent, FeedSource, ReplayDriver, ReplayError, ReplayOptions, ReplayStats,
    TextFeedSource,
};
pub use ring::{Reader, Ring, RingError, Writer};
