//! Historical-feed replay into the engine.
//!
//! A [`FeedSource`] yields normalized [`FeedEvent`]s; the
//! [`ReplayDriver`] paces them against their exchange timestamps,
//! mirrors them into the engine as orders, surfaces them to the
//! strategy, and polls the shard trade rings for fills.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use rustc_hash::FxHashMap;
use thiserror::Error;
use tracing::{info, warn};

use crate::engine::MatchingEngine;
use crate::gateway::{
    IngressGateway, MarketEventKind, Strategy, StrategyContext, StrategyMarketEvent,
};
use crate::ingress::IngressCoordinator;
use crate::order::{Order, Side, Trade};
use crate::ring::Reader;

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("failed to open feed {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// What a feed record did at the venue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FeedAction {
    Add,
    Cancel,
    Replace,
    Execute,
    Delete,
    Unknown,
}

/// One normalized historical-feed record.
#[derive(Clone, Debug)]
pub struct FeedEvent {
    pub symbol: String,
    pub ts_event_ns: u64,
    pub action: FeedAction,
    pub order_id: u64,
    pub side: Option<Side>,
    pub price_cents: i64,
    pub qty: u32,
    pub new_price_cents: i64,
    pub new_qty: u32,
    /// For Execute: true when the record is the aggressing side
    pub exec_is_aggressor: bool,
}

/// Minimal interface for a historical (or live) feed.
pub trait FeedSource {
    fn open(&mut self, path: &Path) -> Result<(), ReplayError>;
    /// `None` at end of stream.
    fn next_event(&mut self) -> Option<FeedEvent>;
    fn close(&mut self);
}

// ============================================================================
// Text feed source
// ============================================================================

/// Line-oriented feed file reader.
///
/// Format, one record per line, `#` starts a comment:
///
/// ```text
/// symbol,ts_event_ns,action,order_id,side,price_cents,qty,new_price_cents,new_qty,aggressor
/// ```
///
/// `action` is one of A/C/R/E/D; `side` is B, S or empty; `aggressor`
/// is 0/1. Malformed lines are skipped and counted.
#[derive(Default)]
pub struct TextFeedSource {
    lines: Option<Lines<BufReader<File>>>,
    skipped: u64,
}

impl TextFeedSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines dropped because they did not parse.
    pub fn skipped_lines(&self) -> u64 {
        self.skipped
    }

    fn parse_line(line: &str) -> Option<FeedEvent> {
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        if fields.len() != 10 {
            return None;
        }
        let action = match fields[2] {
            "A" => FeedAction::Add,
            "C" => FeedAction::Cancel,
            "R" => FeedAction::Replace,
            "E" => FeedAction::Execute,
            "D" => FeedAction::Delete,
            _ => FeedAction::Unknown,
        };
        let side = match fields[4] {
            "B" => Some(Side::Buy),
            "S" => Some(Side::Sell),
            "" => None,
            _ => return None,
        };
        Some(FeedEvent {
            symbol: fields[0].to_string(),
            ts_event_ns: fields[1].parse().ok()?,
            action,
            order_id: fields[3].parse().ok()?,
            side,
            price_cents: fields[5].parse().ok()?,
            qty: fields[6].parse().ok()?,
            new_price_cents: fields[7].parse().ok()?,
            new_qty: fields[8].parse().ok()?,
            exec_is_aggressor: fields[9] == "1",
        })
    }
}

impl FeedSource for TextFeedSource {
    fn open(&mut self, path: &Path) -> Result<(), ReplayError> {
        self.close();
        let file = File::open(path).map_err(|source| ReplayError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        self.lines = Some(BufReader::new(file).lines());
        Ok(())
    }

    fn next_event(&mut self) -> Option<FeedEvent> {
        let lines = self.lines.as_mut()?;
        loop {
            let line = match lines.next()? {
                Ok(line) => line,
                Err(err) => {
                    warn!(%err, "feed read error, stopping");
                    return None;
                }
            };
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            match Self::parse_line(trimmed) {
                Some(event) => return Some(event),
                None => {
                    self.skipped += 1;
                    warn!(line = trimmed, "skipping malformed feed line");
                }
            }
        }
    }

    fn close(&mut self) {
        self.lines = None;
    }
}

// ============================================================================
// Replay driver
// ============================================================================

/// Knobs for one replay run.
#[derive(Clone, Debug)]
pub struct ReplayOptions {
    /// Pacing multiplier against ts_event deltas; 0 disables pacing
    pub speed: f64,
    /// Skip events before this exchange timestamp (0 = from the start)
    pub start_ns: u64,
    /// Stop at events after this exchange timestamp (0 = to the end)
    pub end_ns: u64,
    /// Replay only this symbol, if set
    pub symbol: Option<String>,
    /// Turn feed Execute actions into aggressing market IOC orders
    /// instead of only surfacing them to the strategy
    pub synthesize_executes: bool,
}

impl Default for ReplayOptions {
    fn default() -> Self {
        Self {
            speed: 1.0,
            start_ns: 0,
            end_ns: 0,
            symbol: None,
            synthesize_executes: false,
        }
    }
}

/// Counters reported at the end of a run.
#[derive(Clone, Copy, Debug, Default)]
pub struct ReplayStats {
    pub feed_events: u64,
    pub orders_submitted: u64,
    pub fills_delivered: u64,
}

/// Drives a feed through the ingress into the engine, pacing by
/// exchange timestamps and delivering market events and fills to the
/// strategy on the caller's (decoder) thread.
pub struct ReplayDriver<'a> {
    engine: &'a MatchingEngine,
    ingress: &'a IngressCoordinator,
}

impl<'a> ReplayDriver<'a> {
    pub fn new(engine: &'a MatchingEngine, ingress: &'a IngressCoordinator) -> Self {
        Self { engine, ingress }
    }

    pub fn run(
        &mut self,
        source: &mut dyn FeedSource,
        strategy: &mut dyn Strategy,
        options: &ReplayOptions,
    ) -> ReplayStats {
        let mut gateway = IngressGateway::new(self.ingress);
        strategy.initialize(&StrategyContext {
            speed: options.speed,
        });

        let mut stats = ReplayStats::default();
        let mut symbol_ids: FxHashMap<String, u32> = FxHashMap::default();
        let mut trade_readers: Vec<Reader<Trade>> = (0..self.engine.shard_count())
            .map(|s| self.engine.trade_reader_for_shard(s))
            .collect();

        let mut pacer: Option<(u64, Instant)> = None;

        while let Some(event) = source.next_event() {
            if options.start_ns != 0 && event.ts_event_ns < options.start_ns {
                continue;
            }
            if options.end_ns != 0 && event.ts_event_ns > options.end_ns {
                break;
            }
            if let Some(only) = &options.symbol {
                if &event.symbol != only {
                    continue;
                }
            }
            stats.feed_events += 1;

            // Reproduce the historical cadence, scaled by speed
            match pacer {
                None => pacer = Some((event.ts_event_ns, Instant::now())),
                Some((first_ts, wall_start)) if options.speed > 0.0 => {
                    let delta_ns = event.ts_event_ns.saturating_sub(first_ts);
                    let target = Duration::from_nanos((delta_ns as f64 / options.speed) as u64);
                    let elapsed = wall_start.elapsed();
                    if elapsed < target {
                        std::thread::sleep(target - elapsed);
                    }
                }
                Some(_) => {}
            }

            let symbol_id = match symbol_ids.get(&event.symbol) {
                Some(&id) => id,
                None => {
                    let id = symbol_ids.len() as u32;
                    symbol_ids.insert(event.symbol.clone(), id);
                    id
                }
            };

            // Mirror the event into the engine as a background book op
            let side = event.side.unwrap_or(Side::Buy);
            match event.action {
                FeedAction::Add => {
                    self.ingress.submit_from_decoder(Order::limit(
                        event.order_id,
                        symbol_id,
                        side,
                        event.price_cents,
                        event.qty,
                    ));
                    stats.orders_submitted += 1;
                }
                FeedAction::Cancel | FeedAction::Delete => {
                    self.ingress.submit_from_decoder(Order::cancel(
                        event.order_id,
                        symbol_id,
                        event.order_id,
                    ));
                    stats.orders_submitted += 1;
                }
                FeedAction::Replace => {
                    self.ingress.submit_from_decoder(Order::replace(
                        event.order_id,
                        symbol_id,
                        event.order_id,
                        event.new_price_cents,
                        event.new_qty,
                    ));
                    stats.orders_submitted += 1;
                }
                FeedAction::Execute if options.synthesize_executes => {
                    self.ingress.submit_from_decoder(Order::market(
                        event.order_id,
                        symbol_id,
                        side,
                        event.qty,
                    ));
                    stats.orders_submitted += 1;
                }
                FeedAction::Execute | FeedAction::Unknown => {}
            }

            let kind = match event.action {
                FeedAction::Add => MarketEventKind::Add,
                FeedAction::Cancel | FeedAction::Delete => MarketEventKind::Cancel,
                FeedAction::Replace => MarketEventKind::Replace,
                FeedAction::Execute => MarketEventKind::Execute,
                FeedAction::Unknown => continue,
            };
            strategy.on_market_event(
                &StrategyMarketEvent {
                    kind,
                    symbol_id,
                    ts_event_ns: event.ts_event_ns,
                    order_id: event.order_id,
                    side,
                    price_cents: event.price_cents,
                    qty: event.qty,
                },
                &mut gateway,
            );

            stats.fills_delivered += drain_fills(&mut trade_readers, strategy, &mut gateway);
        }

        // The feed is done; every decoder submission must reach a shard
        // before the final fill sweep
        while self.engine.processed_count() < self.ingress.submitted_count() {
            if !self.engine.is_running() {
                break;
            }
            std::hint::spin_loop();
        }
        stats.fills_delivered += drain_fills(&mut trade_readers, strategy, &mut gateway);

        strategy.on_end();
        info!(
            feed_events = stats.feed_events,
            orders = stats.orders_submitted,
            fills = stats.fills_delivered,
            symbols = symbol_ids.len(),
            "replay finished"
        );
        stats
    }
}

fn drain_fills(
    readers: &mut [Reader<Trade>],
    strategy: &mut dyn Strategy,
    gateway: &mut IngressGateway<'_>,
) -> u64 {
    let mut delivered = 0;
    for reader in readers {
        while let Some(trade) = reader.try_dequeue() {
            strategy.on_fill(&trade, gateway);
            delivered += 1;
        }
    }
    delivered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineConfig, MatchingEngine};
    use crate::gateway::OrderGateway;
    use std::io::Write;
    use std::sync::Arc;

    fn write_feed(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("shardbook-{}-{}", std::process::id(), name));
        let mut file = File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_text_source_parses_and_skips() {
        let path = write_feed(
            "parse.csv",
            "# comment line\n\
             AAPL,1000,A,1,B,10000,5,0,0,0\n\
             not,a,valid,line\n\
             AAPL,2000,E,1,S,10000,2,0,0,1\n\
             AAPL,3000,R,1,,0,0,10100,3,0\n",
        );
        let mut source = TextFeedSource::new();
        source.open(&path).unwrap();

        let first = source.next_event().unwrap();
        assert_eq!(first.action, FeedAction::Add);
        assert_eq!(first.symbol, "AAPL");
        assert_eq!(first.side, Some(Side::Buy));
        assert_eq!(first.price_cents, 10_000);

        let second = source.next_event().unwrap();
        assert_eq!(second.action, FeedAction::Execute);
        assert!(second.exec_is_aggressor);

        let third = source.next_event().unwrap();
        assert_eq!(third.action, FeedAction::Replace);
        assert_eq!(third.side, None);
        assert_eq!(third.new_price_cents, 10_100);
        assert_eq!(third.new_qty, 3);

        assert!(source.next_event().is_none());
        assert_eq!(source.skipped_lines(), 1);
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_open_missing_file() {
        let mut source = TextFeedSource::new();
        let err = source.open(Path::new("/nonexistent/feed.csv")).unwrap_err();
        assert!(matches!(err, ReplayError::Open { .. }));
    }

    /// In-memory source for driver tests.
    struct VecFeedSource(Vec<FeedEvent>);

    impl FeedSource for VecFeedSource {
        fn open(&mut self, _path: &Path) -> Result<(), ReplayError> {
            Ok(())
        }
        fn next_event(&mut self) -> Option<FeedEvent> {
            if self.0.is_empty() {
                None
            } else {
                Some(self.0.remove(0))
            }
        }
        fn close(&mut self) {}
    }

    fn feed_event(ts: u64, action: FeedAction, order_id: u64, side: Side, price: i64, qty: u32) -> FeedEvent {
        FeedEvent {
            symbol: "TEST".to_string(),
            ts_event_ns: ts,
            action,
            order_id,
            side: Some(side),
            price_cents: price,
            qty,
            new_price_cents: 0,
            new_qty: 0,
            exec_is_aggressor: action == FeedAction::Execute,
        }
    }

    #[derive(Default)]
    struct CountingStrategy {
        events: u64,
        fills: u64,
        ended: bool,
    }

    impl Strategy for CountingStrategy {
        fn on_market_event(&mut self, _ev: &StrategyMarketEvent, _gw: &mut dyn OrderGateway) {
            self.events += 1;
        }
        fn on_fill(&mut self, _trade: &Trade, _gw: &mut dyn OrderGateway) {
            self.fills += 1;
        }
        fn on_end(&mut self) {
            self.ended = true;
        }
    }

    #[test]
    fn test_driver_builds_book_and_delivers_fills() {
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

        let mut source = VecFeedSource(vec![
            feed_event(1_000, FeedAction::Add, 1, Side::Sell, 10_000, 5),
            feed_event(2_000, FeedAction::Add, 2, Side::Buy, 10_000, 3),
            feed_event(3_000, FeedAction::Cancel, 1, Side::Sell, 0, 0),
        ]);
        let mut strategy = CountingStrategy::default();
        let options = ReplayOptions {
            speed: 0.0, // flat out
            ..ReplayOptions::default()
        };

        let stats =
            ReplayDriver::new(&engine, &ingress).run(&mut source, &mut strategy, &options);

        assert_eq!(stats.feed_events, 3);
        assert_eq!(stats.orders_submitted, 3);
        assert_eq!(stats.fills_delivered, 1); // ask 5 crossed by bid 3
        assert_eq!(strategy.events, 3);
        assert_eq!(strategy.fills, 1);
        assert!(strategy.ended);

        ingress.stop();
        engine.shutdown();
    }

    #[test]
    fn test_driver_time_window_and_symbol_filter() {
        let engine = Arc::new(
            MatchingEngine::new(EngineConfig {
                num_shards: 1,
                ring_capacity: 256,
                ..EngineConfig::default()
            })
            .unwrap(),
        );
        engine.start();
        let ingress = IngressCoordinator::new(Arc::clone(&engine), 1, 64).unwrap();
        ingress.start();

        let mut other = feed_event(1_500, FeedAction::Add, 9, Side::Buy, 9_000, 1);
        other.symbol = "OTHER".to_string();
        let mut source = VecFeedSource(vec![
            feed_event(1_000, FeedAction::Add, 1, Side::Buy, 9_000, 1), // before window
            other,                                                      // wrong symbol
            feed_event(2_000, FeedAction::Add, 2, Side::Buy, 9_000, 1),
            feed_event(5_000, FeedAction::Add, 3, Side::Buy, 9_000, 1), // after window
        ]);
        let mut strategy = CountingStrategy::default();
        let options = ReplayOptions {
            speed: 0.0,
            start_ns: 1_200,
            end_ns: 4_000,
            symbol: Some("TEST".to_string()),
            ..ReplayOptions::default()
        };

        let stats =
            ReplayDriver::new(&engine, &ingress).run(&mut source, &mut strategy, &options);
        assert_eq!(stats.feed_events, 1);
        assert_eq!(strategy.events, 1);

        ingress.stop();
        engine.shutdown();
    }
}
