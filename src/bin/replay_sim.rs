//! Historical-feed replay simulator.
//!
//! Replays a text feed file through the ingress into the engine and
//! runs a book-watching strategy over the normalized event stream.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::info;

use shardbook::{
    EngineConfig, IngressCoordinator, MatchingEngine, MarketEventKind, OrderGateway,
    ReplayDriver, ReplayOptions, Strategy, StrategyMarketEvent, TextFeedSource, Trade,
};
use shardbook::replay::FeedSource;

#[derive(Parser)]
#[command(name = "replay_sim")]
#[command(about = "Replay a historical feed file through the matching engine")]
struct Args {
    /// Path to the feed file
    feed: PathBuf,
    /// Replay speed multiplier (0 = flat out)
    #[arg(long, default_value_t = 1.0)]
    speed: f64,
    /// Replay only this symbol
    #[arg(long)]
    symbol: Option<String>,
    /// Skip events before this exchange timestamp (ns)
    #[arg(long, default_value_t = 0)]
    start_ns: u64,
    /// Stop at events after this exchange timestamp (ns)
    #[arg(long, default_value_t = 0)]
    end_ns: u64,
    /// Synthesize feed executes as aggressing market IOC orders
    #[arg(long)]
    synthesize_executes: bool,
    /// Number of matching shards
    #[arg(long, default_value_t = 4)]
    shards: usize,
    /// Shard ring capacity (power of two)
    #[arg(long, default_value_t = 4096)]
    ring_size: usize,
    /// Number of ingress producer threads
    #[arg(long, default_value_t = 2)]
    producers: usize,
    /// Producer mailbox capacity (power of two)
    #[arg(long, default_value_t = 4096)]
    mailbox_size: usize,
}

/// Tallies the replayed stream; a stand-in for user strategy code.
#[derive(Default)]
struct MarketWatch {
    adds: u64,
    cancels: u64,
    replaces: u64,
    executes: u64,
    fills: u64,
    filled_qty: u64,
}

impl Strategy for MarketWatch {
    fn on_market_event(&mut self, event: &StrategyMarketEvent, _gateway: &mut dyn OrderGateway) {
        match event.kind {
            MarketEventKind::Add => self.adds += 1,
            MarketEventKind::Cancel => self.cancels += 1,
            MarketEventKind::Replace => self.replaces += 1,
            MarketEventKind::Execute => self.executes += 1,
        }
    }

    fn on_fill(&mut self, trade: &Trade, _gateway: &mut dyn OrderGateway) {
        self.fills += 1;
        self.filled_qty += trade.qty as u64;
    }

    fn on_end(&mut self) {
        info!(
            adds = self.adds,
            cancels = self.cancels,
            replaces = self.replaces,
            executes = self.executes,
            fills = self.fills,
            filled_qty = self.filled_qty,
            "strategy summary"
        );
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    if !args.ring_size.is_power_of_two() || !args.mailbox_size.is_power_of_two() {
        eprintln!("ring-size and mailbox-size must be powers of two");
        return ExitCode::from(2);
    }

    let mut source = TextFeedSource::new();
    if let Err(err) = source.open(&args.feed) {
        eprintln!("Error: {err}");
        return ExitCode::from(3);
    }

    match run(&args, &mut source) {
        Ok(()) => {
            println!("Replay completed for: {}", args.feed.display());
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("Error: {err}");
            ExitCode::from(1)
        }
    }
}

fn run(args: &Args, source: &mut TextFeedSource) -> Result<(), Box<dyn std::error::Error>> {
    let engine = Arc::new(MatchingEngine::new(EngineConfig {
        num_shards: args.shards,
        ring_capacity: args.ring_size,
        ..EngineConfig::default()
    })?);
    engine.start();

    let ingress = IngressCoordinator::new(Arc::clone(&engine), args.producers, args.mailbox_size)?;
    ingress.start();

    let options = ReplayOptions {
        speed: args.speed,
        start_ns: args.start_ns,
        end_ns: args.end_ns,
        symbol: args.symbol.clone(),
        synthesize_executes: args.synthesize_executes,
    };
    let mut strategy = MarketWatch::default();
    let stats = ReplayDriver::new(&engine, &ingress).run(source, &mut strategy, &options);
    source.close();

    ingress.stop();
    engine.shutdown();

    println!("Feed events: {}", stats.feed_events);
    println!("Orders:      {}", stats.orders_submitted);
    println!("Fills:       {}", stats.fills_delivered);
    println!("Skipped:     {} lines", source.skipped_lines());
    Ok(())
}
