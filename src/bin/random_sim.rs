//! Random order-flow simulator.
//!
//! Drives the full pipeline (decoder thread -> ingress -> shards ->
//! consumers) with a seeded stream of limit orders at a target rate,
//! then reports the engine counters and throughput.

use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

use shardbook::{EngineConfig, IngressCoordinator, MatchingEngine, Order, Side};

#[derive(Parser)]
#[command(name = "random_sim")]
#[command(about = "Random order-flow simulator for the sharded matching engine")]
struct Args {
    /// Number of matching shards
    num_shards: usize,
    /// Shard ring capacity (power of two)
    ring_size: usize,
    /// Number of ingress producer threads
    num_producers: usize,
    /// Producer mailbox capacity (power of two)
    mailbox_size: usize,
    /// Number of distinct symbols to generate
    num_symbols: u32,
    /// Target order rate per second (0 = unpaced)
    rate_per_sec: u64,
    /// Run duration in seconds
    duration_sec: u64,
    /// RNG seed
    seed: Option<u64>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    if args.num_shards == 0
        || args.num_symbols == 0
        || !args.ring_size.is_power_of_two()
        || !args.mailbox_size.is_power_of_two()
    {
        eprintln!(
            "Usage: random_sim <num_shards> <ring_size> <num_producers> <mailbox_size> \
             <num_symbols> <rate_per_sec> <duration_sec> [seed]"
        );
        eprintln!("ring_size and mailbox_size must be powers of two; counts must be non-zero");
        return ExitCode::from(2);
    }

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err}");
            ExitCode::from(1)
        }
    }
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let engine = Arc::new(MatchingEngine::new(EngineConfig {
        num_shards: args.num_shards,
        ring_capacity: args.ring_size,
        ..EngineConfig::default()
    })?);
    engine.start();

    let ingress = IngressCoordinator::new(Arc::clone(&engine), args.num_producers, args.mailbox_size)?;
    ingress.start();

    // One consumer per shard per stream keeps the outbound rings drained
    let consumers_running = Arc::new(AtomicBool::new(true));
    let trades_seen = Arc::new(AtomicU64::new(0));
    let mut consumers = Vec::with_capacity(args.num_shards * 2);
    for shard in 0..args.num_shards {
        let mut trades = engine.trade_reader_for_shard(shard);
        let running = Arc::clone(&consumers_running);
        let seen = Arc::clone(&trades_seen);
        consumers.push(std::thread::spawn(move || {
            while running.load(Ordering::Acquire) {
                if trades.try_dequeue().is_some() {
                    seen.fetch_add(1, Ordering::Relaxed);
                } else {
                    std::hint::spin_loop();
                }
            }
            while trades.try_dequeue().is_some() {
                seen.fetch_add(1, Ordering::Relaxed);
            }
        }));

        let mut events = engine.event_reader_for_shard(shard);
        let running = Arc::clone(&consumers_running);
        consumers.push(std::thread::spawn(move || {
            while running.load(Ordering::Acquire) {
                if events.try_dequeue().is_none() {
                    std::hint::spin_loop();
                }
            }
            while events.try_dequeue().is_some() {}
        }));
    }

    // Decoder loop: seeded random limit orders, paced to the target rate
    let seed = args.seed.unwrap_or(123_456_789);
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let base_cents: Vec<i64> = (0..args.num_symbols)
        .map(|i| 5_000 + ((i % 100) as i64) * 10)
        .collect();

    let start = Instant::now();
    let end = start + Duration::from_secs(args.duration_sec);
    let nanos_per_order = if args.rate_per_sec > 0 {
        1_000_000_000 / args.rate_per_sec
    } else {
        0
    };
    let mut order_seq: u64 = 1;

    while Instant::now() < end {
        let loop_start = Instant::now();

        let symbol_id = rng.gen_range(0..args.num_symbols);
        let side = if rng.gen_bool(0.5) { Side::Buy } else { Side::Sell };
        let jitter: i64 = rng.gen_range(-50..=50);
        let order = Order::limit(
            order_seq,
            symbol_id,
            side,
            base_cents[symbol_id as usize] + jitter,
            rng.gen_range(1..=100),
        );
        order_seq += 1;
        ingress.submit_from_decoder(order);

        if nanos_per_order > 0 {
            let elapsed = loop_start.elapsed();
            let target = Duration::from_nanos(nanos_per_order);
            if elapsed < target {
                std::thread::sleep(target - elapsed);
            }
        }
    }
    let gen_end = Instant::now();
    let generated = order_seq - 1;

    // Everything submitted must be processed before teardown
    while engine.processed_count() < generated {
        std::hint::spin_loop();
    }
    let drained_end = Instant::now();

    ingress.stop();
    consumers_running.store(false, Ordering::Release);
    for handle in consumers {
        let _ = handle.join();
    }
    engine.shutdown();

    let gen_ms = gen_end.duration_since(start).as_millis();
    let drain_ms = drained_end.duration_since(gen_end).as_millis();
    let total_ms = drained_end.duration_since(start).as_millis();

    println!("Produced:  {generated}");
    println!("Enqueued:  {}", engine.enqueued_count());
    println!("Dropped:   {}", engine.dropped_count());
    println!("Processed: {}", engine.processed_count());
    println!("Trades:    {}", engine.trades_count());
    println!("Consumed:  {}", trades_seen.load(Ordering::Relaxed));
    println!("Overflow:  {} trades, {} events",
        engine.dropped_trades_count(),
        engine.dropped_events_count(),
    );
    println!("Gen ms:    {gen_ms}");
    println!("Drain ms:  {drain_ms}");
    println!("Total ms:  {total_ms}");
    if total_ms > 0 {
        let per_sec = generated as f64 / (total_ms as f64 / 1000.0);
        println!("Throughput: {} orders/s", per_sec as u64);
    }
    Ok(())
}
