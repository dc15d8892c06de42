//! Single-shard matcher latency report.
//!
//! Measures `Matcher::process` in isolation (no rings, no threads)
//! and prints an hdrhistogram percentile breakdown.

use hdrhistogram::Histogram;
use std::time::Instant;

use shardbook::{Matcher, Order, Outputs, Side};

const WARMUP: usize = 10_000;
const ITERATIONS: u64 = 1_000_000;
const BUFFER_SIZE: u64 = 10_000;

fn main() {
    println!("Preparing latency run...");

    let mut matcher = Matcher::new();
    let mut out = Outputs::with_capacity(32);

    // Pre-generate a ring of orders so RNG and allocation stay out of
    // the measured section
    let orders: Vec<Order> = (0..BUFFER_SIZE)
        .map(|i| {
            let side = if i % 2 == 0 { Side::Buy } else { Side::Sell };
            Order::limit(i + 1, 0, side, 10_000 + (i as i64 % 100), 10)
        })
        .collect();

    println!("Warming up ({WARMUP} ops)...");
    for (i, order) in orders.iter().cycle().take(WARMUP).enumerate() {
        let mut warm = *order;
        warm.id = 1_000_000_000 + i as u64;
        out.clear();
        std::hint::black_box(matcher.process(&warm, &mut out));
    }

    println!("Running {ITERATIONS} iterations...");
    let mut histogram = Histogram::<u64>::new_with_bounds(1, 100_000, 3).expect("histogram bounds");
    let mut total = std::time::Duration::ZERO;
    const ID_BASE: u64 = 2_000_000_000;

    for (i, order) in orders.iter().cycle().take(ITERATIONS as usize).enumerate() {
        let mut cmd = *order;
        cmd.id = ID_BASE + i as u64;
        out.clear();

        let start = Instant::now();
        std::hint::black_box(matcher.process(&cmd, &mut out));
        let elapsed = start.elapsed();

        histogram.record(elapsed.as_nanos() as u64).unwrap_or(());
        total += elapsed;
    }

    println!("\n=== Latency Report (ns) ===");
    println!("Total Ops:  {ITERATIONS}");
    println!(
        "Throughput: {:.2} ops/sec",
        ITERATIONS as f64 / total.as_secs_f64()
    );
    println!("---------------------------");
    println!("Min:    {:6} ns", histogram.min());
    println!("P50:    {:6} ns", histogram.value_at_quantile(0.50));
    println!("P90:    {:6} ns", histogram.value_at_quantile(0.90));
    println!("P99:    {:6} ns", histogram.value_at_quantile(0.99));
    println!("P99.9:  {:6} ns", histogram.value_at_quantile(0.999));
    println!("P99.99: {:6} ns", histogram.value_at_quantile(0.9999));
    println!("Max:    {:6} ns", histogram.max());
}
