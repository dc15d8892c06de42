//! Criterion benches for the ring hop and the matcher hot paths.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use shardbook::{Matcher, Order, Outputs, Ring, Side};

fn bench_ring(c: &mut Criterion) {
    let ring: Ring<Order> = Ring::with_capacity(1024).unwrap();
    let order = Order::limit(1, 0, Side::Buy, 10_000, 10);

    c.bench_function("ring_enqueue_dequeue", |b| {
        b.iter(|| {
            ring.try_enqueue(black_box(order)).unwrap();
            black_box(ring.try_dequeue().unwrap());
        })
    });
}

fn bench_place_no_match(c: &mut Criterion) {
    let mut matcher = Matcher::new();
    let mut out = Outputs::with_capacity(32);
    let mut id = 0u64;

    c.bench_function("place_resting_bid", |b| {
        b.iter(|| {
            id += 1;
            out.clear();
            let order = Order::limit(id, 0, Side::Buy, 9_000 + (id % 64) as i64, 10);
            matcher.process(black_box(&order), &mut out);
        })
    });
}

fn bench_place_and_cross(c: &mut Criterion) {
    let mut matcher = Matcher::new();
    let mut out = Outputs::with_capacity(32);
    let mut id = 0u64;

    c.bench_function("cross_single_level", |b| {
        b.iter(|| {
            out.clear();
            matcher.process(
                black_box(&Order::limit(id + 1, 0, Side::Sell, 10_000, 10)),
                &mut out,
            );
            out.clear();
            matcher.process(
                black_box(&Order::limit(id + 2, 0, Side::Buy, 10_000, 10)),
                &mut out,
            );
            id += 2;
        })
    });
}

fn bench_cancel(c: &mut Criterion) {
    let mut matcher = Matcher::new();
    let mut out = Outputs::with_capacity(32);
    let mut id = 0u64;

    c.bench_function("place_then_cancel", |b| {
        b.iter(|| {
            out.clear();
            matcher.process(
                black_box(&Order::limit(id + 1, 0, Side::Buy, 9_500, 10)),
                &mut out,
            );
            out.clear();
            matcher.process(black_box(&Order::cancel(id + 2, 0, id + 1)), &mut out);
            id += 2;
        })
    });
}

criterion_group!(
    benches,
    bench_ring,
    bench_place_no_match,
    bench_place_and_cross,
    bench_cancel
);
criterion_main!(benches);
