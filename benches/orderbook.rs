//! Benchmarks for order book reconciliation.
//!
//! Run with: `cargo bench`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use depth_ladder::orderbook::{apply_update, BookUpdate, OrderBook};
use depth_ladder::types::BookMessage;

/// Full book with `size` levels per side around 10_000
fn full_book(size: usize) -> BookMessage {
    let bids: Vec<(String, String)> = (0..size)
        .map(|i| (format!("{}.5", 9_999 - i), format!("{}", 1 + i % 7)))
        .collect();
    let asks: Vec<(String, String)> = (0..size)
        .map(|i| (format!("{}.5", 10_000 + i), format!("{}", 1 + i % 5)))
        .collect();

    let as_refs = |pairs: &[(String, String)]| -> Vec<(&str, &str)> {
        pairs.iter().map(|(p, q)| (p.as_str(), q.as_str())).collect()
    };
    BookMessage::new("BENCH", 1)
        .with_bids(&as_refs(&bids))
        .with_asks(&as_refs(&asks))
}

fn bench_apply_delta(c: &mut Criterion) {
    let mut group = c.benchmark_group("apply_delta");

    for size in [10, 100, 1000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let mut book = BookUpdate::full_replace(full_book(size)).apply(OrderBook::new());

            // Simulate a typical delta: one size change, one level pulled and re-added
            let delta = BookMessage::new("BENCH", 2)
                .with_bids(&[("9999.5", "3"), ("9998.5", "0")])
                .with_asks(&[("10000.5", "2"), ("9998.5", "0")]);
            let restore = BookMessage::new("BENCH", 3).with_bids(&[("9998.5", "2")]);

            b.iter(|| {
                let taken = std::mem::take(&mut book);
                let next = apply_update(taken, black_box(&delta));
                book = apply_update(next, black_box(&restore));
            });
        });
    }

    group.finish();
}

fn bench_full_replace(c: &mut Criterion) {
    let mut group = c.benchmark_group("full_replace");

    for size in [10, 100, 1000].iter() {
        let message = full_book(*size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &message, |b, message| {
            b.iter(|| {
                black_box(BookUpdate::full_replace(message.clone()).apply(OrderBook::new()));
            });
        });
    }

    group.finish();
}

fn bench_top_of_book(c: &mut Criterion) {
    let book = BookUpdate::full_replace(full_book(100)).apply(OrderBook::new());

    c.bench_function("top_of_book", |b| {
        b.iter(|| {
            black_box(book.best_bid());
            black_box(book.best_ask());
            black_box(book.spread());
        });
    });
}

criterion_group!(benches, bench_apply_delta, bench_full_replace, bench_top_of_book);
criterion_main!(benches);
