//! Block-Offset Table Benchmarks
//!
//! Recording blocks of increasing span and looking up block starts.
//! Run with: `cargo bench --package gcmeta`

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use gcmeta::{BlockOffsetTable, ContiguousSpace, MemRegion};

const HEAP_BASE: usize = 0x10_0000_0000;
const CARD_SIZE: usize = 512;
const HEAP_WORDS: usize = 16 * 1024 * 1024;

fn create_table() -> BlockOffsetTable {
    BlockOffsetTable::new(MemRegion::new(HEAP_BASE, HEAP_WORDS), HEAP_WORDS, CARD_SIZE).unwrap()
}

fn bench_update_for_block(c: &mut Criterion) {
    let mut group = c.benchmark_group("update_for_block");
    let bot = create_table();

    let spans = [1usize, 16, 256, 4096, 65536];
    for &cards in &spans {
        group.throughput(Throughput::Elements(cards as u64));
        group.bench_function(format!("cards_{}", cards), |b| {
            let start = HEAP_BASE + 24;
            let end = start + cards * CARD_SIZE;
            b.iter(|| bot.update_for_block(black_box(start), black_box(end)))
        });
    }

    group.finish();
}

fn bench_block_start_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("block_start_lookup");

    // One huge block: the worst case for back-skipping.
    let bot = create_table();
    let cards = HEAP_WORDS * 8 / CARD_SIZE;
    bot.update_for_block(HEAP_BASE + 8, HEAP_BASE + (cards - 1) * CARD_SIZE);

    group.bench_function("huge_block_last_card", |b| {
        let addr = HEAP_BASE + (cards - 2) * CARD_SIZE;
        b.iter(|| black_box(bot.block_start_reaching_into_card(black_box(addr))))
    });

    group.bench_function("huge_block_scan", |b| {
        b.iter(|| {
            let mut addr = HEAP_BASE + CARD_SIZE;
            for _ in 0..1000 {
                black_box(bot.block_start_reaching_into_card(addr));
                addr += 997 * CARD_SIZE;
            }
        })
    });

    group.finish();
}

fn bench_space_block_start(c: &mut Criterion) {
    let mut group = c.benchmark_group("space_block_start");

    // Uniform small objects: lookups walk forward from the card's block.
    let words = 1024 * 1024;
    let space = ContiguousSpace::new(MemRegion::new(HEAP_BASE, words), words, CARD_SIZE).unwrap();
    while space.allocate(13).is_some() {}
    let sizer = |_addr: usize| 13usize;

    group.bench_function("uniform_13_words", |b| {
        let mut addr = HEAP_BASE;
        b.iter(|| {
            addr = HEAP_BASE + (addr - HEAP_BASE + 4104) % (words * 8 - 8);
            black_box(space.block_start(black_box(addr), &sizer))
        })
    });

    group.finish();
}

fn bench_allocate(c: &mut Criterion) {
    let mut group = c.benchmark_group("space_allocate");

    for &size in &[4usize, 64, 1024] {
        group.throughput(Throughput::Bytes((size * 8) as u64));
        group.bench_function(format!("words_{}", size), |b| {
            let words = 4 * 1024 * 1024;
            let mut space =
                ContiguousSpace::new(MemRegion::new(HEAP_BASE, words), words, CARD_SIZE).unwrap();
            b.iter(|| {
                if space.allocate(size).is_none() {
                    space.clear();
                }
            })
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_update_for_block,
    bench_block_start_lookup,
    bench_space_block_start,
    bench_allocate
);
criterion_main!(benches);
