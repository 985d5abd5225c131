//! Block-Offset Table Tests
//!
//! - lookups land on the right block for random layouts and every card size
//! - lookup cost is bounded independently of block and heap size
//! - resizing is idempotent and never loses committed entries
//! - disjoint blocks may be recorded from many threads at once

mod common;

use common::{bot_over, lookup_reads, random_space, BlockLayout, CARD_SIZE, HEAP_BASE};
use gcmeta::card::constants::{BASE, N_POWERS};
use gcmeta::{BlockOffsetTable, ContiguousSpace, MemRegion};
use std::sync::{Arc, Barrier};
use std::thread;

/// ============================================================================
/// ROUND TRIP
/// ============================================================================

#[test]
fn test_every_word_of_every_block_finds_its_start() {
    let (space, layout) = random_space(96 * 1024, CARD_SIZE, 0xB07);
    let sizer = |addr: usize| layout.size_at(addr);

    for (&start, &words) in &layout.blocks {
        for w in 0..words {
            let addr = start + w * 8;
            assert_eq!(
                space.block_start(addr, &sizer),
                start,
                "wrong block for {:#x}",
                addr
            );
        }
    }
}

#[test]
fn test_table_answer_is_at_or_before_card() {
    let (space, layout) = random_space(64 * 1024, CARD_SIZE, 7);
    let bot = space.offset_table();

    let mut card = HEAP_BASE;
    while card < space.top() {
        let found = bot.block_start_reaching_into_card(card);
        assert!(found <= card);
        assert_eq!(
            Some(found),
            layout.containing(card),
            "card {:#x} resolves to a block that does not cover it",
            card
        );
        card += CARD_SIZE;
    }
}

#[test]
fn test_round_trip_for_all_card_sizes() {
    for (seed, card_size) in [128usize, 256, 512, 1024].into_iter().enumerate() {
        let (space, layout) = random_space(32 * 1024, card_size, seed as u64);
        let sizer = |addr: usize| layout.size_at(addr);

        for (&start, &words) in &layout.blocks {
            let last = start + (words - 1) * 8;
            assert_eq!(space.block_start(last, &sizer), start, "card size {}", card_size);
        }
    }
}

/// ============================================================================
/// BOUNDED LOOKUP
/// ============================================================================

#[test]
fn test_lookup_cost_does_not_grow_with_block_size() {
    let bound = (BASE - 1) * N_POWERS + 1;

    for cards in [1usize, 15, 16, 255, 256, 4095, 4096, 70_000] {
        let words = cards * 64 + 64;
        let bot = bot_over(words);
        let start = HEAP_BASE + 24;
        let end = start + cards * CARD_SIZE;
        bot.update_for_block(start, end);

        let mut worst = 0;
        let mut card = HEAP_BASE + CARD_SIZE;
        while card < end {
            assert_eq!(bot.block_start_reaching_into_card(card), start);
            worst = worst.max(lookup_reads(&bot, card));
            card += CARD_SIZE;
        }
        assert!(
            worst <= bound,
            "{} cards needed {} reads, bound {}",
            cards,
            worst,
            bound
        );
    }
}

#[test]
fn test_back_skip_codes_are_monotonic() {
    let cards = 5000;
    let bot = bot_over(cards * 64 + 64);
    bot.update_for_block(HEAP_BASE, HEAP_BASE + cards * CARD_SIZE);

    let mut prev = bot.entry_value(HEAP_BASE + CARD_SIZE);
    for i in 2..cards {
        let entry = bot.entry_value(HEAP_BASE + i * CARD_SIZE);
        assert!(entry >= prev, "code decreased at card {}", i);
        prev = entry;
    }
    bot.verify_for_block(HEAP_BASE, HEAP_BASE + cards * CARD_SIZE);
}

/// ============================================================================
/// RESIZE
/// ============================================================================

#[test]
fn test_resize_is_idempotent() {
    let words = 8 * 1024 * 1024;
    let mut bot = BlockOffsetTable::new(MemRegion::new(HEAP_BASE, words), words / 8, CARD_SIZE)
        .expect("table creation should succeed");

    bot.resize(words / 2).unwrap();
    let committed = bot.committed_size();
    bot.resize(words / 2).unwrap();
    assert_eq!(bot.committed_size(), committed);

    bot.resize(words / 8).unwrap();
    bot.resize(words / 2).unwrap();
    assert_eq!(bot.committed_size(), committed);
}

#[test]
fn test_entries_survive_growth() {
    let words = 1024 * 1024;
    let mut bot = BlockOffsetTable::new(MemRegion::new(HEAP_BASE, words), 4096, CARD_SIZE)
        .expect("table creation should succeed");

    let start = HEAP_BASE + 40;
    bot.update_for_block(start, start + 20 * CARD_SIZE);
    bot.resize(words).unwrap();

    assert_eq!(bot.block_start_reaching_into_card(start + 19 * CARD_SIZE), start);
    assert!(bot.committed_size() <= bot.reserved_size());
}

/// ============================================================================
/// CONCURRENCY
/// ============================================================================

#[test]
fn test_concurrent_disjoint_updates() {
    let thread_count = 8;
    let blocks_per_thread = 200;
    let block_words = 200;

    let total_words = thread_count * blocks_per_thread * block_words;
    let bot = Arc::new(bot_over(total_words));
    let barrier = Arc::new(Barrier::new(thread_count));

    let mut handles = Vec::new();
    for t in 0..thread_count {
        let bot = Arc::clone(&bot);
        let barrier = Arc::clone(&barrier);
        handles.push(thread::spawn(move || {
            barrier.wait();
            // Interleave ownership so neighbouring blocks belong to
            // different threads.
            for i in 0..blocks_per_thread {
                let index = i * thread_count + t;
                let start = HEAP_BASE + index * block_words * 8;
                bot.update_for_block(start, start + block_words * 8);
            }
        }));
    }
    for handle in handles {
        handle.join().expect("writer should not panic");
    }

    let mut layout = BlockLayout::default();
    for index in 0..thread_count * blocks_per_thread {
        layout.record(HEAP_BASE + index * block_words * 8, block_words);
    }

    let mut card = HEAP_BASE;
    while card < HEAP_BASE + total_words * 8 {
        let found = bot.block_start_reaching_into_card(card);
        assert_eq!(Some(found), layout.containing(card), "card {:#x}", card);
        card += CARD_SIZE;
    }
}

#[test]
fn test_concurrent_allocation_keeps_table_consistent() {
    let words = 512 * 1024;
    let space = Arc::new(
        ContiguousSpace::new(MemRegion::new(HEAP_BASE, words), words, CARD_SIZE)
            .expect("space creation should succeed"),
    );
    let barrier = Arc::new(Barrier::new(4));

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let space = Arc::clone(&space);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let size = 37 + t * 50;
                let mut mine = Vec::new();
                while let Some(addr) = space.allocate(size) {
                    mine.push((addr, size));
                }
                mine
            })
        })
        .collect();

    let mut layout = BlockLayout::default();
    for handle in handles {
        for (addr, size) in handle.join().expect("allocator should not panic") {
            layout.record(addr, size);
        }
    }

    let sizer = |addr: usize| layout.size_at(addr);
    for (&start, &words) in &layout.blocks {
        assert_eq!(space.block_start(start + (words - 1) * 8, &sizer), start);
    }
}
