//! Single-process micro-benchmarks for the shared hash map. It acquires
//! 1 M counters, then exercises sequential increments, random look-ups and
//! misses.

use rand::seq::SliceRandom;
use rand::{Rng, rng};
use shared_hash_map::{LongValue, SharedHashMap, SharedHashMapBuilder};
use std::time::Instant;
use tempfile::tempdir;

// ---------------------------------------------------------------------------
// Tunables
// ---------------------------------------------------------------------------

const NUM_ENTRIES: usize = 1_000_000;
const NUM_SEGMENTS: u32 = 128;
const ENTRY_SIZE: u32 = 24; // key bytes + 8-byte counter
const NUM_RANDOM_CHECKS: usize = 1_000_000;
const NUM_MISSES: usize = 1_000_000;

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

fn main() {
    let dir = tempdir().expect("Failed to create temp dir");
    let map = SharedHashMapBuilder::new()
        .entries(NUM_ENTRIES as u64)
        .segments(NUM_SEGMENTS)
        .entry_size(ENTRY_SIZE)
        .create::<LongValue>(&dir.path().join("bench.shm"))
        .expect("Failed to create map");

    println!("Running acquire benchmark…");
    benchmark_acquire_new(&map);
    benchmark_acquire_existing(&map);
    benchmark_random_gets(&map);
    benchmark_misses(&map);
    println!("✅ Benchmarks completed.");
}

fn key(i: usize) -> String {
    format!("user:{i}")
}

// ---------------------------------------------------------------------------
// 1 ─ Create 1 M counters in shuffled order
// ---------------------------------------------------------------------------

fn benchmark_acquire_new(map: &SharedHashMap<LongValue>) {
    let mut order: Vec<usize> = (0..NUM_ENTRIES).collect();
    order.shuffle(&mut rng());

    let mut value = LongValue::new();
    let start_time = Instant::now();

    for &i in &order {
        map.acquire_using(&key(i), &mut value)
            .expect("Failed to acquire entry")
            .set_value(i as i64);
    }

    let dt = start_time.elapsed();
    println!(
        "Created {NUM_ENTRIES} counters in {:#.3}s ({:#.3} acquires/s)",
        dt.as_secs_f64(),
        NUM_ENTRIES as f64 / dt.as_secs_f64()
    );
}

// ---------------------------------------------------------------------------
// 2 ─ Increment every existing counter
// ---------------------------------------------------------------------------

fn benchmark_acquire_existing(map: &SharedHashMap<LongValue>) {
    let mut value = LongValue::new();
    let start_time = Instant::now();

    for i in 0..NUM_ENTRIES {
        let value = map
            .acquire_using(&key(i), &mut value)
            .expect("Failed to acquire entry");
        assert_eq!(value.add_atomic_value(1), i as i64 + 1, "Corrupt counter {i}");
    }

    let dt = start_time.elapsed();
    println!(
        "Incremented {NUM_ENTRIES} counters in {:#.3}s ({:#.3} acquires/s)",
        dt.as_secs_f64(),
        NUM_ENTRIES as f64 / dt.as_secs_f64()
    );
}

// ---------------------------------------------------------------------------
// 3 ─ Random single-key look-ups
// ---------------------------------------------------------------------------

fn benchmark_random_gets(map: &SharedHashMap<LongValue>) {
    let mut rng = rng();
    let mut value = LongValue::new();
    let start_time = Instant::now();

    for _ in 0..NUM_RANDOM_CHECKS {
        let i = rng.random_range(0..NUM_ENTRIES);
        let value = map
            .get_using(&key(i), &mut value)
            .expect("Map is open")
            .expect("Missing entry in random read");
        assert_eq!(value.get_value(), i as i64 + 1, "Corrupt counter {i}");
    }

    let dt = start_time.elapsed();
    println!(
        "Randomly read {NUM_RANDOM_CHECKS} counters in {:#.3}s ({:#.3} reads/s)",
        dt.as_secs_f64(),
        NUM_RANDOM_CHECKS as f64 / dt.as_secs_f64()
    );
}

// ---------------------------------------------------------------------------
// 4 ─ Look-ups of absent keys
// ---------------------------------------------------------------------------

fn benchmark_misses(map: &SharedHashMap<LongValue>) {
    let mut value = LongValue::new();
    let start_time = Instant::now();

    for i in 0..NUM_MISSES {
        let found = map
            .get_using(&format!("miss:{i}"), &mut value)
            .expect("Map is open");
        assert!(found.is_none(), "Unexpected entry for miss:{i}");
    }

    let dt = start_time.elapsed();
    println!(
        "Missed {NUM_MISSES} keys in {:#.3}s ({:#.3} reads/s)",
        dt.as_secs_f64(),
        NUM_MISSES as f64 / dt.as_secs_f64()
    );
}
