use shared_hash_map::{DoubleValue, LongValue, SharedHashMap, SharedHashMapBuilder};
use std::sync::{Arc, Barrier};
use std::thread;
use tempfile::tempdir;
use tokio::task;

fn create_shared_map(dir: &tempfile::TempDir, name: &str) -> Arc<SharedHashMap<LongValue>> {
    let map = SharedHashMapBuilder::new()
        .entries(10_000)
        .segments(16)
        .entry_size(32)
        .create::<LongValue>(&dir.path().join(name))
        .expect("Failed to create map");
    Arc::new(map)
}

#[test]
fn test_concurrent_acquire_of_new_key_creates_one_entry() {
    const THREADS: usize = 8;

    let dir = tempdir().expect("Failed to create temp dir");
    let map = create_shared_map(&dir, "race.shm");
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let map = Arc::clone(&map);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let mut value = LongValue::new();
                barrier.wait();
                map.acquire_using("contended", &mut value)
                    .expect("Acquire failed")
                    .add_atomic_value(1);
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    assert_eq!(map.len().unwrap(), 1, "Racing creators must share one entry");
    let mut value = LongValue::new();
    let value = map.get_using("contended", &mut value).unwrap().unwrap();
    assert_eq!(value.get_value(), THREADS as i64);
}

#[test]
fn test_concurrent_increments_are_not_lost() {
    const THREADS: usize = 8;
    const INCREMENTS: i64 = 10_000;

    let dir = tempdir().expect("Failed to create temp dir");
    let map = create_shared_map(&dir, "increments.shm");

    thread::scope(|scope| {
        for _ in 0..THREADS {
            scope.spawn(|| {
                let mut value = LongValue::new();
                let value = map.acquire_using("hits", &mut value).unwrap();
                for _ in 0..INCREMENTS {
                    value.add_atomic_value(1);
                }
            });
        }
    });

    let mut value = LongValue::new();
    let value = map.get_using("hits", &mut value).unwrap().unwrap();
    assert_eq!(value.get_value(), THREADS as i64 * INCREMENTS);
}

#[test]
fn test_concurrent_inserts_and_removes_across_segments() {
    const THREADS: usize = 8;
    const KEYS_PER_THREAD: usize = 500;

    let dir = tempdir().expect("Failed to create temp dir");
    let map = create_shared_map(&dir, "churn.shm");

    thread::scope(|scope| {
        for t in 0..THREADS {
            let map = &map;
            scope.spawn(move || {
                let mut value = LongValue::new();
                for i in 0..KEYS_PER_THREAD {
                    let key = format!("t{}:{}", t, i);
                    map.acquire_using(&key, &mut value).unwrap().set_value(i as i64);
                }
                // Remove every other key again.
                for i in (0..KEYS_PER_THREAD).step_by(2) {
                    assert!(map.remove(&format!("t{}:{}", t, i)).unwrap());
                }
            });
        }
    });

    assert_eq!(map.len().unwrap(), THREADS * KEYS_PER_THREAD / 2);

    let mut value = LongValue::new();
    for t in 0..THREADS {
        for i in 0..KEYS_PER_THREAD {
            let found = map.get_using(&format!("t{}:{}", t, i), &mut value).unwrap();
            if i % 2 == 0 {
                assert!(found.is_none(), "t{}:{} should be removed", t, i);
            } else {
                assert_eq!(found.expect("Key should remain").get_value(), i as i64);
            }
        }
    }
}

#[test]
fn test_concurrent_float_adds() {
    let dir = tempdir().expect("Failed to create temp dir");
    let map = SharedHashMapBuilder::new()
        .entries(16)
        .segments(2)
        .entry_size(32)
        .create::<DoubleValue>(&dir.path().join("floats.shm"))
        .expect("Failed to create map");

    thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                let mut value = DoubleValue::new();
                let value = map.acquire_using("sum", &mut value).unwrap();
                for _ in 0..1_000 {
                    value.add_atomic_value(0.5);
                }
            });
        }
    });

    let mut value = DoubleValue::new();
    let value = map.get_using("sum", &mut value).unwrap().unwrap();
    assert_eq!(value.get_value(), 2_000.0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_blocking_tasks_share_counters() {
    let dir = tempdir().expect("Failed to create temp dir");
    let map = create_shared_map(&dir, "tokio.shm");

    let mut tasks = Vec::new();
    for worker in 0..8i64 {
        let map = Arc::clone(&map);
        tasks.push(task::spawn_blocking(move || {
            let mut value = LongValue::new();
            for i in 0..100 {
                map.acquire_using(&format!("bucket{}", i % 10), &mut value)
                    .expect("Acquire failed")
                    .add_atomic_value(worker);
            }
        }));
    }

    for task in tasks {
        task.await.expect("Task panicked");
    }

    let mut total = 0;
    let mut value = LongValue::new();
    map.for_each_entry(&mut value, |_, value| total += value.get_value())
        .unwrap();

    // Each worker adds its id 100 times.
    assert_eq!(total, (0..8).sum::<i64>() * 100);
    assert_eq!(map.len().unwrap(), 10);
}
