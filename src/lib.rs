//! # Shared Hash Map
//!
//! A segmented hash map stored in one memory-mapped file and shared, without
//! copying, by every thread and process that maps it.
//!
//! - **Fixed layout**: capacity, segment count and per-entry size are chosen
//!   at creation; every entry occupies one fixed-size slot.
//! - **Cross-process locking**: each segment carries its own spin lock inside
//!   the mapping, so unrelated processes coordinate through the file alone.
//! - **Zero-copy values**: values are read and updated in place through
//!   reusable, atomically operated [`ValueView`]s such as [`LongValue`].
//!
//! ```no_run
//! use shared_hash_map::{LongValue, SharedHashMapBuilder};
//! use std::path::Path;
//!
//! let map = SharedHashMapBuilder::new()
//!     .entries(10_000)
//!     .segments(16)
//!     .entry_size(32)
//!     .create::<LongValue>(Path::new("/dev/shm/hits.shm"))
//!     .expect("Failed to create map");
//!
//! let mut hits = LongValue::new();
//! for _ in 0..3 {
//!     map.acquire_using("page:/index", &mut hits)
//!         .expect("Failed to acquire entry")
//!         .add_atomic_value(1);
//! }
//!
//! let hits = map
//!     .get_using("page:/index", &mut hits)
//!     .expect("Map is open")
//!     .map(|view| view.get_value());
//! assert_eq!(hits, Some(3));
//! ```

pub mod storage_engine;
pub use storage_engine::*;

pub mod utils;
