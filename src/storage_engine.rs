pub mod constants;

pub mod digest;

mod error;
pub use error::{MapError, Result};

mod slot_layout;
mod free_slot_index;
mod segment_lock;
mod map_header;
mod segment;

mod shared_hash_map;
pub use shared_hash_map::{MapStats, SharedHashMap};

mod builder;
pub use builder::SharedHashMapBuilder;

pub use map_header::MapHeader;

pub use shared_hash_map_values::*;

#[cfg(feature = "expose-internal-api")]
pub use free_slot_index::{FreeSlotIndex, OccupiedSlots, bitset_words};
#[cfg(feature = "expose-internal-api")]
pub use segment_lock::{ExclusiveGuard, SegmentLock, SharedGuard};
#[cfg(feature = "expose-internal-api")]
pub use slot_layout::{SlotHeader, SlotLayout, SlotStatus};
