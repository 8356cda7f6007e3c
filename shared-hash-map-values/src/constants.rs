/// Largest value alignment a view may request.
///
/// Slot arrays are laid out on cache-line boundaries, so any power of two up
/// to 64 can be honored without extra padding at the segment level.
pub const MAX_VALUE_ALIGN: usize = 64;

/// Natural alignment of the 64-bit atomic views (`LongValue`, `DoubleValue`).
pub const WORD_ALIGN: usize = 8;

// Value type identifiers recorded in every map header. Never reuse a number.
pub const LONG_VALUE_TYPE_ID: u32 = 1;
pub const INT_VALUE_TYPE_ID: u32 = 2;
pub const DOUBLE_VALUE_TYPE_ID: u32 = 3;
