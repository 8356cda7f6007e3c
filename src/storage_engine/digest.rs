mod compute_checksum;
pub use compute_checksum::compute_checksum;

mod compute_hash;
pub use compute_hash::{bucket_for_hash, compute_hash, segment_for_hash, tag_for_hash};
