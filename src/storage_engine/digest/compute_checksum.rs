use crc32fast::Hasher as Crc32FastHasher;

/// Computes a 4-byte CRC32 checksum over `data`.
///
/// Used to validate the map header when a file is opened. `crc32fast`
/// picks SSE4.2 / PCLMULQDQ or NEON at runtime when available.
///
/// # Returns
/// - The checksum as a little-endian 4-byte array.
#[inline]
pub fn compute_checksum(data: &[u8]) -> [u8; 4] {
    let mut hasher = Crc32FastHasher::new();
    hasher.update(data);
    hasher.finalize().to_le_bytes()
}
