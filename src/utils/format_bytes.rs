/// Formats a byte count with binary units (KB, MB, GB).
///
/// Sizes below 1 KB are shown as raw bytes; larger sizes use two decimals.
///
/// # Examples
/// ```
/// use shared_hash_map::utils::format_bytes;
///
/// assert_eq!(format_bytes(640), "640 bytes");
/// assert_eq!(format_bytes(4096), "4.00 KB");
/// assert_eq!(format_bytes(45_088_768), "43.00 MB");
/// assert_eq!(format_bytes(3 * 1024 * 1024 * 1024), "3.00 GB");
/// ```
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    match bytes {
        b if b >= GB => format!("{:.2} GB", b as f64 / GB as f64),
        b if b >= MB => format!("{:.2} MB", b as f64 / MB as f64),
        b if b >= KB => format!("{:.2} KB", b as f64 / KB as f64),
        _ => format!("{} bytes", bytes),
    }
}
