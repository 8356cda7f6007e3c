/// Parses a count such as `"500"`, `"64k"` or `"1m"`.
///
/// Suffixes are decimal (`k` = 1,000, `m` = 1,000,000, `g` = 1,000,000,000)
/// and case-insensitive; `_` separators are ignored.
///
/// # Returns:
/// - `Ok(u64)` with the expanded count.
/// - `Err(String)` describing why the input was rejected.
pub fn parse_quantity(input: &str) -> Result<u64, String> {
    let normalized = input.trim().to_lowercase().replace('_', "");

    let num_end = normalized
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(normalized.len());

    let (num_part, unit_part) = normalized.split_at(num_end);

    let multiplier: u64 = match unit_part {
        "" => 1,
        "k" => 1_000,
        "m" => 1_000_000,
        "g" => 1_000_000_000,
        _ => return Err(format!("Invalid quantity suffix: {}", unit_part)),
    };

    num_part
        .parse::<u64>()
        .map_err(|_| format!("Failed to parse quantity: {}", input))?
        .checked_mul(multiplier)
        .ok_or_else(|| format!("Quantity out of range: {}", input))
}
