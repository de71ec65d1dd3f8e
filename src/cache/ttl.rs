/// Largest TTL the cache will honor; parse results are capped here rather
/// than rejected so `999999999d` still produces a usable entry.
pub const MAX_TTL_SECONDS: u64 = i32::MAX as u64;

/// Parse a duration expression of the form `<digits><unit>` where the unit is
/// one of `s`, `m`, `h`, `d`. The grammar is anchored: whitespace or any
/// other stray byte makes the input non-matching. Empty or non-matching
/// input falls back to `default_ttl` (the documented silent-default
/// behavior). A literal zero (`0s`) is returned as 0 and rejected
/// downstream.
pub fn parse_ttl(raw: &str, default_ttl: u64) -> u64 {
    if raw.is_empty() {
        return default_ttl;
    }

    let Some(unit) = raw.chars().last() else {
        return default_ttl;
    };
    let digits = &raw[..raw.len() - unit.len_utf8()];
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return default_ttl;
    }

    let multiplier: u64 = match unit {
        's' => 1,
        'm' => 60,
        'h' => 3600,
        'd' => 86_400,
        _ => return default_ttl,
    };

    // Digits may exceed u64; widen before multiplying so the cap applies
    // instead of a wrap or a parse failure.
    let value: u128 = match digits.parse() {
        Ok(value) => value,
        Err(_) => return MAX_TTL_SECONDS,
    };
    let seconds = value.saturating_mul(multiplier as u128);
    seconds.min(MAX_TTL_SECONDS as u128) as u64
}
