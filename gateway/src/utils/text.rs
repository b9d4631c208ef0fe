//! Small text helpers shared by the mint endpoint and the live clients.

/// Trim surrounding whitespace and cap the result at `max_chars` characters.
///
/// Counts Unicode scalar values, never bytes, so multi-byte input is never
/// split inside a character. Returns `None` when nothing is left after trimming.
pub fn trim_and_truncate(input: &str, max_chars: usize) -> Option<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }

    match trimmed.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => Some(trimmed[..byte_idx].to_string()),
        None => Some(trimmed.to_string()),
    }
}

/// Lowercase hex rendering of at most the first `max_bytes` bytes.
pub fn hex_prefix(data: &[u8], max_bytes: usize) -> String {
    hex::encode(&data[..data.len().min(max_bytes)])
}
