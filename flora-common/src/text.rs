//! Small text helpers shared by name normalization and prompt rendering

/// Collapse runs of whitespace into single spaces and trim both ends
pub fn collapse_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Truncate to at most `max_chars` characters, never splitting a UTF-8 sequence
///
/// Returns the kept prefix and whether anything was cut off.
pub fn truncate_chars(input: &str, max_chars: usize) -> (&str, bool) {
    match input.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => (&input[..byte_idx], true),
        None => (input, false),
    }
}

/// Returns `Some(trimmed)` when the value carries any non-whitespace text
pub fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
