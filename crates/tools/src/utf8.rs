/// UTF-8 helpers for scanning byte buffers that hold decoded text.
///
/// Buffers handed to these helpers are valid UTF-8 between the positions the
/// caller passes in; the helpers only decide where character boundaries fall.

/// Length of the UTF-8 sequence introduced by `first`, or 0 for a byte that
/// cannot start a sequence.
pub fn utf8_seq_len(first: u8) -> usize {
    match first {
        0x00..=0x7F => 1,
        0xC2..=0xDF => 2,
        0xE0..=0xEF => 3,
        0xF0..=0xF4 => 4,
        _ => 0,
    }
}

/// True for continuation bytes (`10xxxxxx`).
#[inline]
pub fn is_continuation(byte: u8) -> bool {
    byte & 0xC0 == 0x80
}

/// Number of characters in a UTF-8 byte run.
///
/// Counts lead bytes, so a run that starts or ends mid-sequence is still
/// counted without panicking.
pub fn char_count(bytes: &[u8]) -> usize {
    bytes.iter().filter(|&&b| !is_continuation(b)).count()
}

/// Decode the character starting at `pos`.
///
/// Returns `None` when `pos` is out of range, points into the middle of a
/// sequence, or the sequence is truncated by the end of `bytes`.
pub fn char_at(bytes: &[u8], pos: usize) -> Option<(char, usize)> {
    let first = *bytes.get(pos)?;
    if first < 0x80 {
        return Some((first as char, 1));
    }
    let len = utf8_seq_len(first);
    if len == 0 || pos + len > bytes.len() {
        return None;
    }
    let s = std::str::from_utf8(&bytes[pos..pos + len]).ok()?;
    s.chars().next().map(|ch| (ch, len))
}

/// Largest char boundary in `text` that is `<= index`.
pub fn floor_char_boundary(text: &str, index: usize) -> usize {
    if index >= text.len() {
        return text.len();
    }
    let mut i = index;
    while i > 0 && !text.is_char_boundary(i) {
        i -= 1;
    }
    i
}
