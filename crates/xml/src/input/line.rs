use tools::utf8::char_count;

/// Line number and line-start offset for the active character buffer.
///
/// Positions are 1-based character columns. `line_start` is a byte offset
/// into the buffer; when a shift discards the start of the current line the
/// discarded characters are remembered in `carried`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct LineTracker {
    pub(crate) line_no: usize,
    line_start: usize,
    carried: usize,
}

impl LineTracker {
    pub(crate) fn new() -> Self {
        Self {
            line_no: 1,
            line_start: 0,
            carried: 0,
        }
    }

    /// Record a line break whose next line begins at buffer offset `pos`.
    #[inline]
    pub(crate) fn on_new_line(&mut self, pos: usize) {
        self.line_no += 1;
        self.line_start = pos;
        self.carried = 0;
    }

    /// 1-based column of buffer offset `pos`.
    pub(crate) fn position(&self, chars: &[u8], pos: usize) -> usize {
        let from = self.line_start.min(pos);
        let to = pos.min(chars.len());
        self.carried + char_count(&chars[from.min(to)..to]) + 1
    }

    /// Live bytes in `from..to` were moved down by `by` to close a rewrite
    /// gap.
    pub(crate) fn on_moved_down(&mut self, from: usize, to: usize, by: usize) {
        if (from..to).contains(&self.line_start) {
            self.line_start -= by;
        }
    }

    /// `removed` source characters on the current line no longer occupy
    /// live bytes.
    pub(crate) fn on_rewritten(&mut self, removed: usize) {
        self.carried += removed;
    }

    /// The first `n` bytes of the buffer are about to be discarded.
    pub(crate) fn discard_prefix(&mut self, chars: &[u8], n: usize) {
        if self.line_start < n {
            self.carried += char_count(&chars[self.line_start..n]);
            self.line_start = 0;
        } else {
            self.line_start -= n;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn columns_count_characters() {
        let buf = "ab\n€x".as_bytes();
        let mut line = LineTracker::new();
        assert_eq!(line.position(buf, 1), 2);
        line.on_new_line(3);
        assert_eq!(line.line_no, 2);
        assert_eq!(line.position(buf, 3), 1);
        // after the three-byte euro sign
        assert_eq!(line.position(buf, 6), 2);
    }

    #[test]
    fn moved_line_start_follows_live_bytes() {
        let mut line = LineTracker::new();
        line.on_new_line(3);
        line.on_moved_down(2, 6, 1);
        assert_eq!(line.line_start, 2);
        line.on_moved_down(5, 9, 1);
        assert_eq!(line.line_start, 2);
        line.on_rewritten(3);
        assert_eq!(line.position(b"xxab", 4), 6);
    }

    #[test]
    fn discarded_prefix_is_carried() {
        let buf = b"abcdef";
        let mut line = LineTracker::new();
        line.discard_prefix(buf, 4);
        let shifted = b"ef";
        assert_eq!(line.position(shifted, 1), 6);
    }
}
