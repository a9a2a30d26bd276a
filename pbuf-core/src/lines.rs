//! Line indexing and byte↔(line, character) conversion (§4.4).
//!
//! `LineIndex` itself never scans page bytes for newlines (that requires
//! loading pages, which is the I/O crate's job). It only holds the sorted
//! list of line-start virtual addresses and answers conversions against it;
//! the owner (the I/O crate's `LineMarksManager`) is responsible for
//! invalidating it on every edit and rebuilding it from the VPM's
//! loaded/cached newline positions on next use.

/// Information about one line, as returned by `get_line_info`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineInfo {
    pub byte_start: u64,
    /// Inclusive of the line's trailing newline, or the buffer's end for
    /// the last line.
    pub byte_end: u64,
    pub length: u64,
}

/// 1-based (line, character) position, matching the spec's external
/// addressing convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineChar {
    pub line: u64,
    pub character: u64,
}

/// A lazily-rebuilt cache of line-start virtual addresses.
#[derive(Debug, Clone, Default)]
pub struct LineIndex {
    /// Always non-empty and starts with `0` once built; `None` means
    /// "needs rebuild".
    line_starts: Option<Vec<u64>>,
}

impl LineIndex {
    pub fn new() -> Self {
        LineIndex { line_starts: None }
    }

    pub fn is_valid(&self) -> bool {
        self.line_starts.is_some()
    }

    pub fn invalidate(&mut self) {
        self.line_starts = None;
    }

    /// Installs a freshly computed set of line starts. `newline_positions`
    /// are absolute virtual addresses of every `\n` byte in the buffer, in
    /// ascending order; position `0` is always line 1's start regardless of
    /// content.
    pub fn rebuild_from_newlines(&mut self, newline_positions: impl IntoIterator<Item = u64>) {
        let mut starts = vec![0u64];
        starts.extend(newline_positions.into_iter().map(|nl| nl + 1));
        self.line_starts = Some(starts);
    }

    fn starts(&self) -> &[u64] {
        self.line_starts
            .as_deref()
            .expect("LineIndex::rebuild_from_newlines must be called before use")
    }

    pub fn get_line_count(&self) -> u64 {
        self.starts().len() as u64
    }

    /// `byte = lineStarts[line-1] + (character-1)`, clamped to the line's
    /// span. Out-of-range `line` clamps to the nearest valid line.
    pub fn line_char_to_byte(&self, pos: LineChar, total_size: u64) -> u64 {
        let starts = self.starts();
        let line_idx = pos.line.saturating_sub(1).min(starts.len() as u64 - 1) as usize;
        let line_start = starts[line_idx];
        let line_end = starts.get(line_idx + 1).copied().unwrap_or(total_size);
        let byte = line_start + pos.character.saturating_sub(1);
        byte.clamp(line_start, line_end)
    }

    /// Binary search for the greatest line start `<= byte`.
    pub fn byte_to_line_char(&self, byte: u64) -> LineChar {
        let starts = self.starts();
        let idx = starts.partition_point(|&s| s <= byte).saturating_sub(1);
        LineChar {
            line: idx as u64 + 1,
            character: byte - starts[idx] + 1,
        }
    }

    /// `byteEnd = lineStarts[n] - 1` (the line's own trailing newline) or
    /// `total_size` for the last line. `n` is 1-based.
    pub fn get_line_info(&self, n: u64, total_size: u64) -> Option<LineInfo> {
        let starts = self.starts();
        let idx = n.checked_sub(1)? as usize;
        let byte_start = *starts.get(idx)?;
        let byte_end = starts
            .get(idx + 1)
            .map(|&next| next - 1)
            .unwrap_or(total_size);
        Some(LineInfo {
            byte_start,
            byte_end,
            length: byte_end.saturating_sub(byte_start),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (LineIndex, u64) {
        // "First line\nSecond line\nThird line"
        let text = "First line\nSecond line\nThird line";
        let newlines: Vec<u64> = text
            .bytes()
            .enumerate()
            .filter(|&(_, b)| b == b'\n')
            .map(|(i, _)| i as u64)
            .collect();
        let mut idx = LineIndex::new();
        idx.rebuild_from_newlines(newlines);
        (idx, text.len() as u64)
    }

    #[test]
    fn seed_scenario_line_conversion() {
        let (idx, total) = sample();
        assert_eq!(
            idx.line_char_to_byte(LineChar { line: 2, character: 1 }, total),
            11
        );
        assert_eq!(
            idx.byte_to_line_char(11),
            LineChar { line: 2, character: 1 }
        );
        assert_eq!(
            idx.byte_to_line_char(5),
            LineChar { line: 1, character: 6 }
        );
    }

    #[test]
    fn line_count_and_info() {
        let (idx, total) = sample();
        assert_eq!(idx.get_line_count(), 3);
        let first = idx.get_line_info(1, total).unwrap();
        assert_eq!(first.byte_start, 0);
        assert_eq!(first.byte_end, 10); // the '\n' itself
        let last = idx.get_line_info(3, total).unwrap();
        assert_eq!(last.byte_end, total);
    }

    #[test]
    fn empty_buffer_has_one_line() {
        let mut idx = LineIndex::new();
        idx.rebuild_from_newlines(std::iter::empty());
        assert_eq!(idx.get_line_count(), 1);
        assert_eq!(idx.byte_to_line_char(0), LineChar { line: 1, character: 1 });
    }

    #[test]
    fn line_char_clamps_past_line_end() {
        let (idx, total) = sample();
        // Line 1 spans [0, 11); asking for character 1000 clamps to the newline.
        let byte = idx.line_char_to_byte(LineChar { line: 1, character: 1000 }, total);
        assert_eq!(byte, 11);
    }
}
