//! Wires `pbuf_core::{marks, lines}` into the engine: the named mark set
//! and the lazily-rebuilt line-start index, plus the glue the Virtual
//! Page Manager calls back into on every edit (§4.4, §9).

use pbuf_core::{LineChar, LineIndex, LineInfo, MarkSet};

/// Owns the mark set and line index for one buffer. The Buffer facade
/// holds this behind `Rc<RefCell<_>>` and hands the Virtual Page Manager
/// a `Weak` back-reference (§9's "cyclic references" design note) so the
/// VPM can invalidate/notify this manager the instant an edit completes,
/// without the two halves needing to agree on a single owner.
#[derive(Debug, Default)]
pub struct LineMarksManager {
    marks: MarkSet,
    lines: LineIndex,
}

impl LineMarksManager {
    pub fn new() -> Self {
        LineMarksManager {
            marks: MarkSet::new(),
            lines: LineIndex::new(),
        }
    }

    pub fn marks(&self) -> &MarkSet {
        &self.marks
    }

    pub fn set_mark(&mut self, name: impl Into<String>, address: u64) {
        self.marks.set(name, address);
    }

    pub fn get_mark(&self, name: &str) -> Option<u64> {
        self.marks.get(name)
    }

    pub fn remove_mark(&mut self, name: &str) -> Option<u64> {
        self.marks.remove(name)
    }

    pub fn marks_in_range(&self, start: u64, end: u64) -> Vec<(String, u64)> {
        self.marks.marks_in_range(start, end)
    }

    pub fn install_relative_marks(&mut self, insert_pos: u64, relative: &[(String, u64)]) {
        self.marks.install_relative(insert_pos, relative);
    }

    pub fn snapshot_marks(&self) -> MarkSet {
        self.marks.snapshot()
    }

    pub fn restore_marks(&mut self, snapshot: MarkSet, total_size: u64) {
        self.marks.restore(snapshot);
        self.marks.clamp_to_bounds(total_size);
    }

    /// Called by the Virtual Page Manager immediately after a mutation at
    /// `[pos, pos+deleted) -> [pos, pos+inserted)` completes. Applies the
    /// §3 mark-shift rule and invalidates the line index, which is
    /// rebuilt lazily the next time a line/char query is made.
    pub fn notify_edit(&mut self, pos: u64, deleted: u64, inserted: u64) {
        self.marks.apply_edit(pos, deleted, inserted);
        self.lines.invalidate();
    }

    pub fn lines_are_fresh(&self) -> bool {
        self.lines.is_valid()
    }

    /// `get_line_count` without the panic `LineIndex` would otherwise
    /// raise on an unbuilt index -- `0` means "not currently known",
    /// used only for undo-group bookkeeping that nothing re-derives from.
    pub fn cached_line_count(&self) -> u64 {
        if self.lines.is_valid() {
            self.lines.get_line_count()
        } else {
            0
        }
    }

    /// Installs a freshly scanned set of absolute newline positions,
    /// called by the Buffer facade after it asks the VPM for a full scan
    /// (which may force-load every page -- an expensive, on-demand-only
    /// operation per §4.4).
    pub fn rebuild_lines(&mut self, newline_positions: impl IntoIterator<Item = u64>) {
        self.lines.rebuild_from_newlines(newline_positions);
    }

    pub fn get_line_count(&self) -> u64 {
        self.lines.get_line_count()
    }

    pub fn line_char_to_byte(&self, pos: LineChar, total_size: u64) -> u64 {
        self.lines.line_char_to_byte(pos, total_size)
    }

    pub fn byte_to_line_char(&self, byte: u64) -> LineChar {
        self.lines.byte_to_line_char(byte)
    }

    pub fn get_line_info(&self, n: u64, total_size: u64) -> Option<LineInfo> {
        self.lines.get_line_info(n, total_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notify_edit_shifts_marks_and_invalidates_lines() {
        let mut lm = LineMarksManager::new();
        lm.set_mark("cursor", 20);
        lm.rebuild_lines(vec![5, 15]);
        assert!(lm.lines_are_fresh());
        lm.notify_edit(10, 0, 3);
        assert_eq!(lm.get_mark("cursor"), Some(23));
        assert!(!lm.lines_are_fresh());
    }

    #[test]
    fn snapshot_and_restore_round_trip() {
        let mut lm = LineMarksManager::new();
        lm.set_mark("a", 5);
        let snap = lm.snapshot_marks();
        lm.set_mark("a", 999);
        lm.restore_marks(snap, 100);
        assert_eq!(lm.get_mark("a"), Some(5));
    }

    #[test]
    fn restore_clamps_marks_outside_bounds() {
        let mut lm = LineMarksManager::new();
        lm.set_mark("a", 50);
        let snap = lm.snapshot_marks();
        lm.restore_marks(snap, 10);
        assert_eq!(lm.get_mark("a"), None);
    }
}
