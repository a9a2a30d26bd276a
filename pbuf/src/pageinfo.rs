//! The resident form of a page descriptor (§3): loaded bytes, a newline
//! position cache, dirty/access bookkeeping, and a checksum used to
//! detect corruption in original-source pages.

use std::time::Instant;

/// The in-memory contents of one page, present only while its descriptor
/// is `is_loaded()`. Owned exclusively by the Virtual Page Manager's
/// cache -- readers get copies of sub-ranges, never a view into this.
#[derive(Debug, Clone)]
pub struct PageInfo {
    pub data: Vec<u8>,
    /// Relative byte indices (within `data`) of every `0x0A`, ascending.
    newline_positions: Vec<usize>,
    pub is_dirty: bool,
    pub last_access: Instant,
    /// CRC32 of `data` as loaded, used to cross-check original-source
    /// pages against truncation/corruption. Not a security boundary.
    pub checksum: u32,
}

impl PageInfo {
    pub fn new(data: Vec<u8>, dirty: bool) -> Self {
        let newline_positions = scan_newlines(&data);
        let checksum = crc32fast::hash(&data);
        PageInfo {
            data,
            newline_positions,
            is_dirty: dirty,
            last_access: Instant::now(),
            checksum,
        }
    }

    pub fn touch(&mut self) {
        self.last_access = Instant::now();
    }

    pub fn newline_positions(&self) -> &[usize] {
        &self.newline_positions
    }

    pub fn newline_count(&self) -> usize {
        self.newline_positions.len()
    }

    /// Recomputes the newline cache and checksum after `data` has been
    /// mutated in place (splice/insert/delete). Callers are responsible
    /// for calling this any time `data` changes.
    pub fn rebuild_caches(&mut self) {
        self.newline_positions = scan_newlines(&self.data);
        self.checksum = crc32fast::hash(&self.data);
    }

    /// Splices `bytes` into `data` at `rel_pos`, rebuilding caches and
    /// marking the page dirty.
    pub fn splice_insert(&mut self, rel_pos: usize, bytes: &[u8]) {
        self.data.splice(rel_pos..rel_pos, bytes.iter().copied());
        self.rebuild_caches();
        self.is_dirty = true;
    }

    /// Removes `data[range]`, returning the removed bytes, rebuilding
    /// caches and marking the page dirty.
    pub fn splice_delete(&mut self, range: std::ops::Range<usize>) -> Vec<u8> {
        let removed: Vec<u8> = self.data.splice(range, std::iter::empty()).collect();
        self.rebuild_caches();
        self.is_dirty = true;
        removed
    }
}

fn scan_newlines(data: &[u8]) -> Vec<usize> {
    data.iter()
        .enumerate()
        .filter(|&(_, &b)| b == b'\n')
        .map(|(i, _)| i)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newline_positions_match_content() {
        let p = PageInfo::new(b"ab\ncd\n".to_vec(), false);
        assert_eq!(p.newline_positions(), &[2, 5]);
        assert_eq!(p.newline_count(), 2);
    }

    #[test]
    fn splice_insert_rebuilds_caches_and_marks_dirty() {
        let mut p = PageInfo::new(b"abcd".to_vec(), false);
        p.splice_insert(2, b"\n\n");
        assert_eq!(p.data, b"ab\n\ncd");
        assert_eq!(p.newline_positions(), &[2, 3]);
        assert!(p.is_dirty);
    }

    #[test]
    fn splice_delete_returns_removed_bytes() {
        let mut p = PageInfo::new(b"ab\ncd".to_vec(), false);
        let removed = p.splice_delete(1..4);
        assert_eq!(removed, b"b\nc");
        assert_eq!(p.data, b"ad");
        assert!(p.newline_positions().is_empty());
    }

    #[test]
    fn checksum_changes_when_data_changes() {
        let mut p = PageInfo::new(b"hello".to_vec(), false);
        let before = p.checksum;
        p.splice_insert(0, b"x");
        assert_ne!(before, p.checksum);
    }
}
