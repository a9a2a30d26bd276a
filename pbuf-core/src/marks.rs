//! Named marks: virtual addresses that move with edits (§3, §4.4).

use std::collections::BTreeMap;

/// A globally named mark set, keyed by name with unique membership.
///
/// Stored as a `BTreeMap` (rather than a `HashMap`) so that mark extraction
/// and snapshot diffs iterate in a stable order, which is convenient for
/// tests and for deterministic notification content.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde1", derive(serde::Serialize, serde::Deserialize))]
pub struct MarkSet {
    marks: BTreeMap<String, u64>,
}

impl MarkSet {
    pub fn new() -> Self {
        MarkSet {
            marks: BTreeMap::new(),
        }
    }

    pub fn set(&mut self, name: impl Into<String>, address: u64) {
        self.marks.insert(name.into(), address);
    }

    pub fn get(&self, name: &str) -> Option<u64> {
        self.marks.get(name).copied()
    }

    pub fn remove(&mut self, name: &str) -> Option<u64> {
        self.marks.remove(name)
    }

    pub fn len(&self) -> usize {
        self.marks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.marks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.marks.iter().map(|(k, &v)| (k.as_str(), v))
    }

    pub fn clear(&mut self) {
        self.marks.clear();
    }

    /// Applies the §3 edit rule for an edit at `[pos, pos+deleted) ->
    /// [pos, pos+inserted)` to every mark in place.
    ///
    /// - address `< pos`: unchanged.
    /// - address `>= pos + deleted`: shifted by `inserted - deleted`.
    /// - address `in [pos, pos+deleted)`: collapses to `pos`.
    pub fn apply_edit(&mut self, pos: u64, deleted: u64, inserted: u64) {
        let delta = inserted as i64 - deleted as i64;
        let delete_end = pos + deleted;
        for addr in self.marks.values_mut() {
            if *addr < pos {
                continue;
            } else if *addr >= delete_end {
                *addr = (*addr as i64 + delta).max(0) as u64;
            } else {
                *addr = pos;
            }
        }
    }

    /// Returns `(name, relative_offset)` for every mark whose address lies
    /// in `[start, end)`, ascending by address then name. Does not mutate
    /// the set; callers combine this with `apply_edit` for the "report
    /// marks, then delete" sequence the Line/Marks manager exposes.
    pub fn marks_in_range(&self, start: u64, end: u64) -> Vec<(String, u64)> {
        let mut found: Vec<(String, u64)> = self
            .marks
            .iter()
            .filter(|(_, &addr)| addr >= start && addr < end)
            .map(|(name, &addr)| (name.clone(), addr - start))
            .collect();
        found.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        found
    }

    /// Registers marks at `insert_pos + rel_offset` for each `(name,
    /// rel_offset)` pair, overwriting any pre-existing name. Callers invoke
    /// this after the plain insert (and its `apply_edit` shift) has already
    /// happened.
    pub fn install_relative(&mut self, insert_pos: u64, relative: &[(String, u64)]) {
        for (name, rel) in relative {
            self.marks.insert(name.clone(), insert_pos + rel);
        }
    }

    /// Drops every mark whose address now falls outside `[0, total_size]`,
    /// used when restoring an undo snapshot per §4.5.
    pub fn clamp_to_bounds(&mut self, total_size: u64) {
        self.marks.retain(|_, &mut addr| addr <= total_size);
    }

    /// Replaces the whole set, used to install an undo/redo marks
    /// snapshot.
    pub fn restore(&mut self, snapshot: MarkSet) {
        self.marks = snapshot.marks;
    }

    pub fn snapshot(&self) -> MarkSet {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mark_before_edit_is_unaffected() {
        let mut m = MarkSet::new();
        m.set("a", 3);
        m.apply_edit(10, 2, 5);
        assert_eq!(m.get("a"), Some(3));
    }

    #[test]
    fn mark_after_edit_shifts_by_delta() {
        let mut m = MarkSet::new();
        m.set("a", 20);
        m.apply_edit(10, 2, 5); // delta = +3
        assert_eq!(m.get("a"), Some(23));
    }

    #[test]
    fn mark_inside_deleted_range_collapses_to_start() {
        let mut m = MarkSet::new();
        m.set("a", 11);
        m.apply_edit(10, 5, 0);
        assert_eq!(m.get("a"), Some(10));
    }

    #[test]
    fn shift_never_goes_negative() {
        let mut m = MarkSet::new();
        m.set("a", 12);
        m.apply_edit(10, 10, 0); // delta = -10, address inside range anyway collapses
        assert_eq!(m.get("a"), Some(10));

        let mut m2 = MarkSet::new();
        m2.set("a", 15);
        m2.apply_edit(5, 20, 0); // address 15 is inside [5, 25) -> collapses
        assert_eq!(m2.get("a"), Some(5));
    }

    #[test]
    fn marks_in_range_reports_relative_offsets_sorted() {
        let mut m = MarkSet::new();
        m.set("b", 15);
        m.set("a", 12);
        let found = m.marks_in_range(10, 20);
        assert_eq!(found, vec![("a".to_string(), 2), ("b".to_string(), 5)]);
    }

    #[test]
    fn install_relative_overwrites_existing_name() {
        let mut m = MarkSet::new();
        m.set("a", 999);
        m.install_relative(100, &[("a".to_string(), 5)]);
        assert_eq!(m.get("a"), Some(105));
    }

    #[test]
    fn clamp_to_bounds_drops_out_of_range_marks() {
        let mut m = MarkSet::new();
        m.set("a", 5);
        m.set("b", 50);
        m.clamp_to_bounds(10);
        assert_eq!(m.get("a"), Some(5));
        assert_eq!(m.get("b"), None);
    }
}
