//! The page address index: a dense, sorted, gap-free array of descriptors
//! plus an auxiliary key map, as specified in §4.2.
//!
//! Invariant maintained by every mutator in this module: the descriptor
//! sequence is sorted by `virtual_start`, forms an exact partition of
//! `[0, total_virtual_size)` with no gaps or overlaps, and every descriptor
//! has `virtual_size > 0` except a single placeholder for the empty buffer.
//! Violating this is a programmer error in this crate; `validate()` is the
//! test hook that asserts it holds.

use crate::page::PageDescriptor;
use std::collections::HashMap;

/// The address index owned by the Virtual Page Manager.
#[derive(Debug, Default)]
pub struct PageIndex {
    descriptors: Vec<PageDescriptor>,
    key_to_idx: HashMap<String, usize>,
    total_virtual_size: u64,
}

impl PageIndex {
    pub fn new() -> Self {
        PageIndex {
            descriptors: Vec::new(),
            key_to_idx: HashMap::new(),
            total_virtual_size: 0,
        }
    }

    pub fn total_virtual_size(&self) -> u64 {
        self.total_virtual_size
    }

    pub fn descriptors(&self) -> &[PageDescriptor] {
        &self.descriptors
    }

    pub fn descriptors_mut(&mut self) -> &mut [PageDescriptor] {
        &mut self.descriptors
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn get_by_key(&self, key: &str) -> Option<&PageDescriptor> {
        self.key_to_idx.get(key).map(|&i| &self.descriptors[i])
    }

    pub fn get_by_key_mut(&mut self, key: &str) -> Option<&mut PageDescriptor> {
        let idx = *self.key_to_idx.get(key)?;
        self.descriptors.get_mut(idx)
    }

    pub fn index_of_key(&self, key: &str) -> Option<usize> {
        self.key_to_idx.get(key).copied()
    }

    /// Rebuilds the auxiliary key map from scratch. Called after any
    /// mutation that could have shifted descriptor indices.
    fn reindex(&mut self) {
        self.key_to_idx.clear();
        self.key_to_idx.reserve(self.descriptors.len());
        for (i, d) in self.descriptors.iter().enumerate() {
            self.key_to_idx.insert(d.page_key.clone(), i);
        }
        self.total_virtual_size = self.descriptors.last().map(|d| d.virtual_end()).unwrap_or(0);
    }

    /// Replaces the whole descriptor sequence in one shot, used by
    /// `initialize_from_file`/`initialize_from_content` in the VPM.
    pub fn replace_all(&mut self, descriptors: Vec<PageDescriptor>) {
        self.descriptors = descriptors;
        self.reindex();
    }

    /// Binary search for the descriptor whose range contains `pos`. `pos ==
    /// total_virtual_size` resolves to the tail descriptor at its own
    /// offset (the valid insertion point at end-of-buffer). `None` for any
    /// other out-of-range position.
    pub fn find_page_at(&self, pos: u64) -> Option<(&PageDescriptor, u64)> {
        if pos > self.total_virtual_size {
            return None;
        }
        if pos == self.total_virtual_size {
            return self.descriptors.last().map(|d| (d, d.virtual_size));
        }
        let idx = self.descriptors.partition_point(|d| d.virtual_end() <= pos);
        self.descriptors
            .get(idx)
            .map(|d| (d, pos - d.virtual_start))
    }

    pub fn find_page_at_index(&self, pos: u64) -> Option<usize> {
        if pos > self.total_virtual_size {
            return None;
        }
        if pos == self.total_virtual_size {
            return if self.descriptors.is_empty() {
                None
            } else {
                Some(self.descriptors.len() - 1)
            };
        }
        let idx = self.descriptors.partition_point(|d| d.virtual_end() <= pos);
        if idx < self.descriptors.len() {
            Some(idx)
        } else {
            None
        }
    }

    /// All descriptors intersecting `[start, end)`, excluding zero-size
    /// placeholders, in virtual-start order.
    pub fn get_pages_in_range(&self, start: u64, end: u64) -> &[PageDescriptor] {
        if start >= end {
            return &[];
        }
        let first = self.descriptors.partition_point(|d| d.virtual_end() <= start);
        let last = self.descriptors.partition_point(|d| d.virtual_start < end);
        if first >= last {
            return &[];
        }
        &self.descriptors[first..last]
    }

    pub fn get_pages_in_range_indices(&self, start: u64, end: u64) -> std::ops::Range<usize> {
        if start >= end {
            return 0..0;
        }
        let first = self.descriptors.partition_point(|d| d.virtual_end() <= start);
        let last = self.descriptors.partition_point(|d| d.virtual_start < end);
        if first >= last {
            0..0
        } else {
            first..last
        }
    }

    /// Inserts a descriptor at `idx`, shifting the indices of everything
    /// after it. Caller is responsible for giving it a correct
    /// `virtual_start`.
    pub fn insert_page(&mut self, idx: usize, descriptor: PageDescriptor) {
        self.descriptors.insert(idx, descriptor);
        self.reindex();
    }

    pub fn push_page(&mut self, descriptor: PageDescriptor) {
        self.descriptors.push(descriptor);
        self.reindex();
    }

    /// Removes the descriptor with the given key, if present, returning it.
    pub fn remove_page(&mut self, key: &str) -> Option<PageDescriptor> {
        let idx = self.key_to_idx.get(key).copied()?;
        let removed = self.descriptors.remove(idx);
        self.reindex();
        Some(removed)
    }

    /// Adjusts `key`'s `virtual_size` by `delta` and shifts the
    /// `virtual_start` of every subsequent descriptor by the same amount.
    /// `delta` may be negative (a deletion shrinking a page).
    pub fn update_page_size(&mut self, key: &str, delta: i64) -> Option<()> {
        let idx = *self.key_to_idx.get(key)?;
        {
            let d = &mut self.descriptors[idx];
            let new_size = (d.virtual_size as i64 + delta).max(0) as u64;
            d.virtual_size = new_size;
        }
        for d in self.descriptors.iter_mut().skip(idx + 1) {
            d.virtual_start = (d.virtual_start as i64 + delta).max(0) as u64;
        }
        self.total_virtual_size = self.descriptors.last().map(|d| d.virtual_end()).unwrap_or(0);
        Some(())
    }

    /// Shrinks `key`'s descriptor to `virtual_size = offset` and inserts a
    /// new descriptor right after it holding the remainder (`parent_key =
    /// key`, one generation higher). Returns the new descriptor's key and
    /// index; the VPM is responsible for moving the actual bytes.
    pub fn split_page(
        &mut self,
        key: &str,
        offset: u64,
        new_key: String,
    ) -> Option<(usize, u64, u64, u32)> {
        let idx = *self.key_to_idx.get(key)?;
        let (parent_start, parent_size, parent_gen) = {
            let d = &self.descriptors[idx];
            (d.virtual_start, d.virtual_size, d.generation)
        };
        if offset > parent_size {
            return None;
        }
        let remainder = parent_size - offset;
        {
            let d = &mut self.descriptors[idx];
            d.virtual_size = offset;
        }
        let mut new_desc = crate::page::PageDescriptor::new_memory(
            new_key,
            parent_start + offset,
            remainder,
        );
        new_desc.parent_key = Some(key.to_string());
        new_desc.generation = parent_gen + 1;
        self.descriptors.insert(idx + 1, new_desc);
        self.reindex();
        Some((idx + 1, parent_start + offset, remainder, parent_gen + 1))
    }

    /// Merges `absorbed_key`'s descriptor into `keep_key`'s, which must be
    /// its immediate neighbor. The merged span occupies exactly the same
    /// virtual range the two pages occupied together, so (unlike
    /// `update_page_size`) no descriptor other than `keep_key` itself is
    /// touched. Returns the absorbed descriptor's size so the caller can
    /// move its bytes; `None` if either key is missing or they are not
    /// adjacent.
    pub fn merge_into(&mut self, keep_key: &str, absorbed_key: &str) -> Option<u64> {
        let keep_idx = *self.key_to_idx.get(keep_key)?;
        let absorbed_idx = *self.key_to_idx.get(absorbed_key)?;
        if absorbed_idx != keep_idx + 1 && keep_idx != absorbed_idx + 1 {
            return None;
        }
        let absorbed_size = self.descriptors[absorbed_idx].virtual_size;
        let absorbed_start = self.descriptors[absorbed_idx].virtual_start;
        self.descriptors[keep_idx].virtual_size += absorbed_size;
        if absorbed_idx < keep_idx {
            self.descriptors[keep_idx].virtual_start = absorbed_start;
        }
        self.descriptors.remove(absorbed_idx);
        self.reindex();
        Some(absorbed_size)
    }

    /// Verifies the partition invariant and key-map synchronization. Used
    /// by tests and by debug assertions in the VPM; never called on the
    /// hot path.
    pub fn validate(&self) -> Result<(), String> {
        let mut expected_start = 0u64;
        for (i, d) in self.descriptors.iter().enumerate() {
            if d.virtual_start != expected_start {
                return Err(format!(
                    "descriptor {i} ({:?}) starts at {}, expected {}",
                    d.page_key, d.virtual_start, expected_start
                ));
            }
            if d.virtual_size == 0 && self.descriptors.len() != 1 {
                return Err(format!(
                    "descriptor {i} ({:?}) has zero size in a non-placeholder index",
                    d.page_key
                ));
            }
            expected_start = d.virtual_end();
        }
        if expected_start != self.total_virtual_size {
            return Err(format!(
                "sum of descriptor sizes {expected_start} != total_virtual_size {}",
                self.total_virtual_size
            ));
        }
        if self.key_to_idx.len() != self.descriptors.len() {
            return Err(format!(
                "key map has {} entries for {} descriptors",
                self.key_to_idx.len(),
                self.descriptors.len()
            ));
        }
        for (i, d) in self.descriptors.iter().enumerate() {
            match self.key_to_idx.get(&d.page_key) {
                Some(&mapped) if mapped == i => {}
                Some(&mapped) => {
                    return Err(format!(
                        "key {:?} maps to {mapped}, but lives at {i}",
                        d.page_key
                    ))
                }
                None => return Err(format!("key {:?} missing from key map", d.page_key)),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::PageDescriptor;

    fn mem(key: &str, start: u64, size: u64) -> PageDescriptor {
        PageDescriptor::new_memory(key.into(), start, size)
    }

    fn sample() -> PageIndex {
        let mut idx = PageIndex::new();
        idx.replace_all(vec![mem("a", 0, 10), mem("b", 10, 10), mem("c", 20, 10)]);
        idx
    }

    #[test]
    fn find_page_at_interior_and_boundaries() {
        let idx = sample();
        let (d, rel) = idx.find_page_at(0).unwrap();
        assert_eq!((d.page_key.as_str(), rel), ("a", 0));
        let (d, rel) = idx.find_page_at(9).unwrap();
        assert_eq!((d.page_key.as_str(), rel), ("a", 9));
        let (d, rel) = idx.find_page_at(10).unwrap();
        assert_eq!((d.page_key.as_str(), rel), ("b", 0));
        let (d, rel) = idx.find_page_at(30).unwrap();
        assert_eq!((d.page_key.as_str(), rel), ("c", 10));
        assert!(idx.find_page_at(31).is_none());
    }

    #[test]
    fn get_pages_in_range_intersects_correctly() {
        let idx = sample();
        let pages = idx.get_pages_in_range(5, 25);
        let keys: Vec<_> = pages.iter().map(|d| d.page_key.as_str()).collect();
        assert_eq!(keys, vec!["a", "b", "c"]);

        let pages = idx.get_pages_in_range(10, 20);
        let keys: Vec<_> = pages.iter().map(|d| d.page_key.as_str()).collect();
        assert_eq!(keys, vec!["b"]);

        assert!(idx.get_pages_in_range(5, 5).is_empty());
    }

    #[test]
    fn update_page_size_shifts_subsequent_starts() {
        let mut idx = sample();
        idx.update_page_size("a", 5).unwrap();
        assert_eq!(idx.get_by_key("a").unwrap().virtual_size, 15);
        assert_eq!(idx.get_by_key("b").unwrap().virtual_start, 15);
        assert_eq!(idx.get_by_key("c").unwrap().virtual_start, 25);
        assert_eq!(idx.total_virtual_size(), 35);
        idx.validate().unwrap();
    }

    #[test]
    fn update_page_size_negative_delta_shrinks_and_shifts_back() {
        let mut idx = sample();
        idx.update_page_size("b", -4).unwrap();
        assert_eq!(idx.get_by_key("b").unwrap().virtual_size, 6);
        assert_eq!(idx.get_by_key("c").unwrap().virtual_start, 16);
        idx.validate().unwrap();
    }

    #[test]
    fn split_page_inserts_remainder_after() {
        let mut idx = sample();
        let (new_idx, new_start, new_size, gen) = idx.split_page("b", 3, "b-split".into()).unwrap();
        assert_eq!(new_idx, 2);
        assert_eq!(new_start, 13);
        assert_eq!(new_size, 7);
        assert_eq!(gen, 1);
        assert_eq!(idx.get_by_key("b").unwrap().virtual_size, 3);
        assert_eq!(idx.get_by_key("b-split").unwrap().virtual_start, 13);
        assert_eq!(idx.get_by_key("c").unwrap().virtual_start, 20);
        idx.validate().unwrap();
    }

    #[test]
    fn merge_into_keeps_total_size_and_span() {
        let mut idx = sample();
        let absorbed_size = idx.merge_into("a", "b").unwrap();
        assert_eq!(absorbed_size, 10);
        assert_eq!(idx.get_by_key("a").unwrap().virtual_size, 20);
        assert_eq!(idx.get_by_key("a").unwrap().virtual_start, 0);
        assert!(idx.get_by_key("b").is_none());
        assert_eq!(idx.get_by_key("c").unwrap().virtual_start, 20);
        assert_eq!(idx.total_virtual_size(), 30);
        idx.validate().unwrap();
    }

    #[test]
    fn merge_into_when_absorbed_precedes_keep_moves_start_back() {
        let mut idx = sample();
        let absorbed_size = idx.merge_into("c", "b").unwrap();
        assert_eq!(absorbed_size, 10);
        assert_eq!(idx.get_by_key("c").unwrap().virtual_start, 10);
        assert_eq!(idx.get_by_key("c").unwrap().virtual_size, 20);
        idx.validate().unwrap();
    }

    #[test]
    fn merge_into_rejects_non_adjacent_keys() {
        let mut idx = sample();
        assert!(idx.merge_into("a", "c").is_none());
    }

    #[test]
    fn remove_page_closes_the_gap() {
        let mut idx = sample();
        idx.update_page_size("b", -10).unwrap();
        let removed = idx.remove_page("b").unwrap();
        assert_eq!(removed.page_key, "b");
        assert_eq!(idx.get_by_key("c").unwrap().virtual_start, 10);
        idx.validate().unwrap();
    }

    #[test]
    fn validate_rejects_broken_partition() {
        let mut idx = sample();
        // Directly corrupt a start to desynchronize the partition.
        let bad = idx.get_by_key_mut("b").unwrap();
        bad.virtual_start = 11;
        assert!(idx.validate().is_err());
    }
}
