//! Missing data ranges, tracked only while a buffer is detached (§3, §4.6).

use crate::error::LoadFailureReason;

/// A virtual interval whose bytes were lost to an I/O failure.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde1", derive(serde::Serialize, serde::Deserialize))]
pub struct MissingDataRange {
    pub virtual_start: u64,
    pub virtual_end: u64,
    pub original_file_start: Option<u64>,
    pub original_file_end: Option<u64>,
    pub reason: LoadFailureReason,
}

impl MissingDataRange {
    pub fn size(&self) -> u64 {
        self.virtual_end - self.virtual_start
    }

    fn overlaps_or_touches(&self, other: &MissingDataRange) -> bool {
        self.virtual_start <= other.virtual_end && other.virtual_start <= self.virtual_end
    }

    fn merged_with(&self, other: &MissingDataRange) -> MissingDataRange {
        MissingDataRange {
            virtual_start: self.virtual_start.min(other.virtual_start),
            virtual_end: self.virtual_end.max(other.virtual_end),
            original_file_start: match (self.original_file_start, other.original_file_start) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            },
            original_file_end: match (self.original_file_end, other.original_file_end) {
                (Some(a), Some(b)) => Some(a.max(b)),
                (a, b) => a.or(b),
            },
            // Keep the earlier range's reason; a later overlapping failure
            // doesn't change why the earliest bytes went missing.
            reason: self.reason,
        }
    }
}

/// Merges `new_range` into `existing`, combining any overlapping or
/// adjacent ranges into one, and keeps the whole list sorted by
/// `virtual_start`.
pub fn insert_and_merge(existing: &mut Vec<MissingDataRange>, new_range: MissingDataRange) {
    existing.push(new_range);
    existing.sort_by_key(|r| r.virtual_start);
    let mut merged: Vec<MissingDataRange> = Vec::with_capacity(existing.len());
    for range in existing.drain(..) {
        match merged.last_mut() {
            Some(last) if last.overlaps_or_touches(&range) => {
                *last = last.merged_with(&range);
            }
            _ => merged.push(range),
        }
    }
    *existing = merged;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(start: u64, end: u64) -> MissingDataRange {
        MissingDataRange {
            virtual_start: start,
            virtual_end: end,
            original_file_start: Some(start),
            original_file_end: Some(end),
            reason: LoadFailureReason::FileTruncated,
        }
    }

    #[test]
    fn disjoint_ranges_stay_separate() {
        let mut ranges = vec![range(0, 10)];
        insert_and_merge(&mut ranges, range(20, 30));
        assert_eq!(ranges.len(), 2);
    }

    #[test]
    fn overlapping_ranges_merge() {
        let mut ranges = vec![range(0, 10)];
        insert_and_merge(&mut ranges, range(5, 15));
        assert_eq!(ranges, vec![range(0, 15)]);
    }

    #[test]
    fn adjacent_ranges_merge() {
        let mut ranges = vec![range(0, 10)];
        insert_and_merge(&mut ranges, range(10, 20));
        assert_eq!(ranges, vec![range(0, 20)]);
    }

    #[test]
    fn out_of_order_insertion_still_merges() {
        let mut ranges = vec![range(20, 30)];
        insert_and_merge(&mut ranges, range(0, 10));
        insert_and_merge(&mut ranges, range(9, 21));
        assert_eq!(ranges, vec![range(0, 30)]);
    }
}
