//! Operation records, groups, and the pure merge-decision function (§4.5).
//!
//! Execution against the Virtual Page Manager lives in the I/O crate
//! (`pbuf::undo_system`), since undo/redo replay real page mutations. This
//! module only holds the data and the merge policy, so the policy can be
//! unit tested as "a pure function of `(lastOp, newOp, mergeTimeWindow,
//! mergePositionWindow)`" exactly as the design notes require.

use crate::marks::MarkSet;

/// The kind of a recorded operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Insert,
    Delete,
    Overwrite,
}

/// One recorded mutation. `data` is the bytes inserted (for `Insert`/
/// `Overwrite`); `original_data` is the bytes displaced (for `Delete`/
/// `Overwrite`).
#[derive(Debug, Clone)]
pub struct Operation {
    pub kind: OpKind,
    pub pre_execution_position: u64,
    pub data: Vec<u8>,
    pub original_data: Vec<u8>,
    pub timestamp_ms: i64,
    pub post_execution_position: u64,
}

impl Operation {
    /// The post-execution coordinate-space "end" used by the merge-distance
    /// calculation: `prePos + data.len()` for insert/overwrite, `prePos`
    /// for delete (a delete doesn't advance the cursor).
    pub fn logical_end(&self) -> u64 {
        match self.kind {
            OpKind::Insert | OpKind::Overwrite => {
                self.pre_execution_position + self.data.len() as u64
            }
            OpKind::Delete => self.pre_execution_position,
        }
    }
}

/// One undo/redo unit: either a single operation, several logically merged
/// operations, or a committed transaction's batch.
#[derive(Debug, Clone)]
pub struct OperationGroup {
    pub operations: Vec<Operation>,
    /// Marks as they were immediately before this group's first operation.
    pub pre_marks: MarkSet,
    /// Line count immediately before this group's first operation.
    pub pre_line_count: u64,
    pub is_from_transaction: bool,
    /// Optional human label (transaction name, or None for ad hoc groups).
    pub name: Option<String>,
}

impl OperationGroup {
    pub fn single(op: Operation, pre_marks: MarkSet, pre_line_count: u64) -> Self {
        OperationGroup {
            operations: vec![op],
            pre_marks,
            pre_line_count,
            is_from_transaction: false,
            name: None,
        }
    }
}

/// The merge-policy knobs, a subset of `BufferConfig`.
#[derive(Debug, Clone, Copy)]
pub struct MergePolicy {
    pub merge_time_window_ms: i64,
    pub merge_position_window: u64,
}

impl Default for MergePolicy {
    fn default() -> Self {
        MergePolicy {
            merge_time_window_ms: 5000,
            merge_position_window: 0,
        }
    }
}

/// What `merge_decision` recommends doing with `new_op` relative to the top
/// group on the undo stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Start a brand new group.
    NewGroup,
    /// Append `new_op` to the existing group as a distinct entry.
    LogicalMerge,
    /// Concatenate `new_op.data` onto the last operation's `data` in place.
    PhysicalMerge,
}

/// Decides how `new_op` relates to `last_op`, the most recent operation in
/// the top group of the undo stack. `top_group_is_transaction` must be
/// `true` when that group was produced by a committed transaction (such
/// groups never accept further merges).
///
/// Pure function of its inputs: no I/O, no hidden state, unit-testable in
/// isolation as the design notes require.
pub fn merge_decision(
    last_op: &Operation,
    new_op: &Operation,
    top_group_is_transaction: bool,
    policy: MergePolicy,
) -> MergeOutcome {
    if top_group_is_transaction {
        return MergeOutcome::NewGroup;
    }
    if (new_op.timestamp_ms - last_op.timestamp_ms).abs() > policy.merge_time_window_ms {
        return MergeOutcome::NewGroup;
    }
    let last_end = last_op.logical_end();
    let distance = 0i64
        .max(new_op.pre_execution_position as i64 - last_end as i64)
        .max(last_op.pre_execution_position as i64 - new_op.pre_execution_position as i64)
        as u64;
    if distance > policy.merge_position_window {
        return MergeOutcome::NewGroup;
    }
    let contiguous_insert = last_op.kind == OpKind::Insert
        && new_op.kind == OpKind::Insert
        && new_op.pre_execution_position == last_op.pre_execution_position + last_op.data.len() as u64
        && distance == 0;
    if contiguous_insert {
        MergeOutcome::PhysicalMerge
    } else {
        MergeOutcome::LogicalMerge
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn insert_at(pos: u64, data: &str, ts: i64) -> Operation {
        Operation {
            kind: OpKind::Insert,
            pre_execution_position: pos,
            data: data.as_bytes().to_vec(),
            original_data: Vec::new(),
            timestamp_ms: ts,
            post_execution_position: pos + data.len() as u64,
        }
    }

    fn delete_at(pos: u64, removed: &str, ts: i64) -> Operation {
        Operation {
            kind: OpKind::Delete,
            pre_execution_position: pos,
            data: Vec::new(),
            original_data: removed.as_bytes().to_vec(),
            timestamp_ms: ts,
            post_execution_position: pos,
        }
    }

    #[test]
    fn contiguous_inserts_within_window_physically_merge() {
        let last = insert_at(0, "H", 1000);
        let new = insert_at(1, "e", 1010);
        let outcome = merge_decision(&last, &new, false, MergePolicy::default());
        assert_eq!(outcome, MergeOutcome::PhysicalMerge);
    }

    #[test]
    fn non_adjacent_insert_forces_new_group_under_default_zero_window() {
        // mergePositionWindow defaults to 0, so even an insert two past the
        // end of the last op is outside the window and forces a new group,
        // not a logical merge.
        let last = insert_at(0, "H", 1000);
        let new = insert_at(2, "x", 1010);
        let outcome = merge_decision(&last, &new, false, MergePolicy::default());
        assert_eq!(outcome, MergeOutcome::NewGroup);
    }

    #[test]
    fn insert_within_nonzero_position_window_logically_merges() {
        let last = insert_at(0, "H", 1000);
        let new = insert_at(2, "x", 1010);
        let policy = MergePolicy {
            merge_time_window_ms: 5000,
            merge_position_window: 2,
        };
        let outcome = merge_decision(&last, &new, false, policy);
        assert_eq!(outcome, MergeOutcome::LogicalMerge);
    }

    #[test]
    fn outside_time_window_forces_new_group() {
        let last = insert_at(0, "H", 0);
        let new = insert_at(1, "e", 10_000);
        let outcome = merge_decision(&last, &new, false, MergePolicy::default());
        assert_eq!(outcome, MergeOutcome::NewGroup);
    }

    #[test]
    fn transaction_groups_never_merge() {
        let last = insert_at(0, "H", 1000);
        let new = insert_at(1, "e", 1010);
        let outcome = merge_decision(&last, &new, true, MergePolicy::default());
        assert_eq!(outcome, MergeOutcome::NewGroup);
    }

    #[test]
    fn delete_then_delete_adjacent_logically_merges() {
        let last = delete_at(5, "x", 1000);
        let new = delete_at(5, "y", 1010);
        let outcome = merge_decision(&last, &new, false, MergePolicy::default());
        // Deletes never physically merge (only insert+insert does), but
        // repeated deletes at the same collapsed position are adjacent.
        assert_eq!(outcome, MergeOutcome::LogicalMerge);
    }
}
