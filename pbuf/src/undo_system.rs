//! Recording, transactions, and undo/redo execution against the Virtual
//! Page Manager (§4.5). The merge *policy* is pure and lives in
//! `pbuf_core::undo`; this module is the stateful half that owns the
//! stacks and actually replays operations.

use crate::linemarks::LineMarksManager;
use crate::vpm::VirtualPageManager;
use pbuf_core::{
    BufferError, MarkSet, MergeOutcome, MergePolicy, OpKind, Operation, OperationGroup, Result,
};
use std::cell::RefCell;
use std::rc::Rc;

struct Transaction {
    name: Option<String>,
    operations: Vec<Operation>,
    initial_marks: MarkSet,
    initial_line_count: u64,
}

/// Owns the undo and redo stacks and the (at most one) open transaction.
pub struct UndoRedoSystem {
    undo_stack: Vec<OperationGroup>,
    redo_stack: Vec<OperationGroup>,
    max_undo_levels: usize,
    policy: MergePolicy,
    transaction: Option<Transaction>,
}

impl UndoRedoSystem {
    pub fn new(max_undo_levels: usize, policy: MergePolicy) -> Self {
        UndoRedoSystem {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            max_undo_levels,
            policy,
            transaction: None,
        }
    }

    pub fn in_transaction(&self) -> bool {
        self.transaction.is_some()
    }

    pub fn undo_len(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo_stack.len()
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty() || self.in_transaction()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty() && !self.in_transaction()
    }

    pub fn begin_transaction(
        &mut self,
        name: Option<String>,
        initial_marks: MarkSet,
        initial_line_count: u64,
    ) -> Result<()> {
        if self.transaction.is_some() {
            return Err(BufferError::invalid_argument(
                "a transaction is already open",
            ));
        }
        self.transaction = Some(Transaction {
            name,
            operations: Vec::new(),
            initial_marks,
            initial_line_count,
        });
        Ok(())
    }

    /// Packages the open transaction's operations into a single
    /// `is_from_transaction` group. An empty transaction still succeeds
    /// but pushes nothing onto the undo stack.
    pub fn commit_transaction(&mut self, final_name: Option<String>) -> Result<()> {
        let txn = self
            .transaction
            .take()
            .ok_or_else(|| BufferError::invalid_argument("no transaction is open"))?;
        self.redo_stack.clear();
        if txn.operations.is_empty() {
            return Ok(());
        }
        let group = OperationGroup {
            operations: txn.operations,
            pre_marks: txn.initial_marks,
            pre_line_count: txn.initial_line_count,
            is_from_transaction: true,
            name: final_name.or(txn.name),
        };
        self.push_group(group);
        Ok(())
    }

    /// Records a mutation. Inside a transaction it just accumulates;
    /// otherwise it attempts to merge with the top undo group per
    /// `merge_decision`, falling back to a new group. Always clears the
    /// redo stack (§4.5: "any new recording clears the redo stack").
    pub fn record(&mut self, op: Operation, pre_marks: MarkSet, pre_line_count: u64) {
        if let Some(txn) = self.transaction.as_mut() {
            txn.operations.push(op);
            return;
        }
        self.redo_stack.clear();
        let top_is_transaction = self
            .undo_stack
            .last()
            .map(|g| g.is_from_transaction)
            .unwrap_or(false);
        let outcome = match self.undo_stack.last().and_then(|g| g.operations.last()) {
            Some(last_op) => pbuf_core::undo::merge_decision(last_op, &op, top_is_transaction, self.policy),
            None => MergeOutcome::NewGroup,
        };
        match outcome {
            MergeOutcome::NewGroup => {
                self.push_group(OperationGroup::single(op, pre_marks, pre_line_count));
            }
            MergeOutcome::LogicalMerge => {
                self.undo_stack
                    .last_mut()
                    .expect("outcome implies a top group exists")
                    .operations
                    .push(op);
            }
            MergeOutcome::PhysicalMerge => {
                let top = self
                    .undo_stack
                    .last_mut()
                    .expect("outcome implies a top group exists");
                let last = top.operations.last_mut().expect("non-empty group");
                last.data.extend_from_slice(&op.data);
                last.post_execution_position = op.post_execution_position;
            }
        }
    }

    fn push_group(&mut self, group: OperationGroup) {
        self.undo_stack.push(group);
        if self.undo_stack.len() > self.max_undo_levels {
            self.undo_stack.remove(0);
        }
    }

    /// Replays `txn.operations` in reverse against `vpm` and restores the
    /// transaction's initial marks snapshot. Nothing is pushed to either
    /// stack -- a rolled-back transaction leaves no undo/redo trace.
    pub async fn rollback(
        &mut self,
        vpm: &mut VirtualPageManager,
        line_marks: &Rc<RefCell<LineMarksManager>>,
    ) -> Result<()> {
        let txn = self
            .transaction
            .take()
            .ok_or_else(|| BufferError::invalid_argument("no transaction is open"))?;
        for op in txn.operations.iter().rev() {
            invert(vpm, op).await?;
        }
        let total = vpm.total_virtual_size();
        line_marks
            .borrow_mut()
            .restore_marks(txn.initial_marks, total);
        Ok(())
    }

    /// `undo()` while a transaction is open is defined as an alias for
    /// `rollback()`.
    pub async fn undo(
        &mut self,
        vpm: &mut VirtualPageManager,
        line_marks: &Rc<RefCell<LineMarksManager>>,
    ) -> Result<bool> {
        if self.in_transaction() {
            self.rollback(vpm, line_marks).await?;
            return Ok(true);
        }
        let Some(group) = self.undo_stack.pop() else {
            return Ok(false);
        };
        for op in group.operations.iter().rev() {
            invert(vpm, op).await?;
        }
        let total = vpm.total_virtual_size();
        line_marks
            .borrow_mut()
            .restore_marks(group.pre_marks.clone(), total);
        self.redo_stack.push(group);
        Ok(true)
    }

    pub async fn redo(
        &mut self,
        vpm: &mut VirtualPageManager,
        line_marks: &Rc<RefCell<LineMarksManager>>,
    ) -> Result<bool> {
        if self.in_transaction() {
            return Err(BufferError::invalid_argument(
                "redo is disabled while a transaction is open",
            ));
        }
        let Some(mut group) = self.redo_stack.pop() else {
            return Ok(false);
        };
        // Snapshot the state right before replay so a subsequent undo
        // knows what to restore to.
        group.pre_marks = line_marks.borrow().snapshot_marks();
        group.pre_line_count = line_marks.borrow().get_line_count();
        for op in group.operations.iter() {
            apply(vpm, op).await?;
        }
        self.undo_stack.push(group);
        Ok(true)
    }
}

async fn invert(vpm: &mut VirtualPageManager, op: &Operation) -> Result<()> {
    match op.kind {
        OpKind::Insert => {
            vpm.delete_range(
                op.pre_execution_position,
                op.pre_execution_position + op.data.len() as u64,
            )
            .await?;
        }
        OpKind::Delete => {
            vpm.insert_at(op.pre_execution_position, &op.original_data)
                .await?;
        }
        OpKind::Overwrite => {
            vpm.delete_range(
                op.pre_execution_position,
                op.pre_execution_position + op.data.len() as u64,
            )
            .await?;
            vpm.insert_at(op.pre_execution_position, &op.original_data)
                .await?;
        }
    }
    Ok(())
}

async fn apply(vpm: &mut VirtualPageManager, op: &Operation) -> Result<()> {
    match op.kind {
        OpKind::Insert => {
            vpm.insert_at(op.pre_execution_position, &op.data).await?;
        }
        OpKind::Delete => {
            vpm.delete_range(
                op.pre_execution_position,
                op.pre_execution_position + op.original_data.len() as u64,
            )
            .await?;
        }
        OpKind::Overwrite => {
            vpm.delete_range(
                op.pre_execution_position,
                op.pre_execution_position + op.original_data.len() as u64,
            )
            .await?;
            vpm.insert_at(op.pre_execution_position, &op.data).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pbuf_core::BufferConfig;
    use crate::storage::MemoryStorage;
    use std::sync::Arc;

    fn op_insert(pos: u64, data: &str, ts: i64) -> Operation {
        Operation {
            kind: OpKind::Insert,
            pre_execution_position: pos,
            data: data.as_bytes().to_vec(),
            original_data: Vec::new(),
            timestamp_ms: ts,
            post_execution_position: pos + data.len() as u64,
        }
    }

    #[test]
    fn contiguous_inserts_physically_merge_into_one_group() {
        let mut u = UndoRedoSystem::new(50, MergePolicy::default());
        u.record(op_insert(0, "H", 1000), MarkSet::new(), 1);
        u.record(op_insert(1, "e", 1001), MarkSet::new(), 1);
        u.record(op_insert(2, "l", 1002), MarkSet::new(), 1);
        assert_eq!(u.undo_len(), 1);
    }

    #[test]
    fn undo_stack_cap_evicts_oldest() {
        let mut u = UndoRedoSystem::new(2, MergePolicy {
            merge_time_window_ms: 0,
            merge_position_window: 0,
        });
        u.record(op_insert(0, "a", 0), MarkSet::new(), 1);
        u.record(op_insert(100, "b", 100_000), MarkSet::new(), 1);
        u.record(op_insert(200, "c", 200_000), MarkSet::new(), 1);
        assert_eq!(u.undo_len(), 2);
    }

    #[tokio::test]
    async fn undo_and_redo_round_trip_a_basic_edit() {
        let config = BufferConfig::default();
        let mut vpm = VirtualPageManager::new(config, Arc::new(MemoryStorage::new()));
        vpm.initialize_from_content(b"Hello World").await;
        let line_marks = Rc::new(RefCell::new(LineMarksManager::new()));
        let mut u = UndoRedoSystem::new(50, config.merge_policy());

        let pre_marks = line_marks.borrow().snapshot_marks();
        vpm.insert_at(6, b"Beautiful ").await.unwrap();
        u.record(
            op_insert(6, "Beautiful ", 0),
            pre_marks,
            line_marks.borrow().get_line_count(),
        );

        assert_eq!(vpm.read_range(0, vpm.total_virtual_size()).await, b"Hello Beautiful World");
        u.undo(&mut vpm, &line_marks).await.unwrap();
        assert_eq!(vpm.read_range(0, vpm.total_virtual_size()).await, b"Hello World");
        u.redo(&mut vpm, &line_marks).await.unwrap();
        assert_eq!(vpm.read_range(0, vpm.total_virtual_size()).await, b"Hello Beautiful World");
    }

    #[tokio::test]
    async fn transaction_rollback_discards_without_undo_trace() {
        let config = BufferConfig::default();
        let mut vpm = VirtualPageManager::new(config, Arc::new(MemoryStorage::new()));
        vpm.initialize_from_content(b"Initial content").await;
        let line_marks = Rc::new(RefCell::new(LineMarksManager::new()));
        let mut u = UndoRedoSystem::new(50, config.merge_policy());

        u.begin_transaction(Some("t".into()), line_marks.borrow().snapshot_marks(), 1)
            .unwrap();
        vpm.insert_at(0, b"This will be rolled back ").await.unwrap();
        u.record(op_insert(0, "This will be rolled back ", 0), MarkSet::new(), 1);
        u.rollback(&mut vpm, &line_marks).await.unwrap();

        assert_eq!(vpm.read_range(0, vpm.total_virtual_size()).await, b"Initial content");
        assert_eq!(u.undo_len(), 0);
        assert!(!u.in_transaction());
    }
}
