//! The public `PagedBuffer` facade (§4.6): wires the Virtual Page Manager,
//! the Line/Marks manager, and the undo/redo system into one editing API,
//! and owns the save path -- atomic for the original file, direct for
//! "save as", both detachment-aware.

use crate::linemarks::LineMarksManager;
use crate::save_format;
use crate::storage::PageStorage;
use crate::undo_system::UndoRedoSystem;
use crate::vpm::VirtualPageManager;
use pbuf_core::{
    BufferConfig, BufferError, LineChar, LineInfo, MissingDataRange, Notification,
    NotificationKind, OpKind, Operation, Result,
};
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::io::AsyncWriteExt;

/// Whether a buffer's bytes can still be trusted to round-trip through its
/// original source (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IntegrityState {
    #[default]
    Clean,
    /// At least one page could not be loaded from its original source; the
    /// buffer has zero-filled stand-ins and a non-empty missing-range list.
    Detached,
    /// Reserved for a future corruption check stronger than "failed to
    /// load" (e.g. a checksum mismatch on read-back); not yet produced by
    /// anything in this crate.
    Corrupted,
}

/// The result of comparing a loaded file's current on-disk state against
/// what was true when it was loaded or last saved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileChangeStatus {
    pub size_changed: bool,
    pub mtime_changed: bool,
    pub deleted: bool,
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

fn io_save_err(target: &Path) -> impl Fn(std::io::Error) -> BufferError + '_ {
    move |e| BufferError::StorageSaveFailure {
        page_key: format!("save:{}", target.display()),
        source: e,
    }
}

/// The engine's single entry point: one buffer, one address space, one
/// undo history. Holds the Line/Marks manager behind `Rc<RefCell<_>>` and
/// hands the Virtual Page Manager a `Weak` back-reference so an edit can
/// notify marks/lines without the two halves sharing a single owner (§9).
pub struct PagedBuffer {
    config: BufferConfig,
    vpm: VirtualPageManager,
    line_marks: Rc<RefCell<LineMarksManager>>,
    undo: UndoRedoSystem,
    filename: Option<PathBuf>,
    file_size: u64,
    file_mtime: Option<SystemTime>,
    integrity: IntegrityState,
    unsaved_changes: bool,
    missing_ranges: Vec<MissingDataRange>,
    notification_sinks: Vec<Box<dyn FnMut(&Notification)>>,
}

impl PagedBuffer {
    pub fn new(config: BufferConfig, storage: Arc<dyn PageStorage>) -> Self {
        let line_marks = Rc::new(RefCell::new(LineMarksManager::new()));
        let mut vpm = VirtualPageManager::new(config, storage);
        vpm.attach_line_marks(Rc::downgrade(&line_marks));
        PagedBuffer {
            undo: UndoRedoSystem::new(config.max_undo_levels, config.merge_policy()),
            config,
            vpm,
            line_marks,
            filename: None,
            file_size: 0,
            file_mtime: None,
            integrity: IntegrityState::Clean,
            unsaved_changes: false,
            missing_ranges: Vec::new(),
            notification_sinks: Vec::new(),
        }
    }

    // -- loading ---------------------------------------------------------

    pub async fn load_file(&mut self, filename: impl Into<PathBuf>) -> Result<()> {
        let filename = filename.into();
        let meta = tokio::fs::metadata(&filename).await.map_err(|e| {
            let reason = if e.kind() == std::io::ErrorKind::PermissionDenied {
                pbuf_core::LoadFailureReason::PermissionDenied
            } else {
                pbuf_core::LoadFailureReason::FileDeleted
            };
            BufferError::LoadFailure {
                page_key: format!("{}", filename.display()),
                reason,
                source: Some(e),
            }
        })?;
        self.vpm.initialize_from_file(filename.clone(), meta.len());
        *self.line_marks.borrow_mut() = LineMarksManager::new();
        self.undo = UndoRedoSystem::new(self.config.max_undo_levels, self.config.merge_policy());
        self.filename = Some(filename);
        self.file_size = meta.len();
        self.file_mtime = meta.modified().ok();
        self.integrity = IntegrityState::Clean;
        self.unsaved_changes = false;
        self.missing_ranges.clear();
        self.drain_vpm_side_effects();
        self.emit(
            NotificationKind::BufferContentLoaded,
            "buffer content loaded from file".to_string(),
        );
        Ok(())
    }

    /// Loads `bytes` as the whole buffer content, with no associated file.
    /// Async only because applying the memory limit on a large `bytes` may
    /// need to spill dirty pages through `PageStorage` before returning.
    pub async fn load_content(&mut self, bytes: &[u8]) {
        self.vpm.initialize_from_content(bytes).await;
        *self.line_marks.borrow_mut() = LineMarksManager::new();
        self.undo = UndoRedoSystem::new(self.config.max_undo_levels, self.config.merge_policy());
        self.filename = None;
        self.file_size = bytes.len() as u64;
        self.file_mtime = None;
        self.integrity = IntegrityState::Clean;
        self.unsaved_changes = false;
        self.missing_ranges.clear();
        self.drain_vpm_side_effects();
        self.emit(
            NotificationKind::BufferContentLoaded,
            "buffer content loaded from memory".to_string(),
        );
    }

    // -- notifications / detachment bookkeeping --------------------------

    pub fn on_notification(&mut self, cb: impl FnMut(&Notification) + 'static) {
        self.notification_sinks.push(Box::new(cb));
    }

    fn emit(&mut self, kind: NotificationKind, message: String) {
        self.dispatch(Notification::new(kind, message));
    }

    fn dispatch(&mut self, n: Notification) {
        for sink in self.notification_sinks.iter_mut() {
            sink(&n);
        }
    }

    /// Drains whatever the VPM accumulated during the last call and folds
    /// any new missing ranges into buffer-level detachment state. Must be
    /// called after every `VirtualPageManager` method that can load a page.
    fn drain_vpm_side_effects(&mut self) {
        for n in self.vpm.take_notifications() {
            self.dispatch(n);
        }
        let missing = self.vpm.take_missing_ranges();
        if missing.is_empty() {
            return;
        }
        for range in missing {
            pbuf_core::missing::insert_and_merge(&mut self.missing_ranges, range);
        }
        if !matches!(self.integrity, IntegrityState::Detached) {
            self.integrity = IntegrityState::Detached;
            log::error!(target: "pbuf::buffer", "buffer detached: underlying data became unreadable");
            self.emit(
                NotificationKind::BufferDetached,
                "buffer detached: underlying data became unreadable; use Save As to preserve partial data".to_string(),
            );
        }
    }

    pub fn integrity_state(&self) -> IntegrityState {
        self.integrity
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.unsaved_changes
    }

    pub fn missing_ranges(&self) -> &[MissingDataRange] {
        &self.missing_ranges
    }

    pub fn filename(&self) -> Option<&Path> {
        self.filename.as_deref()
    }

    pub fn total_size(&self) -> u64 {
        self.vpm.total_virtual_size()
    }

    pub fn loaded_pages(&self) -> usize {
        self.vpm.loaded_pages()
    }

    // -- editing -----------------------------------------------------------

    pub async fn insert_bytes(
        &mut self,
        pos: u64,
        bytes: &[u8],
        relative_marks: Option<&[(String, u64)]>,
    ) -> Result<u64> {
        if pos > self.vpm.total_virtual_size() {
            return Err(BufferError::invalid_argument(format!(
                "insert position {pos} is past the end of the buffer"
            )));
        }
        let pre_marks = self.line_marks.borrow().snapshot_marks();
        let pre_line_count = self.line_marks.borrow().cached_line_count();
        let inserted = self.vpm.insert_at(pos, bytes).await?;
        self.drain_vpm_side_effects();
        if let Some(relative) = relative_marks {
            self.line_marks.borrow_mut().install_relative_marks(pos, relative);
        }
        self.unsaved_changes = true;
        self.undo.record(
            Operation {
                kind: OpKind::Insert,
                pre_execution_position: pos,
                data: bytes.to_vec(),
                original_data: Vec::new(),
                timestamp_ms: now_ms(),
                post_execution_position: pos + inserted,
            },
            pre_marks,
            pre_line_count,
        );
        Ok(inserted)
    }

    /// Deletes `[start, end)`, returning the removed bytes and the marks
    /// that fell inside the range (as `(name, offset relative to start)`)
    /// before the delete collapsed them, for a caller that wants to
    /// reinstall them on a later insert.
    pub async fn delete_bytes(
        &mut self,
        start: u64,
        end: u64,
    ) -> Result<(Vec<u8>, Vec<(String, u64)>)> {
        if start > end {
            return Err(BufferError::invalid_argument(format!(
                "delete range start {start} is after end {end}"
            )));
        }
        let extracted = self.line_marks.borrow().marks_in_range(start, end);
        let pre_marks = self.line_marks.borrow().snapshot_marks();
        let pre_line_count = self.line_marks.borrow().cached_line_count();
        let removed = self.vpm.delete_range(start, end).await?;
        self.drain_vpm_side_effects();
        self.unsaved_changes = true;
        self.undo.record(
            Operation {
                kind: OpKind::Delete,
                pre_execution_position: start,
                data: Vec::new(),
                original_data: removed.clone(),
                timestamp_ms: now_ms(),
                post_execution_position: start,
            },
            pre_marks,
            pre_line_count,
        );
        Ok((removed, extracted))
    }

    /// Replaces `[pos, pos+bytes.len())` with `bytes`, extending the buffer
    /// if the replaced range runs past the current end. Returns the
    /// displaced bytes.
    pub async fn overwrite_bytes(&mut self, pos: u64, bytes: &[u8]) -> Result<Vec<u8>> {
        let total = self.vpm.total_virtual_size();
        if pos > total {
            return Err(BufferError::invalid_argument(format!(
                "overwrite position {pos} is past the end of the buffer"
            )));
        }
        let pre_marks = self.line_marks.borrow().snapshot_marks();
        let pre_line_count = self.line_marks.borrow().cached_line_count();
        let end = (pos + bytes.len() as u64).min(total);
        let displaced = self.vpm.delete_range(pos, end).await?;
        self.vpm.insert_at(pos, bytes).await?;
        self.drain_vpm_side_effects();
        self.unsaved_changes = true;
        self.undo.record(
            Operation {
                kind: OpKind::Overwrite,
                pre_execution_position: pos,
                data: bytes.to_vec(),
                original_data: displaced.clone(),
                timestamp_ms: now_ms(),
                post_execution_position: pos + bytes.len() as u64,
            },
            pre_marks,
            pre_line_count,
        );
        Ok(displaced)
    }

    /// Reads `[start, end)`. Never fails: a detached range reads back as
    /// zeros.
    pub async fn get_bytes(&mut self, start: u64, end: u64) -> Vec<u8> {
        let out = self.vpm.read_range(start, end).await;
        self.drain_vpm_side_effects();
        out
    }

    // -- marks -------------------------------------------------------------

    pub fn set_mark(&mut self, name: impl Into<String>, address: u64) {
        self.line_marks.borrow_mut().set_mark(name, address);
    }

    pub fn get_mark(&self, name: &str) -> Option<u64> {
        self.line_marks.borrow().get_mark(name)
    }

    pub fn remove_mark(&mut self, name: &str) -> Option<u64> {
        self.line_marks.borrow_mut().remove_mark(name)
    }

    // -- lines / char conversions -------------------------------------------

    async fn ensure_lines_fresh(&mut self) {
        if self.line_marks.borrow().lines_are_fresh() {
            return;
        }
        let newlines = self.vpm.collect_all_newlines().await;
        self.drain_vpm_side_effects();
        self.line_marks.borrow_mut().rebuild_lines(newlines);
    }

    pub async fn line_count(&mut self) -> u64 {
        self.ensure_lines_fresh().await;
        self.line_marks.borrow().get_line_count()
    }

    pub async fn line_char_to_byte(&mut self, pos: LineChar) -> u64 {
        self.ensure_lines_fresh().await;
        let total = self.total_size();
        self.line_marks.borrow().line_char_to_byte(pos, total)
    }

    pub async fn byte_to_line_char(&mut self, byte: u64) -> LineChar {
        self.ensure_lines_fresh().await;
        self.line_marks.borrow().byte_to_line_char(byte)
    }

    pub async fn line_info(&mut self, n: u64) -> Option<LineInfo> {
        self.ensure_lines_fresh().await;
        let total = self.total_size();
        self.line_marks.borrow().get_line_info(n, total)
    }

    // -- undo / redo / transactions ------------------------------------------

    pub fn in_transaction(&self) -> bool {
        self.undo.in_transaction()
    }

    pub fn can_undo(&self) -> bool {
        self.undo.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.undo.can_redo()
    }

    pub fn begin_transaction(&mut self, name: Option<String>) -> Result<()> {
        let marks = self.line_marks.borrow().snapshot_marks();
        let line_count = self.line_marks.borrow().cached_line_count();
        self.undo.begin_transaction(name, marks, line_count)
    }

    pub fn commit_transaction(&mut self, final_name: Option<String>) -> Result<()> {
        self.undo.commit_transaction(final_name)
    }

    pub async fn rollback_transaction(&mut self) -> Result<()> {
        self.undo.rollback(&mut self.vpm, &self.line_marks).await?;
        self.drain_vpm_side_effects();
        Ok(())
    }

    pub async fn undo(&mut self) -> Result<bool> {
        let did = self.undo.undo(&mut self.vpm, &self.line_marks).await?;
        self.drain_vpm_side_effects();
        if did {
            self.unsaved_changes = true;
        }
        Ok(did)
    }

    pub async fn redo(&mut self) -> Result<bool> {
        let did = self.undo.redo(&mut self.vpm, &self.line_marks).await?;
        self.drain_vpm_side_effects();
        if did {
            self.unsaved_changes = true;
        }
        Ok(did)
    }

    // -- file-change detection ------------------------------------------

    /// Compares the loaded file's current on-disk state to what was true
    /// at load/save time. `None` if this buffer has no associated file.
    ///
    /// A single `stat(2)` via `rustix`, not one of the suspension points
    /// this crate exposes as `async`.
    pub fn check_file_changes(&self) -> Option<FileChangeStatus> {
        let path = self.filename.as_ref()?;
        match rustix::fs::stat(path) {
            Ok(meta) => {
                let mtime = UNIX_EPOCH
                    .checked_add(std::time::Duration::new(meta.st_mtime as u64, meta.st_mtime_nsec as u32));
                Some(FileChangeStatus {
                    size_changed: meta.st_size as u64 != self.file_size,
                    mtime_changed: mtime != self.file_mtime,
                    deleted: false,
                })
            }
            Err(_) => Some(FileChangeStatus {
                size_changed: false,
                mtime_changed: false,
                deleted: true,
            }),
        }
    }

    // -- save path -----------------------------------------------------

    /// Saves to `target`, or to the file this buffer was loaded from when
    /// `target` is `None`. Saving to the original path while detached
    /// requires `force_partial_save`; saving elsewhere never does.
    pub async fn save_file(&mut self, target: Option<PathBuf>, force_partial_save: bool) -> Result<()> {
        let target_path = target
            .or_else(|| self.filename.clone())
            .ok_or(BufferError::NoFilename)?;
        let is_original = self.filename.as_ref() == Some(&target_path);

        if is_original && matches!(self.integrity, IntegrityState::Detached) && !force_partial_save {
            return Err(BufferError::DetachedSave(target_path));
        }
        if is_original && !self.unsaved_changes && !matches!(self.integrity, IntegrityState::Detached) {
            self.emit(
                NotificationKind::SaveSkipped,
                "buffer has no unsaved changes; save skipped".to_string(),
            );
            return Ok(());
        }
        if is_original {
            self.atomic_save(&target_path).await
        } else {
            self.direct_save(&target_path).await
        }
    }

    /// Always a direct (non-atomic) save; permitted regardless of
    /// detachment since it never overwrites the buffer's original source.
    pub async fn save_as(&mut self, target: PathBuf) -> Result<()> {
        self.direct_save(&target).await
    }

    /// Copies the original file aside, rewires not-yet-loaded `Original`
    /// descriptors to read from that copy, writes the buffer's current
    /// content to the real target, then rewires descriptors to the
    /// freshly written file (unless detached, in which case the copy
    /// stays the read source -- the written file now contains marker
    /// text whose byte offsets no longer line up with the original).
    async fn atomic_save(&mut self, target: &Path) -> Result<()> {
        self.emit(
            NotificationKind::AtomicSaveStarted,
            format!("starting atomic save to {}", target.display()),
        );
        log::info!(target: "pbuf::buffer", "atomic save starting for {}", target.display());

        let tmp = target.with_extension(format!("pbuf-tmp-{}", now_ms()));
        match tokio::fs::copy(target, &tmp).await {
            Ok(_) => {
                self.vpm.rewire_original_filenames(&tmp);
                if let Err(e) = self.write_virtual_buffer(target).await {
                    self.vpm.rewire_original_filenames(&tmp);
                    return Err(e);
                }
                if matches!(self.integrity, IntegrityState::Detached) {
                    log::info!(
                        target: "pbuf::buffer",
                        "detached save: retaining {} as the read source for unloaded pages",
                        tmp.display()
                    );
                } else {
                    self.vpm.rewire_original_filenames(target);
                    match tokio::fs::remove_file(&tmp).await {
                        Ok(()) => self.emit(
                            NotificationKind::TempCleanup,
                            format!("removed temporary copy {}", tmp.display()),
                        ),
                        Err(e) => {
                            self.emit(
                                NotificationKind::TempCleanupFailed,
                                format!("failed to remove temporary copy {}: {e}", tmp.display()),
                            );
                            log::warn!(target: "pbuf::buffer", "failed to remove temp copy {}: {e}", tmp.display());
                        }
                    }
                }
            }
            // The original file is simply gone -- nothing to copy aside, so
            // fall back to writing the target directly.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::warn!(
                    target: "pbuf::buffer",
                    "original file {} is gone; saving without a temp-copy safety net",
                    target.display()
                );
                self.write_virtual_buffer(target).await?;
                if !matches!(self.integrity, IntegrityState::Detached) {
                    self.vpm.rewire_original_filenames(target);
                }
            }
            Err(e) => return Err(io_save_err(target)(e)),
        }

        self.post_save_bookkeeping(target).await;
        self.emit(
            NotificationKind::SaveCompleted,
            format!("saved to {}", target.display()),
        );
        Ok(())
    }

    async fn direct_save(&mut self, target: &Path) -> Result<()> {
        self.write_virtual_buffer(target).await?;
        if !matches!(self.integrity, IntegrityState::Detached) {
            self.vpm.rewire_original_filenames(target);
        }
        self.post_save_bookkeeping(target).await;
        self.emit(
            NotificationKind::SaveCompleted,
            format!("saved to {}", target.display()),
        );
        Ok(())
    }

    /// Streams the buffer's virtual content to `target` in page-sized
    /// chunks, splicing in the missing-data summary and inline markers when
    /// detached, and handling the rarer case of a page going bad mid-save
    /// (§4.6 "late corruption").
    async fn write_virtual_buffer(&mut self, target: &Path) -> Result<()> {
        let mut file = tokio::fs::File::create(target)
            .await
            .map_err(io_save_err(target))?;

        if matches!(self.integrity, IntegrityState::Detached) {
            let summary = save_format::render_summary(&self.missing_ranges);
            file.write_all(summary.as_bytes())
                .await
                .map_err(io_save_err(target))?;
            self.emit(
                NotificationKind::DetachedSaveSummary,
                format!(
                    "wrote missing-data summary for {} range(s)",
                    self.missing_ranges.len()
                ),
            );
        }

        let total = self.vpm.total_virtual_size();
        let chunk_size = self.config.page_size.max(1) * self.config.max_memory_pages.max(1) as u64;
        let mut missing_iter = self.missing_ranges.clone().into_iter().peekable();
        let mut pos = 0u64;
        while pos < total {
            if let Some(range) = missing_iter.peek() {
                if range.virtual_start == pos {
                    let marker = save_format::render_marker(range, total);
                    file.write_all(marker.as_bytes())
                        .await
                        .map_err(io_save_err(target))?;
                    pos = range.virtual_end.min(total);
                    missing_iter.next();
                    continue;
                }
            }
            let chunk_end = missing_iter
                .peek()
                .map(|r| r.virtual_start)
                .unwrap_or(total)
                .min(pos + chunk_size)
                .min(total);
            let was_detached = matches!(self.integrity, IntegrityState::Detached);
            let bytes = self.vpm.read_range(pos, chunk_end).await;
            self.drain_vpm_side_effects();
            if !was_detached && matches!(self.integrity, IntegrityState::Detached) {
                let marker = save_format::render_emergency_marker(pos);
                file.write_all(marker.as_bytes())
                    .await
                    .map_err(io_save_err(target))?;
                self.emit(
                    NotificationKind::EmergencyMissingData,
                    format!("data became unavailable mid-save at buffer address {pos}"),
                );
                log::error!(target: "pbuf::buffer", "data became unavailable mid-save at {pos}");
            }
            file.write_all(&bytes).await.map_err(io_save_err(target))?;
            pos = chunk_end;
            tokio::task::yield_now().await;
        }
        file.flush().await.map_err(io_save_err(target))?;
        Ok(())
    }

    async fn post_save_bookkeeping(&mut self, target: &Path) {
        self.filename = Some(target.to_path_buf());
        match tokio::fs::metadata(target).await {
            Ok(meta) => {
                self.file_size = meta.len();
                self.file_mtime = meta.modified().ok();
            }
            Err(_) => {
                self.file_size = self.vpm.total_virtual_size();
                self.file_mtime = None;
            }
        }
        self.unsaved_changes = false;
        if !matches!(self.integrity, IntegrityState::Detached) {
            self.integrity = IntegrityState::Clean;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn small_page_config() -> BufferConfig {
        BufferConfig {
            page_size: 4,
            ..BufferConfig::default()
        }
    }

    #[tokio::test]
    async fn insert_and_read_back_through_the_facade() {
        let mut buf = PagedBuffer::new(BufferConfig::default(), Arc::new(MemoryStorage::new()));
        buf.load_content(b"Hello World").await;
        buf.insert_bytes(6, b"Beautiful ", None).await.unwrap();
        let total = buf.total_size();
        assert_eq!(buf.get_bytes(0, total).await, b"Hello Beautiful World");
    }

    #[tokio::test]
    async fn undo_and_redo_round_trip_through_the_facade() {
        let mut buf = PagedBuffer::new(BufferConfig::default(), Arc::new(MemoryStorage::new()));
        buf.load_content(b"Hello World").await;
        buf.insert_bytes(6, b"Beautiful ", None).await.unwrap();
        buf.undo().await.unwrap();
        let total = buf.total_size();
        assert_eq!(buf.get_bytes(0, total).await, b"Hello World");
        buf.redo().await.unwrap();
        let total = buf.total_size();
        assert_eq!(buf.get_bytes(0, total).await, b"Hello Beautiful World");
    }

    #[tokio::test]
    async fn committed_transaction_undoes_as_one_group() {
        let mut buf = PagedBuffer::new(BufferConfig::default(), Arc::new(MemoryStorage::new()));
        buf.load_content(b"Hello").await;
        buf.begin_transaction(Some("paste".into())).unwrap();
        buf.insert_bytes(5, b" World", None).await.unwrap();
        buf.insert_bytes(11, b"!", None).await.unwrap();
        buf.commit_transaction(None).unwrap();

        let total = buf.total_size();
        assert_eq!(buf.get_bytes(0, total).await, b"Hello World!");
        assert!(buf.undo().await.unwrap());
        let total = buf.total_size();
        assert_eq!(buf.get_bytes(0, total).await, b"Hello");
        assert!(!buf.can_undo());
    }

    #[tokio::test]
    async fn line_and_mark_queries_track_edits() {
        let mut buf = PagedBuffer::new(BufferConfig::default(), Arc::new(MemoryStorage::new()));
        buf.load_content(b"first\nsecond\nthird").await;
        assert_eq!(buf.line_count().await, 3);
        let lc = buf.byte_to_line_char(6).await;
        assert_eq!(lc.line, 2);
        assert_eq!(lc.character, 1);

        buf.set_mark("cursor", 6);
        buf.insert_bytes(0, b"XX", None).await.unwrap();
        assert_eq!(buf.get_mark("cursor"), Some(8));
    }

    #[tokio::test]
    async fn missing_original_file_triggers_detachment_on_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.txt");
        tokio::fs::write(&path, b"Hello World").await.unwrap();

        let mut buf = PagedBuffer::new(small_page_config(), Arc::new(MemoryStorage::new()));
        buf.load_file(&path).await.unwrap();
        assert_eq!(buf.integrity_state(), IntegrityState::Clean);

        tokio::fs::remove_file(&path).await.unwrap();
        let total = buf.total_size();
        let _ = buf.get_bytes(0, total).await;

        assert_eq!(buf.integrity_state(), IntegrityState::Detached);
        assert!(!buf.missing_ranges().is_empty());
    }

    #[tokio::test]
    async fn detached_buffer_refuses_plain_save_to_original_without_force() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.txt");
        tokio::fs::write(&path, b"Hello World").await.unwrap();

        let mut buf = PagedBuffer::new(small_page_config(), Arc::new(MemoryStorage::new()));
        buf.load_file(&path).await.unwrap();
        tokio::fs::remove_file(&path).await.unwrap();
        let total = buf.total_size();
        let _ = buf.get_bytes(0, total).await;
        assert_eq!(buf.integrity_state(), IntegrityState::Detached);

        let err = buf.save_file(None, false).await.unwrap_err();
        assert!(matches!(err, BufferError::DetachedSave(_)));

        buf.save_file(None, true).await.unwrap();
        let saved = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(saved.contains("MISSING DATA SUMMARY"));
    }

    #[tokio::test]
    async fn save_as_always_permitted_while_detached() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.txt");
        tokio::fs::write(&path, b"Hello World").await.unwrap();
        let other = dir.path().join("copy.txt");

        let mut buf = PagedBuffer::new(small_page_config(), Arc::new(MemoryStorage::new()));
        buf.load_file(&path).await.unwrap();
        tokio::fs::remove_file(&path).await.unwrap();
        let total = buf.total_size();
        let _ = buf.get_bytes(0, total).await;

        buf.save_as(other.clone()).await.unwrap();
        let saved = tokio::fs::read_to_string(&other).await.unwrap();
        assert!(saved.contains("MISSING DATA SUMMARY"));
    }
}
