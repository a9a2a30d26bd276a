//! The Virtual Page Manager (§4.3): address translation, page loading,
//! insert/delete, split/merge, and LRU eviction with storage write-back.

use crate::pageinfo::PageInfo;
use crate::storage::PageStorage;
use crate::linemarks::LineMarksManager;
use lru::LruCache;
use pbuf_core::{
    BufferConfig, BufferError, LoadFailureReason, MissingDataRange, Notification,
    NotificationKind, PageDescriptor, PageIndex, Result, SourceInfo, SourceType,
};
use std::cell::RefCell;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static SPLIT_SEQ: AtomicU64 = AtomicU64::new(0);

fn fresh_key(prefix: &str) -> String {
    format!("{prefix}-{:016x}", SPLIT_SEQ.fetch_add(1, Ordering::Relaxed))
}

/// Owns the address index and the resident page cache. Reads never fail;
/// a page that cannot be loaded becomes a zero-filled stand-in and the
/// affected virtual range is recorded as missing, which the Buffer
/// facade turns into buffer detachment.
pub struct VirtualPageManager {
    config: BufferConfig,
    storage: Arc<dyn PageStorage>,
    index: PageIndex,
    cache: LruCache<String, PageInfo>,
    line_marks: Option<Weak<RefCell<LineMarksManager>>>,
    pending_notifications: Vec<Notification>,
    pending_missing: Vec<MissingDataRange>,
}

impl VirtualPageManager {
    pub fn new(config: BufferConfig, storage: Arc<dyn PageStorage>) -> Self {
        VirtualPageManager {
            config,
            storage,
            index: PageIndex::new(),
            cache: LruCache::unbounded(),
            line_marks: None,
            pending_notifications: Vec::new(),
            pending_missing: Vec::new(),
        }
    }

    pub fn attach_line_marks(&mut self, lm: Weak<RefCell<LineMarksManager>>) {
        self.line_marks = Some(lm);
    }

    pub fn config(&self) -> &BufferConfig {
        &self.config
    }

    pub fn index(&self) -> &PageIndex {
        &self.index
    }

    pub fn total_virtual_size(&self) -> u64 {
        self.index.total_virtual_size()
    }

    pub fn loaded_pages(&self) -> usize {
        self.cache.len()
    }

    pub fn take_notifications(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.pending_notifications)
    }

    pub fn take_missing_ranges(&mut self) -> Vec<MissingDataRange> {
        std::mem::take(&mut self.pending_missing)
    }

    fn notify(&mut self, n: Notification) {
        self.pending_notifications.push(n);
    }

    fn notify_line_marks(&self, pos: u64, deleted: u64, inserted: u64) {
        if let Some(lm) = self.line_marks.as_ref().and_then(|w| w.upgrade()) {
            lm.borrow_mut().notify_edit(pos, deleted, inserted);
        }
    }

    // -- initialization -----------------------------------------------

    /// Partitions `[0, file_size)` into one `Original` descriptor per
    /// `page_size` chunk; loads nothing. An empty file gets a single
    /// empty placeholder descriptor.
    pub fn initialize_from_file(&mut self, filename: PathBuf, file_size: u64) {
        self.cache.clear();
        let page_size = self.config.page_size.max(1);
        if file_size == 0 {
            let desc = PageDescriptor::new_original(
                fresh_key("orig"),
                0,
                0,
                filename,
                0,
                0,
            );
            self.index.replace_all(vec![desc]);
            return;
        }
        let mut descriptors = Vec::new();
        let mut offset = 0u64;
        while offset < file_size {
            let size = page_size.min(file_size - offset);
            descriptors.push(PageDescriptor::new_original(
                fresh_key("orig"),
                offset,
                size,
                filename.clone(),
                offset,
                size,
            ));
            offset += size;
        }
        self.index.replace_all(descriptors);
    }

    /// Partitions `bytes` into `page_size` chunks, all resident and
    /// dirty, then immediately applies the memory limit (§4.3). Async
    /// because bringing `loaded_pages` back under `max_memory_pages` may
    /// require writing dirty overflow pages back through `PageStorage`
    /// before this returns.
    pub async fn initialize_from_content(&mut self, bytes: &[u8]) {
        self.cache.clear();
        let page_size = self.config.page_size.max(1) as usize;
        if bytes.is_empty() {
            let key = fresh_key("mem");
            let desc = PageDescriptor::new_memory(key.clone(), 0, 0);
            self.index.replace_all(vec![desc]);
            self.cache.put(key, PageInfo::new(Vec::new(), true));
            return;
        }
        let mut descriptors = Vec::new();
        let mut start = 0u64;
        for chunk in bytes.chunks(page_size) {
            let key = fresh_key("mem");
            descriptors.push(PageDescriptor::new_memory(
                key.clone(),
                start,
                chunk.len() as u64,
            ));
            self.cache.put(key, PageInfo::new(chunk.to_vec(), true));
            start += chunk.len() as u64;
        }
        self.index.replace_all(descriptors);
        self.apply_memory_limit().await;
    }

    // -- address translation / page loading ----------------------------

    /// Ensures the page at virtual address `pos` is resident, returning
    /// its key and the position relative to its start. `pos ==
    /// total_virtual_size` resolves to the tail descriptor's own
    /// end-of-data offset (a valid insertion point).
    pub async fn ensure_loaded_at(&mut self, pos: u64) -> Result<(String, u64)> {
        let (key, rel) = {
            let (desc, rel) = self.index.find_page_at(pos).ok_or_else(|| {
                BufferError::AddressOutOfRange(pbuf_core::internal_context!(format!(
                    "position {pos} has no containing page (total size {})",
                    self.index.total_virtual_size()
                )))
            })?;
            (desc.page_key.clone(), rel)
        };
        self.ensure_loaded(&key).await?;
        Ok((key, rel))
    }

    /// Ensures the named page is resident, loading it from its source if
    /// necessary. On failure, records a missing range covering the whole
    /// descriptor and installs a zero-filled `PageInfo` so callers never
    /// see an error propagate out of a read.
    pub async fn ensure_loaded(&mut self, key: &str) -> Result<()> {
        if self.cache.contains(key) {
            self.cache.promote(key);
            return Ok(());
        }
        let desc = self
            .index
            .get_by_key(key)
            .cloned()
            .ok_or_else(|| {
                BufferError::AddressOutOfRange(pbuf_core::internal_context!(format!(
                    "no descriptor for page key {key:?}"
                )))
            })?;
        if desc.virtual_size == 0 {
            self.cache.put(key.to_string(), PageInfo::new(Vec::new(), false));
            if let Some(d) = self.index.get_by_key_mut(key) {
                d.set_loaded(true);
            }
            return Ok(());
        }
        let loaded = self.load_descriptor_bytes(&desc).await;
        match loaded {
            Ok(data) => {
                let dirty = desc.is_dirty();
                self.cache.put(key.to_string(), PageInfo::new(data, dirty));
                if let Some(d) = self.index.get_by_key_mut(key) {
                    d.set_loaded(true);
                }
            }
            Err(reason) => {
                self.record_missing(&desc, reason);
                self.cache
                    .put(key.to_string(), PageInfo::new(vec![0u8; desc.virtual_size as usize], false));
                if let Some(d) = self.index.get_by_key_mut(key) {
                    d.set_loaded(true);
                }
            }
        }
        self.apply_memory_limit().await;
        Ok(())
    }

    fn record_missing(&mut self, desc: &PageDescriptor, reason: LoadFailureReason) {
        let (orig_start, orig_end) = match &desc.source_info {
            SourceInfo::Original {
                file_offset,
                original_size,
                ..
            } => (Some(*file_offset), Some(file_offset + original_size)),
            _ => (None, None),
        };
        let range = MissingDataRange {
            virtual_start: desc.virtual_start,
            virtual_end: desc.virtual_end(),
            original_file_start: orig_start,
            original_file_end: orig_end,
            reason,
        };
        self.notify(
            Notification::new(
                NotificationKind::PageDataUnavailable,
                format!("page {:?} unavailable: {reason}", desc.page_key),
            )
            .with_meta("page_key", desc.page_key.clone())
            .with_meta("reason", reason.to_string()),
        );
        log::warn!(
            target: "pbuf::vpm",
            "page {:?} [{}, {}) unavailable: {reason}",
            desc.page_key,
            desc.virtual_start,
            desc.virtual_end()
        );
        pbuf_core::missing::insert_and_merge(&mut self.pending_missing, range);
    }

    async fn load_descriptor_bytes(
        &self,
        desc: &PageDescriptor,
    ) -> std::result::Result<Vec<u8>, LoadFailureReason> {
        match &desc.source_info {
            SourceInfo::Original {
                filename,
                file_offset,
                original_size,
            } => self
                .load_original_slice(filename, *file_offset, *original_size)
                .await
                .map(|data| pad_to(data, desc.virtual_size as usize)),
            SourceInfo::Storage { page_key } | SourceInfo::Memory { page_key } => {
                match self.storage.load_page(page_key).await {
                    Ok(data) if !data.is_empty() || desc.virtual_size == 0 => Ok(data),
                    Ok(_) => Err(LoadFailureReason::DataCorruption),
                    Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                        Err(LoadFailureReason::PermissionDenied)
                    }
                    Err(_) => Err(LoadFailureReason::StorageFailure),
                }
            }
        }
    }

    async fn load_original_slice(
        &self,
        filename: &Path,
        file_offset: u64,
        original_size: u64,
    ) -> std::result::Result<Vec<u8>, LoadFailureReason> {
        use tokio::io::{AsyncReadExt, AsyncSeekExt};

        let meta = match rustix::fs::stat(filename) {
            Ok(m) => m,
            Err(rustix::io::Errno::NOENT) => return Err(LoadFailureReason::FileDeleted),
            Err(rustix::io::Errno::ACCESS) => return Err(LoadFailureReason::PermissionDenied),
            Err(_) => return Err(LoadFailureReason::FileDeleted),
        };
        let current_size = meta.st_size as u64;
        if file_offset >= current_size {
            return Err(LoadFailureReason::FileTruncated);
        }
        let to_read = original_size.min(current_size - file_offset) as usize;
        let mut file = tokio::fs::File::open(filename)
            .await
            .map_err(|_| LoadFailureReason::FileDeleted)?;
        file.seek(std::io::SeekFrom::Start(file_offset))
            .await
            .map_err(|_| LoadFailureReason::FileTruncated)?;
        let mut buf = vec![0u8; to_read];
        let mut read_total = 0usize;
        while read_total < to_read {
            let n = file
                .read(&mut buf[read_total..])
                .await
                .map_err(|_| LoadFailureReason::FileTruncated)?;
            if n == 0 {
                break;
            }
            read_total += n;
        }
        buf.truncate(read_total);
        Ok(buf)
    }

    // -- eviction --------------------------------------------------------

    async fn apply_memory_limit(&mut self) {
        while self.cache.len() > self.config.max_memory_pages {
            let Some((key, mut page)) = self.cache.pop_lru() else {
                break;
            };
            if let Some(d) = self.index.get_by_key_mut(&key) {
                d.cached_newline_count = Some(page.newline_count());
            }
            if !page.is_dirty {
                if let Some(d) = self.index.get_by_key_mut(&key) {
                    d.set_loaded(false);
                }
                continue;
            }
            match self.storage.save_page(&key, &page.data).await {
                Ok(()) => {
                    if let Some(d) = self.index.get_by_key_mut(&key) {
                        d.source_type = SourceType::Storage;
                        d.source_info = SourceInfo::Storage {
                            page_key: key.clone(),
                        };
                        d.set_loaded(false);
                        d.set_dirty(false);
                    }
                    self.notify(
                        Notification::new(
                            NotificationKind::PageEvicted,
                            format!("evicted page {key:?} to storage"),
                        )
                        .with_meta("page_key", key.clone()),
                    );
                    log::debug!(target: "pbuf::vpm", "evicted page {key:?} to storage");
                }
                Err(e) => {
                    self.notify(
                        Notification::new(
                            NotificationKind::StorageError,
                            format!("failed to evict page {key:?}: {e}"),
                        )
                        .with_meta("page_key", key.clone()),
                    );
                    log::warn!(target: "pbuf::vpm", "failed to evict page {key:?}: {e}");
                    page.touch();
                    self.cache.put(key, page);
                    break;
                }
            }
        }
    }

    // -- mutation ----------------------------------------------------

    pub async fn insert_at(&mut self, pos: u64, bytes: &[u8]) -> Result<u64> {
        if bytes.is_empty() {
            return Ok(0);
        }
        let (key, rel) = self.ensure_loaded_at(pos).await?;
        {
            let page = self.cache.get_mut(&key).expect("just loaded");
            page.splice_insert(rel as usize, bytes);
        }
        if let Some(d) = self.index.get_by_key_mut(&key) {
            d.set_dirty(true);
        }
        self.index.update_page_size(&key, bytes.len() as i64);
        self.maybe_split(&key).await;
        self.maybe_merge(&key);
        self.notify_line_marks(pos, 0, bytes.len() as u64);
        Ok(bytes.len() as u64)
    }

    pub async fn delete_range(&mut self, start: u64, end: u64) -> Result<Vec<u8>> {
        let total = self.index.total_virtual_size();
        let start = start.min(total);
        let end = end.min(total);
        if start >= end {
            return Ok(Vec::new());
        }
        let keys: Vec<String> = self
            .index
            .get_pages_in_range(start, end)
            .iter()
            .map(|d| d.page_key.clone())
            .collect();

        let mut pieces: Vec<(u64, Vec<u8>)> = Vec::with_capacity(keys.len());
        for key in keys.iter().rev() {
            self.ensure_loaded(key).await?;
            let (vstart, vend) = {
                let d = self.index.get_by_key(key).expect("just loaded");
                (d.virtual_start, d.virtual_end())
            };
            let sub_start = start.max(vstart) - vstart;
            let sub_end = end.min(vend) - vstart;
            let removed = {
                let page = self.cache.get_mut(key).expect("just loaded");
                page.splice_delete(sub_start as usize..sub_end as usize)
            };
            let removed_len = removed.len() as i64;
            pieces.push((vstart.max(start), removed));
            self.index.update_page_size(key, -removed_len);
        }
        pieces.sort_by_key(|(pos, _)| *pos);
        let deleted: Vec<u8> = pieces.into_iter().flat_map(|(_, d)| d).collect();

        let empty_keys: Vec<String> = keys
            .iter()
            .filter(|k| {
                self.index
                    .get_by_key(k)
                    .map(|d| d.virtual_size == 0)
                    .unwrap_or(false)
            })
            .cloned()
            .collect();
        for key in &empty_keys {
            self.index.remove_page(key);
            self.cache.pop(key);
        }
        if let Some(last_key) = keys.iter().rev().find(|k| !empty_keys.contains(k)) {
            self.maybe_merge(last_key);
        }
        self.notify_line_marks(start, deleted.len() as u64, 0);
        Ok(deleted)
    }

    pub async fn read_range(&mut self, start: u64, end: u64) -> Vec<u8> {
        let total = self.index.total_virtual_size();
        let start = start.min(total);
        let end = end.min(total);
        if start >= end {
            return Vec::new();
        }
        let keys: Vec<String> = self
            .index
            .get_pages_in_range(start, end)
            .iter()
            .map(|d| d.page_key.clone())
            .collect();
        let mut out = Vec::with_capacity((end - start) as usize);
        for key in keys {
            if self.ensure_loaded(&key).await.is_err() {
                // ensure_loaded never actually returns Err for load
                // failures (it zero-fills); this only triggers on a
                // genuine index desync, which we treat the same way:
                // zero-fill the gap rather than propagate.
            }
            let (vstart, vend) = {
                let d = self.index.get_by_key(&key).expect("present");
                (d.virtual_start, d.virtual_end())
            };
            let sub_start = (start.max(vstart) - vstart) as usize;
            let sub_end = (end.min(vend) - vstart) as usize;
            let page = self.cache.get_mut(&key).expect("just loaded");
            let want = sub_end - sub_start;
            if page.data.len() >= sub_end {
                out.extend_from_slice(&page.data[sub_start..sub_end]);
            } else {
                // Short/zero-filled page from a detached load: take what
                // exists and pad the deficit with zeros.
                let have = page.data.len().saturating_sub(sub_start);
                if have > 0 {
                    out.extend_from_slice(&page.data[sub_start..sub_start + have]);
                }
                out.extend(std::iter::repeat(0u8).take(want.saturating_sub(have)));
            }
        }
        out
    }

    // -- full scans, used only by the Buffer facade ---------------------

    /// Force-loads every descriptor and returns the absolute virtual
    /// address of every newline byte, ascending. Used to rebuild the line
    /// index on demand; expensive on a large detached buffer, which is why
    /// the Buffer facade only calls this when a line/char query actually
    /// needs a fresh index.
    pub async fn collect_all_newlines(&mut self) -> Vec<u64> {
        let keys: Vec<(String, u64)> = self
            .index
            .descriptors()
            .iter()
            .map(|d| (d.page_key.clone(), d.virtual_start))
            .collect();
        let mut out = Vec::new();
        for (key, vstart) in keys {
            let _ = self.ensure_loaded(&key).await;
            if let Some(page) = self.cache.get(&key) {
                out.extend(page.newline_positions().iter().map(|&rel| vstart + rel as u64));
            }
        }
        out
    }

    /// Points every `Original` descriptor's source file at `new_filename`,
    /// called by the Buffer facade right after a clean (non-detached) save
    /// writes a byte-exact copy that any still-unloaded original page can
    /// now resolve against.
    pub fn rewire_original_filenames(&mut self, new_filename: &Path) {
        for d in self.index.descriptors_mut() {
            if let SourceInfo::Original { filename, .. } = &mut d.source_info {
                *filename = new_filename.to_path_buf();
            }
        }
    }

    // -- split / merge -------------------------------------------------

    async fn maybe_split(&mut self, key: &str) {
        let (size, max_size) = {
            let Some(d) = self.index.get_by_key(key) else {
                return;
            };
            (d.virtual_size, self.config.max_page_size())
        };
        if size <= max_size {
            return;
        }
        let mid = (size / 2) as usize;
        let new_key = fresh_key("split");
        let upper = {
            let page = self.cache.get_mut(key).expect("resident: just split-checked");
            let upper = page.data.split_off(mid);
            page.rebuild_caches();
            upper
        };
        let upper_len = upper.len();
        if self.index.split_page(key, mid as u64, new_key.clone()).is_none() {
            return;
        }
        self.cache.put(new_key.clone(), PageInfo::new(upper, true));
        self.notify(
            Notification::new(
                NotificationKind::PageSplit,
                format!("split page {key:?} at offset {mid} into {new_key:?}"),
            )
            .with_meta("page_key", key.to_string())
            .with_meta("new_page_key", new_key)
            .with_meta("offset", mid.to_string())
            .with_meta("new_size", upper_len.to_string()),
        );
        log::debug!(target: "pbuf::vpm", "split page {key:?} at {mid}");
    }

    /// Probes once for an adjacent pair where either neighbor is below
    /// `min_page_size` and the combined size fits under `max_page_size`.
    fn maybe_merge(&mut self, around_key: &str) {
        let Some(idx) = self.index.index_of_key(around_key) else {
            return;
        };
        let min_size = self.config.min_page_size();
        let max_size = self.config.max_page_size();
        let descriptors = self.index.descriptors();
        let candidates = [idx.checked_sub(1), Some(idx), Some(idx + 1)];
        let mut pair = None;
        for window in candidates.windows(2) {
            let (Some(a), Some(b)) = (window[0], window[1]) else {
                continue;
            };
            if b >= descriptors.len() {
                continue;
            }
            let da = &descriptors[a];
            let db = &descriptors[b];
            if da.virtual_size == 0 || db.virtual_size == 0 {
                continue;
            }
            let combined = da.virtual_size + db.virtual_size;
            if combined > max_size {
                continue;
            }
            if da.virtual_size < min_size || db.virtual_size < min_size {
                pair = Some((a, b));
                break;
            }
        }
        let Some((a, b)) = pair else {
            return;
        };
        let (key_a, size_a) = {
            let d = &descriptors[a];
            (d.page_key.clone(), d.virtual_size)
        };
        let (key_b, size_b) = {
            let d = &descriptors[b];
            (d.page_key.clone(), d.virtual_size)
        };
        self.merge_pair(key_a, size_a, key_b, size_b);
    }

    /// The larger page absorbs the smaller; ties favor the earlier page
    /// (`key_a`, which always precedes `key_b` in virtual order here).
    fn merge_pair(&mut self, key_a: String, size_a: u64, key_b: String, size_b: u64) {
        let (keep, absorbed, keep_first) = if size_b > size_a {
            (key_b.clone(), key_a.clone(), false)
        } else {
            (key_a.clone(), key_b.clone(), true)
        };
        // Both pages must be resident to splice their bytes together;
        // a page that failed to load is already zero-filled, so this
        // never needs to await I/O that can fail further.
        let absorbed_data = match self.cache.pop(&absorbed) {
            Some(p) => p.data,
            None => return,
        };
        let Some(keep_page) = self.cache.get_mut(&keep) else {
            self.cache.put(absorbed.clone(), PageInfo::new(absorbed_data, true));
            return;
        };
        if keep_first {
            keep_page.data.extend_from_slice(&absorbed_data);
        } else {
            let mut merged = absorbed_data;
            merged.extend_from_slice(&keep_page.data);
            keep_page.data = merged;
        }
        keep_page.rebuild_caches();
        keep_page.is_dirty = true;

        if self.index.merge_into(&keep, &absorbed).is_none() {
            return;
        }
        let storage = Arc::clone(&self.storage);
        let absorbed_for_cleanup = absorbed.clone();
        // Best-effort: the absorbed descriptor may have an evicted
        // storage entry from a previous pass; delete it opportunistically
        // without blocking the merge on the result.
        tokio::spawn(async move {
            let _ = storage.delete_page(&absorbed_for_cleanup).await;
        });
        self.notify(
            Notification::new(
                NotificationKind::PageMerged,
                format!("merged page {absorbed:?} into {keep:?}"),
            )
            .with_meta("kept_page_key", keep)
            .with_meta("absorbed_page_key", absorbed),
        );
    }
}

fn pad_to(mut data: Vec<u8>, len: usize) -> Vec<u8> {
    if data.len() < len {
        data.resize(len, 0);
    }
    data
}
