//! Page descriptors: the metadata half of the virtual address space.
//!
//! A [`PageDescriptor`] never holds page bytes; see `pbuf::pageinfo::PageInfo`
//! in the I/O crate for the resident form. Keeping descriptors here (pure,
//! no I/O) lets the address index and its invariants be unit tested without
//! a runtime.

use bitflags::bitflags;

bitflags! {
    /// The two independent boolean flags a descriptor tracks, packed the
    /// way this codebase packs small permission/state bitsets.
    #[cfg_attr(feature = "serde1", derive(serde::Serialize, serde::Deserialize))]
    #[derive(Copy, Clone, Debug, Default, Hash, Eq, PartialEq)]
    pub struct DescriptorFlags: u8 {
        /// Page bytes differ from what is durably stored (original file or
        /// storage back-end).
        const DIRTY  = 0b0000_0001;
        /// A `PageInfo` for this descriptor currently resides in the VPM's
        /// cache.
        const LOADED = 0b0000_0010;
    }
}

/// Where a page's bytes ultimately come from.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde1", derive(serde::Serialize, serde::Deserialize))]
pub enum SourceType {
    /// A slice of the file the buffer was originally loaded from.
    Original,
    /// Evicted to the pluggable storage back-end, keyed by `pageKey`.
    Storage,
    /// Created in-memory by an edit (insert, split) and not yet evicted.
    Memory,
}

/// Source-specific addressing information, the `sourceInfo` union from the
/// spec's data model.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde1", derive(serde::Serialize, serde::Deserialize))]
pub enum SourceInfo {
    Original {
        filename: std::path::PathBuf,
        file_offset: u64,
        original_size: u64,
    },
    Storage {
        page_key: String,
    },
    Memory {
        page_key: String,
    },
}

/// Metadata for one contiguous slice of the virtual address space.
///
/// Descriptors are kept in a dense, sorted, gap-free sequence by
/// [`crate::index::PageIndex`]; see that module for the partition
/// invariant.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde1", derive(serde::Serialize, serde::Deserialize))]
pub struct PageDescriptor {
    pub page_key: String,
    pub virtual_start: u64,
    pub virtual_size: u64,
    pub source_type: SourceType,
    pub source_info: SourceInfo,
    pub flags: DescriptorFlags,
    pub generation: u32,
    pub parent_key: Option<String>,
    /// Cached newline count, populated before eviction so line queries
    /// don't have to reload an evicted page just to count its newlines.
    pub cached_newline_count: Option<usize>,
}

impl PageDescriptor {
    pub fn virtual_end(&self) -> u64 {
        self.virtual_start + self.virtual_size
    }

    pub fn is_dirty(&self) -> bool {
        self.flags.contains(DescriptorFlags::DIRTY)
    }

    pub fn is_loaded(&self) -> bool {
        self.flags.contains(DescriptorFlags::LOADED)
    }

    pub fn set_dirty(&mut self, dirty: bool) {
        self.flags.set(DescriptorFlags::DIRTY, dirty);
    }

    pub fn set_loaded(&mut self, loaded: bool) {
        self.flags.set(DescriptorFlags::LOADED, loaded);
    }

    pub fn contains(&self, pos: u64) -> bool {
        pos >= self.virtual_start && pos < self.virtual_end()
    }

    /// A freshly-loaded file is partitioned into one `Original` descriptor
    /// per `page_size` chunk; the empty-file case produces a single
    /// zero-size placeholder.
    pub fn new_original(
        page_key: String,
        virtual_start: u64,
        virtual_size: u64,
        filename: std::path::PathBuf,
        file_offset: u64,
        original_size: u64,
    ) -> Self {
        PageDescriptor {
            page_key: page_key.clone(),
            virtual_start,
            virtual_size,
            source_type: SourceType::Original,
            source_info: SourceInfo::Original {
                filename,
                file_offset,
                original_size,
            },
            flags: DescriptorFlags::empty(),
            generation: 0,
            parent_key: None,
            cached_newline_count: None,
        }
    }

    /// `initializeFromContent`/split/insert all produce dirty, resident,
    /// memory-backed descriptors.
    pub fn new_memory(page_key: String, virtual_start: u64, virtual_size: u64) -> Self {
        PageDescriptor {
            page_key: page_key.clone(),
            virtual_start,
            virtual_size,
            source_type: SourceType::Memory,
            source_info: SourceInfo::Memory { page_key },
            flags: DescriptorFlags::DIRTY | DescriptorFlags::LOADED,
            generation: 0,
            parent_key: None,
            cached_newline_count: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn virtual_end_is_start_plus_size() {
        let d = PageDescriptor::new_memory("p0".into(), 10, 20);
        assert_eq!(d.virtual_end(), 30);
        assert!(d.contains(10));
        assert!(d.contains(29));
        assert!(!d.contains(30));
    }

    #[test]
    fn memory_descriptor_starts_dirty_and_loaded() {
        let d = PageDescriptor::new_memory("p0".into(), 0, 4);
        assert!(d.is_dirty());
        assert!(d.is_loaded());
    }

    #[test]
    fn original_descriptor_starts_clean_and_unloaded() {
        let d = PageDescriptor::new_original("p0".into(), 0, 4, "/tmp/x".into(), 0, 4);
        assert!(!d.is_dirty());
        assert!(!d.is_loaded());
    }
}
