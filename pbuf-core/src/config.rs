//! The five configuration knobs enumerated in §6, plus nothing else.

/// Tuning knobs for a [`crate`]-based engine. Every field here maps
/// one-to-one onto a knob named in the spec; there is no hidden
/// configuration surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde1", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde1", serde(default))]
pub struct BufferConfig {
    /// Bytes per page at initial chunking time. Also determines the merge
    /// thresholds `min_page_size = page_size / 4` and `max_page_size =
    /// page_size * 2`.
    pub page_size: u64,
    /// LRU cap on resident pages.
    pub max_memory_pages: usize,
    /// Undo stack depth.
    pub max_undo_levels: usize,
    /// Maximum gap, in milliseconds, between two operations for them to be
    /// eligible to merge into the same undo group.
    pub merge_time_window_ms: i64,
    /// Maximum logical byte distance between two operations for them to be
    /// eligible to merge into the same undo group.
    pub merge_position_window: u64,
}

impl BufferConfig {
    pub fn min_page_size(&self) -> u64 {
        self.page_size / 4
    }

    pub fn max_page_size(&self) -> u64 {
        self.page_size * 2
    }

    pub fn merge_policy(&self) -> crate::undo::MergePolicy {
        crate::undo::MergePolicy {
            merge_time_window_ms: self.merge_time_window_ms,
            merge_position_window: self.merge_position_window,
        }
    }
}

impl Default for BufferConfig {
    fn default() -> Self {
        BufferConfig {
            page_size: 65536,
            max_memory_pages: 100,
            max_undo_levels: 50,
            merge_time_window_ms: 5000,
            merge_position_window: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = BufferConfig::default();
        assert_eq!(cfg.page_size, 65536);
        assert_eq!(cfg.max_memory_pages, 100);
        assert_eq!(cfg.max_undo_levels, 50);
        assert_eq!(cfg.merge_time_window_ms, 5000);
        assert_eq!(cfg.merge_position_window, 0);
        assert_eq!(cfg.min_page_size(), 16384);
        assert_eq!(cfg.max_page_size(), 131072);
    }
}
