//! Text rendering for the detached save path (§4.6): the missing-data
//! summary preamble and the inline per-range markers spliced into the
//! written file in place of unrecoverable bytes.

use pbuf_core::MissingDataRange;

/// The preamble written once, immediately after the save file is opened,
/// whenever the buffer being saved is detached.
pub fn render_summary(ranges: &[MissingDataRange]) -> String {
    let mut s = String::from("--- MISSING DATA SUMMARY ---\n");
    for r in ranges {
        s.push_str(&format!(
            "[Missing {} bytes from buffer addresses {} to {}",
            r.size(),
            r.virtual_start,
            r.virtual_end
        ));
        if let (Some(start), Some(end)) = (r.original_file_start, r.original_file_end) {
            s.push_str(&format!(", original file positions {start} to {end}"));
        }
        s.push_str(&format!(", reason: {}.]\n", r.reason));
    }
    s.push_str("--- END MISSING DATA ---\n\n");
    s
}

/// The inline marker written in place of one missing range's bytes.
/// `total_size` decides whether the end-of-file variant (no resumption
/// point to label) applies.
pub fn render_marker(range: &MissingDataRange, total_size: u64) -> String {
    let mut s = format!(
        "\n--- MISSING {} BYTES FROM BUFFER ADDRESS {} ",
        range.size(),
        range.virtual_start
    );
    if let Some(orig) = range.original_file_start {
        s.push_str(&format!("(ORIGINAL FILE POSITION {orig}) "));
    }
    s.push_str(&format!("- REASON: {} ---\n", range.reason));
    if range.virtual_end >= total_size {
        s.push_str("--- END OF FILE: NO FURTHER DATA AVAILABLE ---\n");
    } else {
        s.push_str(&format!(
            "--- BEGIN DATA BELONGING AT BUFFER ADDRESS {} ---\n",
            range.virtual_end
        ));
    }
    s
}

/// The marker written when a page becomes unreadable mid-save (after the
/// summary was already emitted based on an earlier snapshot).
pub fn render_emergency_marker(at: u64) -> String {
    format!("\n--- EMERGENCY: DATA BECAME UNAVAILABLE MID-SAVE AT BUFFER ADDRESS {at} ---\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pbuf_core::LoadFailureReason;

    fn range(start: u64, end: u64) -> MissingDataRange {
        MissingDataRange {
            virtual_start: start,
            virtual_end: end,
            original_file_start: Some(start + 1000),
            original_file_end: Some(end + 1000),
            reason: LoadFailureReason::FileTruncated,
        }
    }

    #[test]
    fn summary_lists_every_range_with_original_positions() {
        let s = render_summary(&[range(0, 10), range(20, 25)]);
        assert!(s.starts_with("--- MISSING DATA SUMMARY ---\n"));
        assert!(s.contains("Missing 10 bytes from buffer addresses 0 to 10"));
        assert!(s.contains("original file positions 1000 to 1010"));
        assert!(s.contains("Missing 5 bytes from buffer addresses 20 to 25"));
        assert!(s.ends_with("--- END MISSING DATA ---\n\n"));
    }

    #[test]
    fn marker_labels_resumption_point_when_not_at_eof() {
        let m = render_marker(&range(10, 20), 100);
        assert!(m.contains("MISSING 10 BYTES FROM BUFFER ADDRESS 10"));
        assert!(m.contains("BEGIN DATA BELONGING AT BUFFER ADDRESS 20"));
    }

    #[test]
    fn marker_uses_eof_variant_when_range_reaches_buffer_end() {
        let m = render_marker(&range(90, 100), 100);
        assert!(m.contains("END OF FILE: NO FURTHER DATA AVAILABLE"));
        assert!(!m.contains("BEGIN DATA BELONGING"));
    }
}
