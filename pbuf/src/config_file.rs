//! TOML-backed loading of [`BufferConfig`] (§6), gated behind the
//! `config-toml` feature. Synchronous: config is read once, before any
//! buffer exists, so there is no reason to make callers `.await` it.

use pbuf_core::{BufferConfig, BufferError, Result};
use std::path::Path;

/// Parses a `BufferConfig` from a TOML document. Missing keys fall back to
/// [`BufferConfig::default`] (`#[serde(default)]` on every field).
pub fn load_from_str(text: &str) -> Result<BufferConfig> {
    toml::from_str(text).map_err(|e| BufferError::ConfigError(e.to_string()))
}

/// Reads and parses a `BufferConfig` from a TOML file on disk.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<BufferConfig> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .map_err(|e| BufferError::ConfigError(format!("reading {}: {e}", path.display())))?;
    load_from_str(&text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let cfg = load_from_str("").unwrap();
        assert_eq!(cfg, BufferConfig::default());
    }

    #[test]
    fn partial_document_overrides_only_named_fields() {
        let cfg = load_from_str("page_size = 4096\nmax_undo_levels = 10\n").unwrap();
        assert_eq!(cfg.page_size, 4096);
        assert_eq!(cfg.max_undo_levels, 10);
        assert_eq!(cfg.max_memory_pages, BufferConfig::default().max_memory_pages);
    }

    #[test]
    fn malformed_document_is_a_config_error() {
        let err = load_from_str("page_size = [not valid").unwrap_err();
        assert!(matches!(err, BufferError::ConfigError(_)));
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let err = load_from_path("/nonexistent/pbuf-config-test.toml").unwrap_err();
        assert!(matches!(err, BufferError::ConfigError(_)));
    }
}
