#![deny(broken_intra_doc_links)]
//! The async, I/O-bearing half of the `pbuf` paged buffer engine: storage
//! back-ends, the Virtual Page Manager, line/marks glue, undo/redo
//! execution, and the public [`buffer::PagedBuffer`] facade.
//!
//! `pbuf-core` holds everything pure and synchronous; this crate wires it
//! to a filesystem and an async runtime the same way `procfs` wires
//! `procfs-core` to `/proc`.
//!
//! # Cargo features
//!
//! * `chrono` -- Default. Forwarded to `pbuf-core` for notification
//!   timestamps.
//! * `serde1` -- Optional. Forwarded to `pbuf-core`.
//! * `backtrace` -- Optional. Forwarded to `pbuf-core`.
//! * `config-toml` -- Optional. Enables [`config_file`], a TOML loader for
//!   [`pbuf_core::BufferConfig`].

pub mod buffer;
#[cfg(feature = "config-toml")]
pub mod config_file;
pub mod linemarks;
pub mod pageinfo;
mod save_format;
pub mod storage;
pub mod undo_system;
pub mod vpm;

pub use buffer::{FileChangeStatus, IntegrityState, PagedBuffer};
pub use pageinfo::PageInfo;
pub use pbuf_core::{
    BufferConfig, BufferError, LineChar, LineInfo, LoadFailureReason, MissingDataRange,
    Notification, NotificationKind, Result, Severity,
};
pub use storage::{FileStorage, MemoryStorage, PageStorage};
pub use vpm::VirtualPageManager;
