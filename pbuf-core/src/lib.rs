#![deny(broken_intra_doc_links)]
//! Pure, I/O-free data structures for the `pbuf` paged buffer engine.
//!
//! This crate holds everything that can be reasoned about and tested
//! without a filesystem or an async runtime: page descriptors and the
//! address index (§4.2), named marks and line indexing (§4.4), undo/redo
//! operation records and the merge policy (§4.5), missing-data-range
//! bookkeeping, the notification taxonomy, and configuration knobs (§6).
//!
//! The async, I/O-bearing half of the engine (the storage back-ends, the
//! Virtual Page Manager, and the public `PagedBuffer` facade) lives in the
//! sibling `pbuf` crate, which depends on this one the same way `procfs`
//! depends on `procfs-core`.
//!
//! # Cargo features
//!
//! * `chrono` -- Default. Enables timestamps on [`notify::Notification`].
//! * `serde1` -- Optional. Derives `Serialize`/`Deserialize` for the
//!   public types in this crate.
//! * `backtrace` -- Optional. Captures a backtrace on
//!   [`error::BufferError::AddressOutOfRange`].

pub mod config;
pub mod error;
pub mod index;
pub mod lines;
pub mod marks;
pub mod missing;
pub mod notify;
pub mod page;
pub mod undo;

pub use config::BufferConfig;
pub use error::{BufferError, LoadFailureReason, Result};
pub use index::PageIndex;
pub use lines::{LineChar, LineIndex, LineInfo};
pub use marks::MarkSet;
pub use missing::MissingDataRange;
pub use notify::{Notification, NotificationKind, Severity};
pub use page::{DescriptorFlags, PageDescriptor, SourceInfo, SourceType};
pub use undo::{MergeOutcome, MergePolicy, OpKind, Operation, OperationGroup};
