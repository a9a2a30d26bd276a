//! The notification taxonomy (§6). Pure data: dispatch is an application
//! concern (out of scope per §1), so this module only defines the shape.

use std::collections::HashMap;

#[cfg(feature = "chrono")]
use chrono::{DateTime, Utc};

/// Every notification kind the engine can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde1", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde1", serde(rename_all = "snake_case"))]
pub enum NotificationKind {
    BufferContentLoaded,
    FileModifiedOnDisk,
    SaveSkipped,
    AtomicSaveStarted,
    SaveCompleted,
    DetachedSaveSummary,
    BufferDetached,
    PageSplit,
    PageMerged,
    PageEvicted,
    StorageError,
    PageDataUnavailable,
    EmergencyMissingData,
    TempCleanup,
    TempCleanupFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde1", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde1", serde(rename_all = "snake_case"))]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
}

impl NotificationKind {
    /// The severity a notification of this kind is emitted at by default;
    /// call sites may still construct a `Notification` with a different
    /// severity when context warrants it (e.g. `save_skipped` is routine
    /// info, but a caller verifying strict save semantics might want to
    /// treat it otherwise).
    pub fn default_severity(self) -> Severity {
        use NotificationKind::*;
        match self {
            BufferContentLoaded | SaveSkipped | AtomicSaveStarted | SaveCompleted
            | DetachedSaveSummary | TempCleanup => Severity::Info,
            PageSplit | PageMerged | PageEvicted => Severity::Debug,
            FileModifiedOnDisk | PageDataUnavailable => Severity::Warning,
            BufferDetached | StorageError | EmergencyMissingData | TempCleanupFailed => {
                Severity::Error
            }
        }
    }
}

/// One notification event. `metadata` carries kind-specific structured
/// context (a page key, a byte range, an error message) as plain strings so
/// that application-side dispatch (out of this crate's scope) doesn't need
/// to know the engine's internal types.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde1", derive(serde::Serialize, serde::Deserialize))]
pub struct Notification {
    pub kind: NotificationKind,
    pub severity: Severity,
    pub message: String,
    pub metadata: HashMap<String, String>,
    #[cfg(feature = "chrono")]
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    pub fn new(kind: NotificationKind, message: impl Into<String>) -> Self {
        Notification {
            kind,
            severity: kind.default_severity(),
            message: message.into(),
            metadata: HashMap::new(),
            #[cfg(feature = "chrono")]
            timestamp: Utc::now(),
        }
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}
