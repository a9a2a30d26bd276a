//! The pluggable storage back-end contract (§4.1, §6).

mod file;
mod memory;

pub use file::FileStorage;
pub use memory::MemoryStorage;

use async_trait::async_trait;

/// An async, content-addressed page store. Keys are opaque strings chosen
/// by the Virtual Page Manager; implementations must not interpret them.
///
/// `save_page` must atomically publish new contents: a concurrent
/// `load_page` must observe either the old bytes or the new ones, never a
/// partial write. `delete_page` is a no-op (not an error) when the key is
/// absent.
#[async_trait]
pub trait PageStorage: Send + Sync {
    async fn save_page(&self, key: &str, bytes: &[u8]) -> std::io::Result<()>;
    async fn load_page(&self, key: &str) -> std::io::Result<Vec<u8>>;
    async fn delete_page(&self, key: &str) -> std::io::Result<()>;
    async fn page_exists(&self, key: &str) -> std::io::Result<bool>;
}
