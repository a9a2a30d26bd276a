use super::PageStorage;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

/// An in-memory page store. Never touches disk; pages vanish when the
/// process exits. Useful for tests and for buffers that never need to
/// spill beyond `max_memory_pages`.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    pages: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        MemoryStorage {
            pages: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl PageStorage for MemoryStorage {
    async fn save_page(&self, key: &str, bytes: &[u8]) -> std::io::Result<()> {
        self.pages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn load_page(&self, key: &str) -> std::io::Result<Vec<u8>> {
        self.pages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
            .ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("no such page: {key}"),
                )
            })
    }

    async fn delete_page(&self, key: &str) -> std::io::Result<()> {
        self.pages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key);
        Ok(())
    }

    async fn page_exists(&self, key: &str) -> std::io::Result<bool> {
        Ok(self
            .pages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_a_page() {
        let storage = MemoryStorage::new();
        storage.save_page("p0", b"hello").await.unwrap();
        assert!(storage.page_exists("p0").await.unwrap());
        assert_eq!(storage.load_page("p0").await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn delete_of_absent_key_is_success() {
        let storage = MemoryStorage::new();
        storage.delete_page("missing").await.unwrap();
    }

    #[tokio::test]
    async fn load_of_absent_key_fails() {
        let storage = MemoryStorage::new();
        assert!(storage.load_page("missing").await.is_err());
    }
}
