//! Fast key-value store seam, used for whiteboard document snapshots.

use std::collections::HashMap;

use parking_lot::RwLock;

use tg_domain::error::Result;

#[async_trait::async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;
}

/// In-memory KV store. Snapshot durability across restarts belongs to the
/// external store this seam stands in for.
#[derive(Default)]
pub struct MemoryKv {
    map: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl KvStore for MemoryKv {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.map.read().get(key).cloned())
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.map.write().insert(key.to_owned(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.map.write().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_get_delete_round_trip() {
        let kv = MemoryKv::new();
        assert!(kv.get("a").await.unwrap().is_none());
        kv.put("a", vec![1, 2, 3]).await.unwrap();
        assert_eq!(kv.get("a").await.unwrap(), Some(vec![1, 2, 3]));
        kv.delete("a").await.unwrap();
        assert!(kv.get("a").await.unwrap().is_none());
    }
}
