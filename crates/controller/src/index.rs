//! Webhook-path index over receivers.
//!
//! The gateway resolves `/hook/<digest>` to a receiver in O(1) through this
//! map. The receiver reconciler inserts the published path (removing a
//! superseded one on token rotation) and the finalizer removes entries on
//! delete, so the index follows the lifecycle without a resync.

use tokio::sync::RwLock;
use std::collections::HashMap;

/// `(namespace, name)` coordinates of a receiver.
pub type ReceiverKey = (String, String);

#[derive(Debug, Default)]
pub struct ReceiverIndex {
    paths: RwLock<HashMap<String, ReceiverKey>>,
}

impl ReceiverIndex {
    /// Register a published path for a receiver.
    pub async fn insert(&self, path: &str, namespace: &str, name: &str) {
        self.paths.write().await.insert(
            path.to_string(),
            (namespace.to_string(), name.to_string()),
        );
    }

    /// Look up the receiver a path belongs to.
    pub async fn get(&self, path: &str) -> Option<ReceiverKey> {
        self.paths.read().await.get(path).cloned()
    }

    /// Drop a single path (token rotation).
    pub async fn remove_path(&self, path: &str) {
        self.paths.write().await.remove(path);
    }

    /// Drop every path owned by a receiver (deletion).
    pub async fn remove_receiver(&self, namespace: &str, name: &str) {
        self.paths
            .write()
            .await
            .retain(|_, key| !(key.0 == namespace && key.1 == name));
    }

    pub async fn len(&self) -> usize {
        self.paths.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.paths.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn insert_lookup_remove() {
        let index = ReceiverIndex::default();
        index.insert("/hook/abc", "ns1", "r1").await;
        assert_eq!(
            index.get("/hook/abc").await,
            Some(("ns1".to_string(), "r1".to_string()))
        );

        index.remove_path("/hook/abc").await;
        assert!(index.get("/hook/abc").await.is_none());
    }

    #[tokio::test]
    async fn remove_receiver_drops_all_paths() {
        let index = ReceiverIndex::default();
        index.insert("/hook/old", "ns1", "r1").await;
        index.insert("/hook/new", "ns1", "r1").await;
        index.insert("/hook/other", "ns1", "r2").await;

        index.remove_receiver("ns1", "r1").await;
        assert_eq!(index.len().await, 1);
        assert!(index.get("/hook/other").await.is_some());
    }
}
