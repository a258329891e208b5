//! Append-only relay registry.
//!
//! Maps a node id to its published public key. Entries are never replaced
//! or removed during a run, and no private key material is ever held here.

use std::collections::BTreeMap;

use onion_common::NodeEntry;
use onion_core::NodeId;
use onion_crypto::{CryptoError, RelayPublicKey};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("node {0} is already registered")]
    DuplicateNode(NodeId),

    #[error("node {0} is not registered")]
    NotFound(NodeId),

    #[error("invalid public key: {0}")]
    InvalidKey(#[from] CryptoError),

    #[error("malformed request: {0}")]
    MalformedRequest(String),
}

/// In-memory directory. Writers are serialized by the lock, which keeps the
/// duplicate check and the insert atomic.
#[derive(Debug, Default)]
pub struct Registry {
    nodes: RwLock<BTreeMap<NodeId, String>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a relay. A second registration of the same id is rejected and
    /// leaves the original entry untouched.
    pub async fn register(&self, entry: NodeEntry) -> Result<(), DirectoryError> {
        // Reject keys a client could never use to build a layer
        RelayPublicKey::from_encoded(&entry.pub_key)?;

        let mut nodes = self.nodes.write().await;
        if nodes.contains_key(&entry.node_id) {
            debug!("duplicate registration for node {}", entry.node_id);
            return Err(DirectoryError::DuplicateNode(entry.node_id));
        }
        nodes.insert(entry.node_id, entry.pub_key);

        info!("registered node {} ({} total)", entry.node_id, nodes.len());
        Ok(())
    }

    /// All entries, ordered by node id.
    pub async fn list(&self) -> Vec<NodeEntry> {
        self.nodes
            .read()
            .await
            .iter()
            .map(|(node_id, pub_key)| NodeEntry {
                node_id: *node_id,
                pub_key: pub_key.clone(),
            })
            .collect()
    }

    pub async fn lookup(&self, node_id: NodeId) -> Result<NodeEntry, DirectoryError> {
        self.nodes
            .read()
            .await
            .get(&node_id)
            .map(|pub_key| NodeEntry {
                node_id,
                pub_key: pub_key.clone(),
            })
            .ok_or(DirectoryError::NotFound(node_id))
    }

    pub async fn len(&self) -> usize {
        self.nodes.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.nodes.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use onion_crypto::RelayKeypair;
    use std::sync::Arc;

    fn entry(node_id: u32) -> NodeEntry {
        let keypair = RelayKeypair::generate().unwrap();
        NodeEntry {
            node_id: NodeId(node_id),
            pub_key: keypair.public_key().to_encoded().unwrap(),
        }
    }

    #[tokio::test]
    async fn test_register_and_lookup() {
        let registry = Registry::new();
        let e = entry(1);
        registry.register(e.clone()).await.unwrap();

        assert_eq!(registry.lookup(NodeId(1)).await.unwrap(), e);
        assert!(matches!(
            registry.lookup(NodeId(2)).await,
            Err(DirectoryError::NotFound(NodeId(2)))
        ));
    }

    #[tokio::test]
    async fn test_duplicate_keeps_original() {
        let registry = Registry::new();
        let first = entry(5);
        let second = entry(5);

        registry.register(first.clone()).await.unwrap();
        assert!(matches!(
            registry.register(second).await,
            Err(DirectoryError::DuplicateNode(NodeId(5)))
        ));

        assert_eq!(registry.len().await, 1);
        assert_eq!(registry.lookup(NodeId(5)).await.unwrap(), first);
    }

    #[tokio::test]
    async fn test_invalid_key_rejected() {
        let registry = Registry::new();
        let bogus = NodeEntry {
            node_id: NodeId(1),
            pub_key: "aGVsbG8=".into(),
        };

        assert!(matches!(
            registry.register(bogus).await,
            Err(DirectoryError::InvalidKey(_))
        ));
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_list_is_ordered() {
        let registry = Registry::new();
        let key = entry(0).pub_key;
        for id in [3, 1, 2] {
            registry
                .register(NodeEntry {
                    node_id: NodeId(id),
                    pub_key: key.clone(),
                })
                .await
                .unwrap();
        }

        let ids: Vec<NodeId> = registry.list().await.iter().map(|e| e.node_id).collect();
        assert_eq!(ids, vec![NodeId(1), NodeId(2), NodeId(3)]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_duplicates_register_once() {
        let registry = Arc::new(Registry::new());
        let key = entry(0).pub_key;

        let mut handles = Vec::new();
        for _ in 0..16 {
            let registry = registry.clone();
            let key = key.clone();
            handles.push(tokio::spawn(async move {
                registry
                    .register(NodeEntry {
                        node_id: NodeId(9),
                        pub_key: key,
                    })
                    .await
                    .is_ok()
            }));
        }

        let mut accepted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                accepted += 1;
            }
        }
        assert_eq!(accepted, 1);
        assert_eq!(registry.len().await, 1);
    }
}
