//! In-memory transport over a simulated cluster of column stores.
//!
//! Each node's [`MemoryColumnStore`] registers in a shared
//! [`MemoryCluster`]; a node's transport copies files between stores.
//! Connection opens are counted per remote node so tests can assert the
//! one-connection-per-node reuse policy.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;

use shale_core::NodeId;

use super::{NodeConnection, NodeTransport};
use crate::column_io::memory::MemoryColumnStore;
use crate::error::{Error, Result};

fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::transport("lock poisoned")
}

#[derive(Default)]
struct ClusterInner {
    stores: RwLock<HashMap<NodeId, MemoryColumnStore>>,
    connects: RwLock<HashMap<NodeId, Arc<AtomicUsize>>>,
}

/// Shared registry of per-node column stores.
#[derive(Clone, Default)]
pub struct MemoryCluster {
    inner: Arc<ClusterInner>,
}

impl MemoryCluster {
    /// Creates an empty cluster.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a node and returns its column store.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn add_node(&self, node: NodeId) -> Result<MemoryColumnStore> {
        let store = MemoryColumnStore::new();
        self.inner
            .stores
            .write()
            .map_err(poison_err)?
            .insert(node, store.clone());
        Ok(store)
    }

    /// Returns a node's column store.
    ///
    /// # Errors
    ///
    /// Returns an error if the node is unknown.
    pub fn store_for(&self, node: NodeId) -> Result<MemoryColumnStore> {
        self.inner
            .stores
            .read()
            .map_err(poison_err)?
            .get(&node)
            .cloned()
            .ok_or_else(|| Error::transport(format!("unknown node {node}")))
    }

    /// Builds the transport a given node would use for remote fetches.
    #[must_use]
    pub fn transport_for(&self, local_node: NodeId) -> MemoryTransport {
        MemoryTransport {
            cluster: self.clone(),
            local_node,
        }
    }

    /// Total connections opened to `node` so far.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn connect_count(&self, node: NodeId) -> Result<usize> {
        Ok(self
            .inner
            .connects
            .read()
            .map_err(poison_err)?
            .get(&node)
            .map_or(0, |c| c.load(Ordering::Relaxed)))
    }

    fn record_connect(&self, node: NodeId) -> Result<()> {
        let mut connects = self.inner.connects.write().map_err(poison_err)?;
        connects
            .entry(node)
            .or_insert_with(|| Arc::new(AtomicUsize::new(0)))
            .fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// Transport bound to one node's local store.
#[derive(Clone)]
pub struct MemoryTransport {
    cluster: MemoryCluster,
    local_node: NodeId,
}

struct MemoryConnection {
    remote: MemoryColumnStore,
    local: MemoryColumnStore,
}

#[async_trait]
impl NodeConnection for MemoryConnection {
    async fn fetch_file(&mut self, remote_path: &str, local_path: &str) -> Result<u64> {
        let data = self
            .remote
            .get_file(remote_path)?
            .ok_or_else(|| Error::transport(format!("remote file not found: {remote_path}")))?;
        let tuples = data.values.len() as u64;
        self.local
            .put_file(local_path, data.compression, data.values)?;
        Ok(tuples)
    }

    fn close(&mut self) {}
}

#[async_trait]
impl NodeTransport for MemoryTransport {
    async fn connect(&self, node: NodeId) -> Result<Box<dyn NodeConnection>> {
        self.cluster.record_connect(node)?;
        Ok(Box::new(MemoryConnection {
            remote: self.cluster.store_for(node)?,
            local: self.cluster.store_for(self.local_node)?,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::FetchSession;
    use shale_core::{CompressionType, Datum};

    #[tokio::test]
    async fn session_reuses_one_connection_per_node() -> Result<()> {
        let cluster = MemoryCluster::new();
        let node_a = NodeId::new(1);
        let node_b = NodeId::new(2);
        let store_a = cluster.add_node(node_a)?;
        let store_b = cluster.add_node(node_b)?;

        store_b.put_file("x.col", CompressionType::None, vec![Datum::Int64(1)])?;
        store_b.put_file("y.col", CompressionType::None, vec![Datum::Int64(2)])?;

        let transport = cluster.transport_for(node_a);
        {
            let mut session = FetchSession::new(&transport);
            session.fetch(node_b, "x.col", "local/x.col").await?;
            session.fetch(node_b, "y.col", "local/y.col").await?;
            assert_eq!(session.open_connections(), 1);
        }

        assert_eq!(cluster.connect_count(node_b)?, 1);
        assert!(store_a.contains("local/x.col")?);
        assert!(store_a.contains("local/y.col")?);
        Ok(())
    }

    #[tokio::test]
    async fn fetch_missing_file_errors() -> Result<()> {
        let cluster = MemoryCluster::new();
        let node_a = NodeId::new(1);
        let node_b = NodeId::new(2);
        cluster.add_node(node_a)?;
        cluster.add_node(node_b)?;

        let transport = cluster.transport_for(node_a);
        let mut session = FetchSession::new(&transport);
        let result = session.fetch(node_b, "missing.col", "local/m.col").await;
        assert!(result.is_err());
        Ok(())
    }
}
