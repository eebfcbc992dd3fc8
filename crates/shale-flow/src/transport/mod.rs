//! Node-to-node column file transfer.
//!
//! The wire protocol is an external collaborator; the engine sees only
//! connections that copy a remote file into local storage. Connections
//! are scoped resources: a task acquires at most one per distinct remote
//! node, reuses it for every fetch of that task invocation, and releases
//! all of them unconditionally when the task completes, including on
//! error paths. [`FetchSession`] encapsulates that policy.

pub mod memory;

use std::collections::HashMap;

use async_trait::async_trait;

use shale_core::NodeId;

use crate::error::Result;

/// An open connection to one remote node.
#[async_trait]
pub trait NodeConnection: Send {
    /// Copies `remote_path` on the connected node into `local_path` on
    /// this node, returning the tuple count of the copied file.
    async fn fetch_file(&mut self, remote_path: &str, local_path: &str) -> Result<u64>;

    /// Releases the connection. Called exactly once; must not fail.
    fn close(&mut self);
}

/// Connection factory for remote fetches.
#[async_trait]
pub trait NodeTransport: Send + Sync {
    /// Opens a connection to `node`.
    async fn connect(&self, node: NodeId) -> Result<Box<dyn NodeConnection>>;
}

/// Per-task connection cache: one reused connection per distinct remote
/// node, all released on drop.
pub struct FetchSession<'a> {
    transport: &'a dyn NodeTransport,
    connections: HashMap<NodeId, Box<dyn NodeConnection>>,
}

impl<'a> FetchSession<'a> {
    /// Creates an empty session over the given transport.
    #[must_use]
    pub fn new(transport: &'a dyn NodeTransport) -> Self {
        Self {
            transport,
            connections: HashMap::new(),
        }
    }

    /// Fetches a remote file, reusing the session's connection to `node`
    /// if one is already open.
    ///
    /// # Errors
    ///
    /// Returns an error if connecting or the transfer fails.
    pub async fn fetch(&mut self, node: NodeId, remote_path: &str, local_path: &str) -> Result<u64> {
        let connection = match self.connections.entry(node) {
            std::collections::hash_map::Entry::Occupied(entry) => entry.into_mut(),
            std::collections::hash_map::Entry::Vacant(entry) => {
                entry.insert(self.transport.connect(node).await?)
            }
        };
        connection.fetch_file(remote_path, local_path).await
    }

    /// Number of distinct remote nodes currently connected.
    #[must_use]
    pub fn open_connections(&self) -> usize {
        self.connections.len()
    }
}

impl Drop for FetchSession<'_> {
    fn drop(&mut self) {
        for (_, mut connection) in self.connections.drain() {
            connection.close();
        }
    }
}
