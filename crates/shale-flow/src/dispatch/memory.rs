//! In-memory dispatch for tests and development.
//!
//! Envelopes are routed over unbounded channels to per-node
//! [`NodeAgent`] loops, each wrapping a [`TaskExecutor`]. This stands in
//! for whatever RPC fabric a deployment uses; the controller is unaware
//! of the difference.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use shale_core::NodeId;

use super::{TaskDispatcher, TaskEnvelope};
use crate::error::{Error, Result};
use crate::runner::TaskExecutor;

fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::transport("lock poisoned")
}

/// Routes envelopes to registered per-node channels.
#[derive(Default)]
pub struct InMemoryDispatcher {
    senders: RwLock<HashMap<NodeId, mpsc::UnboundedSender<TaskEnvelope>>>,
}

impl InMemoryDispatcher {
    /// Creates a dispatcher with no registered nodes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a node, returning the receiving end of its channel.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn register_node(&self, node: NodeId) -> Result<mpsc::UnboundedReceiver<TaskEnvelope>> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.senders
            .write()
            .map_err(poison_err)?
            .insert(node, sender);
        Ok(receiver)
    }

    /// Registers a node and spawns a worker loop draining its channel
    /// through the given executor.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn spawn_agent(&self, executor: TaskExecutor) -> Result<JoinHandle<()>> {
        let receiver = self.register_node(executor.node_id())?;
        let agent = NodeAgent { executor, receiver };
        Ok(tokio::spawn(agent.run()))
    }
}

#[async_trait]
impl TaskDispatcher for InMemoryDispatcher {
    async fn dispatch(&self, envelope: TaskEnvelope) -> Result<()> {
        let senders = self.senders.read().map_err(poison_err)?;
        let sender = senders.get(&envelope.node_id).ok_or_else(|| {
            Error::transport(format!("no worker registered for node {}", envelope.node_id))
        })?;
        sender
            .send(envelope)
            .map_err(|e| Error::transport(format!("worker channel closed: {e}")))
    }
}

/// Worker loop executing dispatched tasks on one node.
pub struct NodeAgent {
    executor: TaskExecutor,
    receiver: mpsc::UnboundedReceiver<TaskEnvelope>,
}

impl NodeAgent {
    /// Drains the channel until the dispatcher goes away. Execution
    /// failures are fully recorded on the task record, so the loop only
    /// logs and moves on.
    pub async fn run(mut self) {
        while let Some(envelope) = self.receiver.recv().await {
            if let Err(error) = self.executor.execute(envelope.task_id).await {
                tracing::warn!(task_id = %envelope.task_id, %error, "task execution aborted");
            }
        }
    }
}
