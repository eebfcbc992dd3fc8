//! File deletion task.
//!
//! Removes node-local files left behind by earlier phases (repartition
//! fragments, abandoned temp output). A path that no longer exists is
//! logged and skipped, not an error; cleanup must be idempotent.

use async_trait::async_trait;

use crate::column_io::ColumnStore as _;
use crate::error::Result;
use crate::params::DeleteFilesParams;
use crate::runner::{NodeContext, TaskOutput, TaskProbe, TaskRunner};

/// Runner for [`shale_core::task::TaskType::DeleteFiles`].
pub struct DeleteFilesRunner {
    params: DeleteFilesParams,
}

impl DeleteFilesRunner {
    /// Creates the runner from decoded parameters.
    #[must_use]
    pub const fn new(params: DeleteFilesParams) -> Self {
        Self { params }
    }
}

#[async_trait]
impl TaskRunner for DeleteFilesRunner {
    async fn run(&self, cx: &NodeContext, probe: &mut TaskProbe) -> Result<TaskOutput> {
        let total = self.params.paths.len();
        for (done, path) in self.params.paths.iter().enumerate() {
            if !cx.columns.delete_file(path)? {
                tracing::debug!(%path, "file already absent during cleanup");
            }
            #[allow(clippy::cast_precision_loss)]
            let fraction = if total == 0 {
                1.0
            } else {
                (done + 1) as f64 / total as f64
            };
            probe.tick_rows(1, fraction.min(0.99)).await?;
        }
        Ok(TaskOutput::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column_io::memory::MemoryColumnStore;
    use crate::column_io::ColumnStore;
    use crate::paths::DataPaths;
    use crate::recovery::manifest::InMemoryManifestStore;
    use crate::transport::memory::MemoryCluster;
    use bytes::Bytes;
    use shale_core::{
        CompressionType, Datum, InMemoryRepository, Job, JobType, MetaRepository, NodeId, Task,
        TaskType,
    };
    use std::sync::Arc;

    #[tokio::test]
    async fn deletes_present_files_and_skips_missing() -> Result<()> {
        let repository = Arc::new(InMemoryRepository::new());
        let cluster = MemoryCluster::new();
        let node_id = NodeId::new(1);
        let store: MemoryColumnStore = cluster.add_node(node_id)?;
        store.put_file("frag/a", CompressionType::None, vec![Datum::Int64(1)])?;

        let cx = NodeContext {
            node_id,
            repository: Arc::clone(&repository) as Arc<dyn MetaRepository>,
            columns: Arc::new(store.clone()),
            transport: Arc::new(cluster.transport_for(node_id)),
            manifests: Arc::new(InMemoryManifestStore::new()),
            paths: DataPaths::new(),
        };

        let job = repository
            .create_job(Job::new(JobType::Recovery, "cleanup", Bytes::new()))
            .await?;
        let task = repository
            .create_task(Task::new(job.id, node_id, TaskType::DeleteFiles, Bytes::new()))
            .await?;

        let runner = DeleteFilesRunner::new(DeleteFilesParams {
            paths: vec!["frag/a".into(), "frag/missing".into()],
        });
        let mut probe = TaskProbe::new(Arc::clone(&cx.repository), task.id);
        let output = runner.run(&cx, &mut probe).await?;

        assert!(output.output_paths.is_empty());
        assert!(!store.contains("frag/a")?);
        Ok(())
    }
}
