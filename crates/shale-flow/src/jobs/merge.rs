//! Merge job driver.
//!
//! Decomposes a merge job into one same-scheme merge task per unit,
//! each assigned to the node that will hold the merged target, and
//! monitors them in a single pass.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use shale_core::task::TaskType;
use shale_core::{Job, JobType, MetaRepository, Task};

use crate::controller::{DispatchContext, JobDriver, JobPlan};
use crate::error::Result;
use crate::params::{MergeJobParams, MergeSameSchemeParams, ParamBlob};

/// Driver for [`JobType::Merge`].
#[derive(Debug, Default)]
pub struct MergeJobDriver;

impl MergeJobDriver {
    /// Creates the driver.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl JobDriver for MergeJobDriver {
    async fn decompose(
        &self,
        repository: &Arc<dyn MetaRepository>,
        params: Bytes,
    ) -> Result<JobPlan> {
        let merge_params = MergeJobParams::decode(&params)?;
        let description = merge_params.description.clone().unwrap_or_else(|| {
            format!(
                "merge {} partition sets under scheme {}",
                merge_params.units.len(),
                merge_params.scheme_id
            )
        });

        let job = repository
            .create_job(Job::new(JobType::Merge, description, params))
            .await?;

        let mut tasks = Vec::with_capacity(merge_params.units.len());
        for unit in &merge_params.units {
            let task_params = MergeSameSchemeParams {
                scheme_id: merge_params.scheme_id,
                target_partition_id: unit.target_partition_id,
                source_partition_ids: unit.source_partition_ids.clone(),
                column_ids: merge_params.column_ids.clone(),
            };
            let task = repository
                .create_task(Task::new(
                    job.id,
                    unit.node_id,
                    TaskType::MergeSameScheme,
                    task_params.encode(),
                ))
                .await?;
            tasks.push(task);
        }

        Ok(JobPlan { job, tasks })
    }

    async fn dispatch(&self, cx: &DispatchContext) -> Result<()> {
        let mut tasks = cx.issue(cx.initial_tasks()).await?;
        cx.join_tasks(&mut tasks, 0.0, 1.0).await
    }
}
