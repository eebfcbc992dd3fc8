//! Controller lifecycle scenarios: error propagation, cooperative stop,
//! bounded forced stop, progress accounting.
//!
//! Nodes are simulated by spawned tasks that manipulate task records in
//! the repository, which is the only channel the controller watches.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use shale_core::task::TaskType;
use shale_core::{
    InMemoryRepository, Job, JobType, MetaRepository, NodeId, RunStatus, Task, TaskId, TaskUpdate,
};
use shale_flow::controller::{
    DispatchContext, JobController, JobControllerConfig, JobDriver, JobPlan,
};
use shale_flow::dispatch::{TaskDispatcher, TaskEnvelope};
use shale_flow::error::Result;

/// Dispatch backend that accepts every envelope; the simulated nodes
/// watch the repository instead.
struct NullDispatcher;

#[async_trait]
impl TaskDispatcher for NullDispatcher {
    async fn dispatch(&self, _envelope: TaskEnvelope) -> Result<()> {
        Ok(())
    }
}

/// Driver that decomposes into `task_count` placeholder tasks and joins
/// them over the full progress range.
struct ScriptedDriver {
    task_count: usize,
}

#[async_trait]
impl JobDriver for ScriptedDriver {
    async fn decompose(
        &self,
        repository: &Arc<dyn MetaRepository>,
        params: Bytes,
    ) -> Result<JobPlan> {
        let job = repository
            .create_job(Job::new(JobType::Merge, "scripted", params))
            .await?;
        let mut tasks = Vec::with_capacity(self.task_count);
        for _ in 0..self.task_count {
            tasks.push(
                repository
                    .create_task(Task::new(
                        job.id,
                        NodeId::new(1),
                        TaskType::DeleteFiles,
                        Bytes::new(),
                    ))
                    .await?,
            );
        }
        Ok(JobPlan { job, tasks })
    }

    async fn dispatch(&self, cx: &DispatchContext) -> Result<()> {
        let mut tasks = cx.issue(cx.initial_tasks()).await?;
        cx.join_tasks(&mut tasks, 0.0, 1.0).await
    }
}

/// Driver whose dispatch just sleeps; used for the bounded-stop tests.
struct SleepingDriver {
    sleep: Duration,
}

#[async_trait]
impl JobDriver for SleepingDriver {
    async fn decompose(
        &self,
        repository: &Arc<dyn MetaRepository>,
        params: Bytes,
    ) -> Result<JobPlan> {
        let job = repository
            .create_job(Job::new(JobType::Merge, "sleeper", params))
            .await?;
        Ok(JobPlan { job, tasks: vec![] })
    }

    async fn dispatch(&self, _cx: &DispatchContext) -> Result<()> {
        tokio::time::sleep(self.sleep).await;
        Ok(())
    }
}

fn fast_config() -> JobControllerConfig {
    JobControllerConfig {
        poll_interval: Duration::from_millis(20),
        error_poll_interval: Duration::from_millis(5),
        stop_check_interval: Duration::from_millis(5),
        stop_max_wait: Duration::from_millis(500),
    }
}

fn controller(
    repository: &Arc<InMemoryRepository>,
    driver: Arc<dyn JobDriver>,
    config: JobControllerConfig,
) -> JobController {
    JobController::with_config(
        Arc::clone(repository) as Arc<dyn MetaRepository>,
        Arc::new(NullDispatcher),
        driver,
        config,
    )
}

/// How a simulated node treats its task.
#[derive(Clone, Copy)]
enum NodeScript {
    /// Run, then succeed after the delay.
    SucceedAfter(Duration),
    /// Run, then fail after the delay with the given message.
    FailAfter(Duration, &'static str),
    /// Run, then finish only when a cancellation request arrives.
    RunUntilCanceled,
    /// Run and never finish, ignoring cancellation requests.
    Hang,
}

fn spawn_node(repository: Arc<InMemoryRepository>, task_id: TaskId, script: NodeScript) {
    tokio::spawn(async move {
        // Wait until the task record exists and is issued.
        loop {
            match repository.get_task(task_id).await {
                Ok(task) if task.status == RunStatus::StartRequested => break,
                _ => tokio::time::sleep(Duration::from_millis(2)).await,
            }
        }
        repository
            .update_task(task_id, TaskUpdate::status(RunStatus::Running))
            .await
            .expect("mark running");

        match script {
            NodeScript::SucceedAfter(delay) => {
                tokio::time::sleep(delay).await;
                let update = TaskUpdate {
                    status: Some(RunStatus::Done),
                    progress: Some(1.0),
                    ..TaskUpdate::default()
                };
                repository.update_task(task_id, update).await.expect("done");
            }
            NodeScript::FailAfter(delay, message) => {
                tokio::time::sleep(delay).await;
                let update = TaskUpdate {
                    status: Some(RunStatus::Error),
                    error_messages: Some(message.to_string()),
                    ..TaskUpdate::default()
                };
                repository.update_task(task_id, update).await.expect("fail");
            }
            NodeScript::RunUntilCanceled => loop {
                let task = repository.get_task(task_id).await.expect("task exists");
                if task.status == RunStatus::CancelRequested {
                    repository
                        .update_task(task_id, TaskUpdate::status(RunStatus::Canceled))
                        .await
                        .expect("canceled");
                    break;
                }
                tokio::time::sleep(Duration::from_millis(2)).await;
            },
            NodeScript::Hang => {}
        }
    });
}

#[tokio::test]
async fn error_in_one_task_cancels_siblings_and_fails_the_job() {
    let repository = Arc::new(InMemoryRepository::new());
    let controller = controller(
        &repository,
        Arc::new(ScriptedDriver { task_count: 3 }),
        fast_config(),
    );

    let job = controller.start_async(Bytes::new()).await.expect("start");
    let tasks = repository.tasks_by_job(job.id).await.expect("tasks");
    assert_eq!(tasks.len(), 3);

    spawn_node(
        Arc::clone(&repository),
        tasks[0].id,
        NodeScript::RunUntilCanceled,
    );
    spawn_node(
        Arc::clone(&repository),
        tasks[1].id,
        NodeScript::FailAfter(Duration::from_millis(30), "disk failed"),
    );
    spawn_node(
        Arc::clone(&repository),
        tasks[2].id,
        NodeScript::RunUntilCanceled,
    );

    while !controller.is_stopped() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let finished = repository.get_job(job.id).await.expect("job");
    assert_eq!(finished.status, RunStatus::Error);
    assert_eq!(finished.error_messages.as_deref(), Some("disk failed"));

    // An internally observed error waits for every sibling to finish.
    for task in repository.tasks_by_job(job.id).await.expect("tasks") {
        assert!(task.is_finished(), "task {} not finished", task.id);
    }
    let canceled = repository
        .tasks_by_job(job.id)
        .await
        .expect("tasks")
        .into_iter()
        .filter(|t| t.status == RunStatus::Canceled)
        .count();
    assert_eq!(canceled, 2);
}

#[tokio::test]
async fn cooperative_stop_returns_without_cancel_confirmation() {
    let repository = Arc::new(InMemoryRepository::new());
    let controller = controller(
        &repository,
        Arc::new(ScriptedDriver { task_count: 5 }),
        fast_config(),
    );

    let job = controller.start_async(Bytes::new()).await.expect("start");
    let tasks = repository.tasks_by_job(job.id).await.expect("tasks");

    for task in tasks.iter().take(3) {
        spawn_node(
            Arc::clone(&repository),
            task.id,
            NodeScript::SucceedAfter(Duration::from_millis(10)),
        );
    }
    // Two tasks keep running and never confirm cancellation.
    for task in tasks.iter().skip(3) {
        spawn_node(Arc::clone(&repository), task.id, NodeScript::Hang);
    }

    // Let the quick tasks finish before stopping.
    tokio::time::sleep(Duration::from_millis(80)).await;
    controller.request_stop();

    while !controller.is_stopped() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let finished = repository.get_job(job.id).await.expect("job");
    assert_eq!(finished.status, RunStatus::Canceled);

    // The hung tasks received the request but never confirmed; the loop
    // did not wait for them.
    let tasks = repository.tasks_by_job(job.id).await.expect("tasks");
    let cancel_requested = tasks
        .iter()
        .filter(|t| t.status == RunStatus::CancelRequested)
        .count();
    assert_eq!(cancel_requested, 2);
}

#[tokio::test(start_paused = true)]
async fn stop_returns_once_the_loop_exits() {
    let repository = Arc::new(InMemoryRepository::new());
    let mut config = fast_config();
    config.stop_max_wait = Duration::from_millis(3000);
    let controller = controller(
        &repository,
        Arc::new(SleepingDriver {
            sleep: Duration::from_millis(1000),
        }),
        config,
    );

    controller.start_async(Bytes::new()).await.expect("start");

    let started = tokio::time::Instant::now();
    controller.stop().await;
    let waited = started.elapsed();

    assert!(controller.is_stopped());
    // The loop exited after ~1s of driver sleep, well under the 3s bound.
    assert!(waited < Duration::from_millis(1500), "waited {waited:?}");
}

#[tokio::test(start_paused = true)]
async fn stop_gives_up_at_the_bound_when_the_loop_hangs() {
    let repository = Arc::new(InMemoryRepository::new());
    let mut config = fast_config();
    config.stop_max_wait = Duration::from_millis(3000);
    let controller = controller(
        &repository,
        Arc::new(SleepingDriver {
            sleep: Duration::from_millis(5000),
        }),
        config,
    );

    controller.start_async(Bytes::new()).await.expect("start");

    let started = tokio::time::Instant::now();
    controller.stop().await;
    let waited = started.elapsed();

    // Returned at the bound with the loop still running.
    assert!(!controller.is_stopped());
    assert!(waited >= Duration::from_millis(3000), "waited {waited:?}");
    assert!(waited < Duration::from_millis(4000), "waited {waited:?}");
}

#[tokio::test]
async fn progress_is_monotonic_and_reaches_one_on_done() {
    let repository = Arc::new(InMemoryRepository::new());
    let controller = controller(
        &repository,
        Arc::new(ScriptedDriver { task_count: 3 }),
        fast_config(),
    );

    let job = controller.start_async(Bytes::new()).await.expect("start");
    let tasks = repository.tasks_by_job(job.id).await.expect("tasks");
    for (index, task) in tasks.iter().enumerate() {
        spawn_node(
            Arc::clone(&repository),
            task.id,
            NodeScript::SucceedAfter(Duration::from_millis(20 * (index as u64 + 1))),
        );
    }

    let mut samples = Vec::new();
    while !controller.is_stopped() {
        samples.push(repository.get_job(job.id).await.expect("job").progress);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    samples.push(repository.get_job(job.id).await.expect("job").progress);

    assert!(
        samples.windows(2).all(|w| w[0] <= w[1]),
        "progress regressed: {samples:?}"
    );

    let finished = repository.get_job(job.id).await.expect("job");
    assert_eq!(finished.status, RunStatus::Done);
    assert!((finished.progress - 1.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn start_sync_returns_the_terminal_job() {
    let repository = Arc::new(InMemoryRepository::new());
    let controller = controller(
        &repository,
        Arc::new(ScriptedDriver { task_count: 1 }),
        fast_config(),
    );

    let repository_for_node = Arc::clone(&repository);
    let node = tokio::spawn(async move {
        // The task id is 1: first task created in an empty repository.
        spawn_node(
            repository_for_node,
            TaskId::new(1),
            NodeScript::SucceedAfter(Duration::from_millis(10)),
        );
    });

    let job = controller.start_sync(Bytes::new()).await.expect("run");
    node.await.expect("node script");

    assert_eq!(job.status, RunStatus::Done);
    assert!(controller.is_stopped());
}

#[tokio::test]
async fn decomposition_failure_propagates_to_the_caller() {
    struct UnassignedDriver;

    #[async_trait]
    impl JobDriver for UnassignedDriver {
        async fn decompose(
            &self,
            _repository: &Arc<dyn MetaRepository>,
            params: Bytes,
        ) -> Result<JobPlan> {
            // Never inserted: the job keeps its zero id.
            Ok(JobPlan {
                job: Job::new(JobType::Merge, "never inserted", params),
                tasks: vec![],
            })
        }

        async fn dispatch(&self, _cx: &DispatchContext) -> Result<()> {
            Ok(())
        }
    }

    let repository = Arc::new(InMemoryRepository::new());
    let controller = controller(&repository, Arc::new(UnassignedDriver), fast_config());

    let result = controller.start_async(Bytes::new()).await;
    assert!(result.is_err());
    assert!(controller.job_id().is_none());
}

#[tokio::test]
async fn stop_eagerly_marks_the_job_record() {
    let repository = Arc::new(InMemoryRepository::new());
    let controller = controller(
        &repository,
        Arc::new(ScriptedDriver { task_count: 1 }),
        fast_config(),
    );

    let job = controller.start_async(Bytes::new()).await.expect("start");
    spawn_node(Arc::clone(&repository), TaskId::new(1), NodeScript::Hang);

    // Give the loop a moment to reach RUNNING, then stop.
    tokio::time::sleep(Duration::from_millis(30)).await;
    controller.stop().await;

    let record = repository.get_job(job.id).await.expect("job");
    // Either the eager CANCEL_REQUESTED write or, once the loop exits,
    // the terminal CANCELED, never a still-running record.
    assert!(
        matches!(record.status, RunStatus::CancelRequested | RunStatus::Canceled),
        "unexpected status {}",
        record.status
    );
}
