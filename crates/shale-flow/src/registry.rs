//! Task type registry.
//!
//! A fixed mapping from task type tag to (parameter decoder, runner
//! constructor), resolved once at process start. The dispatcher stays
//! decoupled from every concrete task implementation, and the set of
//! supported task types is testable on its own. An unmapped tag is a
//! caller error, never a panic.

use std::collections::HashMap;

use bytes::Bytes;

use shale_core::task::TaskType;

use crate::error::{Error, Result};
use crate::params::{
    DeleteFilesParams, MergeSameSchemeParams, ParamBlob, RecoverFragmentsParams,
    RecoverFromBuddyParams, RepartitionParams,
};
use crate::recovery::buddy::RecoverFromBuddyRunner;
use crate::recovery::recover::RecoverFragmentsRunner;
use crate::recovery::repartition::RepartitionRunner;
use crate::runner::TaskRunner;
use crate::tasks::delete::DeleteFilesRunner;
use crate::tasks::merge::MergeSameSchemeRunner;

type RunnerFactory = fn(&Bytes) -> Result<Box<dyn TaskRunner>>;

/// Static task-type → runner-factory mapping.
pub struct TaskRegistry {
    factories: HashMap<TaskType, RunnerFactory>,
}

impl TaskRegistry {
    /// Builds an empty registry. Useful in tests exercising unmapped
    /// tags; production code uses [`TaskRegistry::standard`].
    #[must_use]
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Builds the full registry of supported task types.
    #[must_use]
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry.register(TaskType::MergeSameScheme, |blob| {
            Ok(Box::new(MergeSameSchemeRunner::new(
                MergeSameSchemeParams::decode(blob)?,
            )))
        });
        registry.register(TaskType::Repartition, |blob| {
            Ok(Box::new(RepartitionRunner::new(RepartitionParams::decode(
                blob,
            )?)))
        });
        registry.register(TaskType::RecoverFromBuddy, |blob| {
            Ok(Box::new(RecoverFromBuddyRunner::new(
                RecoverFromBuddyParams::decode(blob)?,
            )))
        });
        registry.register(TaskType::RecoverFromRepartitionedFragments, |blob| {
            Ok(Box::new(RecoverFragmentsRunner::new(
                RecoverFragmentsParams::decode(blob)?,
            )))
        });
        registry.register(TaskType::DeleteFiles, |blob| {
            Ok(Box::new(DeleteFilesRunner::new(DeleteFilesParams::decode(
                blob,
            )?)))
        });
        registry
    }

    fn register(&mut self, task_type: TaskType, factory: RunnerFactory) {
        self.factories.insert(task_type, factory);
    }

    /// Decodes the parameter blob and constructs the runner for a task
    /// type.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownTaskType`] for unmapped tags, or a decode
    /// error if the blob does not match the type's layout.
    pub fn instantiate(&self, task_type: TaskType, params: &Bytes) -> Result<Box<dyn TaskRunner>> {
        let factory = self.factories.get(&task_type).ok_or_else(|| {
            Error::UnknownTaskType {
                task_type: task_type.to_string(),
            }
        })?;
        factory(params)
    }

    /// The task types this registry can instantiate.
    #[must_use]
    pub fn supported_types(&self) -> Vec<TaskType> {
        let mut types: Vec<TaskType> = self.factories.keys().copied().collect();
        types.sort_by_key(TaskType::as_label);
        types
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_registry_covers_every_task_type() {
        let registry = TaskRegistry::standard();
        let supported = registry.supported_types();
        for task_type in [
            TaskType::MergeSameScheme,
            TaskType::Repartition,
            TaskType::RecoverFromBuddy,
            TaskType::RecoverFromRepartitionedFragments,
            TaskType::DeleteFiles,
        ] {
            assert!(supported.contains(&task_type), "{task_type} unmapped");
        }
    }

    #[test]
    fn unmapped_tag_is_an_error_not_a_panic() {
        let registry = TaskRegistry::empty();
        let result = registry.instantiate(TaskType::DeleteFiles, &Bytes::new());
        assert!(matches!(result, Err(Error::UnknownTaskType { .. })));
    }

    #[test]
    fn instantiate_decodes_params() {
        let registry = TaskRegistry::standard();
        let params = DeleteFilesParams {
            paths: vec!["tmp/t1/a.col".into()],
        };
        assert!(registry
            .instantiate(TaskType::DeleteFiles, &params.encode())
            .is_ok());

        // A garbage blob fails decoding, not instantiation.
        let garbage = Bytes::from_static(&[1, 2, 3]);
        assert!(matches!(
            registry.instantiate(TaskType::DeleteFiles, &garbage),
            Err(Error::ParamDecode { .. })
        ));
    }
}
