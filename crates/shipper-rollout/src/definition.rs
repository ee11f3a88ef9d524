//! Task definition clone-and-patch.
//!
//! Revisions are immutable, so "updating" a family means registering a
//! new revision cloned from the latest `ACTIVE` one with some container
//! images swapped, then retiring the revision it superseded.

use serde::Serialize;
use shipper_core::{ContainerImage, Operation, RegisterTaskDefinitionRequest, TaskDefinition};
use tracing::{debug, info, warn};

use crate::cancel::Cancellation;
use crate::error::DeployError;
use crate::lock::family_key;
use crate::workflow::{Deployer, Progress, WorkflowPhase};

/// Input of [`Deployer::update_definition`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateDefinitionInput {
    pub family: String,
    pub images: Vec<ContainerImage>,
    /// Deregister the superseded revision after registering the new one.
    pub retire_previous: bool,
}

impl UpdateDefinitionInput {
    pub fn new(family: impl Into<String>, images: Vec<ContainerImage>) -> Self {
        Self {
            family: family.into(),
            images,
            retire_previous: true,
        }
    }

    pub(crate) fn validate(&self) -> Result<(), DeployError> {
        if self.family.trim().is_empty() {
            return Err(DeployError::InvalidInput("no task definition family specified".into()));
        }
        if self.images.is_empty() {
            return Err(DeployError::InvalidInput("no container images specified".into()));
        }
        if let Some(bad) = self
            .images
            .iter()
            .find(|i| i.name.trim().is_empty() || i.image.trim().is_empty())
        {
            return Err(DeployError::InvalidInput(format!(
                "container image entry {bad} needs both a name and an image"
            )));
        }
        Ok(())
    }
}

/// What happened to the superseded revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Retirement {
    Retired,
    /// Retirement was not requested.
    Skipped,
    Failed(RetirementWarning),
}

/// The new revision is live but the old one is still `ACTIVE`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetirementWarning {
    pub task_definition: String,
    pub message: String,
}

impl std::fmt::Display for RetirementWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "previous revision {} was not deregistered: {}",
            self.task_definition, self.message
        )
    }
}

/// Result of [`Deployer::update_definition`].
#[derive(Debug, Clone, PartialEq)]
pub struct RegisteredDefinition {
    /// The newly registered revision.
    pub task_definition: TaskDefinition,
    /// ARN of the revision it was cloned from.
    pub previous: String,
    pub retirement: Retirement,
}

impl Deployer {
    /// Register a new revision of `input.family` with patched images.
    pub async fn update_definition(
        &self,
        input: &UpdateDefinitionInput,
        cancel: &Cancellation,
    ) -> Result<RegisteredDefinition, DeployError> {
        input.validate()?;
        let _guard = self.acquire(&[family_key(&input.family)], cancel).await?;
        let mut progress = Progress::new();
        self.update_definition_in(input, cancel, &mut progress).await
    }

    pub(crate) async fn update_definition_in(
        &self,
        input: &UpdateDefinitionInput,
        cancel: &Cancellation,
        progress: &mut Progress,
    ) -> Result<RegisteredDefinition, DeployError> {
        let family = input.family.as_str();
        let api = self.api();

        let latest = cancel
            .guard(
                Operation::ListTaskDefinitions,
                family,
                api.list_task_definitions(family, 1),
            )
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| DeployError::DefinitionNotFound {
                family: family.to_string(),
            })?;

        let source = cancel
            .guard(
                Operation::DescribeTaskDefinition,
                &latest,
                api.describe_task_definition(&latest),
            )
            .await?;
        let previous = source.task_definition.task_definition_arn.clone();
        progress.advance(WorkflowPhase::DefinitionResolved);
        debug!(
            %family,
            revision = %source.task_definition.revision_label(),
            containers = source.task_definition.container_definitions.len(),
            tags = source.tags.len(),
            "resolved latest task definition"
        );

        let mut request = RegisterTaskDefinitionRequest::from_revision(&source);
        request.family = family.to_string();
        let patch = request.apply_images(&input.images);
        if !patch.is_complete() {
            warn!(
                %family,
                requested = patch.requested,
                matched = patch.matched,
                missing = ?patch.missing,
                "container mismatch, nothing registered"
            );
            return Err(DeployError::ContainerMismatch {
                family: family.to_string(),
                requested: patch.requested,
                matched: patch.matched,
                missing: patch.missing,
            });
        }
        progress.advance(WorkflowPhase::DefinitionPatched);

        let registered = cancel
            .guard(
                Operation::RegisterTaskDefinition,
                family,
                api.register_task_definition(&request),
            )
            .await?;
        progress.advance(WorkflowPhase::DefinitionRegistered);
        info!(
            %family,
            revision = %registered.revision_label(),
            previous = %previous,
            "registered task definition"
        );

        let retirement = if !input.retire_previous {
            Retirement::Skipped
        } else {
            match cancel
                .guard(
                    Operation::DeregisterTaskDefinition,
                    &previous,
                    api.deregister_task_definition(&previous),
                )
                .await
            {
                Ok(()) => {
                    progress.advance(WorkflowPhase::OldDefinitionRetired);
                    info!(%family, task_definition = %previous, "deregistered previous task definition");
                    Retirement::Retired
                }
                Err(err @ DeployError::Cancelled { .. }) => return Err(err),
                Err(err) => {
                    warn!(
                        %family,
                        task_definition = %previous,
                        error = %err,
                        "failed to deregister previous task definition"
                    );
                    Retirement::Failed(RetirementWarning {
                        task_definition: previous.clone(),
                        message: err.to_string(),
                    })
                }
            }
        };

        Ok(RegisteredDefinition {
            task_definition: registered,
            previous,
            retirement,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shipper_core::{ApiError, MemoryEcs};
    use std::sync::Arc;

    fn images(pairs: &[(&str, &str)]) -> Vec<ContainerImage> {
        pairs.iter().map(|(n, i)| ContainerImage::new(*n, *i)).collect()
    }

    fn api_family() -> (Arc<MemoryEcs>, Deployer, TaskDefinition) {
        let ecs = Arc::new(MemoryEcs::new());
        let seeded = ecs.seed_task_definition("api", &[("web", "img:v1"), ("sidecar", "img:base")]);
        let deployer = Deployer::new(ecs.clone());
        (ecs, deployer, seeded)
    }

    #[tokio::test]
    async fn patches_named_container_and_retires_previous() {
        let (ecs, deployer, seeded) = api_family();
        let input = UpdateDefinitionInput::new("api", images(&[("web", "img:v2")]));

        let out = deployer.update_definition(&input, &Cancellation::none()).await.unwrap();

        assert_eq!(out.task_definition.revision, 2);
        assert_eq!(out.previous, seeded.task_definition_arn);
        assert_eq!(out.retirement, Retirement::Retired);

        let containers = &out.task_definition.container_definitions;
        assert_eq!(containers[0].image.as_deref(), Some("img:v2"));
        assert_eq!(containers[1].image.as_deref(), Some("img:base"));

        let active = ecs.active_revisions("api");
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].revision, 2);
    }

    #[tokio::test]
    async fn unknown_container_registers_nothing() {
        let (ecs, deployer, _) = api_family();
        let input = UpdateDefinitionInput::new("api", images(&[("worker", "img:v2")]));

        let err = deployer.update_definition(&input, &Cancellation::none()).await.unwrap_err();

        assert!(matches!(
            err,
            DeployError::ContainerMismatch { ref family, matched: 0, .. } if family == "api"
        ));
        assert_eq!(ecs.call_count(Operation::RegisterTaskDefinition), 0);
        assert_eq!(ecs.active_revisions("api").len(), 1);
    }

    #[tokio::test]
    async fn partial_match_is_still_a_mismatch() {
        let (ecs, deployer, _) = api_family();
        let input = UpdateDefinitionInput::new(
            "api",
            images(&[("web", "img:v2"), ("worker", "img:v2")]),
        );

        let err = deployer.update_definition(&input, &Cancellation::none()).await.unwrap_err();
        assert!(matches!(err, DeployError::ContainerMismatch { matched: 1, requested: 2, .. }));
        assert_eq!(ecs.call_count(Operation::RegisterTaskDefinition), 0);
    }

    #[tokio::test]
    async fn missing_family_is_definition_not_found() {
        let ecs = Arc::new(MemoryEcs::new());
        let deployer = Deployer::new(ecs.clone());
        let input = UpdateDefinitionInput::new("api", images(&[("web", "img:v2")]));

        let err = deployer.update_definition(&input, &Cancellation::none()).await.unwrap_err();
        assert!(matches!(err, DeployError::DefinitionNotFound { ref family } if family == "api"));
        assert_eq!(ecs.call_count(Operation::DescribeTaskDefinition), 0);
    }

    #[tokio::test]
    async fn registration_failure_keeps_old_revision() {
        let (ecs, deployer, seeded) = api_family();
        ecs.fail(
            Operation::RegisterTaskDefinition,
            ApiError::service("ClientException", "limit exceeded"),
        );
        let input = UpdateDefinitionInput::new("api", images(&[("web", "img:v2")]));

        let err = deployer.update_definition(&input, &Cancellation::none()).await.unwrap_err();
        assert!(matches!(
            err,
            DeployError::Api { operation: Operation::RegisterTaskDefinition, .. }
        ));
        assert_eq!(ecs.call_count(Operation::DeregisterTaskDefinition), 0);
        assert_eq!(ecs.active_revisions("api")[0].task_definition_arn, seeded.task_definition_arn);
    }

    #[tokio::test]
    async fn deregistration_failure_is_a_warning() {
        let (ecs, deployer, seeded) = api_family();
        ecs.fail(
            Operation::DeregisterTaskDefinition,
            ApiError::Transport("connection reset".into()),
        );
        let input = UpdateDefinitionInput::new("api", images(&[("web", "img:v2")]));

        let out = deployer.update_definition(&input, &Cancellation::none()).await.unwrap();
        assert_eq!(out.task_definition.revision, 2);
        match out.retirement {
            Retirement::Failed(warning) => {
                assert_eq!(warning.task_definition, seeded.task_definition_arn);
                assert!(warning.message.contains("connection reset"));
            }
            other => panic!("unexpected retirement: {other:?}"),
        }
        assert_eq!(ecs.active_revisions("api").len(), 2);
    }

    #[tokio::test]
    async fn retirement_can_be_skipped() {
        let (ecs, deployer, _) = api_family();
        let mut input = UpdateDefinitionInput::new("api", images(&[("web", "img:v2")]));
        input.retire_previous = false;

        let out = deployer.update_definition(&input, &Cancellation::none()).await.unwrap();
        assert_eq!(out.retirement, Retirement::Skipped);
        assert_eq!(ecs.call_count(Operation::DeregisterTaskDefinition), 0);
    }

    #[tokio::test]
    async fn untagged_source_sends_no_tags() {
        let (ecs, deployer, _) = api_family();
        let input = UpdateDefinitionInput::new("api", images(&[("web", "img:v2")]));
        deployer.update_definition(&input, &Cancellation::none()).await.unwrap();

        let sent = ecs.registrations();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].tags, None);
    }

    #[tokio::test]
    async fn rerun_with_same_images_does_not_drift() {
        let (ecs, deployer, _) = api_family();
        let input = UpdateDefinitionInput::new("api", images(&[("web", "img:v2")]));

        let first = deployer.update_definition(&input, &Cancellation::none()).await.unwrap();
        let second = deployer.update_definition(&input, &Cancellation::none()).await.unwrap();

        assert_eq!(second.previous, first.task_definition.task_definition_arn);
        assert_eq!(
            second.task_definition.container_definitions,
            first.task_definition.container_definitions
        );
        assert_eq!(ecs.active_revisions("api")[0].revision, 3);
    }

    #[tokio::test]
    async fn empty_input_is_rejected_before_any_call() {
        let (ecs, deployer, _) = api_family();

        let no_images = UpdateDefinitionInput::new("api", Vec::new());
        assert!(matches!(
            deployer.update_definition(&no_images, &Cancellation::none()).await,
            Err(DeployError::InvalidInput(_))
        ));

        let no_family = UpdateDefinitionInput::new(" ", images(&[("web", "img:v2")]));
        assert!(matches!(
            deployer.update_definition(&no_family, &Cancellation::none()).await,
            Err(DeployError::InvalidInput(_))
        ));

        let blank_name = UpdateDefinitionInput::new("api", images(&[("", "img:v2")]));
        assert!(matches!(
            deployer.update_definition(&blank_name, &Cancellation::none()).await,
            Err(DeployError::InvalidInput(_))
        ));

        assert!(ecs.calls().is_empty());
    }
}
