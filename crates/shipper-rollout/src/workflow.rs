//! Deployer — drives a rollout from `Idle` to `Done`.

use std::sync::Arc;

use serde::Serialize;
use shipper_core::{ContainerImage, EcsApi};
use tracing::{debug, error, info, warn};

use crate::cancel::Cancellation;
use crate::definition::{RegisteredDefinition, Retirement, RetirementWarning, UpdateDefinitionInput};
use crate::error::{DeployError, Stage};
use crate::lock::{family_key, service_key, DeployLock, LockGuard, NoLock};
use crate::service::{validate_target, DeployServiceInput};

/// Phases of a rollout, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowPhase {
    Idle,
    DefinitionResolved,
    DefinitionPatched,
    DefinitionRegistered,
    /// Best effort; skipped when retirement is off or fails.
    OldDefinitionRetired,
    ServiceDescribed,
    ServiceUpdated,
    Done,
}

/// Phase tracker for one rollout.
#[derive(Debug)]
pub(crate) struct Progress {
    phase: WorkflowPhase,
    registered: Option<RegisteredRevision>,
}

impl Progress {
    pub(crate) fn new() -> Self {
        Self {
            phase: WorkflowPhase::Idle,
            registered: None,
        }
    }

    pub(crate) fn phase(&self) -> WorkflowPhase {
        self.phase
    }

    pub(crate) fn advance(&mut self, next: WorkflowPhase) {
        debug!(from = ?self.phase, to = ?next, "rollout phase");
        self.phase = next;
    }
}

/// A full rollout: new task definition revision, then service update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployRequest {
    pub family: String,
    pub images: Vec<ContainerImage>,
    pub cluster: String,
    pub service: String,
    pub retire_previous: bool,
}

impl DeployRequest {
    pub fn new(
        family: impl Into<String>,
        images: Vec<ContainerImage>,
        cluster: impl Into<String>,
        service: impl Into<String>,
    ) -> Self {
        Self {
            family: family.into(),
            images,
            cluster: cluster.into(),
            service: service.into(),
            retire_previous: true,
        }
    }

    fn definition_input(&self) -> UpdateDefinitionInput {
        UpdateDefinitionInput {
            family: self.family.clone(),
            images: self.images.clone(),
            retire_previous: self.retire_previous,
        }
    }
}

/// Summary of a successful rollout.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeployReport {
    pub family: String,
    /// ARN of the registered revision.
    pub task_definition: String,
    /// `family:revision` of the registered revision.
    pub revision: String,
    pub previous_task_definition: String,
    pub cluster: String,
    pub service: String,
    pub desired_count: i32,
    pub retirement: Retirement,
}

/// The task definition half of a rollout, kept when the service half fails.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegisteredRevision {
    pub family: String,
    pub task_definition: String,
    pub revision: String,
    pub previous_task_definition: String,
    pub retirement: Retirement,
}

impl From<&RegisteredDefinition> for RegisteredRevision {
    fn from(registered: &RegisteredDefinition) -> Self {
        Self {
            family: registered.task_definition.family.clone(),
            task_definition: registered.task_definition.task_definition_arn.clone(),
            revision: registered.task_definition.revision_label(),
            previous_task_definition: registered.previous.clone(),
            retirement: registered.retirement.clone(),
        }
    }
}

/// Tagged result of [`Deployer::run`].
#[derive(Debug, Clone)]
pub enum DeployOutcome {
    Done(DeployReport),
    /// The service runs the new revision but the old one was not retired.
    DoneWithWarning {
        report: DeployReport,
        warning: RetirementWarning,
    },
    Failed {
        /// Last phase reached before the failure.
        phase: WorkflowPhase,
        error: DeployError,
        /// Revision registered before the failure; it is not rolled back.
        registered: Option<RegisteredRevision>,
    },
}

impl DeployOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }

    pub fn report(&self) -> Option<&DeployReport> {
        match self {
            Self::Done(report) | Self::DoneWithWarning { report, .. } => Some(report),
            Self::Failed { .. } => None,
        }
    }

    pub fn warning(&self) -> Option<&RetirementWarning> {
        match self {
            Self::DoneWithWarning { warning, .. } => Some(warning),
            _ => None,
        }
    }

    /// Revision registered by a failed rollout, if it got that far.
    pub fn registered(&self) -> Option<&RegisteredRevision> {
        match self {
            Self::Failed { registered, .. } => registered.as_ref(),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&DeployError> {
        match self {
            Self::Failed { error, .. } => Some(error),
            _ => None,
        }
    }
}

/// Runs rollouts against one orchestrator.
///
/// Stateless between calls; cheap to share behind an `Arc`.
#[derive(Clone)]
pub struct Deployer {
    api: Arc<dyn EcsApi>,
    lock: Arc<dyn DeployLock>,
}

impl Deployer {
    pub fn new(api: Arc<dyn EcsApi>) -> Self {
        Self {
            api,
            lock: Arc::new(NoLock),
        }
    }

    /// Serialize rollouts through `lock`.
    pub fn with_lock(mut self, lock: Arc<dyn DeployLock>) -> Self {
        self.lock = lock;
        self
    }

    pub(crate) fn api(&self) -> &dyn EcsApi {
        self.api.as_ref()
    }

    /// Take `keys` in order, giving up if `cancel` fires while waiting.
    pub(crate) async fn acquire(
        &self,
        keys: &[String],
        cancel: &Cancellation,
    ) -> Result<Vec<LockGuard>, DeployError> {
        let mut guards = Vec::with_capacity(keys.len());
        for key in keys {
            let guard = cancel
                .race(self.lock.acquire(key))
                .await
                .map_err(|cause| DeployError::Cancelled {
                    stage: Stage::LockWait,
                    cause,
                })?;
            guards.push(guard);
        }
        Ok(guards)
    }

    /// Run the whole rollout.
    pub async fn run(&self, request: &DeployRequest, cancel: &Cancellation) -> DeployOutcome {
        let mut progress = Progress::new();

        match self.run_in(request, cancel, &mut progress).await {
            Ok(report) => {
                progress.advance(WorkflowPhase::Done);
                match &report.retirement {
                    Retirement::Failed(warning) => {
                        warn!(
                            family = %report.family,
                            service = %report.service,
                            %warning,
                            "deployed with warning"
                        );
                        let warning = warning.clone();
                        DeployOutcome::DoneWithWarning { report, warning }
                    }
                    _ => {
                        info!(
                            family = %report.family,
                            revision = %report.revision,
                            cluster = %report.cluster,
                            service = %report.service,
                            "service deployed"
                        );
                        DeployOutcome::Done(report)
                    }
                }
            }
            Err(error) => {
                error!(
                    family = %request.family,
                    cluster = %request.cluster,
                    service = %request.service,
                    phase = ?progress.phase(),
                    registered = ?progress.registered.as_ref().map(|r| &r.revision),
                    %error,
                    "deployment failed"
                );
                DeployOutcome::Failed {
                    phase: progress.phase(),
                    error,
                    registered: progress.registered.take(),
                }
            }
        }
    }

    async fn run_in(
        &self,
        request: &DeployRequest,
        cancel: &Cancellation,
        progress: &mut Progress,
    ) -> Result<DeployReport, DeployError> {
        let definition_input = request.definition_input();
        definition_input.validate()?;
        validate_target(&request.cluster, &request.service)?;

        let _guards = self
            .acquire(
                &[
                    family_key(&request.family),
                    service_key(&request.cluster, &request.service),
                ],
                cancel,
            )
            .await?;

        let registered = self
            .update_definition_in(&definition_input, cancel, progress)
            .await?;
        progress.registered = Some(RegisteredRevision::from(&registered));

        let service_input = DeployServiceInput {
            cluster: request.cluster.clone(),
            service: request.service.clone(),
            task_definition: registered.task_definition.clone(),
        };
        let service = self.deploy_service_in(&service_input, cancel, progress).await?;

        Ok(DeployReport {
            family: request.family.clone(),
            task_definition: registered.task_definition.task_definition_arn.clone(),
            revision: registered.task_definition.revision_label(),
            previous_task_definition: registered.previous,
            cluster: request.cluster.clone(),
            service: service.service_name,
            desired_count: service.desired_count,
            retirement: registered.retirement,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shipper_core::{ApiError, MemoryEcs, Operation};

    #[test]
    fn phases_are_ordered() {
        assert!(WorkflowPhase::Idle < WorkflowPhase::DefinitionRegistered);
        assert!(WorkflowPhase::DefinitionRegistered < WorkflowPhase::ServiceUpdated);
        assert!(WorkflowPhase::ServiceUpdated < WorkflowPhase::Done);
    }

    #[tokio::test]
    async fn failure_reports_last_phase() {
        let ecs = Arc::new(MemoryEcs::new());
        ecs.seed_task_definition("api", &[("web", "img:v1")]);
        ecs.fail(Operation::DescribeServices, ApiError::Transport("timeout".into()));
        let deployer = Deployer::new(ecs.clone());

        let request = DeployRequest::new("api", vec![ContainerImage::new("web", "img:v2")], "prod", "svc");
        let outcome = deployer.run(&request, &Cancellation::none()).await;

        match outcome {
            DeployOutcome::Failed { phase, error, registered } => {
                assert_eq!(phase, WorkflowPhase::OldDefinitionRetired);
                assert!(matches!(error, DeployError::Api { operation: Operation::DescribeServices, .. }));
                let registered = registered.unwrap();
                assert_eq!(registered.revision, "api:2");
                assert_eq!(registered.retirement, Retirement::Retired);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn invalid_request_fails_at_idle() {
        let deployer = Deployer::new(Arc::new(MemoryEcs::new()));
        let request = DeployRequest::new("api", vec![ContainerImage::new("web", "img:v2")], "prod", "");

        let outcome = deployer.run(&request, &Cancellation::none()).await;
        assert!(!outcome.is_success());
        assert!(matches!(
            outcome,
            DeployOutcome::Failed {
                phase: WorkflowPhase::Idle,
                error: DeployError::InvalidInput(_),
                registered: None,
            }
        ));
    }
}
