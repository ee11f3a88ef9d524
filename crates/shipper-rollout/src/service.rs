//! Service repointing.
//!
//! Reads the service's current operational settings and re-applies them
//! against the new task definition with a forced redeployment.

use shipper_core::{Operation, Service, TaskDefinition, UpdateServiceRequest};
use tracing::{debug, info};

use crate::cancel::Cancellation;
use crate::error::DeployError;
use crate::lock::service_key;
use crate::workflow::{Deployer, Progress, WorkflowPhase};

/// Input of [`Deployer::deploy_service`].
#[derive(Debug, Clone, PartialEq)]
pub struct DeployServiceInput {
    pub cluster: String,
    pub service: String,
    /// Revision produced by [`Deployer::update_definition`].
    pub task_definition: TaskDefinition,
}

impl DeployServiceInput {
    pub(crate) fn validate(&self) -> Result<(), DeployError> {
        validate_target(&self.cluster, &self.service)
    }
}

pub(crate) fn validate_target(cluster: &str, service: &str) -> Result<(), DeployError> {
    if service.trim().is_empty() {
        return Err(DeployError::InvalidInput("no service specified".into()));
    }
    if cluster.trim().is_empty() {
        return Err(DeployError::InvalidInput("no cluster specified".into()));
    }
    Ok(())
}

impl Deployer {
    /// Point `input.service` at `input.task_definition` and force a new deployment.
    pub async fn deploy_service(
        &self,
        input: &DeployServiceInput,
        cancel: &Cancellation,
    ) -> Result<Service, DeployError> {
        input.validate()?;
        let _guard = self
            .acquire(&[service_key(&input.cluster, &input.service)], cancel)
            .await?;
        let mut progress = Progress::new();
        self.deploy_service_in(input, cancel, &mut progress).await
    }

    pub(crate) async fn deploy_service_in(
        &self,
        input: &DeployServiceInput,
        cancel: &Cancellation,
        progress: &mut Progress,
    ) -> Result<Service, DeployError> {
        let (cluster, service) = (input.cluster.as_str(), input.service.as_str());
        let target = format!("{cluster}/{service}");
        let api = self.api();

        let current = cancel
            .guard(
                Operation::DescribeServices,
                &target,
                api.describe_service(cluster, service),
            )
            .await?
            .ok_or_else(|| DeployError::ServiceNotFound {
                cluster: cluster.to_string(),
                service: service.to_string(),
            })?;
        progress.advance(WorkflowPhase::ServiceDescribed);

        let arn = input.task_definition.task_definition_arn.as_str();
        // Only a deployment already running this exact revision contributes
        // its Service Connect settings.
        let service_connect = current.service_connect_for(arn).cloned();
        debug!(
            %cluster,
            %service,
            current = current.task_definition.as_deref().unwrap_or("-"),
            deployments = current.deployments.len(),
            service_connect = service_connect.is_some(),
            "described service"
        );

        let request = UpdateServiceRequest::repoint(cluster, service, &current, arn, service_connect);
        let updated = cancel
            .guard(Operation::UpdateService, &target, api.update_service(&request))
            .await?;
        progress.advance(WorkflowPhase::ServiceUpdated);
        info!(
            %cluster,
            %service,
            revision = %input.task_definition.revision_label(),
            desired = updated.desired_count,
            "service updated, new deployment forced"
        );

        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shipper_core::{ApiError, MemoryEcs, ServiceConnectConfiguration};
    use std::sync::Arc;

    fn prod_service(task_definition: &str) -> Service {
        serde_json::from_value(serde_json::json!({
            "serviceName": "svc",
            "status": "ACTIVE",
            "taskDefinition": task_definition,
            "desiredCount": 3,
            "loadBalancers": [{ "targetGroupArn": "lb-1", "containerName": "web", "containerPort": 80 }],
            "deployments": [{
                "id": "ecs-svc/0",
                "status": "PRIMARY",
                "taskDefinition": task_definition,
                "desiredCount": 3,
                "serviceConnectConfiguration": { "enabled": true, "namespace": "internal" }
            }]
        }))
        .unwrap()
    }

    fn setup() -> (Arc<MemoryEcs>, Deployer, TaskDefinition, TaskDefinition) {
        let ecs = Arc::new(MemoryEcs::new());
        let old = ecs.seed_task_definition("api", &[("web", "img:v1")]);
        let new = ecs.seed_task_definition("api", &[("web", "img:v2")]);
        ecs.insert_service("prod", prod_service(&old.task_definition_arn));
        let deployer = Deployer::new(ecs.clone());
        (ecs, deployer, old, new)
    }

    fn input(task_definition: TaskDefinition) -> DeployServiceInput {
        DeployServiceInput {
            cluster: "prod".into(),
            service: "svc".into(),
            task_definition,
        }
    }

    #[tokio::test]
    async fn repoints_and_preserves_settings() {
        let (ecs, deployer, _, new) = setup();

        let updated = deployer
            .deploy_service(&input(new.clone()), &Cancellation::none())
            .await
            .unwrap();

        assert_eq!(updated.task_definition.as_deref(), Some(new.task_definition_arn.as_str()));
        assert_eq!(updated.desired_count, 3);
        assert_eq!(updated.load_balancers[0].target_group_arn.as_deref(), Some("lb-1"));

        let sent = ecs.updates();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].force_new_deployment);
        assert_eq!(sent[0].desired_count, Some(3));
    }

    #[tokio::test]
    async fn service_connect_not_carried_from_other_revision() {
        let (ecs, deployer, _, new) = setup();
        deployer
            .deploy_service(&input(new), &Cancellation::none())
            .await
            .unwrap();

        assert_eq!(ecs.updates()[0].service_connect_configuration, None);
    }

    #[tokio::test]
    async fn service_connect_carried_when_revision_already_deployed() {
        let (ecs, deployer, old, _) = setup();
        deployer
            .deploy_service(&input(old), &Cancellation::none())
            .await
            .unwrap();

        let expected = ServiceConnectConfiguration {
            enabled: true,
            namespace: Some("internal".into()),
            settings: Default::default(),
        };
        assert_eq!(ecs.updates()[0].service_connect_configuration, Some(expected));
    }

    #[tokio::test]
    async fn missing_service_is_service_not_found() {
        let (ecs, deployer, _, new) = setup();
        let mut missing = input(new);
        missing.service = "other".into();

        let err = deployer
            .deploy_service(&missing, &Cancellation::none())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DeployError::ServiceNotFound { ref cluster, ref service } if cluster == "prod" && service == "other"
        ));
        assert_eq!(ecs.call_count(Operation::UpdateService), 0);
    }

    #[tokio::test]
    async fn update_failure_is_fatal() {
        let (ecs, deployer, _, new) = setup();
        ecs.fail(Operation::UpdateService, ApiError::service("AccessDeniedException", "denied"));

        let err = deployer
            .deploy_service(&input(new), &Cancellation::none())
            .await
            .unwrap_err();
        assert!(matches!(err, DeployError::Api { operation: Operation::UpdateService, ref target, .. } if target == "prod/svc"));
    }

    #[tokio::test]
    async fn blank_cluster_is_rejected() {
        let (ecs, deployer, _, new) = setup();
        let mut bad = input(new);
        bad.cluster = String::new();

        assert!(matches!(
            deployer.deploy_service(&bad, &Cancellation::none()).await,
            Err(DeployError::InvalidInput(_))
        ));
        assert!(ecs.calls().is_empty());
    }
}
