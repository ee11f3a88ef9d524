//! MemoryEcs — an in-memory orchestrator.
//!
//! Implements [`EcsApi`] with ECS-like semantics: per-family revision
//! numbering, `ACTIVE`/`INACTIVE` status, revision tags, services with a
//! deployment history. Every call is recorded, and any operation can be
//! made to fail. Used by tests and by dry runs seeded from a JSON fixture.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::{ApiFuture, EcsApi, Operation};
use crate::config::ConfigError;
use crate::error::{ApiError, ApiResult};
use crate::types::*;

const DEFAULT_REGION: &str = "us-east-1";
const DEFAULT_ACCOUNT: &str = "000000000000";

/// A recorded API call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub operation: Operation,
    /// Family, revision, or `cluster/service` the call addressed.
    pub target: String,
}

/// Seed data for a [`MemoryEcs`], usually loaded from JSON.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MemoryFixture {
    pub task_definitions: Vec<DescribedTaskDefinition>,
    pub services: Vec<FixtureService>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureService {
    pub cluster: String,
    pub service: Service,
}

#[derive(Default)]
struct MemoryState {
    revisions: Vec<DescribedTaskDefinition>,
    /// Keyed by (cluster name, service name).
    services: HashMap<(String, String), Service>,
    calls: Vec<RecordedCall>,
    registrations: Vec<RegisterTaskDefinitionRequest>,
    updates: Vec<UpdateServiceRequest>,
    failures: HashMap<Operation, ApiError>,
    deployment_seq: u32,
}

/// In-memory [`EcsApi`] implementation.
pub struct MemoryEcs {
    region: String,
    account: String,
    state: Mutex<MemoryState>,
}

impl Default for MemoryEcs {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryEcs {
    pub fn new() -> Self {
        Self {
            region: DEFAULT_REGION.to_string(),
            account: DEFAULT_ACCOUNT.to_string(),
            state: Mutex::new(MemoryState::default()),
        }
    }

    pub fn from_fixture(fixture: MemoryFixture) -> Self {
        let ecs = Self::new();
        for described in fixture.task_definitions {
            ecs.seed_described(described);
        }
        for entry in fixture.services {
            ecs.insert_service(&entry.cluster, entry.service);
        }
        ecs
    }

    pub fn from_fixture_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let fixture: MemoryFixture =
            serde_json::from_str(&content).map_err(|source| ConfigError::Fixture {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self::from_fixture(fixture))
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Seeding ────────────────────────────────────────────────────

    /// Register an `ACTIVE` revision of `family` with the given
    /// `(container, image)` slots.
    pub fn seed_task_definition(&self, family: &str, containers: &[(&str, &str)]) -> TaskDefinition {
        let request = RegisterTaskDefinitionRequest {
            family: family.to_string(),
            container_definitions: containers
                .iter()
                .map(|(name, image)| ContainerDefinition::new(*name, *image))
                .collect(),
            cpu: None,
            memory: None,
            ephemeral_storage: None,
            execution_role_arn: None,
            task_role_arn: None,
            inference_accelerators: Vec::new(),
            network_mode: None,
            ipc_mode: None,
            pid_mode: None,
            placement_constraints: Vec::new(),
            proxy_configuration: None,
            requires_compatibilities: Vec::new(),
            runtime_platform: None,
            volumes: Vec::new(),
            tags: None,
        };
        self.lock().register(&self.region, &self.account, &request)
    }

    /// Store a described revision verbatim (ARN, revision, status, tags).
    pub fn seed_described(&self, described: DescribedTaskDefinition) {
        self.lock().revisions.push(described);
    }

    pub fn insert_service(&self, cluster: &str, service: Service) {
        let key = (short_name(cluster).to_string(), service.service_name.clone());
        self.lock().services.insert(key, service);
    }

    /// Make every subsequent call of `operation` fail with `error`.
    pub fn fail(&self, operation: Operation, error: ApiError) {
        self.lock().failures.insert(operation, error);
    }

    pub fn clear_failure(&self, operation: Operation) {
        self.lock().failures.remove(&operation);
    }

    // ── Inspection ─────────────────────────────────────────────────

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self, operation: Operation) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.operation == operation)
            .count()
    }

    /// Every registration request received, in order.
    pub fn registrations(&self) -> Vec<RegisterTaskDefinitionRequest> {
        self.lock().registrations.clone()
    }

    /// Every service update request received, in order.
    pub fn updates(&self) -> Vec<UpdateServiceRequest> {
        self.lock().updates.clone()
    }

    pub fn task_definition(&self, arn: &str) -> Option<DescribedTaskDefinition> {
        self.lock().find(arn).cloned()
    }

    /// `ACTIVE` revisions of `family`, most recent first.
    pub fn active_revisions(&self, family: &str) -> Vec<TaskDefinition> {
        self.lock()
            .active(family)
            .into_iter()
            .map(|d| d.task_definition.clone())
            .collect()
    }

    pub fn service(&self, cluster: &str, service: &str) -> Option<Service> {
        self.lock()
            .services
            .get(&service_key(cluster, service))
            .cloned()
    }

    /// Record the call and return the injected failure, if any.
    fn enter(&self, operation: Operation, target: &str) -> ApiResult<MutexGuard<'_, MemoryState>> {
        let mut state = self.lock();
        state.calls.push(RecordedCall {
            operation,
            target: target.to_string(),
        });
        debug!(%operation, %target, "memory ecs call");
        if let Some(err) = state.failures.get(&operation).cloned() {
            return Err(err);
        }
        Ok(state)
    }
}

impl MemoryState {
    fn find(&self, reference: &str) -> Option<&DescribedTaskDefinition> {
        // Accept a full ARN, `family:revision`, or a bare family (latest ACTIVE).
        let short = reference.rsplit('/').next().unwrap_or(reference);
        match short.split_once(':') {
            Some((family, rev)) => self.revisions.iter().find(|d| {
                d.task_definition.family == family && d.task_definition.revision.to_string() == rev
            }),
            None => self.active(short).into_iter().next(),
        }
    }

    fn active(&self, family: &str) -> Vec<&DescribedTaskDefinition> {
        let mut active: Vec<_> = self
            .revisions
            .iter()
            .filter(|d| {
                d.task_definition.family == family
                    && d.task_definition.status == Some(TaskDefinitionStatus::Active)
            })
            .collect();
        active.sort_by(|a, b| b.task_definition.revision.cmp(&a.task_definition.revision));
        active
    }

    fn register(
        &mut self,
        region: &str,
        account: &str,
        request: &RegisterTaskDefinitionRequest,
    ) -> TaskDefinition {
        let revision = self
            .revisions
            .iter()
            .filter(|d| d.task_definition.family == request.family)
            .map(|d| d.task_definition.revision)
            .max()
            .unwrap_or(0)
            + 1;

        let definition = TaskDefinition {
            task_definition_arn: format!(
                "arn:aws:ecs:{region}:{account}:task-definition/{}:{revision}",
                request.family
            ),
            family: request.family.clone(),
            revision,
            status: Some(TaskDefinitionStatus::Active),
            container_definitions: request.container_definitions.clone(),
            cpu: request.cpu.clone(),
            memory: request.memory.clone(),
            ephemeral_storage: request.ephemeral_storage.clone(),
            execution_role_arn: request.execution_role_arn.clone(),
            task_role_arn: request.task_role_arn.clone(),
            inference_accelerators: request.inference_accelerators.clone(),
            network_mode: request.network_mode.clone(),
            ipc_mode: request.ipc_mode.clone(),
            pid_mode: request.pid_mode.clone(),
            placement_constraints: request.placement_constraints.clone(),
            proxy_configuration: request.proxy_configuration.clone(),
            requires_compatibilities: request.requires_compatibilities.clone(),
            runtime_platform: request.runtime_platform.clone(),
            volumes: request.volumes.clone(),
        };

        self.revisions.push(DescribedTaskDefinition {
            task_definition: definition.clone(),
            tags: request.tags.clone().unwrap_or_default(),
        });
        definition
    }
}

impl EcsApi for MemoryEcs {
    fn list_task_definitions<'a>(&'a self, family: &'a str, limit: u32) -> ApiFuture<'a, Vec<String>> {
        Box::pin(async move {
            let state = self.enter(Operation::ListTaskDefinitions, family)?;
            Ok(state
                .active(family)
                .into_iter()
                .take(limit as usize)
                .map(|d| d.task_definition.task_definition_arn.clone())
                .collect())
        })
    }

    fn describe_task_definition<'a>(&'a self, task_definition: &'a str) -> ApiFuture<'a, DescribedTaskDefinition> {
        Box::pin(async move {
            let state = self.enter(Operation::DescribeTaskDefinition, task_definition)?;
            state
                .find(task_definition)
                .cloned()
                .ok_or_else(|| ApiError::service("ClientException", "Unable to describe task definition."))
        })
    }

    fn register_task_definition<'a>(
        &'a self,
        request: &'a RegisterTaskDefinitionRequest,
    ) -> ApiFuture<'a, TaskDefinition> {
        Box::pin(async move {
            let mut state = self.enter(Operation::RegisterTaskDefinition, &request.family)?;
            state.registrations.push(request.clone());

            if matches!(&request.tags, Some(tags) if tags.is_empty()) {
                return Err(ApiError::service("ClientException", "Tags must not be empty."));
            }
            if request.container_definitions.is_empty() {
                return Err(ApiError::service(
                    "ClientException",
                    "Container list cannot be empty.",
                ));
            }

            Ok(state.register(&self.region, &self.account, request))
        })
    }

    fn deregister_task_definition<'a>(&'a self, task_definition: &'a str) -> ApiFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.enter(Operation::DeregisterTaskDefinition, task_definition)?;
            let arn = state
                .find(task_definition)
                .map(|d| d.task_definition.task_definition_arn.clone())
                .ok_or_else(|| ApiError::service("ClientException", "The specified task definition does not exist."))?;

            for described in state.revisions.iter_mut() {
                if described.task_definition.task_definition_arn == arn {
                    described.task_definition.status = Some(TaskDefinitionStatus::Inactive);
                }
            }
            Ok(())
        })
    }

    fn describe_service<'a>(&'a self, cluster: &'a str, service: &'a str) -> ApiFuture<'a, Option<Service>> {
        Box::pin(async move {
            let target = format!("{cluster}/{service}");
            let state = self.enter(Operation::DescribeServices, &target)?;
            Ok(state
                .services
                .get(&service_key(cluster, service))
                .filter(|s| s.status != Some(ServiceStatus::Inactive))
                .cloned())
        })
    }

    fn update_service<'a>(&'a self, request: &'a UpdateServiceRequest) -> ApiFuture<'a, Service> {
        Box::pin(async move {
            let target = format!("{}/{}", request.cluster, request.service);
            let mut state = self.enter(Operation::UpdateService, &target)?;
            state.updates.push(request.clone());

            let revision_active = state
                .find(&request.task_definition)
                .is_some_and(|d| d.task_definition.status == Some(TaskDefinitionStatus::Active));
            if !revision_active {
                return Err(ApiError::service(
                    "ClientException",
                    format!("TaskDefinition {} is not active.", request.task_definition),
                ));
            }

            state.deployment_seq += 1;
            let deployment_id = format!("ecs-svc/{}", state.deployment_seq);

            let key = service_key(&request.cluster, &request.service);
            let service = state
                .services
                .get_mut(&key)
                .filter(|s| s.status != Some(ServiceStatus::Inactive))
                .ok_or_else(|| ApiError::service("ServiceNotFoundException", "Service not found."))?;

            service.task_definition = Some(request.task_definition.clone());
            if let Some(count) = request.desired_count {
                service.desired_count = count;
            }
            service.capacity_provider_strategy = request.capacity_provider_strategy.clone();
            service.deployment_configuration = request.deployment_configuration.clone();
            if let Some(flag) = request.enable_ecs_managed_tags {
                service.enable_ecs_managed_tags = flag;
            }
            if let Some(flag) = request.enable_execute_command {
                service.enable_execute_command = flag;
            }
            service.health_check_grace_period_seconds = request.health_check_grace_period_seconds;
            service.load_balancers = request.load_balancers.clone();
            service.network_configuration = request.network_configuration.clone();
            service.placement_constraints = request.placement_constraints.clone();
            service.placement_strategy = request.placement_strategy.clone();
            service.platform_version = request.platform_version.clone();
            service.propagate_tags = request.propagate_tags.clone();
            service.service_registries = request.service_registries.clone();

            for previous in service.deployments.iter_mut() {
                previous.status = Some("ACTIVE".to_string());
            }
            service.deployments.insert(
                0,
                Deployment {
                    id: Some(deployment_id),
                    status: Some("PRIMARY".to_string()),
                    task_definition: Some(request.task_definition.clone()),
                    desired_count: service.desired_count,
                    running_count: 0,
                    service_connect_configuration: request.service_connect_configuration.clone(),
                },
            );

            Ok(service.clone())
        })
    }
}

/// Last path segment of a name-or-ARN identifier.
fn short_name(identifier: &str) -> &str {
    identifier.rsplit('/').next().unwrap_or(identifier)
}

fn service_key(cluster: &str, service: &str) -> (String, String) {
    (short_name(cluster).to_string(), short_name(service).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(name: &str) -> Service {
        serde_json::from_value(serde_json::json!({
            "serviceName": name,
            "status": "ACTIVE",
            "desiredCount": 2
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn revisions_are_numbered_per_family() {
        let ecs = MemoryEcs::new();
        let first = ecs.seed_task_definition("api", &[("web", "img:v1")]);
        let second = ecs.seed_task_definition("api", &[("web", "img:v2")]);
        let other = ecs.seed_task_definition("worker", &[("job", "img:v1")]);

        assert_eq!(first.revision, 1);
        assert_eq!(second.revision, 2);
        assert_eq!(other.revision, 1);
        assert_eq!(
            second.task_definition_arn,
            "arn:aws:ecs:us-east-1:000000000000:task-definition/api:2"
        );

        let listed = ecs.list_task_definitions("api", 1).await.unwrap();
        assert_eq!(listed, vec![second.task_definition_arn.clone()]);
    }

    #[tokio::test]
    async fn deregistered_revisions_are_not_listed() {
        let ecs = MemoryEcs::new();
        let first = ecs.seed_task_definition("api", &[("web", "img:v1")]);
        ecs.deregister_task_definition(&first.task_definition_arn).await.unwrap();

        assert!(ecs.list_task_definitions("api", 10).await.unwrap().is_empty());
        let described = ecs.describe_task_definition("api:1").await.unwrap();
        assert_eq!(described.task_definition.status, Some(TaskDefinitionStatus::Inactive));
    }

    #[tokio::test]
    async fn explicit_empty_tags_are_rejected() {
        let ecs = MemoryEcs::new();
        let seeded = ecs.seed_task_definition("api", &[("web", "img:v1")]);
        let described = ecs.describe_task_definition(&seeded.task_definition_arn).await.unwrap();

        let mut request = RegisterTaskDefinitionRequest::from_revision(&described);
        request.tags = Some(Vec::new());
        let err = ecs.register_task_definition(&request).await.unwrap_err();
        assert!(matches!(err, ApiError::Service { ref code, .. } if code == "ClientException"));
    }

    #[tokio::test]
    async fn injected_failures_are_returned_and_recorded() {
        let ecs = MemoryEcs::new();
        ecs.fail(Operation::ListTaskDefinitions, ApiError::Transport("boom".into()));

        let err = ecs.list_task_definitions("api", 1).await.unwrap_err();
        assert_eq!(err, ApiError::Transport("boom".into()));
        assert_eq!(ecs.call_count(Operation::ListTaskDefinitions), 1);

        ecs.clear_failure(Operation::ListTaskDefinitions);
        assert!(ecs.list_task_definitions("api", 1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn services_resolve_by_name_or_arn() {
        let ecs = MemoryEcs::new();
        ecs.insert_service("prod", service("svc"));

        let by_arn = ecs
            .describe_service(
                "arn:aws:ecs:us-east-1:000000000000:cluster/prod",
                "arn:aws:ecs:us-east-1:000000000000:service/prod/svc",
            )
            .await
            .unwrap();
        assert_eq!(by_arn.map(|s| s.desired_count), Some(2));
        assert!(ecs.describe_service("prod", "other").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_rejects_unregistered_revision() {
        let ecs = MemoryEcs::new();
        ecs.insert_service("prod", service("svc"));

        let current = ecs.service("prod", "svc").unwrap();
        let request = UpdateServiceRequest::repoint("prod", "svc", &current, "api:9", None);
        assert!(ecs.update_service(&request).await.is_err());
    }

    #[test]
    fn fixture_round_trip_from_json() {
        let fixture: MemoryFixture = serde_json::from_value(serde_json::json!({
            "taskDefinitions": [{
                "taskDefinition": {
                    "taskDefinitionArn": "arn:aws:ecs:us-east-1:000000000000:task-definition/api:4",
                    "family": "api",
                    "revision": 4,
                    "status": "ACTIVE",
                    "containerDefinitions": [{ "name": "web", "image": "img:v1" }]
                }
            }],
            "services": [{ "cluster": "prod", "service": { "serviceName": "svc", "desiredCount": 1 } }]
        }))
        .unwrap();

        let ecs = MemoryEcs::from_fixture(fixture);
        assert_eq!(ecs.active_revisions("api")[0].revision, 4);
        assert!(ecs.service("prod", "svc").is_some());
    }
}
