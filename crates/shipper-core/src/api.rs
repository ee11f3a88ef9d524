//! The orchestrator capability the rollout workflow is written against.
//!
//! Transport and authentication live behind this trait: `shipper-ecs`
//! implements it over HTTP, [`crate::MemoryEcs`] implements it in memory.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::types::{
    DescribedTaskDefinition, RegisterTaskDefinitionRequest, Service, TaskDefinition,
    UpdateServiceRequest,
};

/// Boxed future alias for orchestrator calls.
pub type ApiFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ApiError>> + Send + 'a>>;

/// The remote operations, named as the ECS actions they map to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    ListTaskDefinitions,
    DescribeTaskDefinition,
    RegisterTaskDefinition,
    DeregisterTaskDefinition,
    DescribeServices,
    UpdateService,
}

impl Operation {
    /// The ECS action name (`X-Amz-Target` suffix).
    pub fn action(&self) -> &'static str {
        match self {
            Self::ListTaskDefinitions => "ListTaskDefinitions",
            Self::DescribeTaskDefinition => "DescribeTaskDefinition",
            Self::RegisterTaskDefinition => "RegisterTaskDefinition",
            Self::DeregisterTaskDefinition => "DeregisterTaskDefinition",
            Self::DescribeServices => "DescribeServices",
            Self::UpdateService => "UpdateService",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.action())
    }
}

/// Remote workload-orchestration API (ECS semantics).
///
/// Every method maps to exactly one remote call. Implementations must not
/// retry internally; retries are a caller concern.
pub trait EcsApi: Send + Sync {
    /// ARNs of `ACTIVE` revisions of `family`, most recent first, at most `limit`.
    fn list_task_definitions<'a>(&'a self, family: &'a str, limit: u32) -> ApiFuture<'a, Vec<String>>;

    /// Full spec of one revision, including its tags.
    fn describe_task_definition<'a>(&'a self, task_definition: &'a str) -> ApiFuture<'a, DescribedTaskDefinition>;

    /// Register a new revision and return it.
    fn register_task_definition<'a>(
        &'a self,
        request: &'a RegisterTaskDefinitionRequest,
    ) -> ApiFuture<'a, TaskDefinition>;

    /// Mark a revision `INACTIVE`.
    fn deregister_task_definition<'a>(&'a self, task_definition: &'a str) -> ApiFuture<'a, ()>;

    /// Describe a service. `None` when it does not exist or is `INACTIVE`.
    fn describe_service<'a>(&'a self, cluster: &'a str, service: &'a str) -> ApiFuture<'a, Option<Service>>;

    /// Apply an update to a service and return its new description.
    fn update_service<'a>(&'a self, request: &'a UpdateServiceRequest) -> ApiFuture<'a, Service>;
}
