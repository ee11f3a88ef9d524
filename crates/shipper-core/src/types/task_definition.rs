//! Task definitions — immutable, numbered revisions of a family.
//!
//! Field names follow the ECS JSON wire format so these types decode
//! `DescribeTaskDefinition` responses and encode `RegisterTaskDefinition`
//! requests directly.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::image::ContainerImage;

/// Lifecycle status of a task definition revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskDefinitionStatus {
    Active,
    Inactive,
    DeleteInProgress,
}

/// Resource tag. ECS spells these keys in lowercase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

impl Tag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// One container slot of a task definition.
///
/// Only `name` and `image` are interpreted; every other container field
/// (ports, env, log config, health checks, ...) rides along in `settings`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerDefinition {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(flatten)]
    pub settings: Map<String, Value>,
}

impl ContainerDefinition {
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: Some(image.into()),
            settings: Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EphemeralStorage {
    #[serde(rename = "sizeInGiB")]
    pub size_in_gib: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InferenceAccelerator {
    pub device_name: String,
    pub device_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDefinitionPlacementConstraint {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValuePair {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// App Mesh proxy settings of a task definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyConfiguration {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    pub container_name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<KeyValuePair>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimePlatform {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_architecture: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operating_system_family: Option<String>,
}

/// A task volume. The driver-specific configuration (host path, EFS,
/// FSx, docker volume) is carried opaquely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Volume {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(flatten)]
    pub configuration: Map<String, Value>,
}

/// A registered task definition revision, as described by the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDefinition {
    pub task_definition_arn: String,
    pub family: String,
    pub revision: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskDefinitionStatus>,

    #[serde(default)]
    pub container_definitions: Vec<ContainerDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ephemeral_storage: Option<EphemeralStorage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_role_arn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_role_arn: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inference_accelerators: Vec<InferenceAccelerator>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipc_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub placement_constraints: Vec<TaskDefinitionPlacementConstraint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_configuration: Option<ProxyConfiguration>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requires_compatibilities: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_platform: Option<RuntimePlatform>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<Volume>,
}

impl TaskDefinition {
    /// `family:revision`, the short form used in logs and service references.
    pub fn revision_label(&self) -> String {
        format!("{}:{}", self.family, self.revision)
    }
}

/// A task definition together with the tags attached to it.
///
/// Mirrors the `DescribeTaskDefinition` response body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DescribedTaskDefinition {
    pub task_definition: TaskDefinition,
    #[serde(default)]
    pub tags: Vec<Tag>,
}

/// Body of a `RegisterTaskDefinition` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterTaskDefinitionRequest {
    pub family: String,
    pub container_definitions: Vec<ContainerDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ephemeral_storage: Option<EphemeralStorage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_role_arn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_role_arn: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inference_accelerators: Vec<InferenceAccelerator>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipc_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub placement_constraints: Vec<TaskDefinitionPlacementConstraint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_configuration: Option<ProxyConfiguration>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requires_compatibilities: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_platform: Option<RuntimePlatform>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<Volume>,
    /// `None` is omitted on the wire. ECS rejects an explicit empty list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<Tag>>,
}

/// Result of patching container images into a registration request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePatch {
    pub requested: usize,
    pub matched: usize,
    /// Requested names with no container slot.
    pub missing: Vec<String>,
}

impl ImagePatch {
    pub fn is_complete(&self) -> bool {
        self.matched == self.requested
    }
}

impl RegisterTaskDefinitionRequest {
    /// Clone every structural field of `source` into a new registration.
    ///
    /// Identity and status fields are dropped (the orchestrator assigns
    /// them). Tags are only carried when the source has any.
    pub fn from_revision(source: &DescribedTaskDefinition) -> Self {
        let def = &source.task_definition;
        Self {
            family: def.family.clone(),
            container_definitions: def.container_definitions.clone(),
            cpu: def.cpu.clone(),
            memory: def.memory.clone(),
            ephemeral_storage: def.ephemeral_storage.clone(),
            execution_role_arn: def.execution_role_arn.clone(),
            task_role_arn: def.task_role_arn.clone(),
            inference_accelerators: def.inference_accelerators.clone(),
            network_mode: def.network_mode.clone(),
            ipc_mode: def.ipc_mode.clone(),
            pid_mode: def.pid_mode.clone(),
            placement_constraints: def.placement_constraints.clone(),
            proxy_configuration: def.proxy_configuration.clone(),
            requires_compatibilities: def.requires_compatibilities.clone(),
            runtime_platform: def.runtime_platform.clone(),
            volumes: def.volumes.clone(),
            tags: (!source.tags.is_empty()).then(|| source.tags.clone()),
        }
    }

    /// Overwrite the image of the first container named after each entry.
    ///
    /// Nothing is rolled back when some names are missing; the caller is
    /// expected to discard the request if the patch is incomplete.
    pub fn apply_images(&mut self, images: &[ContainerImage]) -> ImagePatch {
        let mut matched = 0;
        let mut missing = Vec::new();

        for wanted in images {
            match self
                .container_definitions
                .iter_mut()
                .find(|c| c.name == wanted.name)
            {
                Some(container) => {
                    container.image = Some(wanted.image.clone());
                    matched += 1;
                }
                None => missing.push(wanted.name.clone()),
            }
        }

        ImagePatch {
            requested: images.len(),
            matched,
            missing,
        }
    }
}
