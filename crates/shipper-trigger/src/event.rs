//! Deploy events and the status payloads answering them.

use serde::{Deserialize, Serialize};
use shipper_core::{ContainerImage, Operation};
use shipper_rollout::{DeployError, DeployOutcome, DeployReport, DeployRequest, RegisteredRevision, Retirement, Stage};

pub const SUCCESS_MESSAGE: &str = "ECS Service successfully deployed";

/// Inbound deploy event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployEvent {
    pub containers: Vec<ContainerImage>,
    pub service: String,
    /// Task definition family.
    pub task_definition: String,
    pub cluster: String,
    /// Retire the superseded revision. Defaults to true.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deregister: Option<bool>,
}

impl DeployEvent {
    /// Check required fields in order, answering the first one missing.
    pub fn into_request(self) -> Result<DeployRequest, StatusPayload> {
        let missing = if self.containers.is_empty() {
            Some("no Docker images specified")
        } else if self.task_definition.trim().is_empty() {
            Some("no ECS Task Definition specified")
        } else if self.service.trim().is_empty() {
            Some("no ECS Service specified")
        } else if self.cluster.trim().is_empty() {
            Some("no ECS Cluster specified")
        } else {
            None
        };
        if let Some(message) = missing {
            return Err(StatusPayload::invalid_request(message));
        }

        let mut request = DeployRequest::new(self.task_definition, self.containers, self.cluster, self.service);
        request.retire_previous = self.deregister.unwrap_or(true);
        Ok(request)
    }
}

/// `{status, code, message[, warning]}` answer to a [`DeployEvent`].
///
/// A failed rollout that already registered a revision names it in
/// `registered`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusPayload {
    pub status: u16,
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<DeployReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registered: Option<RegisteredRevision>,
}

impl StatusPayload {
    fn new(status: u16, code: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.to_string(),
            message: message.into(),
            warning: None,
            report: None,
            registered: None,
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(400, "invalid_request", message)
    }

    pub fn from_outcome(outcome: DeployOutcome) -> Self {
        match outcome {
            DeployOutcome::Done(report) => Self {
                report: Some(report),
                ..Self::new(200, "success", SUCCESS_MESSAGE)
            },
            DeployOutcome::DoneWithWarning { report, warning } => Self {
                warning: Some(warning.to_string()),
                report: Some(report),
                ..Self::new(200, "success_with_warning", SUCCESS_MESSAGE)
            },
            DeployOutcome::Failed { error, registered, .. } => Self {
                warning: registered.as_ref().and_then(|r| match &r.retirement {
                    Retirement::Failed(warning) => Some(warning.to_string()),
                    _ => None,
                }),
                registered,
                ..Self::from_error(&error)
            },
        }
    }

    pub fn from_error(error: &DeployError) -> Self {
        let code = error.kind().code();
        let status = match error {
            DeployError::InvalidInput(_) => 400,
            DeployError::DefinitionNotFound { .. } | DeployError::ServiceNotFound { .. } => 404,
            DeployError::ContainerMismatch { .. } => 422,
            DeployError::Api { .. } => 502,
            DeployError::Cancelled { .. } => 504,
        };
        let message = match error {
            DeployError::InvalidInput(msg) => msg.clone(),
            _ => format!("error updating {}: {error}", step(error)),
        };
        Self::new(status, code, message)
    }

    pub fn is_success(&self) -> bool {
        self.status == 200
    }
}

/// Which half of the rollout an error belongs to.
fn step(error: &DeployError) -> &'static str {
    let operation = match error {
        DeployError::ServiceNotFound { .. } => return "service",
        DeployError::Api { operation, .. } => Some(*operation),
        DeployError::Cancelled {
            stage: Stage::Call(operation),
            ..
        } => Some(*operation),
        _ => None,
    };
    match operation {
        Some(Operation::DescribeServices | Operation::UpdateService) => "service",
        _ => "task definition",
    }
}
