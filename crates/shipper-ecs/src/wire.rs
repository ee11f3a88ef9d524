//! Request and response envelopes of the ECS JSON 1.1 protocol.
//!
//! Bodies that already exist in `shipper-core` (register, update) are sent
//! as is; only the thin wrappers around them live here.

use serde::{Deserialize, Serialize};
use shipper_core::{Service, TaskDefinition};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ListTaskDefinitionsRequest<'a> {
    pub family_prefix: &'a str,
    pub max_results: u32,
    pub sort: &'static str,
    pub status: &'static str,
}

impl<'a> ListTaskDefinitionsRequest<'a> {
    /// Newest `ACTIVE` revisions of `family` first.
    pub fn latest_active(family: &'a str, limit: u32) -> Self {
        Self {
            family_prefix: family,
            max_results: limit.clamp(1, 100),
            sort: "DESC",
            status: "ACTIVE",
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ListTaskDefinitionsResponse {
    #[serde(default)]
    pub task_definition_arns: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DescribeTaskDefinitionRequest<'a> {
    pub task_definition: &'a str,
    pub include: [&'static str; 1],
}

impl<'a> DescribeTaskDefinitionRequest<'a> {
    pub fn with_tags(task_definition: &'a str) -> Self {
        Self {
            task_definition,
            include: ["TAGS"],
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TaskDefinitionResponse {
    pub task_definition: TaskDefinition,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DeregisterTaskDefinitionRequest<'a> {
    pub task_definition: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct DescribeServicesRequest<'a> {
    pub cluster: &'a str,
    pub services: [&'a str; 1],
}

#[derive(Debug, Deserialize)]
pub(crate) struct DescribeServicesResponse {
    #[serde(default)]
    pub services: Vec<Service>,
    #[serde(default)]
    pub failures: Vec<Failure>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Failure {
    #[serde(default)]
    pub arn: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UpdateServiceResponse {
    pub service: Service,
}

/// Error document returned with a non-2xx status.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(rename = "__type", default)]
    pub kind: Option<String>,
    #[serde(alias = "Message", default)]
    pub message: Option<String>,
}

impl ErrorBody {
    /// `com.amazonaws.ecs#ClientException` → `ClientException`.
    pub fn code(&self) -> Option<&str> {
        let kind = self.kind.as_deref()?;
        let code = kind.rsplit_once('#').map_or(kind, |(_, code)| code);
        Some(code.split(':').next().unwrap_or(code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn list_request_asks_for_newest_active() {
        let body = serde_json::to_value(ListTaskDefinitionsRequest::latest_active("api", 1)).unwrap();
        assert_eq!(
            body,
            json!({ "familyPrefix": "api", "maxResults": 1, "sort": "DESC", "status": "ACTIVE" })
        );
    }

    #[test]
    fn describe_request_includes_tags() {
        let body = serde_json::to_value(DescribeTaskDefinitionRequest::with_tags("api:3")).unwrap();
        assert_eq!(body, json!({ "taskDefinition": "api:3", "include": ["TAGS"] }));
    }

    #[test]
    fn describe_services_request_shape() {
        let body = serde_json::to_value(DescribeServicesRequest {
            cluster: "prod",
            services: ["svc"],
        })
        .unwrap();
        assert_eq!(body, json!({ "cluster": "prod", "services": ["svc"] }));
    }

    #[test]
    fn error_code_strips_namespace_and_suffix() {
        let body: ErrorBody = serde_json::from_value(json!({
            "__type": "com.amazonaws.ecs#ServiceNotFoundException",
            "message": "Service not found."
        }))
        .unwrap();
        assert_eq!(body.code(), Some("ServiceNotFoundException"));

        let body: ErrorBody = serde_json::from_value(json!({
            "__type": "ThrottlingException:http://internal.amazon.com/coral/",
            "Message": "Rate exceeded"
        }))
        .unwrap();
        assert_eq!(body.code(), Some("ThrottlingException"));
        assert_eq!(body.message.as_deref(), Some("Rate exceeded"));
    }

    #[test]
    fn missing_failures_default_to_empty() {
        let body: DescribeServicesResponse = serde_json::from_value(json!({ "services": [] })).unwrap();
        assert!(body.failures.is_empty());
    }
}
