//! `EcsClient` — the HTTP implementation of [`EcsApi`].

use std::time::{Duration, SystemTime};

use aws_credential_types::Credentials;
use aws_sigv4::http_request::{SignableBody, SignableRequest, SigningSettings, sign};
use aws_sigv4::sign::v4;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;
use serde::de::DeserializeOwned;
use shipper_core::config::AwsConfig;
use shipper_core::{
    ApiError, ApiFuture, ApiResult, DescribedTaskDefinition, EcsApi, Operation,
    RegisterTaskDefinitionRequest, Service, ServiceStatus, TaskDefinition, UpdateServiceRequest,
};
use thiserror::Error;
use tracing::{debug, warn};

use crate::wire::*;

const SERVICE_NAME: &str = "ecs";
const TARGET_PREFIX: &str = "AmazonEC2ContainerServiceV20141113";
const CONTENT_TYPE_JSON_11: &str = "application/x-amz-json-1.1";
const X_AMZ_TARGET: &str = "x-amz-target";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum ClientConfigError {
    #[error("no AWS region configured (set aws.region or AWS_REGION)")]
    MissingRegion,

    #[error("no AWS credentials configured (set aws.access_key_id/aws.secret_access_key or AWS_ACCESS_KEY_ID/AWS_SECRET_ACCESS_KEY)")]
    MissingCredentials,

    #[error("failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}

/// Connection settings for an [`EcsClient`].
#[derive(Debug, Clone)]
pub struct EcsClientConfig {
    pub region: String,
    /// Replaces `https://ecs.{region}.amazonaws.com/`.
    pub endpoint: Option<String>,
    pub credentials: Credentials,
    pub timeout: Duration,
}

impl EcsClientConfig {
    pub fn new(region: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            region: region.into(),
            endpoint: None,
            credentials,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Static settings from the `[aws]` config section.
    pub fn from_aws(aws: &AwsConfig) -> Result<Self, ClientConfigError> {
        let region = aws
            .region
            .clone()
            .filter(|r| !r.is_empty())
            .ok_or(ClientConfigError::MissingRegion)?;
        let (Some(access_key_id), Some(secret_access_key)) =
            (aws.access_key_id.clone(), aws.secret_access_key.clone())
        else {
            return Err(ClientConfigError::MissingCredentials);
        };
        let credentials = Credentials::new(
            access_key_id,
            secret_access_key,
            aws.session_token.clone(),
            None,
            "shipper-config",
        );
        Ok(Self {
            endpoint: aws.endpoint.clone(),
            ..Self::new(region, credentials)
        })
    }

    pub fn endpoint_url(&self) -> String {
        match &self.endpoint {
            Some(endpoint) => endpoint.clone(),
            None => format!("https://ecs.{}.amazonaws.com/", self.region),
        }
    }
}

/// ECS over HTTPS, one signed POST per operation. Never retries.
#[derive(Debug, Clone)]
pub struct EcsClient {
    http: reqwest::Client,
    url: String,
    config: EcsClientConfig,
}

impl EcsClient {
    pub fn new(config: EcsClientConfig) -> Result<Self, ClientConfigError> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            http,
            url: config.endpoint_url(),
            config,
        })
    }

    pub fn from_config(aws: &AwsConfig) -> Result<Self, ClientConfigError> {
        Self::new(EcsClientConfig::from_aws(aws)?)
    }

    pub fn region(&self) -> &str {
        &self.config.region
    }

    pub fn endpoint(&self) -> &str {
        &self.url
    }

    /// POST `payload` as `operation` and decode the response body.
    async fn call<Req, Resp>(&self, operation: Operation, payload: &Req) -> ApiResult<Resp>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let body = serde_json::to_vec(payload)
            .map_err(|e| ApiError::Decode(format!("failed to encode {operation} request: {e}")))?;
        let headers = self.signed_headers(operation, &body)?;

        debug!(%operation, url = %self.url, bytes = body.len(), "ecs request");
        let response = self
            .http
            .post(&self.url)
            .headers(headers)
            .body(body)
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        if !status.is_success() {
            let err = decode_error(status, &bytes);
            warn!(%operation, %status, error = %err, "ecs request failed");
            return Err(err);
        }

        serde_json::from_slice(&bytes)
            .map_err(|e| ApiError::Decode(format!("{operation} response: {e}")))
    }

    fn signed_headers(&self, operation: Operation, body: &[u8]) -> ApiResult<HeaderMap> {
        let target = format!("{TARGET_PREFIX}.{}", operation.action());
        let unsigned = [
            (CONTENT_TYPE.as_str(), CONTENT_TYPE_JSON_11),
            (X_AMZ_TARGET, target.as_str()),
        ];

        let identity = self.config.credentials.clone().into();
        let params = v4::SigningParams::builder()
            .identity(&identity)
            .region(&self.config.region)
            .name(SERVICE_NAME)
            .time(SystemTime::now())
            .settings(SigningSettings::default())
            .build()
            .map_err(|e| ApiError::Credentials(e.to_string()))?
            .into();

        let signable = SignableRequest::new(
            "POST",
            self.url.as_str(),
            unsigned.iter().copied(),
            SignableBody::Bytes(body),
        )
        .map_err(|e| ApiError::Credentials(e.to_string()))?;
        let (instructions, _signature) = sign(signable, &params)
            .map_err(|e| ApiError::Credentials(e.to_string()))?
            .into_parts();

        let mut headers = HeaderMap::new();
        for (name, value) in unsigned.into_iter().chain(instructions.headers()) {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| ApiError::Credentials(format!("invalid header {name}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| ApiError::Credentials(format!("invalid header value: {e}")))?;
            headers.insert(name, value);
        }
        Ok(headers)
    }
}

/// Turn a non-2xx response into an [`ApiError`].
pub(crate) fn decode_error(status: reqwest::StatusCode, body: &[u8]) -> ApiError {
    match serde_json::from_slice::<ErrorBody>(body) {
        Ok(doc) if doc.kind.is_some() => ApiError::Service {
            code: doc.code().unwrap_or_default().to_string(),
            message: doc.message.unwrap_or_default(),
        },
        _ => ApiError::Transport(format!(
            "unexpected status {status}: {}",
            String::from_utf8_lossy(body).trim()
        )),
    }
}

impl EcsApi for EcsClient {
    fn list_task_definitions<'a>(&'a self, family: &'a str, limit: u32) -> ApiFuture<'a, Vec<String>> {
        Box::pin(async move {
            let request = ListTaskDefinitionsRequest::latest_active(family, limit);
            let response: ListTaskDefinitionsResponse =
                self.call(Operation::ListTaskDefinitions, &request).await?;
            Ok(response.task_definition_arns)
        })
    }

    fn describe_task_definition<'a>(&'a self, task_definition: &'a str) -> ApiFuture<'a, DescribedTaskDefinition> {
        Box::pin(async move {
            let request = DescribeTaskDefinitionRequest::with_tags(task_definition);
            self.call(Operation::DescribeTaskDefinition, &request).await
        })
    }

    fn register_task_definition<'a>(
        &'a self,
        request: &'a RegisterTaskDefinitionRequest,
    ) -> ApiFuture<'a, TaskDefinition> {
        Box::pin(async move {
            let response: TaskDefinitionResponse =
                self.call(Operation::RegisterTaskDefinition, request).await?;
            Ok(response.task_definition)
        })
    }

    fn deregister_task_definition<'a>(&'a self, task_definition: &'a str) -> ApiFuture<'a, ()> {
        Box::pin(async move {
            let request = DeregisterTaskDefinitionRequest { task_definition };
            let _: TaskDefinitionResponse = self
                .call(Operation::DeregisterTaskDefinition, &request)
                .await?;
            Ok(())
        })
    }

    fn describe_service<'a>(&'a self, cluster: &'a str, service: &'a str) -> ApiFuture<'a, Option<Service>> {
        Box::pin(async move {
            let request = DescribeServicesRequest {
                cluster,
                services: [service],
            };
            let response: DescribeServicesResponse =
                self.call(Operation::DescribeServices, &request).await?;
            select_service(response, service)
        })
    }

    fn update_service<'a>(&'a self, request: &'a UpdateServiceRequest) -> ApiFuture<'a, Service> {
        Box::pin(async move {
            let response: UpdateServiceResponse = self.call(Operation::UpdateService, request).await?;
            Ok(response.service)
        })
    }
}

/// Pick the requested service out of a `DescribeServices` answer.
///
/// `MISSING` failures and `INACTIVE` services read as absent; any other
/// failure is reported.
pub(crate) fn select_service(response: DescribeServicesResponse, name: &str) -> ApiResult<Option<Service>> {
    let found = response.services.into_iter().find(|s| {
        s.service_name == name
            || s.service_arn.as_deref().is_some_and(|arn| arn == name || arn.ends_with(&format!("/{name}")))
    });
    if let Some(service) = found {
        return Ok((service.status != Some(ServiceStatus::Inactive)).then_some(service));
    }

    match response
        .failures
        .into_iter()
        .find(|f| f.reason.as_deref() != Some("MISSING"))
    {
        Some(failure) => Err(ApiError::service(
            failure.reason.unwrap_or_else(|| "Failure".into()),
            format!(
                "{} {}",
                failure.arn.unwrap_or_else(|| name.to_string()),
                failure.detail.unwrap_or_default()
            )
            .trim()
            .to_string(),
        )),
        None => Ok(None),
    }
}
