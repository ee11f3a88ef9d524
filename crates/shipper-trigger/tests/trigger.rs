use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{Value, json};
use shipper_core::{ApiError, MemoryEcs, Operation, Service};
use shipper_rollout::Deployer;
use shipper_trigger::{TriggerState, build_router};
use tower::ServiceExt;

fn seeded() -> Arc<MemoryEcs> {
    let ecs = Arc::new(MemoryEcs::new());
    let old = ecs.seed_task_definition("api", &[("web", "img:v1"), ("sidecar", "img:base")]);
    let service: Service = serde_json::from_value(json!({
        "serviceName": "svc",
        "status": "ACTIVE",
        "taskDefinition": old.task_definition_arn,
        "desiredCount": 3
    }))
    .unwrap();
    ecs.insert_service("prod", service);
    ecs
}

fn app(ecs: Arc<MemoryEcs>) -> axum::Router {
    build_router(TriggerState::new(Arc::new(Deployer::new(ecs))))
}

async fn post_deploy(app: axum::Router, body: Value) -> (StatusCode, Value) {
    let resp = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/deploy")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn event() -> Value {
    json!({
        "containers": [{ "name": "web", "image": "img:v2" }],
        "service": "svc",
        "task_definition": "api",
        "cluster": "prod"
    })
}

#[tokio::test]
async fn healthz_ok() {
    let resp = app(seeded())
        .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn deploy_event_succeeds() {
    let ecs = seeded();
    let (status, body) = post_deploy(app(ecs.clone()), event()).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], 200);
    assert_eq!(body["code"], "success");
    assert_eq!(body["message"], "ECS Service successfully deployed");
    assert_eq!(body["report"]["revision"], "api:2");
    assert!(body.get("warning").is_none());

    let service = ecs.service("prod", "svc").unwrap();
    assert!(service.task_definition.unwrap().ends_with("task-definition/api:2"));
}

#[tokio::test]
async fn missing_cluster_is_invalid_request() {
    let mut body = event();
    body["cluster"] = json!("");
    let (status, body) = post_deploy(app(seeded()), body).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_request");
    assert_eq!(body["message"], "no ECS Cluster specified");
}

#[tokio::test]
async fn malformed_json_is_invalid_request() {
    let (status, body) = post_deploy(app(seeded()), json!({ "containers": "web=img:v2" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_request");
}

#[tokio::test]
async fn unknown_container_is_unprocessable() {
    let ecs = seeded();
    let mut body = event();
    body["containers"] = json!([{ "name": "worker", "image": "img:v2" }]);
    let (status, body) = post_deploy(app(ecs.clone()), body).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "container_mismatch");
    assert!(ecs.registrations().is_empty());
}

#[tokio::test]
async fn unknown_service_is_not_found() {
    let mut body = event();
    body["service"] = json!("other");
    let (status, body) = post_deploy(app(seeded()), body).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "service_not_found");
    assert!(body["message"].as_str().unwrap().starts_with("error updating service"));
    assert_eq!(body["registered"]["revision"], "api:2");
}

#[tokio::test]
async fn failed_deregistration_is_success_with_warning() {
    let ecs = seeded();
    ecs.fail(Operation::DeregisterTaskDefinition, ApiError::Transport("reset".into()));
    let (status, body) = post_deploy(app(ecs), event()).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["code"], "success_with_warning");
    assert!(body["warning"].as_str().unwrap().contains("reset"));
}

#[tokio::test]
async fn orchestrator_failure_is_bad_gateway() {
    let ecs = seeded();
    ecs.fail(
        Operation::RegisterTaskDefinition,
        ApiError::service("ClientException", "Too many revisions"),
    );
    let (status, body) = post_deploy(app(ecs), event()).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["code"], "orchestrator_error");
    assert!(body["message"].as_str().unwrap().contains("Too many revisions"));
}

#[tokio::test]
async fn deregister_false_keeps_previous_revision() {
    let ecs = seeded();
    let mut body = event();
    body["deregister"] = json!(false);
    let (status, body) = post_deploy(app(ecs.clone()), body).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["report"]["retirement"]["state"], "skipped");
    assert_eq!(ecs.active_revisions("api").len(), 2);
}
