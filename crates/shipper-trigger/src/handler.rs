//! HTTP handlers.

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use shipper_rollout::{Cancellation, Deployer};
use tracing::{info, warn};

use crate::TriggerState;
use crate::event::{DeployEvent, StatusPayload};

/// Validate `event`, run the rollout, and describe the outcome.
pub async fn handle_event(deployer: &Deployer, event: DeployEvent, cancel: &Cancellation) -> StatusPayload {
    let request = match event.into_request() {
        Ok(request) => request,
        Err(rejected) => {
            warn!(message = %rejected.message, "rejected deploy event");
            return rejected;
        }
    };

    info!(
        family = %request.family,
        service = %request.service,
        cluster = %request.cluster,
        containers = request.images.len(),
        "deploy event accepted"
    );
    StatusPayload::from_outcome(deployer.run(&request, cancel).await)
}

impl IntoResponse for StatusPayload {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}

/// POST /api/v1/deploy
pub async fn deploy(
    State(state): State<TriggerState>,
    payload: Result<Json<DeployEvent>, JsonRejection>,
) -> StatusPayload {
    let event = match payload {
        Ok(Json(event)) => event,
        Err(rejection) => {
            warn!(error = %rejection.body_text(), "malformed deploy event");
            return StatusPayload::invalid_request(rejection.body_text());
        }
    };
    let cancel = state.cancellation();
    handle_event(&state.deployer, event, &cancel).await
}

/// GET /healthz
pub async fn healthz() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}
