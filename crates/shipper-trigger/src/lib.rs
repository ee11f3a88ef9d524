//! shipper-trigger — event-driven entry point for rollouts.
//!
//! A deploy event names the containers to update, the task definition
//! family, and the target service. Each event runs one rollout and is
//! answered with a [`StatusPayload`].
//!
//! # Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | POST | `/api/v1/deploy` | Run a rollout for a [`DeployEvent`] |
//! | GET | `/healthz` | Liveness |

pub mod event;
pub mod handler;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::{get, post};
use shipper_rollout::{Cancellation, Deployer};
use tokio::sync::watch;

pub use event::{DeployEvent, StatusPayload};
pub use handler::handle_event;

/// Shared state for trigger handlers.
#[derive(Clone)]
pub struct TriggerState {
    pub deployer: Arc<Deployer>,
    /// Per-event deadline.
    pub timeout: Option<Duration>,
    /// Flipped to `true` on shutdown; in-flight rollouts stop at the next call.
    pub shutdown: Option<watch::Receiver<bool>>,
}

impl TriggerState {
    pub fn new(deployer: Arc<Deployer>) -> Self {
        Self {
            deployer,
            timeout: None,
            shutdown: None,
        }
    }

    fn cancellation(&self) -> Cancellation {
        let cancel = match &self.shutdown {
            Some(rx) => Cancellation::from_signal(rx.clone()),
            None => Cancellation::none(),
        };
        match self.timeout {
            Some(timeout) => cancel.with_timeout(timeout),
            None => cancel,
        }
    }
}

/// Build the trigger router.
pub fn build_router(state: TriggerState) -> Router {
    let api_routes = Router::new()
        .route("/deploy", post(handler::deploy))
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/healthz", get(handler::healthz))
}
