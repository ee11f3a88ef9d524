//! shipper-core — shared types for the Shipper image deployer.
//!
//! Holds the ECS data model (task definitions, services, deployments),
//! the [`EcsApi`] capability the rollout workflow talks through, the
//! TOML configuration model, and [`MemoryEcs`], an in-memory
//! orchestrator used for tests and dry runs.

pub mod api;
pub mod config;
pub mod error;
pub mod memory;
pub mod types;

pub use api::{ApiFuture, EcsApi, Operation};
pub use config::ShipperConfig;
pub use error::{ApiError, ApiResult};
pub use memory::MemoryEcs;
pub use types::*;
