//! ECS data model.
//!
//! Field names follow the ECS JSON wire format (`camelCase`), so the same
//! types serve the HTTP client, the in-memory orchestrator, and fixtures.

pub mod image;
pub mod service;
pub mod task_definition;

pub use image::{ContainerImage, InvalidContainerImage};
pub use service::*;
pub use task_definition::*;
