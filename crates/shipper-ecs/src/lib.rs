//! shipper-ecs — Amazon ECS client.
//!
//! Implements [`shipper_core::EcsApi`] over the ECS JSON 1.1 protocol:
//! every operation is a SigV4-signed `POST /` with an `X-Amz-Target`
//! header naming the action. Credentials are static (config file or
//! `AWS_*` environment).

mod client;
mod wire;

pub use client::{ClientConfigError, EcsClient, EcsClientConfig};
pub use aws_credential_types::Credentials;
