//! shipper-rollout — the image rollout workflow.
//!
//! A rollout is two strictly sequential steps against the orchestrator:
//!
//! ```text
//! Idle
//!   │  ListTaskDefinitions + DescribeTaskDefinition
//!   ▼
//! DefinitionResolved ── clone every field, patch images ──▶ DefinitionPatched
//!   │  RegisterTaskDefinition
//!   ▼
//! DefinitionRegistered ── DeregisterTaskDefinition (best effort) ──▶ OldDefinitionRetired
//!   │  DescribeServices
//!   ▼
//! ServiceDescribed ── UpdateService (forceNewDeployment) ──▶ ServiceUpdated ──▶ Done
//! ```
//!
//! Any failure before the service is updated ends the rollout as
//! [`DeployOutcome::Failed`]; nothing is rolled back. A failed
//! deregistration after a successful registration is the one degraded
//! success, [`DeployOutcome::DoneWithWarning`].
//!
//! # Concurrency
//!
//! There is no fencing between reading the latest revision (or the
//! service) and writing the new one. Two rollouts racing on the same
//! family both register a revision and the later `UpdateService` wins.
//! Callers that can overlap must serialize through a [`DeployLock`],
//! e.g. [`KeyedLock`] inside one process.
//!
//! # Components
//!
//! - **`definition`** — task definition clone-and-patch
//! - **`service`** — service repointing
//! - **`workflow`** — `Deployer`, phases, outcome
//! - **`cancel`** — caller-supplied cancellation and deadlines
//! - **`lock`** — serialization hook

pub mod cancel;
pub mod definition;
pub mod error;
pub mod lock;
pub mod service;
pub mod workflow;

pub use cancel::{CancelCause, Cancellation};
pub use definition::{RegisteredDefinition, Retirement, RetirementWarning, UpdateDefinitionInput};
pub use error::{DeployError, ErrorKind, Stage};
pub use lock::{DeployLock, KeyedLock, NoLock};
pub use service::DeployServiceInput;
pub use workflow::{DeployOutcome, DeployReport, DeployRequest, Deployer, RegisteredRevision, WorkflowPhase};
