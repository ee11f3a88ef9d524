//! Caller-supplied cancellation.
//!
//! A [`Cancellation`] combines an optional `watch` signal (set to `true`
//! to cancel) with an optional deadline. Every remote call of a rollout
//! is raced against it. Work that already completed is never undone.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use shipper_core::{ApiError, Operation};
use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::{DeployError, Stage};

/// Why a rollout was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelCause {
    Signal,
    Deadline,
}

impl fmt::Display for CancelCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Signal => f.write_str("cancellation requested"),
            Self::Deadline => f.write_str("deadline exceeded"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    signal: Option<watch::Receiver<bool>>,
    deadline: Option<Instant>,
}

impl Cancellation {
    /// Never cancels.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn from_signal(signal: watch::Receiver<bool>) -> Self {
        Self {
            signal: Some(signal),
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// The cause, if cancellation has already happened.
    pub fn check(&self) -> Option<CancelCause> {
        if self.signal.as_ref().is_some_and(|rx| *rx.borrow()) {
            return Some(CancelCause::Signal);
        }
        if self.deadline.is_some_and(|at| Instant::now() >= at) {
            return Some(CancelCause::Deadline);
        }
        None
    }

    /// Drive `fut` unless cancellation fires first.
    pub async fn race<F: Future>(&self, fut: F) -> Result<F::Output, CancelCause> {
        if let Some(cause) = self.check() {
            return Err(cause);
        }

        tokio::select! {
            out = fut => Ok(out),
            _ = signalled(self.signal.clone()) => Err(CancelCause::Signal),
            _ = expired(self.deadline) => Err(CancelCause::Deadline),
        }
    }

    /// Run one remote call, attaching operation and target to any error.
    pub async fn guard<T, F>(&self, operation: Operation, target: &str, call: F) -> Result<T, DeployError>
    where
        F: Future<Output = Result<T, ApiError>>,
    {
        match self.race(call).await {
            Ok(result) => result.map_err(|source| DeployError::Api {
                operation,
                target: target.to_string(),
                source,
            }),
            Err(cause) => Err(DeployError::Cancelled {
                stage: Stage::Call(operation),
                cause,
            }),
        }
    }
}

async fn signalled(signal: Option<watch::Receiver<bool>>) {
    if let Some(mut rx) = signal {
        // A dropped sender means nobody can cancel any more.
        let fired = rx.wait_for(|cancelled| *cancelled).await.is_ok();
        if fired {
            return;
        }
    }
    std::future::pending::<()>().await
}

async fn expired(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending::<()>().await,
    }
}
