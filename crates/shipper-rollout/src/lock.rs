//! Serialization hook for overlapping rollouts.
//!
//! Rollouts do read-modify-write against the orchestrator with no version
//! fencing. A [`DeployLock`] lets the embedding process serialize rollouts
//! that target the same family or service. Keys are acquired in a fixed
//! order (family, then service) by the workflow.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

/// Held for as long as the rollout owns the key.
pub type LockGuard = Box<dyn Send>;

/// Boxed future alias for lock acquisition.
pub type LockFuture<'a> = Pin<Box<dyn Future<Output = LockGuard> + Send + 'a>>;

pub trait DeployLock: Send + Sync {
    /// Wait until `key` is free and take it.
    fn acquire<'a>(&'a self, key: &'a str) -> LockFuture<'a>;
}

/// No serialization. Concurrent rollouts race as described in the crate docs.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoLock;

impl DeployLock for NoLock {
    fn acquire<'a>(&'a self, _key: &'a str) -> LockFuture<'a> {
        Box::pin(async { Box::new(()) as LockGuard })
    }
}

/// In-process mutex per key.
///
/// Slots nobody holds or waits on are dropped on the next acquisition, so
/// the map stays bounded by the keys currently in use.
#[derive(Debug, Default)]
pub struct KeyedLock {
    keys: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl KeyedLock {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut keys = self.keys.lock().unwrap_or_else(PoisonError::into_inner);
        // Only the map references an idle slot; clones are made under this lock.
        keys.retain(|_, slot| Arc::strong_count(slot) > 1);
        keys.entry(key.to_string()).or_default().clone()
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.keys.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl DeployLock for KeyedLock {
    fn acquire<'a>(&'a self, key: &'a str) -> LockFuture<'a> {
        let slot = self.slot(key);
        Box::pin(async move {
            let guard = slot.lock_owned().await;
            debug!(%key, "deploy lock acquired");
            Box::new(guard) as LockGuard
        })
    }
}

/// Lock key for a task definition family.
pub fn family_key(family: &str) -> String {
    format!("task-definition/{family}")
}

/// Lock key for a service.
pub fn service_key(cluster: &str, service: &str) -> String {
    format!("service/{cluster}/{service}")
}
