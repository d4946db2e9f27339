//! kf resource client: one contract shared by every managed kind.
//!
//! [`ResourceClient`] is the store-facing surface (get/list/create/update/delete). The
//! read-modify-write patterns live in [`ResourceClientExt`], which every client gets for free:
//!
//! - [`ResourceClientExt::transform`] re-reads and retries the whole cycle on version conflicts,
//!   up to the client's [`RetryPolicy`].
//! - [`ResourceClientExt::upsert`] creates when absent, otherwise merges into the stored spec and
//!   performs a single update.

#![forbid(unsafe_code)]

use std::time::Duration;

use async_trait::async_trait;
use kf_core::prelude::*;
use metrics::counter;
use tracing::{debug, warn};

pub mod memory;

pub use memory::MemoryClient;

/// Bound on `transform` attempts. Tunable per client; the defaults can be overridden with
/// `KF_TRANSFORM_ATTEMPTS` and `KF_TRANSFORM_BACKOFF_MS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self { Self { max_attempts: 5, backoff: Duration::from_millis(10) } }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self { Self { max_attempts: max_attempts.max(1), backoff } }

    /// No sleeping between attempts.
    pub fn immediate(max_attempts: u32) -> Self { Self::new(max_attempts, Duration::ZERO) }

    pub fn from_env() -> Self {
        let d = Self::default();
        let max_attempts = std::env::var("KF_TRANSFORM_ATTEMPTS")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(d.max_attempts);
        let backoff = std::env::var("KF_TRANSFORM_BACKOFF_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(d.backoff);
        Self::new(max_attempts, backoff)
    }
}

/// Store-facing operations for one resource kind. Implementations never cache between calls.
#[async_trait]
pub trait ResourceClient<S: ResourceSpec>: Send + Sync {
    async fn get(&self, namespace: &str, name: &str) -> KfResult<ManagedResource<S>>;

    /// All objects in `namespace` matching `opts`, in store order.
    async fn list(&self, namespace: &str, opts: &ListOptions) -> KfResult<Vec<ManagedResource<S>>>;

    async fn create(&self, namespace: &str, name: &str, spec: S) -> KfResult<ManagedResource<S>>;

    /// Replace the stored spec. Fails with `Conflict` when `resource.version` is stale; an empty
    /// version makes this a create.
    async fn update(&self, namespace: &str, resource: ManagedResource<S>) -> KfResult<ManagedResource<S>>;

    async fn delete(&self, namespace: &str, name: &str) -> KfResult<()>;

    fn retry_policy(&self) -> RetryPolicy { RetryPolicy::default() }
}

/// Read-modify-write helpers layered on [`ResourceClient`].
#[async_trait]
pub trait ResourceClientExt<S: ResourceSpec>: ResourceClient<S> {
    /// Apply `mutator` to the latest stored spec and write it back, retrying from a fresh read
    /// whenever the update loses a version race. Non-conflict errors (including the mutator's
    /// own) abort immediately. On exhaustion the last conflict is returned.
    async fn transform<F>(&self, namespace: &str, name: &str, mut mutator: F) -> KfResult<ManagedResource<S>>
    where
        F: FnMut(&mut S) -> KfResult<()> + Send,
    {
        let policy = self.retry_policy();
        let max_attempts = policy.max_attempts.max(1);
        let mut attempt = 1u32;
        loop {
            let mut current = self.get(namespace, name).await?;
            mutator(&mut current.spec)?;
            match self.update(namespace, current).await {
                Ok(updated) => {
                    debug!(kind = S::KIND.kind, ns = %namespace, name = %name, attempt, version = %updated.version, "transform committed");
                    return Ok(updated);
                }
                Err(err) if err.is_conflict() && attempt < max_attempts => {
                    counter!("kf_transform_conflicts_total", 1u64);
                    debug!(kind = S::KIND.kind, ns = %namespace, name = %name, attempt, "version conflict; re-reading");
                    if !policy.backoff.is_zero() {
                        tokio::time::sleep(policy.backoff).await;
                    }
                    attempt += 1;
                }
                Err(err) => {
                    if err.is_conflict() {
                        counter!("kf_transform_exhausted_total", 1u64);
                        warn!(kind = S::KIND.kind, ns = %namespace, name = %name, attempts = attempt, "transform gave up on conflicts");
                    }
                    return Err(err);
                }
            }
        }
    }

    /// Create `desired` when the object is absent; otherwise update the stored object, keeping
    /// its version, with `merger(desired, existing)`. One write at most, no retry.
    async fn upsert<M>(&self, namespace: &str, name: &str, desired: S, merger: M) -> KfResult<ManagedResource<S>>
    where
        M: FnOnce(S, S) -> S + Send,
    {
        match self.get(namespace, name).await {
            Ok(existing) => {
                let ManagedResource { reference, version, spec } = existing;
                let merged = merger(desired, spec);
                debug!(kind = S::KIND.kind, ns = %namespace, name = %name, "upsert: merging into existing");
                self.update(namespace, ManagedResource { reference, version, spec: merged }).await
            }
            Err(err) if err.is_not_found() => {
                debug!(kind = S::KIND.kind, ns = %namespace, name = %name, "upsert: creating");
                self.create(namespace, name, desired).await
            }
            Err(err) => Err(err),
        }
    }
}

impl<S: ResourceSpec, C: ResourceClient<S> + ?Sized> ResourceClientExt<S> for C {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_policy_never_drops_below_one_attempt() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
        assert_eq!(RetryPolicy::immediate(3).backoff, Duration::ZERO);
        assert_eq!(RetryPolicy::default().max_attempts, 5);
    }
}
