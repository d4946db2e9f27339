//! In-process store enforcing the same version checks as the API server.
//! Clones share state, so two handles behave like two concurrent writers.

use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use kf_core::prelude::*;
use tokio::sync::Mutex;
use tracing::trace;

use crate::{ResourceClient, RetryPolicy};

struct Inner<S> {
    next_version: u64,
    objects: BTreeMap<ResourceRef, (VersionToken, S)>,
}

pub struct MemoryClient<S> {
    inner: Arc<Mutex<Inner<S>>>,
    retry: RetryPolicy,
    _kind: PhantomData<fn() -> S>,
}

impl<S> Clone for MemoryClient<S> {
    fn clone(&self) -> Self { Self { inner: Arc::clone(&self.inner), retry: self.retry, _kind: PhantomData } }
}

impl<S: ResourceSpec> Default for MemoryClient<S> {
    fn default() -> Self { Self::new() }
}

impl<S: ResourceSpec> MemoryClient<S> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner { next_version: 1, objects: BTreeMap::new() })),
            retry: RetryPolicy::default(),
            _kind: PhantomData,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub async fn len(&self) -> usize { self.inner.lock().await.objects.len() }

    pub async fn is_empty(&self) -> bool { self.len().await == 0 }

    fn key(namespace: &str, name: &str) -> ResourceRef {
        if S::KIND.namespaced {
            ResourceRef::new(namespace, name)
        } else {
            ResourceRef::new("", name)
        }
    }
}

impl<S> Inner<S> {
    fn stamp(&mut self) -> VersionToken {
        let v = VersionToken::new(self.next_version.to_string());
        self.next_version += 1;
        v
    }
}

#[async_trait]
impl<S: ResourceSpec> ResourceClient<S> for MemoryClient<S> {
    async fn get(&self, namespace: &str, name: &str) -> KfResult<ManagedResource<S>> {
        let key = Self::key(namespace, name);
        let inner = self.inner.lock().await;
        match inner.objects.get(&key) {
            Some((version, spec)) => Ok(ManagedResource { reference: key, version: version.clone(), spec: spec.clone() }),
            None => Err(KfError::NotFound { kind: S::KIND.kind, reference: key }),
        }
    }

    async fn list(&self, namespace: &str, opts: &ListOptions) -> KfResult<Vec<ManagedResource<S>>> {
        let inner = self.inner.lock().await;
        let scope = if S::KIND.namespaced { namespace } else { "" };
        let out = inner
            .objects
            .iter()
            .filter(|(k, _)| k.namespace == scope && opts.matches(&k.name))
            .map(|(k, (version, spec))| ManagedResource { reference: k.clone(), version: version.clone(), spec: spec.clone() })
            .collect();
        Ok(out)
    }

    async fn create(&self, namespace: &str, name: &str, spec: S) -> KfResult<ManagedResource<S>> {
        let key = Self::key(namespace, name);
        let mut inner = self.inner.lock().await;
        if inner.objects.contains_key(&key) {
            return Err(KfError::AlreadyExists { kind: S::KIND.kind, reference: key });
        }
        let version = inner.stamp();
        inner.objects.insert(key.clone(), (version.clone(), spec.clone()));
        trace!(kind = S::KIND.kind, reference = %key, version = %version, "created");
        Ok(ManagedResource { reference: key, version, spec })
    }

    async fn update(&self, namespace: &str, resource: ManagedResource<S>) -> KfResult<ManagedResource<S>> {
        if resource.version.is_empty() {
            // A write without a token is a create.
            return self.create(namespace, &resource.reference.name, resource.spec).await;
        }
        let key = Self::key(namespace, &resource.reference.name);
        let mut inner = self.inner.lock().await;
        let current = match inner.objects.get(&key) {
            Some((v, _)) => v.clone(),
            None => return Err(KfError::NotFound { kind: S::KIND.kind, reference: key }),
        };
        if resource.version != current {
            return Err(KfError::Conflict { kind: S::KIND.kind, reference: key, version: resource.version });
        }
        let version = inner.stamp();
        inner.objects.insert(key.clone(), (version.clone(), resource.spec.clone()));
        trace!(kind = S::KIND.kind, reference = %key, version = %version, "updated");
        Ok(ManagedResource { reference: key, version, spec: resource.spec })
    }

    async fn delete(&self, namespace: &str, name: &str) -> KfResult<()> {
        let key = Self::key(namespace, name);
        let mut inner = self.inner.lock().await;
        match inner.objects.remove(&key) {
            Some(_) => Ok(()),
            None => Err(KfError::NotFound { kind: S::KIND.kind, reference: key }),
        }
    }

    fn retry_policy(&self) -> RetryPolicy { self.retry }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kf_core::{RouteClaimSpec, SpaceSpec};

    fn claim(host: &str) -> RouteClaimSpec { RouteClaimSpec::new(host, "example.com", "") }

    #[tokio::test]
    async fn create_stamps_fresh_versions() {
        let c = MemoryClient::<RouteClaimSpec>::new();
        let a = c.create("ns", "a", claim("a")).await.unwrap();
        let b = c.create("ns", "b", claim("b")).await.unwrap();
        assert!(!a.version.is_empty());
        assert_ne!(a.version, b.version);
        assert_eq!(c.get("ns", "a").await.unwrap(), a);
    }

    #[tokio::test]
    async fn duplicate_create_is_already_exists() {
        let c = MemoryClient::<RouteClaimSpec>::new();
        c.create("ns", "a", claim("a")).await.unwrap();
        let err = c.create("ns", "a", claim("other")).await.unwrap_err();
        assert!(err.is_already_exists(), "err={}", err);
        // same name in another namespace is a different object
        c.create("other", "a", claim("a")).await.unwrap();
    }

    #[tokio::test]
    async fn stale_update_conflicts() {
        let c = MemoryClient::<RouteClaimSpec>::new();
        let first = c.create("ns", "a", claim("a")).await.unwrap();
        let mut fresh = first.clone();
        fresh.spec.hostname = "b".into();
        let second = c.update("ns", fresh).await.unwrap();
        assert_ne!(first.version, second.version);

        let mut stale = first;
        stale.spec.hostname = "c".into();
        let err = c.update("ns", stale).await.unwrap_err();
        assert!(err.is_conflict(), "err={}", err);
        assert_eq!(c.get("ns", "a").await.unwrap().spec.hostname, "b");
    }

    #[tokio::test]
    async fn update_without_token_is_a_create() {
        let c = MemoryClient::<RouteClaimSpec>::new();
        let blind = |host: &str| ManagedResource { reference: ResourceRef::new("ns", "a"), version: VersionToken::default(), spec: claim(host) };
        let created = c.update("ns", blind("x")).await.unwrap();
        assert!(!created.version.is_empty());
        assert_eq!(c.get("ns", "a").await.unwrap(), created);

        let err = c.update("ns", blind("y")).await.unwrap_err();
        assert!(err.is_already_exists(), "err={}", err);
        assert_eq!(c.get("ns", "a").await.unwrap().spec.hostname, "x");
    }

    #[tokio::test]
    async fn update_and_delete_missing_are_not_found() {
        let c = MemoryClient::<RouteClaimSpec>::new();
        let ghost = ManagedResource { reference: ResourceRef::new("ns", "ghost"), version: VersionToken::from("1"), spec: claim("g") };
        assert!(c.update("ns", ghost).await.unwrap_err().is_not_found());
        assert!(c.delete("ns", "ghost").await.unwrap_err().is_not_found());
        assert!(c.get("ns", "ghost").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn list_is_scoped_and_filtered() {
        let c = MemoryClient::<RouteClaimSpec>::new();
        c.create("ns", "b", claim("b")).await.unwrap();
        c.create("ns", "a", claim("a")).await.unwrap();
        c.create("other", "c", claim("c")).await.unwrap();
        let names: Vec<_> = c.list("ns", &ListOptions::default()).await.unwrap().into_iter().map(|r| r.reference.name).collect();
        assert_eq!(names, vec!["a", "b"]);
        let only = c.list("ns", &ListOptions::named("b")).await.unwrap();
        assert_eq!(only.len(), 1);
        c.delete("ns", "a").await.unwrap();
        assert_eq!(c.list("ns", &ListOptions::default()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn cluster_scoped_kinds_ignore_namespace() {
        let c = MemoryClient::<SpaceSpec>::new();
        c.create("whatever", "space-a", SpaceSpec::default()).await.unwrap();
        let got = c.get("", "space-a").await.unwrap();
        assert_eq!(got.reference, ResourceRef::new("", "space-a"));
        assert_eq!(c.list("ignored", &ListOptions::default()).await.unwrap().len(), 1);
    }
}
