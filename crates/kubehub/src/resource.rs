//! `ResourceClient` over the API server, using `DynamicObject` so one implementation serves every kind.

use std::marker::PhantomData;

use anyhow::anyhow;
use async_trait::async_trait;
use kf_client::{ResourceClient, RetryPolicy};
use kf_core::prelude::*;
use kube::{
    api::{Api, DeleteParams, ListParams, PostParams},
    core::{ApiResource, DynamicObject, GroupVersionKind},
    Client,
};
use metrics::counter;
use serde_json::{json, Value};
use tracing::debug;

/// Build the `ApiResource` for a kind without a discovery round-trip.
pub fn api_resource(kind: &KindInfo) -> ApiResource {
    let gvk = GroupVersionKind::gvk(kind.group, kind.version, kind.kind);
    ApiResource::from_gvk_with_plural(&gvk, kind.plural)
}

/// Map a kube error onto the error taxonomy by its API `reason`.
pub fn classify(err: kube::Error, kind: &'static str, reference: ResourceRef, version: VersionToken) -> KfError {
    let reason = match &err {
        kube::Error::Api(resp) => resp.reason.clone(),
        _ => String::new(),
    };
    match reason.as_str() {
        "NotFound" => KfError::NotFound { kind, reference },
        "AlreadyExists" => KfError::AlreadyExists { kind, reference },
        "Conflict" => KfError::Conflict { kind, reference, version },
        _ => {
            counter!("kf_kube_transport_err", 1u64);
            KfError::transport(anyhow::Error::new(err).context(format!("{} {}", kind, reference)))
        }
    }
}

/// Decode a dynamic object; the payload lives under `spec`.
pub fn to_managed<S: ResourceSpec>(obj: &DynamicObject) -> KfResult<ManagedResource<S>> {
    let reference = ResourceRef::new(
        obj.metadata.namespace.clone().unwrap_or_default(),
        obj.metadata.name.clone().unwrap_or_default(),
    );
    let version = VersionToken::new(obj.metadata.resource_version.clone().unwrap_or_default());
    let raw = obj.data.get("spec").cloned().unwrap_or_else(|| Value::Object(Default::default()));
    let spec = serde_json::from_value(raw)
        .map_err(|e| KfError::transport(anyhow!("decoding {} {}: {}", S::KIND.kind, reference, e)))?;
    Ok(ManagedResource { reference, version, spec })
}

/// Encode a spec as a dynamic object. An empty version leaves `resourceVersion` unset.
pub fn to_dynamic<S: ResourceSpec>(
    ar: &ApiResource,
    namespace: &str,
    name: &str,
    version: &VersionToken,
    spec: &S,
) -> KfResult<DynamicObject> {
    let raw = serde_json::to_value(spec)
        .map_err(|e| KfError::transport(anyhow!("encoding {} {}: {}", S::KIND.kind, name, e)))?;
    let mut obj = DynamicObject::new(name, ar).data(json!({ "spec": raw }));
    if S::KIND.namespaced {
        obj = obj.within(namespace);
    }
    if !version.is_empty() {
        obj.metadata.resource_version = Some(version.to_string());
    }
    Ok(obj)
}

/// Put `spec` onto the stored object at `version`. Metadata, status and spec fields the typed
/// payload carries through `extra` survive the write.
pub fn overlay_spec<S: ResourceSpec>(mut current: DynamicObject, version: &VersionToken, spec: &S) -> KfResult<DynamicObject> {
    let name = current.metadata.name.clone().unwrap_or_default();
    let raw = serde_json::to_value(spec)
        .map_err(|e| KfError::transport(anyhow!("encoding {} {}: {}", S::KIND.kind, name, e)))?;
    match current.data.as_object_mut() {
        Some(data) => {
            data.insert("spec".to_string(), raw);
        }
        None => current.data = json!({ "spec": raw }),
    }
    current.metadata.resource_version = Some(version.to_string());
    Ok(current)
}

pub struct KubeResourceClient<S> {
    client: Client,
    ar: ApiResource,
    retry: RetryPolicy,
    _kind: PhantomData<fn() -> S>,
}

impl<S> Clone for KubeResourceClient<S> {
    fn clone(&self) -> Self {
        Self { client: self.client.clone(), ar: self.ar.clone(), retry: self.retry, _kind: PhantomData }
    }
}

impl<S: ResourceSpec> KubeResourceClient<S> {
    pub fn new(client: Client) -> Self {
        Self { client, ar: api_resource(&S::KIND), retry: RetryPolicy::from_env(), _kind: PhantomData }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn reference(namespace: &str, name: &str) -> ResourceRef {
        if S::KIND.namespaced {
            ResourceRef::new(namespace, name)
        } else {
            ResourceRef::new("", name)
        }
    }

    /// Api scoped for single-object calls; namespaced kinds need a namespace.
    fn scoped(&self, namespace: &str) -> KfResult<Api<DynamicObject>> {
        if !S::KIND.namespaced {
            return Ok(Api::all_with(self.client.clone(), &self.ar));
        }
        if namespace.is_empty() {
            return Err(KfError::config(format!("namespace required for {}", S::KIND.kind)));
        }
        Ok(Api::namespaced_with(self.client.clone(), namespace, &self.ar))
    }

    /// Api for listing; an empty namespace lists across all namespaces.
    fn listing(&self, namespace: &str) -> Api<DynamicObject> {
        if S::KIND.namespaced && !namespace.is_empty() {
            Api::namespaced_with(self.client.clone(), namespace, &self.ar)
        } else {
            Api::all_with(self.client.clone(), &self.ar)
        }
    }
}

#[async_trait]
impl<S: ResourceSpec> ResourceClient<S> for KubeResourceClient<S> {
    async fn get(&self, namespace: &str, name: &str) -> KfResult<ManagedResource<S>> {
        let api = self.scoped(namespace)?;
        let reference = Self::reference(namespace, name);
        debug!(kind = S::KIND.kind, reference = %reference, "get");
        let obj = api.get(name).await.map_err(|e| classify(e, S::KIND.kind, reference, VersionToken::default()))?;
        to_managed(&obj)
    }

    async fn list(&self, namespace: &str, opts: &ListOptions) -> KfResult<Vec<ManagedResource<S>>> {
        let api = self.listing(namespace);
        let mut lp = ListParams::default();
        if let Some(name) = opts.name.as_deref() {
            lp = lp.fields(&format!("metadata.name={}", name));
        }
        debug!(kind = S::KIND.kind, ns = %namespace, name = ?opts.name, "list");
        let list = api
            .list(&lp)
            .await
            .map_err(|e| classify(e, S::KIND.kind, ResourceRef::new(namespace, ""), VersionToken::default()))?;
        list.items.iter().map(to_managed::<S>).collect()
    }

    async fn create(&self, namespace: &str, name: &str, spec: S) -> KfResult<ManagedResource<S>> {
        let api = self.scoped(namespace)?;
        let reference = Self::reference(namespace, name);
        let obj = to_dynamic(&self.ar, namespace, name, &VersionToken::default(), &spec)?;
        let created = api
            .create(&PostParams::default(), &obj)
            .await
            .map_err(|e| classify(e, S::KIND.kind, reference.clone(), VersionToken::default()))?;
        debug!(kind = S::KIND.kind, reference = %reference, version = ?created.metadata.resource_version, "created");
        to_managed(&created)
    }

    async fn update(&self, namespace: &str, resource: ManagedResource<S>) -> KfResult<ManagedResource<S>> {
        if resource.version.is_empty() {
            return self.create(namespace, &resource.reference.name, resource.spec).await;
        }
        let api = self.scoped(namespace)?;
        let reference = Self::reference(namespace, &resource.reference.name);
        let current = api
            .get(&reference.name)
            .await
            .map_err(|e| classify(e, S::KIND.kind, reference.clone(), resource.version.clone()))?;
        if current.metadata.resource_version.as_deref() != Some(resource.version.as_str()) {
            return Err(KfError::Conflict { kind: S::KIND.kind, reference, version: resource.version });
        }
        let obj = overlay_spec(current, &resource.version, &resource.spec)?;
        let replaced = api
            .replace(&reference.name, &PostParams::default(), &obj)
            .await
            .map_err(|e| classify(e, S::KIND.kind, reference.clone(), resource.version.clone()))?;
        debug!(kind = S::KIND.kind, reference = %reference, version = ?replaced.metadata.resource_version, "replaced");
        to_managed(&replaced)
    }

    async fn delete(&self, namespace: &str, name: &str) -> KfResult<()> {
        let api = self.scoped(namespace)?;
        let reference = Self::reference(namespace, name);
        api.delete(name, &DeleteParams::default())
            .await
            .map_err(|e| classify(e, S::KIND.kind, reference.clone(), VersionToken::default()))?;
        debug!(kind = S::KIND.kind, reference = %reference, "deleted");
        Ok(())
    }

    fn retry_policy(&self) -> RetryPolicy { self.retry }
}
