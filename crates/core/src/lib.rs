//! kf core types: resource identity, versioned snapshots, kind specs and the error taxonomy
//! shared by every resource client.

#![forbid(unsafe_code)]

use std::fmt;

use serde::{de::DeserializeOwned, Deserialize, Serialize};

pub mod route;
pub mod service;
pub mod space;

pub use route::RouteClaimSpec;
pub use service::{BuildDescriptor, BuildSpec, PullPolicy, ServiceSpec};
pub use space::{QuotaRequest, SpaceSpec};

/// Namespace used when none is configured.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Identity of a managed object. Cluster-scoped kinds carry an empty namespace.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceRef {
    pub namespace: String,
    pub name: String,
}

impl ResourceRef {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self { namespace: namespace.into(), name: name.into() }
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            f.write_str(&self.name)
        } else {
            write!(f, "{}/{}", self.namespace, self.name)
        }
    }
}

/// Opaque marker stamped by the store on every write. Only ever compared for equality;
/// an empty token means the object has never been written.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct VersionToken(String);

impl VersionToken {
    pub fn new(v: impl Into<String>) -> Self { Self(v.into()) }
    pub fn as_str(&self) -> &str { &self.0 }
    pub fn is_empty(&self) -> bool { self.0.is_empty() }
}

impl From<String> for VersionToken {
    fn from(v: String) -> Self { Self(v) }
}

impl From<&str> for VersionToken {
    fn from(v: &str) -> Self { Self(v.to_string()) }
}

impl fmt::Display for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

/// Snapshot of a stored object. Goes stale as soon as any writer touches the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ManagedResource<S> {
    pub reference: ResourceRef,
    pub version: VersionToken,
    pub spec: S,
}

impl<S> ManagedResource<S> {
    pub fn name(&self) -> &str { &self.reference.name }
    pub fn namespace(&self) -> &str { &self.reference.namespace }
}

/// Static API coordinates of a resource kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KindInfo {
    pub group: &'static str,
    pub version: &'static str,
    pub kind: &'static str,
    pub plural: &'static str,
    pub namespaced: bool,
}

impl KindInfo {
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.to_string()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }
}

/// Spec payload of a managed kind.
pub trait ResourceSpec: Clone + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static {
    const KIND: KindInfo;
}

/// Filters accepted by `list`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOptions {
    /// Only return the object with this exact name.
    pub name: Option<String>,
}

impl ListOptions {
    pub fn named(name: impl Into<String>) -> Self { Self { name: Some(name.into()) } }

    pub fn matches(&self, name: &str) -> bool {
        self.name.as_deref().map(|n| n == name).unwrap_or(true)
    }
}

/// Errors surfaced by resource clients and the push orchestrator.
#[derive(Debug, thiserror::Error)]
pub enum KfError {
    /// Caller input rejected before any side effect.
    #[error("{0}")]
    Config(String),
    #[error("{kind} {reference} not found")]
    NotFound { kind: &'static str, reference: ResourceRef },
    #[error("{kind} {reference} already exists")]
    AlreadyExists { kind: &'static str, reference: ResourceRef },
    #[error("{kind} {reference} was modified concurrently (stale version {version:?})")]
    Conflict { kind: &'static str, reference: ResourceRef, version: VersionToken },
    #[error(transparent)]
    Build(anyhow::Error),
    #[error(transparent)]
    Logs(anyhow::Error),
    #[error(transparent)]
    Transport(anyhow::Error),
}

impl KfError {
    pub fn config(msg: impl Into<String>) -> Self { KfError::Config(msg.into()) }

    pub fn transport(err: impl Into<anyhow::Error>) -> Self { KfError::Transport(err.into()) }

    pub fn is_config(&self) -> bool { matches!(self, KfError::Config(_)) }
    pub fn is_not_found(&self) -> bool { matches!(self, KfError::NotFound { .. }) }
    pub fn is_already_exists(&self) -> bool { matches!(self, KfError::AlreadyExists { .. }) }
    pub fn is_conflict(&self) -> bool { matches!(self, KfError::Conflict { .. }) }
}

pub type KfResult<T> = Result<T, KfError>;

pub mod prelude {
    pub use super::{
        KfError, KfResult, KindInfo, ListOptions, ManagedResource, ResourceRef, ResourceSpec, VersionToken,
        DEFAULT_NAMESPACE,
    };
}
