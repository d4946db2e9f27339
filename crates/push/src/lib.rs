//! kf push: validate → resolve image → list existing → compose → create or update → tail logs.
//!
//! The orchestrator runs strictly in that order and never retries a step. Collaborators are
//! injected as trait objects so the kube-backed implementations stay in `kf-kubehub`.

#![forbid(unsafe_code)]

use std::io::Write;
use std::sync::Arc;

use async_trait::async_trait;
use kf_client::ResourceClient;
use kf_core::prelude::*;
use kf_core::ServiceSpec;
use metrics::{counter, histogram};
use tracing::{error, info};

pub mod build;
pub mod compose;
pub mod config;

pub use build::{resolve_image, ContainerCliBuilder, ResolvedImage, SrcImageBuilder};
pub use compose::{compose, DesiredService};
pub use config::{ImageSource, PushConfig, PushOptions};

/// Lists deployed apps in a namespace.
#[async_trait]
pub trait AppLister: Send + Sync {
    async fn list(&self, namespace: &str, opts: &ListOptions) -> KfResult<Vec<ManagedResource<ServiceSpec>>>;
}

#[async_trait]
impl AppLister for Arc<dyn ResourceClient<ServiceSpec>> {
    async fn list(&self, namespace: &str, opts: &ListOptions) -> KfResult<Vec<ManagedResource<ServiceSpec>>> {
        ResourceClient::list(self.as_ref(), namespace, opts).await
    }
}

/// Lazily constructs the client used for the create/update write.
#[async_trait]
pub trait ServingFactory: Send + Sync {
    async fn serving(&self) -> KfResult<Arc<dyn ResourceClient<ServiceSpec>>>;
}

/// Hands out an already-built client.
pub struct StaticServing(pub Arc<dyn ResourceClient<ServiceSpec>>);

#[async_trait]
impl ServingFactory for StaticServing {
    async fn serving(&self) -> KfResult<Arc<dyn ResourceClient<ServiceSpec>>> { Ok(Arc::clone(&self.0)) }
}

/// Streams deployment progress for the object written at `resource_version`.
#[async_trait]
pub trait LogTailer: Send + Sync {
    async fn tail(
        &self,
        out: &mut (dyn Write + Send),
        resource_version: &str,
        namespace: &str,
        skip_build_logs: bool,
    ) -> anyhow::Result<()>;
}

pub struct Pusher {
    lister: Arc<dyn AppLister>,
    serving: Arc<dyn ServingFactory>,
    builder: Arc<dyn SrcImageBuilder>,
    logs: Arc<dyn LogTailer>,
}

impl Pusher {
    pub fn new(
        lister: Arc<dyn AppLister>,
        serving: Arc<dyn ServingFactory>,
        builder: Arc<dyn SrcImageBuilder>,
        logs: Arc<dyn LogTailer>,
    ) -> Self {
        Self { lister, serving, builder, logs }
    }

    /// Push `app_name`, tailing logs to stdout.
    pub async fn push(&self, app_name: &str, opts: &PushOptions) -> KfResult<()> {
        let mut out = std::io::stdout();
        self.push_to(app_name, opts, &mut out).await
    }

    /// Push `app_name`, tailing logs to `out`.
    ///
    /// Nothing is touched when validation fails. A log tailing error is returned even though
    /// the deploy itself went through.
    pub async fn push_to(&self, app_name: &str, opts: &PushOptions, out: &mut (dyn Write + Send)) -> KfResult<()> {
        let cfg = opts.validate(app_name)?;
        let t0 = std::time::Instant::now();
        counter!("kf_push_attempts", 1u64);
        info!(app = %cfg.app_name, ns = %cfg.namespace, source_build = cfg.is_source_build(), "push started");

        let res = self.deploy(&cfg).await;
        let written = match res {
            Ok(w) => w,
            Err(e) => {
                counter!("kf_push_err", 1u64);
                error!(app = %cfg.app_name, ns = %cfg.namespace, error = %e, "push failed");
                return Err(e);
            }
        };
        histogram!("kf_push_latency_ms", t0.elapsed().as_secs_f64() * 1000.0);
        counter!("kf_push_ok", 1u64);

        let skip_build_logs = !cfg.is_source_build();
        self.logs
            .tail(out, written.version.as_str(), &cfg.namespace, skip_build_logs)
            .await
            .map_err(KfError::Logs)
    }

    async fn deploy(&self, cfg: &PushConfig) -> KfResult<ManagedResource<ServiceSpec>> {
        let image = resolve_image(cfg, self.builder.as_ref()).await?;

        let apps = self.lister.list(&cfg.namespace, &ListOptions::default()).await?;
        let existing = apps.into_iter().find(|a| a.reference.name == cfg.app_name);

        let desired = compose(cfg, &image);
        let serving = self.serving.serving().await?;

        match existing {
            None => {
                let created = serving.create(&cfg.namespace, &desired.reference.name, desired.spec).await?;
                info!(app = %cfg.app_name, ns = %cfg.namespace, version = %created.version, "app created");
                Ok(created)
            }
            Some(current) => {
                let replacement = ManagedResource { reference: current.reference, version: current.version, spec: desired.spec };
                let updated = serving.update(&cfg.namespace, replacement).await?;
                info!(app = %cfg.app_name, ns = %cfg.namespace, version = %updated.version, "app updated");
                Ok(updated)
            }
        }
    }
}
