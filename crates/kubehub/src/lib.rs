//! kf kubehub: kube-backed resource client, serving factory and status tailer

#![forbid(unsafe_code)]

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use kf_client::{ResourceClient, RetryPolicy};
use kf_core::{KfError, KfResult, ServiceSpec};
use kf_push::ServingFactory;
use kube::Client;
use tracing::debug;

pub mod resource;
pub mod tail;

pub use resource::{api_resource, classify, overlay_spec, to_dynamic, to_managed, KubeResourceClient};
pub use tail::{ConditionTracker, KubeLogTailer, Outcome};

/// Client from the ambient kubeconfig or in-cluster environment.
pub async fn get_kube_client() -> Result<Client> {
    let client = Client::try_default().await.context("building kube client from kubeconfig")?;
    debug!(ns = %client.default_namespace(), "kube client ready");
    Ok(client)
}

/// Builds the serving client on first use so commands that fail validation never connect.
#[derive(Debug, Clone, Copy, Default)]
pub struct KubeServingFactory {
    retry: Option<RetryPolicy>,
}

impl KubeServingFactory {
    pub fn new() -> Self { Self::default() }

    pub fn with_retry_policy(retry: RetryPolicy) -> Self { Self { retry: Some(retry) } }
}

#[async_trait]
impl ServingFactory for KubeServingFactory {
    async fn serving(&self) -> KfResult<Arc<dyn ResourceClient<ServiceSpec>>> {
        let client = get_kube_client().await.map_err(KfError::Transport)?;
        let mut services = KubeResourceClient::<ServiceSpec>::new(client);
        if let Some(retry) = self.retry {
            services = services.with_retry_policy(retry);
        }
        Ok(Arc::new(services))
    }
}
