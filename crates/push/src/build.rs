//! Image resolution: deploy a given image as-is, or build source into a fresh tag.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use kf_core::{KfError, KfResult};
use tracing::{debug, info};

use crate::config::{ImageSource, PushConfig};

/// Builds the source in `dir` into a container image and pushes it as `tag`.
#[async_trait]
pub trait SrcImageBuilder: Send + Sync {
    async fn build(&self, dir: &Path, tag: &str) -> anyhow::Result<()>;
}

/// Nanoseconds since the Unix epoch, zero-padded to 19 digits.
pub fn timestamp19() -> String {
    let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default().max(0);
    format!("{:019}", nanos)
}

/// Tag of the intermediate image holding the uploaded source.
pub fn source_image_tag(registry: &str, app_name: &str) -> String {
    format!("{}/src-{}-{}:latest", registry, app_name, timestamp19())
}

/// Tag of the runtime image the build produces.
pub fn app_image_tag(registry: &str, app_name: &str) -> String {
    format!("{}/{}-{}:latest", registry, app_name, timestamp19())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedImage {
    /// Deployed verbatim; nothing was built.
    Prebuilt(String),
    /// Source was built into `source_image`; the final image is produced in-cluster.
    Built { source_image: String, container_registry: String },
}

impl ResolvedImage {
    pub fn is_built(&self) -> bool { matches!(self, ResolvedImage::Built { .. }) }
}

/// Decide the image for `cfg`, invoking `builder` for source pushes. Build failures are fatal.
pub async fn resolve_image(cfg: &PushConfig, builder: &dyn SrcImageBuilder) -> KfResult<ResolvedImage> {
    match &cfg.source {
        ImageSource::Docker(image) => {
            debug!(app = %cfg.app_name, image = %image, "using prebuilt image");
            Ok(ResolvedImage::Prebuilt(image.clone()))
        }
        ImageSource::Source { path, container_registry } => {
            let tag = source_image_tag(container_registry, &cfg.app_name);
            info!(app = %cfg.app_name, dir = %path.display(), tag = %tag, "building source image");
            builder.build(path, &tag).await.map_err(KfError::Build)?;
            Ok(ResolvedImage::Built { source_image: tag, container_registry: container_registry.clone() })
        }
    }
}

/// Builds and pushes with a docker-compatible CLI (`docker`, `podman`, ...).
#[derive(Debug, Clone)]
pub struct ContainerCliBuilder {
    program: PathBuf,
}

impl Default for ContainerCliBuilder {
    fn default() -> Self { Self::from_env() }
}

impl ContainerCliBuilder {
    pub fn new(program: impl Into<PathBuf>) -> Self { Self { program: program.into() } }

    /// Program taken from `KF_BUILDER`, defaulting to `docker`.
    pub fn from_env() -> Self {
        Self::new(std::env::var("KF_BUILDER").unwrap_or_else(|_| "docker".to_string()))
    }

    async fn run(&self, args: &[&OsStr]) -> anyhow::Result<()> {
        let status = tokio::process::Command::new(&self.program)
            .args(args)
            .status()
            .await
            .with_context(|| format!("spawning {}", self.program.display()))?;
        if status.success() {
            Ok(())
        } else {
            Err(anyhow!("{} {:?} exited with {}", self.program.display(), args, status))
        }
    }
}

#[async_trait]
impl SrcImageBuilder for ContainerCliBuilder {
    async fn build(&self, dir: &Path, tag: &str) -> anyhow::Result<()> {
        self.run(&[OsStr::new("build"), OsStr::new("--tag"), OsStr::new(tag), dir.as_os_str()]).await?;
        self.run(&[OsStr::new("push"), OsStr::new(tag)]).await
    }
}
