//! Push options as given by the caller, and the validated configuration derived from them.

use std::path::PathBuf;

use kf_core::{KfError, KfResult, DEFAULT_NAMESPACE};

/// Build template used when none is selected.
pub const DEFAULT_BUILD_TEMPLATE: &str = "buildpack";

/// Raw, unvalidated push input.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushOptions {
    pub namespace: Option<String>,
    pub path: Option<PathBuf>,
    pub container_registry: Option<String>,
    pub docker_image: Option<String>,
    pub service_account: Option<String>,
    pub build_template: Option<String>,
}

/// Where the deployed image comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// Prebuilt image reference, deployed verbatim.
    Docker(String),
    /// Source directory built and pushed to `container_registry`.
    Source { path: PathBuf, container_registry: String },
}

/// Fully validated push configuration. Only produced by [`PushOptions::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushConfig {
    pub app_name: String,
    pub namespace: String,
    pub source: ImageSource,
    pub service_account: String,
    pub build_template: String,
}

impl PushConfig {
    pub fn is_source_build(&self) -> bool { matches!(self.source, ImageSource::Source { .. }) }
}

fn non_empty(v: &Option<String>) -> Option<&str> { v.as_deref().filter(|s| !s.is_empty()) }

impl PushOptions {
    /// Pure validation; performs no I/O.
    pub fn validate(&self, app_name: &str) -> KfResult<PushConfig> {
        if app_name.is_empty() {
            return Err(KfError::config("invalid app name"));
        }
        let registry = non_empty(&self.container_registry);
        let docker = non_empty(&self.docker_image);
        if registry.is_some() == docker.is_some() {
            return Err(KfError::config("container registry or docker image must be set (not both)"));
        }
        let path = self.path.as_ref().filter(|p| !p.as_os_str().is_empty());
        if docker.is_some() && path.is_some() {
            return Err(KfError::config("path flag is not valid with docker image flag"));
        }
        let service_account = non_empty(&self.service_account).ok_or_else(|| KfError::config("service account is not set"))?;

        let source = match docker {
            Some(image) => ImageSource::Docker(image.to_string()),
            None => ImageSource::Source {
                path: path.cloned().unwrap_or_else(|| PathBuf::from(".")),
                container_registry: registry.unwrap_or_default().to_string(),
            },
        };

        Ok(PushConfig {
            app_name: app_name.to_string(),
            namespace: non_empty(&self.namespace).unwrap_or(DEFAULT_NAMESPACE).to_string(),
            source,
            service_account: service_account.to_string(),
            build_template: non_empty(&self.build_template).unwrap_or(DEFAULT_BUILD_TEMPLATE).to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source_opts() -> PushOptions {
        PushOptions {
            container_registry: Some("some-reg.io".into()),
            service_account: Some("some-service-account".into()),
            ..Default::default()
        }
    }

    #[test]
    fn defaults_namespace_path_and_template() {
        let cfg = source_opts().validate("some-app").unwrap();
        assert_eq!(cfg.namespace, "default");
        assert_eq!(cfg.build_template, "buildpack");
        assert_eq!(
            cfg.source,
            ImageSource::Source { path: PathBuf::from("."), container_registry: "some-reg.io".into() }
        );
        assert!(cfg.is_source_build());
    }

    #[test]
    fn docker_image_is_taken_verbatim() {
        let opts = PushOptions {
            docker_image: Some("gcr.io/x/y:1".into()),
            service_account: Some("sa".into()),
            namespace: Some("ns".into()),
            ..Default::default()
        };
        let cfg = opts.validate("app").unwrap();
        assert_eq!(cfg.source, ImageSource::Docker("gcr.io/x/y:1".into()));
        assert_eq!(cfg.namespace, "ns");
        assert!(!cfg.is_source_build());
    }

    #[test]
    fn registry_is_taken_verbatim() {
        let mut opts = source_opts();
        opts.container_registry = Some("reg.io/team/".into());
        match opts.validate("app").unwrap().source {
            ImageSource::Source { container_registry, .. } => assert_eq!(container_registry, "reg.io/team/"),
            other => panic!("unexpected source {:?}", other),
        }
    }

    #[test]
    fn validation_order_matches_messages() {
        let cases: Vec<(&str, PushOptions, &str)> = vec![
            ("", source_opts(), "invalid app name"),
            (
                "app",
                PushOptions { service_account: Some("sa".into()), ..Default::default() },
                "container registry or docker image must be set (not both)",
            ),
            (
                "app",
                PushOptions { docker_image: Some("img".into()), ..source_opts() },
                "container registry or docker image must be set (not both)",
            ),
            (
                "app",
                PushOptions {
                    docker_image: Some("img".into()),
                    path: Some("some-path".into()),
                    service_account: Some("sa".into()),
                    ..Default::default()
                },
                "path flag is not valid with docker image flag",
            ),
            (
                "app",
                PushOptions { container_registry: Some("reg".into()), ..Default::default() },
                "service account is not set",
            ),
        ];
        for (app, opts, want) in cases {
            let err = opts.validate(app).unwrap_err();
            assert!(err.is_config(), "expected config error for {:?}", opts);
            assert_eq!(err.to_string(), want);
        }
    }
}
