//! Desired service state for a push.

use kf_core::service::{
    BuildDescriptor, BuildSpec, Configuration, Container, RevisionSpec, RevisionTemplate, RunLatest, SourceSpec, TemplateArgument,
    TemplateInstantiation,
};
use kf_core::{PullPolicy, ResourceRef, ServiceSpec};

use crate::build::{app_image_tag, ResolvedImage};
use crate::config::PushConfig;

/// Name of the single argument handed to the build template.
pub const IMAGE_ARG: &str = "IMAGE";

#[derive(Debug, Clone, PartialEq)]
pub struct DesiredService {
    pub reference: ResourceRef,
    pub spec: ServiceSpec,
}

pub fn compose(cfg: &PushConfig, image: &ResolvedImage) -> DesiredService {
    let (runtime_image, build) = match image {
        ResolvedImage::Prebuilt(image) => (image.clone(), None),
        ResolvedImage::Built { source_image, container_registry } => {
            let target = app_image_tag(container_registry, &cfg.app_name);
            let build = BuildSpec {
                service_account_name: cfg.service_account.clone(),
                source: SourceSpec { custom: Container { image: source_image.clone(), image_pull_policy: None } },
                template: TemplateInstantiation {
                    name: cfg.build_template.clone(),
                    arguments: vec![TemplateArgument { name: IMAGE_ARG.to_string(), value: target.clone() }],
                },
            };
            (target, Some(BuildDescriptor::new(build)))
        }
    };

    let spec = ServiceSpec {
        run_latest: RunLatest {
            configuration: Configuration {
                build,
                revision_template: RevisionTemplate {
                    spec: RevisionSpec {
                        service_account_name: cfg.service_account.clone(),
                        container: Container { image: runtime_image, image_pull_policy: Some(PullPolicy::Always) },
                    },
                },
            },
        },
        ..Default::default()
    };

    DesiredService { reference: ResourceRef::new(cfg.namespace.clone(), cfg.app_name.clone()), spec }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PushOptions;

    fn cfg(docker: Option<&str>) -> PushConfig {
        PushOptions {
            namespace: Some("ns".into()),
            container_registry: docker.is_none().then(|| "reg.io".to_string()),
            docker_image: docker.map(str::to_string),
            service_account: Some("builder".into()),
            ..Default::default()
        }
        .validate("app")
        .unwrap()
    }

    #[test]
    fn prebuilt_image_has_no_build() {
        let d = compose(&cfg(Some("nginx:1")), &ResolvedImage::Prebuilt("nginx:1".into()));
        assert_eq!(d.reference, ResourceRef::new("ns", "app"));
        assert_eq!(d.spec.image(), "nginx:1");
        assert!(d.spec.build().is_none());
        assert_eq!(d.spec.pull_policy(), Some(PullPolicy::Always));
        assert_eq!(d.spec.service_account(), "builder");
    }

    #[test]
    fn built_image_embeds_buildpack_descriptor() {
        let resolved = ResolvedImage::Built {
            source_image: "reg.io/src-app-0000000000000000001:latest".into(),
            container_registry: "reg.io".into(),
        };
        let d = compose(&cfg(None), &resolved);
        let descriptor = d.spec.build_descriptor().expect("build descriptor");
        assert_eq!(descriptor.api_version, "build.knative.dev/v1alpha1");
        assert_eq!(descriptor.kind, "Build");
        let build = &descriptor.spec;
        assert_eq!(build.template.name, "buildpack");
        assert_eq!(build.template.arguments.len(), 1);
        assert_eq!(build.argument(IMAGE_ARG), Some(d.spec.image()));
        assert_eq!(build.source.custom.image, "reg.io/src-app-0000000000000000001:latest");
        assert_eq!(build.service_account_name, "builder");
        assert!(d.spec.image().starts_with("reg.io/app-"));
        assert_eq!(d.spec.pull_policy(), Some(PullPolicy::Always));
    }
}
