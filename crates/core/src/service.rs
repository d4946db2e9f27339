//! Application service spec, serialized in the knative serving `v1alpha1` run-latest shape.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{KindInfo, ResourceSpec};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum PullPolicy {
    #[default]
    Always,
    IfNotPresent,
    Never,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSpec {
    pub run_latest: RunLatest,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RunLatest {
    pub configuration: Configuration,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Configuration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<BuildDescriptor>,
    pub revision_template: RevisionTemplate,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RevisionTemplate {
    pub spec: RevisionSpec,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RevisionSpec {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub service_account_name: String,
    pub container: Container,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    pub image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_pull_policy: Option<PullPolicy>,
}

pub const BUILD_API_VERSION: &str = "build.knative.dev/v1alpha1";
pub const BUILD_KIND: &str = "Build";

/// Build object embedded in the service configuration, typed as a knative `Build`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BuildDescriptor {
    pub api_version: String,
    pub kind: String,
    pub spec: BuildSpec,
}

impl BuildDescriptor {
    pub fn new(spec: BuildSpec) -> Self {
        Self { api_version: BUILD_API_VERSION.to_string(), kind: BUILD_KIND.to_string(), spec }
    }
}

impl Default for BuildDescriptor {
    fn default() -> Self { Self::new(BuildSpec::default()) }
}

/// Spec of a knative build `v1alpha1`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BuildSpec {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub service_account_name: String,
    pub source: SourceSpec,
    pub template: TemplateInstantiation,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SourceSpec {
    /// Container whose filesystem holds the uploaded source.
    pub custom: Container,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TemplateInstantiation {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arguments: Vec<TemplateArgument>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TemplateArgument {
    pub name: String,
    pub value: String,
}

impl BuildSpec {
    pub fn argument(&self, name: &str) -> Option<&str> {
        self.template.arguments.iter().find(|a| a.name == name).map(|a| a.value.as_str())
    }
}

impl ServiceSpec {
    pub fn image(&self) -> &str { &self.run_latest.configuration.revision_template.spec.container.image }

    pub fn build(&self) -> Option<&BuildSpec> { self.build_descriptor().map(|b| &b.spec) }

    pub fn build_descriptor(&self) -> Option<&BuildDescriptor> { self.run_latest.configuration.build.as_ref() }

    pub fn service_account(&self) -> &str {
        &self.run_latest.configuration.revision_template.spec.service_account_name
    }

    pub fn pull_policy(&self) -> Option<PullPolicy> {
        self.run_latest.configuration.revision_template.spec.container.image_pull_policy
    }
}

impl ResourceSpec for ServiceSpec {
    const KIND: KindInfo = KindInfo {
        group: "serving.knative.dev",
        version: "v1alpha1",
        kind: "Service",
        plural: "services",
        namespaced: true,
    };
}
