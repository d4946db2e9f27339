//! Spaces and their quota sub-resource.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{KfError, KfResult, KindInfo, ResourceSpec};

/// Flag value meaning "no limit requested".
pub const UNDEFINED_QUOTA: &str = "undefined";

pub const QUOTA_MEMORY: &str = "memory";
pub const QUOTA_CPU: &str = "cpu";
pub const QUOTA_ROUTES: &str = "count/routeclaims.kf.dev";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SpaceSpec {
    #[serde(default)]
    pub resource_limits: ResourceLimits,
    /// Space settings this client does not manage, carried through writes untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceLimits {
    /// Hard limits keyed by resource name, values are Kubernetes quantities.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub space_quota: BTreeMap<String, String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SpaceSpec {
    pub fn quota(&self) -> &BTreeMap<String, String> { &self.resource_limits.space_quota }

    pub fn clear_quota(&mut self) { self.resource_limits.space_quota.clear(); }
}

impl ResourceSpec for SpaceSpec {
    const KIND: KindInfo = KindInfo {
        group: "kf.dev",
        version: "v1alpha1",
        kind: "Space",
        plural: "spaces",
        namespaced: false,
    };
}

/// Quota limits requested on the command line; `None` leaves the current value alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuotaRequest {
    pub memory: Option<String>,
    pub cpu: Option<String>,
    pub routes: Option<String>,
}

impl QuotaRequest {
    pub fn from_flags(memory: &str, cpu: &str, routes: &str) -> Self {
        fn requested(v: &str) -> Option<String> {
            if v == UNDEFINED_QUOTA { None } else { Some(v.to_string()) }
        }
        Self { memory: requested(memory), cpu: requested(cpu), routes: requested(routes) }
    }

    pub fn is_empty(&self) -> bool { self.memory.is_none() && self.cpu.is_none() && self.routes.is_none() }

    /// Validate every requested value, then write them into the space quota.
    /// Nothing is written when any value is invalid.
    pub fn apply(&self, space: &mut SpaceSpec) -> KfResult<()> {
        if let Some(m) = &self.memory { check_quantity(QUOTA_MEMORY, m)?; }
        if let Some(c) = &self.cpu { check_quantity(QUOTA_CPU, c)?; }
        if let Some(r) = &self.routes {
            if r.parse::<u64>().is_err() {
                return Err(KfError::config(format!("invalid routes quota {:?}: expected a non-negative integer", r)));
            }
        }
        let quota = &mut space.resource_limits.space_quota;
        if let Some(m) = &self.memory { quota.insert(QUOTA_MEMORY.to_string(), m.clone()); }
        if let Some(c) = &self.cpu { quota.insert(QUOTA_CPU.to_string(), c.clone()); }
        if let Some(r) = &self.routes { quota.insert(QUOTA_ROUTES.to_string(), r.clone()); }
        Ok(())
    }
}

fn quantity_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[+-]?(\d+(\.\d*)?|\.\d+)([KMGTPE]i|[numkMGTPE]|[eE][+-]?\d+)?$").expect("static quantity pattern")
    })
}

/// Kubernetes resource quantity grammar (e.g. `500Mi`, `10Gi`, `400m`, `1.5`).
pub fn is_quantity(v: &str) -> bool { quantity_pattern().is_match(v) }

fn check_quantity(resource: &str, v: &str) -> KfResult<()> {
    if is_quantity(v) {
        Ok(())
    } else {
        Err(KfError::config(format!("invalid {} quota {:?}: not a resource quantity", resource, v)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn undefined_flags_are_not_requested() {
        let q = QuotaRequest::from_flags("undefined", "400m", "undefined");
        assert_eq!(q.memory, None);
        assert_eq!(q.cpu.as_deref(), Some("400m"));
        assert!(!q.is_empty());
        assert!(QuotaRequest::from_flags(UNDEFINED_QUOTA, UNDEFINED_QUOTA, UNDEFINED_QUOTA).is_empty());
    }

    #[test]
    fn apply_sets_only_requested_limits() {
        let mut space = SpaceSpec::default();
        space.resource_limits.space_quota.insert(QUOTA_CPU.into(), "1".into());
        QuotaRequest::from_flags("10Gi", "undefined", "5").apply(&mut space).unwrap();
        assert_eq!(space.quota().get(QUOTA_MEMORY).map(String::as_str), Some("10Gi"));
        assert_eq!(space.quota().get(QUOTA_CPU).map(String::as_str), Some("1"));
        assert_eq!(space.quota().get(QUOTA_ROUTES).map(String::as_str), Some("5"));
    }

    #[test]
    fn invalid_values_leave_space_untouched() {
        let mut space = SpaceSpec::default();
        let err = QuotaRequest::from_flags("10Gi", "lots", "undefined").apply(&mut space).unwrap_err();
        assert!(err.is_config());
        assert!(space.quota().is_empty());

        let err = QuotaRequest::from_flags("undefined", "undefined", "-1").apply(&mut space).unwrap_err();
        assert!(err.to_string().contains("routes"), "err={}", err);
    }

    #[test]
    fn quantity_grammar() {
        for ok in ["500Mi", "10Gi", "400m", "1", "1.5", ".5", "1e3", "2k"] {
            assert!(is_quantity(ok), "{} should parse", ok);
        }
        for bad in ["", "Gi", "10GB", "ten", "1.2.3"] {
            assert!(!is_quantity(bad), "{} should not parse", bad);
        }
    }

    #[test]
    fn space_wire_shape() {
        let mut space = SpaceSpec::default();
        space.resource_limits.space_quota.insert(QUOTA_MEMORY.into(), "1Gi".into());
        let v = serde_json::to_value(&space).unwrap();
        assert_eq!(v, serde_json::json!({"resourceLimits": {"spaceQuota": {"memory": "1Gi"}}}));
        let empty: SpaceSpec = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(empty.quota().is_empty());
    }

    #[test]
    fn unmanaged_space_settings_survive_quota_changes() {
        let raw = serde_json::json!({
            "security": {"enableDeveloperLogsAccess": true},
            "resourceLimits": {"spaceQuota": {"cpu": "2", "memory": "4Gi"}, "resourceQuota": {"pods": "10"}}
        });
        let mut space: SpaceSpec = serde_json::from_value(raw).unwrap();
        QuotaRequest::from_flags("1Gi", "undefined", "undefined").apply(&mut space).unwrap();
        let v = serde_json::to_value(&space).unwrap();
        assert_eq!(v["security"]["enableDeveloperLogsAccess"], true);
        assert_eq!(v["resourceLimits"]["resourceQuota"]["pods"], "10");
        assert_eq!(v["resourceLimits"]["spaceQuota"], serde_json::json!({"cpu": "2", "memory": "1Gi"}));

        space.clear_quota();
        let v = serde_json::to_value(&space).unwrap();
        assert!(v["resourceLimits"].get("spaceQuota").is_none());
        assert_eq!(v["security"]["enableDeveloperLogsAccess"], true);
    }
}
