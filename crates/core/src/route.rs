//! Route claims reserve a hostname/domain/path triple inside a namespace.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{KindInfo, ResourceSpec};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RouteClaimSpec {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub hostname: String,
    pub domain: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RouteClaimSpec {
    pub fn new(hostname: impl Into<String>, domain: impl Into<String>, path: impl Into<String>) -> Self {
        let path = path.into();
        let path = if path.is_empty() || path.starts_with('/') { path } else { format!("/{}", path) };
        Self { hostname: hostname.into(), domain: domain.into(), path, extra: Map::new() }
    }

    /// Object name for the claim: DNS-safe, deterministic per (hostname, domain, path).
    pub fn object_name(&self) -> String {
        let mut parts: Vec<&str> = Vec::new();
        if !self.hostname.is_empty() { parts.push(&self.hostname); }
        parts.push(&self.domain);
        let path = self.path.trim_matches('/');
        if !path.is_empty() { parts.push(path); }
        let mut out = String::with_capacity(64);
        for c in parts.join("-").chars() {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_alphanumeric() {
                out.push(c);
            } else if !out.ends_with('-') {
                out.push('-');
            }
        }
        let trimmed = out.trim_matches('-');
        trimmed.chars().take(253).collect()
    }

    /// Rendered URL-ish form, e.g. `www.example.com/foo`.
    pub fn host_path(&self) -> String {
        let host = if self.hostname.is_empty() { self.domain.clone() } else { format!("{}.{}", self.hostname, self.domain) };
        format!("{}{}", host, self.path)
    }
}

impl ResourceSpec for RouteClaimSpec {
    const KIND: KindInfo = KindInfo {
        group: "kf.dev",
        version: "v1alpha1",
        kind: "RouteClaim",
        plural: "routeclaims",
        namespaced: true,
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_name_is_dns_safe() {
        let r = RouteClaimSpec::new("www", "Example.com", "api/v1");
        assert_eq!(r.path, "/api/v1");
        assert_eq!(r.object_name(), "www-example-com-api-v1");
        assert_eq!(r.host_path(), "www.Example.com/api/v1");
    }

    #[test]
    fn object_name_without_hostname_or_path() {
        let r = RouteClaimSpec::new("", "example.com", "");
        assert_eq!(r.object_name(), "example-com");
        assert_eq!(r.host_path(), "example.com");
    }

    #[test]
    fn unknown_fields_round_trip() {
        let raw = serde_json::json!({"domain": "example.com", "path": "/x", "routeServiceURL": "https://svc"});
        let r: RouteClaimSpec = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(r.path, "/x");
        assert_eq!(serde_json::to_value(&r).unwrap(), raw);
    }
}
