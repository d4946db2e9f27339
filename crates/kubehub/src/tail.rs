//! Deployment progress: watch the pushed service from the written resource version and print
//! its status conditions until it turns Ready (or fails).

use std::collections::HashMap;
use std::io::Write;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use futures::TryStreamExt;
use kf_core::{ResourceSpec, ServiceSpec};
use kf_push::LogTailer;
use kube::{
    api::{Api, WatchEvent, WatchParams},
    core::DynamicObject,
    Client,
};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::resource::api_resource;

/// Server-side watch timeout must stay below 295s.
const MAX_WATCH_SECS: u32 = 290;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub kind: String,
    pub status: String,
    pub reason: String,
    pub message: String,
}

impl Condition {
    pub fn render(&self) -> String {
        let mut line = format!("{}={}", self.kind, self.status);
        if !self.reason.is_empty() {
            line.push_str(&format!(" ({})", self.reason));
        }
        if !self.message.is_empty() {
            line.push_str(": ");
            line.push_str(&self.message);
        }
        line
    }
}

/// Read `status.conditions` of an object; entries without a type are ignored.
pub fn conditions(obj: &Value) -> Vec<Condition> {
    let field = |c: &Value, k: &str| c.get(k).and_then(|v| v.as_str()).unwrap_or("").to_string();
    obj.get("status")
        .and_then(|s| s.get("conditions"))
        .and_then(|c| c.as_array())
        .map(|items| {
            items
                .iter()
                .filter(|c| c.get("type").and_then(|v| v.as_str()).is_some())
                .map(|c| Condition {
                    kind: field(c, "type"),
                    status: field(c, "status"),
                    reason: field(c, "reason"),
                    message: field(c, "message"),
                })
                .collect()
        })
        .unwrap_or_default()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Ready,
    Failed(String),
}

/// Tracks the conditions of one named service across watch events, emitting a line only when a
/// condition changes. Events for other services are ignored.
#[derive(Debug, Default)]
pub struct ConditionTracker {
    skip_build_logs: bool,
    target: String,
    seen: HashMap<String, Condition>,
    outcome: Option<Outcome>,
}

impl ConditionTracker {
    pub fn new(target: impl Into<String>, skip_build_logs: bool) -> Self {
        Self { skip_build_logs, target: target.into(), ..Default::default() }
    }

    pub fn target(&self) -> &str { &self.target }

    pub fn outcome(&self) -> Option<&Outcome> { self.outcome.as_ref() }

    /// Feed one object state; returns the lines to print.
    pub fn observe(&mut self, name: &str, obj: &Value) -> Vec<String> {
        if name != self.target {
            return Vec::new();
        }
        let mut lines = Vec::new();
        for c in conditions(obj) {
            if self.skip_build_logs && c.kind.starts_with("Build") {
                continue;
            }
            if self.seen.get(&c.kind) == Some(&c) {
                continue;
            }
            if c.kind == "Ready" {
                match c.status.as_str() {
                    "True" => self.outcome = Some(Outcome::Ready),
                    "False" => {
                        let why = if c.message.is_empty() { c.reason.clone() } else { c.message.clone() };
                        self.outcome = Some(Outcome::Failed(why));
                    }
                    _ => {}
                }
            }
            lines.push(c.render());
            self.seen.insert(c.kind.clone(), c);
        }
        lines
    }
}

/// Tails the service of one app.
pub struct KubeLogTailer {
    client: Client,
    app_name: String,
    timeout_secs: u32,
}

impl KubeLogTailer {
    /// Watch timeout from `KF_LOG_TAIL_TIMEOUT_SECS` (default 120, capped at 290).
    pub fn new(client: Client, app_name: impl Into<String>) -> Self {
        let timeout_secs = std::env::var("KF_LOG_TAIL_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(120);
        Self::with_timeout(client, app_name, timeout_secs)
    }

    pub fn with_timeout(client: Client, app_name: impl Into<String>, timeout_secs: u32) -> Self {
        Self { client, app_name: app_name.into(), timeout_secs: timeout_secs.clamp(1, MAX_WATCH_SECS) }
    }
}

#[async_trait]
impl LogTailer for KubeLogTailer {
    async fn tail(
        &self,
        out: &mut (dyn Write + Send),
        resource_version: &str,
        namespace: &str,
        skip_build_logs: bool,
    ) -> Result<()> {
        let ar = api_resource(&ServiceSpec::KIND);
        let api: Api<DynamicObject> = Api::namespaced_with(self.client.clone(), namespace, &ar);
        let wp = WatchParams::default()
            .fields(&format!("metadata.name={}", self.app_name))
            .timeout(self.timeout_secs);
        info!(app = %self.app_name, ns = %namespace, rv = %resource_version, skip_build_logs, "tailing service status");
        let stream = api.watch(&wp, resource_version).await.context("watching services")?;
        futures::pin_mut!(stream);

        let mut tracker = ConditionTracker::new(self.app_name.as_str(), skip_build_logs);
        while let Some(ev) = stream.try_next().await.context("reading service watch")? {
            match ev {
                WatchEvent::Added(obj) | WatchEvent::Modified(obj) => {
                    let name = obj.metadata.name.clone().unwrap_or_default();
                    let raw = serde_json::to_value(&obj).context("serializing DynamicObject")?;
                    for line in tracker.observe(&name, &raw) {
                        writeln!(out, "{}", line)?;
                    }
                    match tracker.outcome() {
                        Some(Outcome::Ready) => {
                            writeln!(out, "{} is ready", name)?;
                            return Ok(());
                        }
                        Some(Outcome::Failed(why)) => return Err(anyhow!("deploying {} failed: {}", name, why)),
                        None => {}
                    }
                }
                WatchEvent::Deleted(obj) => {
                    let name = obj.metadata.name.clone().unwrap_or_default();
                    if tracker.target() == name {
                        return Err(anyhow!("service {} was deleted while deploying", name));
                    }
                }
                WatchEvent::Bookmark(_) => debug!("watch bookmark"),
                WatchEvent::Error(e) => return Err(anyhow!("watch error: {}", e.message)),
            }
        }
        warn!(app = %self.app_name, ns = %namespace, secs = self.timeout_secs, "service watch ended before ready");
        Err(anyhow!("timed out after {}s waiting for the service to become ready", self.timeout_secs))
    }
}
