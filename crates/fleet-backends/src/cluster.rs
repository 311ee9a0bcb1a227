use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fleet_core::capability::Executor;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams};
use kube::Client;
use serde_json::{json, Value};
use tracing::info;

pub const RESTARTED_AT_ANNOTATION: &str = "restarter.play-net.org/restartedAt";

/// The few cluster operations fleetbot performs.
#[async_trait]
pub trait ClusterApi: Send + Sync {
    async fn scale_to(&self, replicas: i32) -> anyhow::Result<()>;

    async fn delete_pods_matching(&self, selector: &str) -> anyhow::Result<()>;

    /// Restart the statefulset's pods by stamping its pod template.
    async fn annotate_rollout(&self) -> anyhow::Result<()>;
}

pub fn label_selector(key: &str, value: &str) -> String {
    format!("{key}={value}")
}

pub fn replicas_patch(replicas: i32) -> Value {
    json!({ "spec": { "replicas": replicas } })
}

pub fn restart_patch(at: DateTime<Utc>) -> Value {
    json!({
        "spec": {
            "template": {
                "metadata": {
                    "annotations": { RESTARTED_AT_ANNOTATION: at.to_rfc3339() }
                }
            }
        }
    })
}

// ---------------------------------------------------------------------------
// KubeCluster
// ---------------------------------------------------------------------------

/// [`ClusterApi`] against one namespace, and optionally one statefulset in
/// it.
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
    namespace: String,
    statefulset: Option<String>,
    field_manager: String,
}

impl KubeCluster {
    pub fn new(client: Client, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
            statefulset: None,
            field_manager: "fleetbot".to_string(),
        }
    }

    pub fn with_statefulset(mut self, name: impl Into<String>) -> Self {
        self.statefulset = Some(name.into());
        self
    }

    pub fn with_field_manager(mut self, field_manager: impl Into<String>) -> Self {
        self.field_manager = field_manager.into();
        self
    }

    fn statefulset(&self) -> anyhow::Result<&str> {
        self.statefulset
            .as_deref()
            .with_context(|| format!("no statefulset configured in {}", self.namespace))
    }

    async fn patch_statefulset(&self, patch: &Value) -> anyhow::Result<()> {
        let name = self.statefulset()?;
        let api: Api<StatefulSet> = Api::namespaced(self.client.clone(), &self.namespace);
        let params = PatchParams {
            field_manager: Some(self.field_manager.clone()),
            ..PatchParams::default()
        };
        api.patch(name, &params, &Patch::Merge(patch))
            .await
            .with_context(|| format!("patching statefulset {}/{name}", self.namespace))?;
        Ok(())
    }
}

#[async_trait]
impl ClusterApi for KubeCluster {
    async fn scale_to(&self, replicas: i32) -> anyhow::Result<()> {
        self.patch_statefulset(&replicas_patch(replicas)).await?;
        info!(namespace = %self.namespace, statefulset = ?self.statefulset, replicas, "scaled");
        Ok(())
    }

    async fn delete_pods_matching(&self, selector: &str) -> anyhow::Result<()> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), &self.namespace);
        api.delete_collection(&DeleteParams::default(), &ListParams::default().labels(selector))
            .await
            .with_context(|| format!("deleting pods {selector} in {}", self.namespace))?;
        info!(namespace = %self.namespace, selector, "deleted pods");
        Ok(())
    }

    async fn annotate_rollout(&self) -> anyhow::Result<()> {
        self.patch_statefulset(&restart_patch(Utc::now())).await?;
        info!(namespace = %self.namespace, statefulset = ?self.statefulset, "rollout restarted");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Executors
// ---------------------------------------------------------------------------

/// Scales to a fixed replica count: 0 winds down, 1 wakes up.
pub struct ScaleExecutor {
    cluster: Arc<dyn ClusterApi>,
    replicas: i32,
}

impl ScaleExecutor {
    pub fn new(cluster: Arc<dyn ClusterApi>, replicas: i32) -> Self {
        Self { cluster, replicas }
    }
}

#[async_trait]
impl Executor for ScaleExecutor {
    async fn perform(&self) -> anyhow::Result<()> {
        self.cluster.scale_to(self.replicas).await
    }
}

/// Restarts by deleting the pods and letting their controller recreate them.
pub struct PodRestartExecutor {
    cluster: Arc<dyn ClusterApi>,
    selector: String,
}

impl PodRestartExecutor {
    pub fn new(cluster: Arc<dyn ClusterApi>, selector: impl Into<String>) -> Self {
        Self {
            cluster,
            selector: selector.into(),
        }
    }
}

#[async_trait]
impl Executor for PodRestartExecutor {
    async fn perform(&self) -> anyhow::Result<()> {
        self.cluster.delete_pods_matching(&self.selector).await
    }
}

pub struct RolloutRestartExecutor {
    cluster: Arc<dyn ClusterApi>,
}

impl RolloutRestartExecutor {
    pub fn new(cluster: Arc<dyn ClusterApi>) -> Self {
        Self { cluster }
    }
}

#[async_trait]
impl Executor for RolloutRestartExecutor {
    async fn perform(&self) -> anyhow::Result<()> {
        self.cluster.annotate_rollout().await
    }
}
