//! Turns a [`FleetConfig`] into the workflows and operands every guild gets.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fleet_backends::cluster::{
    label_selector, PodRestartExecutor, RolloutRestartExecutor, ScaleExecutor,
};
use fleet_backends::{A2sQuery, ClusterApi, KubeCluster, MinecraftServer};
use fleet_core::capability::{Executor, SilentNotifier};
use fleet_core::config::{
    FleetConfig, MinecraftConfig, RestartMethod, StatefulSetConfig, ValheimConfig, WorkflowConfig,
};
use fleet_core::gate::{DebounceWindow, RoleGate};
use fleet_core::registry::Catalog;
use fleet_core::workflow::{
    ActionCopy, ConsoleRelay, DirectAction, GatedAction, Operand, PlayersPanel,
    WhitelistApproval, Workflow,
};
use tracing::info;

/// Hands out a cluster handle for a namespace, scoped to a statefulset when
/// one is given.
pub type Clusters<'a> = &'a dyn Fn(&str, Option<&StatefulSetConfig>) -> Arc<dyn ClusterApi>;

pub struct Services {
    pub catalog: Catalog,
    /// Shared by every workflow that talks to Minecraft.
    pub minecraft: Option<Arc<MinecraftServer>>,
}

/// Whether any configured workflow reaches into the cluster.
pub fn needs_cluster(config: &FleetConfig) -> bool {
    match (&config.minecraft, &config.valheim) {
        (Some(mc), _) => mc.statefulset.is_some(),
        (None, Some(_)) => true,
        (None, None) => false,
    }
}

pub fn kube_clusters(
    client: kube::Client,
) -> impl Fn(&str, Option<&StatefulSetConfig>) -> Arc<dyn ClusterApi> {
    move |namespace: &str, statefulset: Option<&StatefulSetConfig>| -> Arc<dyn ClusterApi> {
        let mut cluster = KubeCluster::new(client.clone(), namespace);
        if let Some(sts) = statefulset {
            cluster = cluster
                .with_statefulset(&sts.name)
                .with_field_manager(&sts.field_manager);
        }
        Arc::new(cluster)
    }
}

/// Stand-in for runs without cluster access. Every call fails.
pub fn detached(_namespace: &str, _statefulset: Option<&StatefulSetConfig>) -> Arc<dyn ClusterApi> {
    Arc::new(Detached)
}

struct Detached;

#[async_trait]
impl ClusterApi for Detached {
    async fn scale_to(&self, _replicas: i32) -> anyhow::Result<()> {
        anyhow::bail!("not connected to a cluster")
    }

    async fn delete_pods_matching(&self, _selector: &str) -> anyhow::Result<()> {
        anyhow::bail!("not connected to a cluster")
    }

    async fn annotate_rollout(&self) -> anyhow::Result<()> {
        anyhow::bail!("not connected to a cluster")
    }
}

pub fn build_catalog(config: &FleetConfig, clusters: Clusters<'_>) -> Services {
    let mut services = Services {
        catalog: Catalog::new(),
        minecraft: None,
    };
    if let Some(mc) = &config.minecraft {
        let server = Arc::new(MinecraftServer::over_tcp(
            &mc.rcon_address,
            &mc.rcon_password,
            Duration::from_millis(mc.rcon_timeout_ms),
            mc.max_reconnects,
        ));
        services.catalog = minecraft(
            services.catalog,
            mc,
            Arc::clone(&server),
            &config.workflow,
            clusters,
        );
        services.minecraft = Some(server);
        info!(address = %mc.rcon_address, "enabled minecraft");
    } else if let Some(vh) = &config.valheim {
        services.catalog = valheim(services.catalog, vh, &config.workflow, clusters);
        info!(address = %vh.query_address, "enabled valheim");
    }
    services
}

fn minecraft(
    catalog: Catalog,
    mc: &MinecraftConfig,
    server: Arc<MinecraftServer>,
    windows: &WorkflowConfig,
    clusters: Clusters<'_>,
) -> Catalog {
    let gate = RoleGate::new(&mc.approver_role);
    let debounce = DebounceWindow::new(windows.debounce());
    let poll = DebounceWindow::new(windows.poll_interval());
    let cluster = mc
        .statefulset
        .as_ref()
        .map(|sts| clusters(&sts.namespace, Some(sts)));

    let restarter: Arc<dyn Executor> = match (mc.restart, &cluster) {
        (RestartMethod::Rollout, Some(cluster)) => {
            Arc::new(RolloutRestartExecutor::new(Arc::clone(cluster)))
        }
        _ => server.clone(),
    };

    let mut catalog = catalog
        .with_workflow({
            let (server, gate) = (server.clone(), gate.clone());
            move || Arc::new(WhitelistApproval::new(server.clone(), gate.clone())) as Arc<dyn Workflow>
        })
        .with_workflow({
            let (server, gate) = (server.clone(), gate.clone());
            move || {
                Arc::new(
                    GatedAction::new(
                        ActionCopy::restart(),
                        server.clone(),
                        restarter.clone(),
                        gate.clone(),
                    )
                    .with_notifier(server.clone())
                    .with_debounce(debounce),
                ) as Arc<dyn Workflow>
            }
        })
        .with_workflow({
            let server = server.clone();
            move || Arc::new(PlayersPanel::new(server.clone()).with_poll_interval(poll)) as Arc<dyn Workflow>
        });

    if let Some(cluster) = cluster {
        catalog = catalog
            .with_workflow({
                let (server, gate, cluster) = (server.clone(), gate.clone(), cluster.clone());
                move || {
                    Arc::new(
                        GatedAction::new(
                            ActionCopy::wind_down(),
                            server.clone(),
                            Arc::new(ScaleExecutor::new(cluster.clone(), 0)),
                            gate.clone(),
                        )
                        .with_notifier(server.clone())
                        .with_debounce(debounce),
                    ) as Arc<dyn Workflow>
                }
            })
            .with_workflow(move || {
                Arc::new(DirectAction::wake_up(Arc::new(ScaleExecutor::new(
                    cluster.clone(),
                    1,
                )))) as Arc<dyn Workflow>
            });
    }

    if let Some(channel) = mc.rcon_channel_id.clone() {
        catalog = catalog.with_operand(move || {
            Arc::new(ConsoleRelay::new(channel.clone(), gate.clone(), server.clone())) as Arc<dyn Operand>
        });
    }
    catalog
}

fn valheim(
    catalog: Catalog,
    vh: &ValheimConfig,
    windows: &WorkflowConfig,
    clusters: Clusters<'_>,
) -> Catalog {
    let query = Arc::new(A2sQuery::new(&vh.query_address));
    let gate = RoleGate::new(&vh.approver_role);
    let debounce = DebounceWindow::new(windows.debounce());
    let poll = DebounceWindow::new(windows.poll_interval());
    let restarter: Arc<dyn Executor> = Arc::new(PodRestartExecutor::new(
        clusters(&vh.namespace, None),
        label_selector(&vh.pod_label_key, &vh.pod_label_value),
    ));

    catalog
        .with_workflow({
            let query = query.clone();
            move || {
                Arc::new(
                    GatedAction::new(
                        ActionCopy::restart(),
                        query.clone(),
                        restarter.clone(),
                        gate.clone(),
                    )
                    .with_notifier(Arc::new(SilentNotifier))
                    .with_debounce(debounce),
                ) as Arc<dyn Workflow>
            }
        })
        .with_workflow(move || {
            Arc::new(PlayersPanel::new(query.clone()).with_poll_interval(poll)) as Arc<dyn Workflow>
        })
}
