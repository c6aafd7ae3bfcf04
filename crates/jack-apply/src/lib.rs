//! Apply orchestrator: the single `Apply()` entry point that takes the
//! committed running configuration and pushes it into the kernel and
//! plugin processes, snapshotting first and rolling back whole on any
//! failure. Sequencing follows spec.md §4.7 exactly; grounded
//! throughout on `op-dbus-service::main`'s top-level orchestration
//! shape (acquire a serializing lock, run a fixed step sequence,
//! propagate the first error) and the teacher's
//! `DisasterRecoveryExport::apply_order` dependency-ordering idea,
//! reimplemented as the toposort in [`toposort`].

pub mod toposort;

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value as JsonValue;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use jack_core::{JackError, Result, RollbackOutcome, Value};
use jack_network::{InterfaceSpec, NetworkManager};
use jack_plugins::PluginRegistry;
use jack_snapshot::{CheckpointKind, SnapshotManager};
use jack_txn::TxnManager;

use toposort::toposort;

/// One registered plugin's running config, captured alongside its
/// dependency list so ordering and application both see the same
/// read of pending+running taken at apply's start.
struct PluginWork {
    namespace: String,
    dependencies: Vec<String>,
    config: Value,
}

pub struct ApplyOrchestrator {
    txn: Arc<TxnManager>,
    network: Arc<NetworkManager>,
    snapshot: Arc<SnapshotManager>,
    plugins: Arc<PluginRegistry>,
    apply_lock: Mutex<()>,
}

impl ApplyOrchestrator {
    pub fn new(
        txn: Arc<TxnManager>,
        network: Arc<NetworkManager>,
        snapshot: Arc<SnapshotManager>,
        plugins: Arc<PluginRegistry>,
    ) -> Self {
        Self { txn, network, snapshot, plugins, apply_lock: Mutex::new(()) }
    }

    /// Runs one full apply. At most one apply runs at a time; a commit
    /// racing a running apply doesn't change what that apply pushes,
    /// since every namespace this apply needs is read once, up front,
    /// before the apply mutex's step sequence begins.
    pub async fn apply(&self) -> Result<()> {
        let _guard = self.apply_lock.lock().await;

        // A namespace with no prior `set`/commit (and, for anything but
        // `interfaces`, no bootstrap) reads back as `NotFound` rather
        // than an empty document; apply treats that the same as "no
        // configuration yet" instead of failing outright.
        let interfaces = self.read_namespace_or_default("interfaces").await?;
        let routes = self.read_namespace_or_default("routes").await?;
        let plugin_work = self.collect_plugin_work().await;

        let checkpoint_id = self.snapshot.checkpoint(CheckpointKind::Auto).await?;
        info!(checkpoint = %checkpoint_id, "captured pre-apply checkpoint");

        match self.run_steps(interfaces, routes, plugin_work).await {
            Ok(()) => Ok(()),
            Err((err, applied_plugins)) => {
                error!(error = %err, "apply failed, rolling back");
                let rollback = self.rollback(&checkpoint_id, &applied_plugins).await;
                Err(JackError::apply_failed(err, rollback))
            }
        }
    }

    async fn read_namespace_or_default(&self, namespace: &str) -> Result<Value> {
        match self.txn.get(namespace).await {
            Ok(value) => Ok(value),
            Err(JackError::NotFound(_)) => Ok(Value::object()),
            Err(e) => Err(e),
        }
    }

    async fn collect_plugin_work(&self) -> Vec<PluginWork> {
        let mut work = Vec::new();
        for meta in self.plugins.list().await {
            let config = self.txn.get(&meta.namespace).await.unwrap_or_else(|_| Value::object());
            work.push(PluginWork { namespace: meta.namespace, dependencies: meta.dependencies, config });
        }
        work
    }

    async fn rollback(&self, checkpoint_id: &str, applied_plugins: &[String]) -> RollbackOutcome {
        let outcome = match self.snapshot.rollback_to(checkpoint_id).await {
            Ok(report) if report.is_clean() => RollbackOutcome::Restored,
            Ok(report) => RollbackOutcome::Partial {
                warnings: report.errors.into_iter().chain(report.manual_intervention).collect(),
            },
            Err(e) => RollbackOutcome::Failed(e.to_string()),
        };

        for namespace in applied_plugins.iter().rev() {
            if let Err(e) = self.plugins.flush(namespace).await {
                warn!(namespace = %namespace, error = %e, "flush during rollback failed");
            }
        }
        outcome
    }

    /// The five side-effecting steps of spec.md §4.7 (steps 3-6), plus
    /// the VLAN/plugin topological ordering each needs. Returns the
    /// first error paired with the plugin namespaces already applied,
    /// so the caller can Flush them in reverse order.
    async fn run_steps(
        &self,
        interfaces: Value,
        routes: Value,
        plugin_work: Vec<PluginWork>,
    ) -> std::result::Result<(), (JackError, Vec<String>)> {
        let applied_plugins: Vec<String> = Vec::new();

        self.network.enable_ip_forwarding().await.map_err(|e| (e, applied_plugins.clone()))?;

        let parsed = NetworkManager::parse_interfaces(&interfaces);
        let edges = NetworkManager::vlan_dependency_edges(&parsed);
        let iface_names: Vec<String> = parsed.iter().map(|(n, _)| n.clone()).collect();
        let iface_order = toposort(iface_names, edges).map_err(|e| (e, applied_plugins.clone()))?;
        let specs: HashMap<String, InterfaceSpec> = parsed.into_iter().collect();
        for name in &iface_order {
            let spec = specs.get(name).expect("toposort only returns names it was given");
            self.network
                .apply_interface_config(name, spec)
                .await
                .map_err(|e| (e, applied_plugins.clone()))?;
        }

        self.network.apply_routes_config(&routes).await.map_err(|e| (e, applied_plugins.clone()))?;

        self.apply_plugins(plugin_work, applied_plugins).await
    }

    async fn apply_plugins(
        &self,
        plugin_work: Vec<PluginWork>,
        mut applied_plugins: Vec<String>,
    ) -> std::result::Result<(), (JackError, Vec<String>)> {
        let names: Vec<String> = plugin_work.iter().map(|w| w.namespace.clone()).collect();
        let edges: Vec<(String, String)> = plugin_work
            .iter()
            .flat_map(|w| w.dependencies.iter().map(move |d| (w.namespace.clone(), d.clone())))
            .collect();
        let order = toposort(names, edges).map_err(|e| (e, applied_plugins.clone()))?;

        let mut configs: HashMap<String, JsonValue> =
            plugin_work.into_iter().map(|w| (w.namespace, w.config.to_json())).collect();

        for namespace in order {
            let config = configs.remove(&namespace).unwrap_or(JsonValue::Null);
            self.plugins
                .apply_config(&namespace, config)
                .await
                .map_err(|e| (e, applied_plugins.clone()))?;
            applied_plugins.push(namespace);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use jack_config_store::ConfigStore;
    use jack_osadapters::fake::{FakeClock, FakeFilesystem, FakeNetlink, FakeSubprocess, FakeSysctl};
    use jack_osadapters::types::LinkInfo;
    use jack_osadapters::OsAdapters;

    async fn fake_adapters_with_eth0() -> Arc<OsAdapters> {
        let netlink = FakeNetlink::new();
        netlink
            .seed_link(LinkInfo {
                index: 1,
                name: "eth0".to_string(),
                kind: None,
                mtu: 1500,
                up: true,
                mac_address: None,
                master_index: None,
                vlan_id: None,
                parent_index: None,
            })
            .await;
        Arc::new(OsAdapters {
            netlink: Arc::new(netlink),
            sysctl: Arc::new(FakeSysctl::new()),
            filesystem: Arc::new(FakeFilesystem::new()),
            subprocess: Arc::new(FakeSubprocess::new()),
            clock: Arc::new(FakeClock::new()),
        })
    }

    fn orchestrator(dir: PathBuf, adapters: Arc<OsAdapters>) -> ApplyOrchestrator {
        let config_store = Arc::new(ConfigStore::new(adapters.filesystem.clone(), adapters.clock.clone()));
        let txn = Arc::new(TxnManager::new(config_store));
        let network = Arc::new(NetworkManager::new(adapters.clone()));
        let snapshot = Arc::new(SnapshotManager::new(adapters.clone(), dir));
        let plugins = Arc::new(PluginRegistry::new(PathBuf::from("/tmp/jack-apply-test-reverse")));
        ApplyOrchestrator::new(txn, network, snapshot, plugins)
    }

    #[tokio::test]
    async fn apply_with_no_configured_namespaces_enables_forwarding() {
        let dir = tempfile::tempdir().unwrap();
        let adapters = Arc::new(OsAdapters::fake());
        let orch = orchestrator(dir.path().to_path_buf(), adapters.clone());
        orch.apply().await.unwrap();
        let forwarding = adapters.sysctl.read("net.ipv4.ip_forward").await.unwrap();
        assert_eq!(forwarding, "1");
    }

    #[tokio::test]
    async fn apply_persists_an_auto_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let adapters = Arc::new(OsAdapters::fake());
        let orch = orchestrator(dir.path().to_path_buf(), adapters);
        orch.apply().await.unwrap();
        let checkpoints = orch.snapshot.list_checkpoints().await.unwrap();
        assert_eq!(checkpoints.len(), 1);
        assert_eq!(checkpoints[0].kind, CheckpointKind::Auto);
    }

    #[tokio::test]
    async fn committed_interfaces_are_applied_before_routes() {
        let dir = tempfile::tempdir().unwrap();
        let adapters = fake_adapters_with_eth0().await;
        let orch = orchestrator(dir.path().to_path_buf(), adapters);
        orch.txn
            .set("interfaces.eth0.type", Value::String("physical".into()))
            .await
            .unwrap();
        orch.txn
            .set("interfaces.eth0.device", Value::String("eth0".into()))
            .await
            .unwrap();
        orch.txn.commit().await.unwrap();

        orch.apply().await.unwrap();
    }
}
