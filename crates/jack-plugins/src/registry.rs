//! Plugin registry: the daemon's single view of every running plugin
//! process, namespace routing, CLI command registration, and the
//! `NamespaceCatalog` bridge back into `jack-txn`. Structure mirrors
//! `op-plugins/src/registry.rs` (an `Arc<RwLock<HashMap<...>>>` of
//! registered entries behind a cheap `Clone` wrapper) with the
//! in-process `BoxedPlugin` replaced by a `PluginProcess` handle.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{info, warn};

use jack_core::{Category, JackError, Result};
use jack_logger::LogEntry;
use jack_txn::NamespaceCatalog;

use crate::discovery::discover_plugins;
use crate::process::PluginProcess;
use crate::reverse::{serve_reverse_channel, ReverseBroker, ServiceRouter};
use crate::rpc::{CliCommand, PluginMetadata, PluginStatus};

const REVERSE_DIAL_TIMEOUT: Duration = Duration::from_secs(10);

pub struct RegisteredPlugin {
    pub process: Arc<PluginProcess>,
    pub metadata: PluginMetadata,
    pub path: PathBuf,
    pub enabled: bool,
}

pub struct PluginRegistry {
    plugins: Arc<RwLock<HashMap<String, RegisteredPlugin>>>,
    reverse: Arc<ReverseBroker>,
}

impl Clone for PluginRegistry {
    fn clone(&self) -> Self {
        Self { plugins: Arc::clone(&self.plugins), reverse: Arc::clone(&self.reverse) }
    }
}

impl PluginRegistry {
    pub fn new(reverse_dir: PathBuf) -> Self {
        Self {
            plugins: Arc::new(RwLock::new(HashMap::new())),
            reverse: Arc::new(ReverseBroker::new(reverse_dir)),
        }
    }

    /// Spawn and register every plugin binary discovery can find,
    /// skipping any whose namespace is already registered. Returns the
    /// namespaces successfully started; a plugin that fails to start is
    /// logged and skipped rather than aborting the whole scan.
    pub async fn discover_and_register(&self) -> Vec<String> {
        let mut started = Vec::new();
        for found in discover_plugins() {
            let already_known = {
                let plugins = self.plugins.read().await;
                plugins.values().any(|p| p.path == found.path)
            };
            if already_known {
                continue;
            }
            match self.register_path(&found.path).await {
                Ok(namespace) => started.push(namespace),
                Err(e) => warn!(plugin = %found.name, error = %e, "failed to start plugin"),
            }
        }
        started
    }

    /// Spawn a single plugin binary, complete its handshakes (both the
    /// main stdio handshake inside `PluginProcess::spawn` and the
    /// reverse-channel handshake here), and register it under the
    /// namespace its metadata declares.
    pub async fn register_path(&self, path: &Path) -> Result<String> {
        let process = Arc::new(PluginProcess::spawn(path).await?);
        let metadata = process.metadata().await?;
        let namespace = metadata.namespace.clone();

        {
            let plugins = self.plugins.read().await;
            if plugins.contains_key(&namespace) {
                return Err(JackError::Conflict(format!(
                    "plugin namespace '{namespace}' is already registered"
                )));
            }
        }

        let (endpoint, pending) = self.reverse.prepare(&namespace).await?;
        process.set_daemon_service(&endpoint).await?;
        let stream = pending.wait_for_dial(REVERSE_DIAL_TIMEOUT).await?;

        let token = uuid::Uuid::new_v4().to_string();
        if !process.verify_daemon_service(&token).await? {
            return Err(JackError::Plugin(format!(
                "plugin '{namespace}' failed reverse-channel verification"
            )));
        }

        let router: Arc<dyn ServiceRouter> = Arc::new(self.clone());
        tokio::spawn(serve_reverse_channel(stream, router));

        {
            let mut plugins = self.plugins.write().await;
            plugins.insert(
                namespace.clone(),
                RegisteredPlugin { process, metadata, path: path.to_path_buf(), enabled: true },
            );
        }
        info!(namespace = %namespace, "registered plugin");
        Ok(namespace)
    }

    pub async fn enable(&self, namespace: &str) -> Result<()> {
        let mut plugins = self.plugins.write().await;
        let entry = plugins
            .get_mut(namespace)
            .ok_or_else(|| JackError::NotFound(namespace.to_string()))?;
        entry.enabled = true;
        Ok(())
    }

    pub async fn disable(&self, namespace: &str) -> Result<()> {
        let mut plugins = self.plugins.write().await;
        let entry = plugins
            .get_mut(namespace)
            .ok_or_else(|| JackError::NotFound(namespace.to_string()))?;
        entry.enabled = false;
        Ok(())
    }

    /// Flush, close, and kill every registered plugin process. Called
    /// at daemon shutdown and before a full rescan.
    pub async fn teardown_all(&self) {
        let mut plugins = self.plugins.write().await;
        for (namespace, entry) in plugins.drain() {
            if let Err(e) = entry.process.teardown().await {
                warn!(namespace = %namespace, error = %e, "error tearing down plugin");
            }
        }
    }

    pub async fn list(&self) -> Vec<PluginMetadata> {
        let plugins = self.plugins.read().await;
        plugins.values().map(|p| p.metadata.clone()).collect()
    }

    pub async fn status(&self, namespace: &str) -> Result<PluginStatus> {
        self.with_process(namespace, |p| {
            let p = p.clone();
            async move { p.status().await }
        })
        .await
    }

    pub async fn apply_config(&self, namespace: &str, config: Value) -> Result<()> {
        self.with_process(namespace, |p| {
            let p = p.clone();
            async move { p.apply_config(config).await }
        })
        .await
    }

    pub async fn validate_config(&self, namespace: &str, config: Value) -> Result<Vec<String>> {
        self.with_process(namespace, |p| {
            let p = p.clone();
            async move { p.validate_config(config).await }
        })
        .await
    }

    pub async fn flush(&self, namespace: &str) -> Result<()> {
        self.with_process(namespace, |p| {
            let p = p.clone();
            async move { p.flush().await }
        })
        .await
    }

    /// Finds which registered, enabled plugin owns a CLI command name
    /// and returns (namespace, command descriptor).
    pub async fn find_cli_owner(&self, command: &str) -> Option<(String, CliCommand)> {
        let plugins = self.plugins.read().await;
        for (namespace, entry) in plugins.iter() {
            if !entry.enabled {
                continue;
            }
            if let Some(cmd) = entry.metadata.cli_commands.iter().find(|c| c.name == command) {
                return Some((namespace.clone(), cmd.clone()));
            }
        }
        None
    }

    pub async fn execute_cli_command(&self, namespace: &str, command: &str, args: Vec<String>) -> Result<Value> {
        self.with_process(namespace, |p| {
            let p = p.clone();
            let command = command.to_string();
            async move { p.execute_cli_command(&command, args).await }
        })
        .await
    }

    async fn with_process<F, Fut, T>(&self, namespace: &str, f: F) -> Result<T>
    where
        F: FnOnce(&Arc<PluginProcess>) -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let process = {
            let plugins = self.plugins.read().await;
            let entry = plugins
                .get(namespace)
                .filter(|p| p.enabled)
                .ok_or_else(|| JackError::NotFound(namespace.to_string()))?;
            Arc::clone(&entry.process)
        };
        f(&process).await
    }
}

#[async_trait]
impl ServiceRouter for PluginRegistry {
    async fn call_service(&self, target_namespace: &str, service: &str, params: Value) -> Result<Value> {
        self.with_process(target_namespace, |p| {
            let p = p.clone();
            let service = service.to_string();
            async move { p.call_service(&service, params).await }
        })
        .await
    }
}

/// Fans a structured log entry out to every enabled plugin's
/// `OnLogEvent`, in parallel, dropping individual failures — matching
/// spec.md §4.9's "subscriber errors are dropped" rule one level down
/// (the registry is one `jack_logger::Subscriber`; each plugin inside
/// it is its own best-effort delivery).
#[async_trait]
impl jack_logger::Subscriber for PluginRegistry {
    async fn on_log_event(&self, entry: LogEntry) {
        let event = crate::rpc::LogEvent {
            level: entry.level.as_str().to_string(),
            target: entry.component,
            message: entry.message,
        };
        let plugins = self.plugins.read().await;
        for (namespace, plugin) in plugins.iter() {
            if !plugin.enabled {
                continue;
            }
            if let Err(e) = plugin.process.on_log_event(&event).await {
                warn!(namespace = %namespace, error = %e, "plugin OnLogEvent failed");
            }
        }
    }
}

#[async_trait]
impl NamespaceCatalog for PluginRegistry {
    async fn plugin_namespaces(&self) -> Vec<(String, Category)> {
        let plugins = self.plugins.read().await;
        plugins
            .values()
            .filter(|p| p.enabled)
            .map(|p| (p.metadata.namespace.clone(), Category::from_plugin_category(&p.metadata.category)))
            .collect()
    }
}
