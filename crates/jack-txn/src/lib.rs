//! Transaction manager: the running/pending configuration overlay and its
//! `Get`/`Set`/`Diff`/`Commit`/`Revert`/`ListNamespaces` operations.
//!
//! Concurrency follows spec.md §4.3 exactly: a single exclusive lock
//! guards the running+pending pair for every operation, `Get` included —
//! simplicity over wait-freedom, since namespace documents are small and
//! commits are rare compared to reads.

pub mod diff;
pub mod validate;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use jack_config_store::ConfigStore;
use jack_core::value::split_path;
use jack_core::{Category, JackError, Result, Value};
use tokio::sync::RwLock;

pub use diff::Change;

/// Supplies the plugin-owned namespaces (and their display category) that
/// `ListNamespaces` groups alongside the built-ins. Implemented by
/// `jack-plugins`; kept as a trait here rather than a direct dependency
/// to avoid a `jack-txn` <-> `jack-plugins` crate cycle (the plugin host
/// itself calls into the transaction manager to fetch a namespace's
/// config before `ApplyConfig`).
#[async_trait]
pub trait NamespaceCatalog: Send + Sync {
    async fn plugin_namespaces(&self) -> Vec<(String, Category)>;
}

struct TxnState {
    running: HashMap<String, Value>,
    pending: HashMap<String, Value>,
}

pub struct TxnManager {
    config_store: Arc<ConfigStore>,
    catalog: Option<Arc<dyn NamespaceCatalog>>,
    state: RwLock<TxnState>,
}

impl TxnManager {
    pub fn new(config_store: Arc<ConfigStore>) -> Self {
        TxnManager {
            config_store,
            catalog: None,
            state: RwLock::new(TxnState {
                running: HashMap::new(),
                pending: HashMap::new(),
            }),
        }
    }

    pub fn with_catalog(mut self, catalog: Arc<dyn NamespaceCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Load `name`'s running value from the config store into `state` if
    /// it isn't already cached. Namespaces are loaded lazily, on first
    /// reference, rather than all at once at startup, so a plugin
    /// installed after boot doesn't need a daemon restart to become
    /// addressable.
    async fn ensure_loaded<'a>(&self, state: &'a mut TxnState, name: &str) -> Result<()> {
        if state.running.contains_key(name) {
            return Ok(());
        }
        let value = self.config_store.load_namespace(name).await?;
        state.running.insert(name.to_string(), value);
        Ok(())
    }

    pub async fn get(&self, path: &str) -> Result<Value> {
        let segments = split_path(path);
        let mut state = self.state.write().await;

        if segments.is_empty() {
            return Ok(self.namespace_listing_value(&state).await);
        }

        let namespace = segments[0];
        self.ensure_loaded(&mut state, namespace).await?;
        let doc = state
            .pending
            .get(namespace)
            .or_else(|| state.running.get(namespace))
            .expect("ensure_loaded just populated running");

        if segments.len() == 1 {
            Ok(doc.clone())
        } else {
            doc.get_path(&segments[1..]).map(Value::clone)
        }
    }

    pub async fn set(&self, path: &str, value: Value) -> Result<()> {
        let segments = split_path(path);
        if segments.len() < 2 {
            return Err(JackError::Validation(vec![
                "set requires a namespace and at least one field".to_string(),
            ]));
        }
        let namespace = segments[0];
        let mut state = self.state.write().await;
        self.ensure_loaded(&mut state, namespace).await?;

        if !state.pending.contains_key(namespace) {
            let running = state.running.get(namespace).cloned().unwrap_or_else(Value::object);
            state.pending.insert(namespace.to_string(), running);
        }
        let doc = state.pending.get_mut(namespace).expect("just inserted");
        doc.set_path(&segments[1..], value)
    }

    pub async fn diff(&self) -> Vec<Change> {
        let state = self.state.read().await;
        let mut changes = Vec::new();
        for (namespace, pending) in &state.pending {
            let running = state.running.get(namespace);
            diff::diff_values(namespace, running, Some(pending), &mut changes);
        }
        changes
    }

    /// Validates every pending namespace; aborts with no state change if
    /// any fails, otherwise persists each changed namespace and promotes
    /// pending to running.
    pub async fn commit(&self) -> Result<()> {
        let mut state = self.state.write().await;
        if state.pending.is_empty() {
            return Ok(());
        }

        let mut all_errors = Vec::new();
        for (namespace, value) in &state.pending {
            let errors = validate::validate_namespace(namespace, value);
            all_errors.extend(errors);
        }
        if !all_errors.is_empty() {
            return Err(JackError::Validation(all_errors));
        }

        let pending = std::mem::take(&mut state.pending);
        for (namespace, value) in &pending {
            self.config_store.save_namespace(namespace, value).await?;
        }
        for (namespace, value) in pending {
            state.running.insert(namespace, value);
        }
        Ok(())
    }

    pub async fn revert(&self) -> Result<()> {
        let mut state = self.state.write().await;
        if state.pending.is_empty() {
            return Err(JackError::NoPending);
        }
        state.pending.clear();
        Ok(())
    }

    pub async fn list_namespaces(&self) -> IndexMap<String, Vec<String>> {
        let state = self.state.read().await;
        self.namespace_groups(&state).await
    }

    /// `state` isn't consulted: the built-in namespaces are fixed and
    /// plugin namespaces come entirely from the catalog, independent of
    /// which namespaces happen to be cached in memory right now.
    async fn namespace_groups(&self, _state: &TxnState) -> IndexMap<String, Vec<String>> {
        let mut groups: IndexMap<String, Vec<String>> = Category::ORDER
            .iter()
            .map(|c| (c.as_str().to_string(), Vec::new()))
            .collect();

        for name in jack_core::category::CORE_NAMESPACES {
            groups.get_mut(Category::Core.as_str()).unwrap().push(name.to_string());
        }
        if let Some(catalog) = &self.catalog {
            for (name, category) in catalog.plugin_namespaces().await {
                let bucket = groups.entry(category.as_str().to_string()).or_default();
                if !bucket.contains(&name) {
                    bucket.push(name);
                }
            }
        }
        groups
    }

    async fn namespace_listing_value(&self, state: &TxnState) -> Value {
        let groups = self.namespace_groups(state).await;
        let mut root = Value::object();
        for (category, namespaces) in groups {
            let list = Value::List(namespaces.into_iter().map(Value::String).collect());
            root.set_path(&[category.as_str()], list).ok();
        }
        root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jack_osadapters::fake::{FakeClock, FakeFilesystem};

    fn manager() -> TxnManager {
        let store = Arc::new(ConfigStore::new(
            Arc::new(FakeFilesystem::new()),
            Arc::new(FakeClock::new()),
        ));
        TxnManager::new(store)
    }

    #[tokio::test]
    async fn set_then_get_sees_pending_not_running() {
        let mgr = manager();
        mgr.set("jack.enabled", Value::Bool(true)).await.unwrap();
        let got = mgr.get("jack.enabled").await.unwrap();
        assert_eq!(got, Value::Bool(true));
    }

    #[tokio::test]
    async fn diff_is_empty_until_a_set() {
        let mgr = manager();
        assert!(mgr.diff().await.is_empty());
        mgr.set("jack.enabled", Value::Bool(true)).await.unwrap();
        let changes = mgr.diff().await;
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].path, "jack.enabled");
    }

    #[tokio::test]
    async fn revert_without_pending_fails() {
        let mgr = manager();
        let err = mgr.revert().await.unwrap_err();
        assert!(matches!(err, JackError::NoPending));
    }

    #[tokio::test]
    async fn commit_persists_and_clears_pending() {
        let mgr = manager();
        mgr.set("jack.enabled", Value::Bool(true)).await.unwrap();
        mgr.commit().await.unwrap();
        assert!(mgr.diff().await.is_empty());
        let got = mgr.get("jack.enabled").await.unwrap();
        assert_eq!(got, Value::Bool(true));
    }

    #[tokio::test]
    async fn commit_rejects_invalid_routes_without_state_change() {
        let mgr = manager();
        mgr.set("routes.r1.destination", Value::String("default".into()))
            .await
            .unwrap();
        let err = mgr.commit().await.unwrap_err();
        assert!(matches!(err, JackError::Validation(_)));
        // Pending survives an aborted commit.
        assert_eq!(mgr.diff().await.len(), 1);
    }

    #[tokio::test]
    async fn set_requires_at_least_two_segments() {
        let mgr = manager();
        let err = mgr.set("jack", Value::Bool(true)).await.unwrap_err();
        assert!(matches!(err, JackError::Validation(_)));
    }
}
