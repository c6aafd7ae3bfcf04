//! Namespace persistence: `<base>/<name>.json`, atomic write with a
//! timestamped backup of whatever was there before.
//!
//! Grounded on the teacher's atomic file-write conventions in
//! `op-core/src/config.rs` (pretty JSON, mode bits set explicitly on the
//! written file), generalized from a single config file to one file per
//! namespace.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use jack_core::value::Value;
use jack_core::{config, JackError, Result};
use jack_osadapters::{Clock, Filesystem};

/// Namespaces whose bootstrap requires probing the kernel cannot live in
/// this crate (it would pull `jack-osadapters::Netlink` in through a
/// second, conflicting path); implemented by `jack-network` and wired in
/// by `jackd::main`.
#[async_trait]
pub trait InterfaceBootstrap: Send + Sync {
    async fn bootstrap_interfaces(&self) -> Result<Value>;
}

pub struct ConfigStore {
    filesystem: Arc<dyn Filesystem>,
    clock: Arc<dyn Clock>,
    base_dir: PathBuf,
    bootstrap: Option<Arc<dyn InterfaceBootstrap>>,
}

impl ConfigStore {
    pub fn new(filesystem: Arc<dyn Filesystem>, clock: Arc<dyn Clock>) -> Self {
        ConfigStore {
            filesystem,
            clock,
            base_dir: PathBuf::from(config::config_dir()),
            bootstrap: None,
        }
    }

    pub fn with_bootstrap(mut self, bootstrap: Arc<dyn InterfaceBootstrap>) -> Self {
        self.bootstrap = Some(bootstrap);
        self
    }

    pub fn config_dir(&self) -> &Path {
        &self.base_dir
    }

    fn namespace_path(&self, name: &str) -> PathBuf {
        self.base_dir.join(format!("{name}.json"))
    }

    /// Reads `<base>/<name>.json`. For the `interfaces` namespace, an
    /// absent file triggers kernel-probing bootstrap instead of
    /// `NotFound`, per the config store's first-boot contract.
    pub async fn load_namespace(&self, name: &str) -> Result<Value> {
        let path = self.namespace_path(name);
        if !self.filesystem.exists(&path).await {
            if name == "interfaces" {
                if let Some(bootstrap) = &self.bootstrap {
                    let value = bootstrap.bootstrap_interfaces().await?;
                    self.save_namespace(name, &value).await?;
                    return Ok(value);
                }
            }
            return Err(JackError::NotFound(format!("namespace '{name}'")));
        }
        let bytes = self.filesystem.read(&path).await?;
        let text = String::from_utf8_lossy(&bytes);
        let json: serde_json::Value = serde_json::from_str(&text).map_err(|e| {
            JackError::Validation(vec![format!(
                "{name}.json:{}:{}: {e}",
                e.line(),
                e.column()
            )])
        })?;
        Ok(Value::from_json(json))
    }

    /// Pretty-prints `value`, backs up any existing file to
    /// `<name>.json.backup.<UTC-YYYYMMDD-HHMMSS>`, then writes through a
    /// `.tmp` sibling (mode 0600) and renames it into place. A crash
    /// between backup and rename, or between tmp-write and rename, both
    /// leave the previous `<name>.json` intact.
    pub async fn save_namespace(&self, name: &str, value: &Value) -> Result<()> {
        self.filesystem.create_dir_all(&self.base_dir).await?;
        let path = self.namespace_path(name);
        if self.filesystem.exists(&path).await {
            let stamp = self.clock.backup_stamp();
            let backup = self
                .base_dir
                .join(format!("{name}.json.backup.{stamp}"));
            self.filesystem.copy(&path, &backup).await?;
        }

        let pretty = serde_json::to_string_pretty(&value.to_json())?;
        let tmp = self.base_dir.join(format!("{name}.json.tmp"));
        self.filesystem.write(&tmp, pretty.as_bytes()).await?;
        self.filesystem.set_permissions(&tmp, 0o600).await?;
        self.filesystem.rename(&tmp, &path).await?;
        Ok(())
    }

    /// All namespace files currently on disk, derived from the `*.json`
    /// entries in the config directory (backups and `.tmp` files excluded).
    pub async fn list_namespace_files(&self) -> Result<Vec<String>> {
        if !self.filesystem.exists(&self.base_dir).await {
            return Ok(Vec::new());
        }
        let entries = self.filesystem.list_dir(&self.base_dir).await?;
        Ok(entries
            .into_iter()
            .filter_map(|name| name.strip_suffix(".json").map(str::to_string))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jack_osadapters::fake::{FakeClock, FakeFilesystem};

    fn store() -> ConfigStore {
        ConfigStore::new(Arc::new(FakeFilesystem::new()), Arc::new(FakeClock::new()))
    }

    #[tokio::test]
    async fn missing_namespace_without_bootstrap_is_not_found() {
        let store = store();
        let err = store.load_namespace("routes").await.unwrap_err();
        assert!(matches!(err, JackError::NotFound(_)));
    }

    #[tokio::test]
    async fn save_then_load_roundtrips() {
        let store = store();
        let mut value = Value::object();
        value
            .set_path(&["br-lan", "ipaddr"], Value::String("192.168.1.1".into()))
            .unwrap();
        store.save_namespace("interfaces", &value).await.unwrap();
        let loaded = store.load_namespace("interfaces").await.unwrap();
        assert_eq!(loaded, value);
    }

    #[tokio::test]
    async fn second_save_backs_up_the_first() {
        let store = store();
        let v1 = Value::String("one".into()).to_owned();
        let mut ns = Value::object();
        ns.set_path(&["a"], v1).unwrap();
        store.save_namespace("jack", &ns).await.unwrap();

        let mut ns2 = Value::object();
        ns2.set_path(&["a"], Value::String("two".into())).unwrap();
        store.save_namespace("jack", &ns2).await.unwrap();

        let files = store.list_namespace_files().await.unwrap();
        assert!(files.contains(&"jack".to_string()));
        let loaded = store.load_namespace("jack").await.unwrap();
        assert_eq!(loaded, ns2);
    }

    #[tokio::test]
    async fn bootstrap_invoked_only_for_interfaces() {
        struct AlwaysEth0;
        #[async_trait]
        impl InterfaceBootstrap for AlwaysEth0 {
            async fn bootstrap_interfaces(&self) -> Result<Value> {
                let mut v = Value::object();
                v.set_path(&["eth0", "protocol"], Value::String("dhcp".into()))
                    .unwrap();
                Ok(v)
            }
        }
        let store = ConfigStore::new(Arc::new(FakeFilesystem::new()), Arc::new(FakeClock::new()))
            .with_bootstrap(Arc::new(AlwaysEth0));
        let loaded = store.load_namespace("interfaces").await.unwrap();
        assert!(loaded.get_path(&["eth0", "protocol"]).is_ok());

        let err = store.load_namespace("routes").await.unwrap_err();
        assert!(matches!(err, JackError::NotFound(_)));
    }
}
