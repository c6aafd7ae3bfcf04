//! In-memory fakes for every capability trait, so the transaction manager,
//! the network reconciler and the apply orchestrator can be exercised
//! without root or a real kernel. Shape follows the teacher's
//! `Arc<RwLock<HashMap<...>>>` registry style in `op-plugins::registry`.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use jack_core::{JackError, Result};
use tokio::sync::RwLock;

use crate::clock::Clock;
use crate::filesystem::Filesystem;
use crate::netlink::Netlink;
use crate::subprocess::{ProcessOutput, Subprocess};
use crate::sysctl::Sysctl;
use crate::types::{AddrInfo, LinkInfo, NeighborInfo, RouteInfo};

#[derive(Default)]
struct NetlinkState {
    links: HashMap<u32, LinkInfo>,
    next_index: u32,
    addrs: HashMap<u32, Vec<AddrInfo>>,
    routes: Vec<RouteInfo>,
    neighbors: Vec<NeighborInfo>,
}

/// In-memory link/address/route tables behind a single lock, seeded with
/// a loopback interface the way a real kernel always has one.
pub struct FakeNetlink {
    state: Arc<RwLock<NetlinkState>>,
}

impl Default for FakeNetlink {
    fn default() -> Self {
        let mut links = HashMap::new();
        links.insert(
            1,
            LinkInfo {
                index: 1,
                name: "lo".into(),
                kind: None,
                mtu: 65536,
                up: true,
                mac_address: None,
                master_index: None,
                vlan_id: None,
                parent_index: None,
            },
        );
        FakeNetlink {
            state: Arc::new(RwLock::new(NetlinkState {
                links,
                next_index: 2,
                addrs: HashMap::new(),
                routes: Vec::new(),
                neighbors: Vec::new(),
            })),
        }
    }
}

impl FakeNetlink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test seam: register a physical link as if discovered at boot.
    pub async fn seed_link(&self, link: LinkInfo) {
        let mut state = self.state.write().await;
        if link.index >= state.next_index {
            state.next_index = link.index + 1;
        }
        state.links.insert(link.index, link);
    }

    /// Test seam: register a neighbor table entry.
    pub async fn seed_neighbor(&self, neighbor: NeighborInfo) {
        self.state.write().await.neighbors.push(neighbor);
    }
}

#[async_trait]
impl Netlink for FakeNetlink {
    async fn link_list(&self) -> Result<Vec<LinkInfo>> {
        let state = self.state.read().await;
        let mut out: Vec<_> = state.links.values().cloned().collect();
        out.sort_by_key(|l| l.index);
        Ok(out)
    }

    async fn link_get(&self, name: &str) -> Result<Option<LinkInfo>> {
        let state = self.state.read().await;
        Ok(state.links.values().find(|l| l.name == name).cloned())
    }

    async fn link_add_bridge(&self, name: &str) -> Result<u32> {
        let mut state = self.state.write().await;
        if state.links.values().any(|l| l.name == name) {
            return Err(JackError::Conflict(format!("link {name} already exists")));
        }
        let index = state.next_index;
        state.next_index += 1;
        state.links.insert(
            index,
            LinkInfo {
                index,
                name: name.to_string(),
                kind: Some("bridge".into()),
                mtu: 1500,
                up: false,
                mac_address: None,
                master_index: None,
                vlan_id: None,
                parent_index: None,
            },
        );
        Ok(index)
    }

    async fn link_add_vlan(&self, name: &str, parent_index: u32, vlan_id: u16) -> Result<u32> {
        let mut state = self.state.write().await;
        if !state.links.contains_key(&parent_index) {
            return Err(JackError::NotFound(format!(
                "vlan parent index {parent_index}"
            )));
        }
        let index = state.next_index;
        state.next_index += 1;
        state.links.insert(
            index,
            LinkInfo {
                index,
                name: name.to_string(),
                kind: Some("vlan".into()),
                mtu: 1500,
                up: false,
                mac_address: None,
                master_index: None,
                vlan_id: Some(vlan_id),
                parent_index: Some(parent_index),
            },
        );
        Ok(index)
    }

    async fn link_delete(&self, index: u32) -> Result<()> {
        let mut state = self.state.write().await;
        state.links.remove(&index);
        state.addrs.remove(&index);
        Ok(())
    }

    async fn link_set_up(&self, index: u32) -> Result<()> {
        let mut state = self.state.write().await;
        let link = state
            .links
            .get_mut(&index)
            .ok_or_else(|| JackError::NotFound(format!("link index {index}")))?;
        link.up = true;
        Ok(())
    }

    async fn link_set_down(&self, index: u32) -> Result<()> {
        let mut state = self.state.write().await;
        let link = state
            .links
            .get_mut(&index)
            .ok_or_else(|| JackError::NotFound(format!("link index {index}")))?;
        link.up = false;
        Ok(())
    }

    async fn link_set_mtu(&self, index: u32, mtu: u32) -> Result<()> {
        let mut state = self.state.write().await;
        let link = state
            .links
            .get_mut(&index)
            .ok_or_else(|| JackError::NotFound(format!("link index {index}")))?;
        link.mtu = mtu;
        Ok(())
    }

    async fn link_set_master(&self, index: u32, master_index: u32) -> Result<()> {
        let mut state = self.state.write().await;
        if !state.links.contains_key(&master_index) {
            return Err(JackError::NotFound(format!(
                "bridge index {master_index}"
            )));
        }
        let link = state
            .links
            .get_mut(&index)
            .ok_or_else(|| JackError::NotFound(format!("link index {index}")))?;
        link.master_index = Some(master_index);
        Ok(())
    }

    async fn link_set_nomaster(&self, index: u32) -> Result<()> {
        let mut state = self.state.write().await;
        let link = state
            .links
            .get_mut(&index)
            .ok_or_else(|| JackError::NotFound(format!("link index {index}")))?;
        link.master_index = None;
        Ok(())
    }

    async fn link_set_name(&self, index: u32, name: &str) -> Result<()> {
        let mut state = self.state.write().await;
        if state.links.values().any(|l| l.index != index && l.name == name) {
            return Err(JackError::Conflict(format!("link {name} already exists")));
        }
        let link = state
            .links
            .get_mut(&index)
            .ok_or_else(|| JackError::NotFound(format!("link index {index}")))?;
        link.name = name.to_string();
        Ok(())
    }

    async fn addr_list(&self, index: u32) -> Result<Vec<AddrInfo>> {
        let state = self.state.read().await;
        Ok(state.addrs.get(&index).cloned().unwrap_or_default())
    }

    async fn addr_add(&self, index: u32, address: Ipv4Addr, prefix_len: u8) -> Result<()> {
        let mut state = self.state.write().await;
        if !state.links.contains_key(&index) {
            return Err(JackError::NotFound(format!("link index {index}")));
        }
        let entry = state.addrs.entry(index).or_default();
        if !entry.iter().any(|a| a.address == address && a.prefix_len == prefix_len) {
            entry.push(AddrInfo { address, prefix_len });
        }
        Ok(())
    }

    async fn addr_del(&self, index: u32, address: Ipv4Addr, prefix_len: u8) -> Result<()> {
        let mut state = self.state.write().await;
        if let Some(entry) = state.addrs.get_mut(&index) {
            entry.retain(|a| !(a.address == address && a.prefix_len == prefix_len));
        }
        Ok(())
    }

    async fn route_list(&self) -> Result<Vec<RouteInfo>> {
        Ok(self.state.read().await.routes.clone())
    }

    async fn route_add(&self, route: &RouteInfo) -> Result<()> {
        let mut state = self.state.write().await;
        state.routes.push(route.clone());
        Ok(())
    }

    async fn route_del(&self, route: &RouteInfo) -> Result<()> {
        let mut state = self.state.write().await;
        state
            .routes
            .retain(|r| !(r.destination == route.destination && r.oif_index == route.oif_index));
        Ok(())
    }

    async fn neighbor_list(&self, index: u32) -> Result<Vec<NeighborInfo>> {
        let state = self.state.read().await;
        Ok(state.neighbors.iter().filter(|n| n.link_index == index).cloned().collect())
    }
}

/// In-memory `/proc/sys` stand-in, seeded with the handful of keys jack
/// actually reads/writes (`net.ipv4.ip_forward` chiefly).
#[derive(Default)]
pub struct FakeSysctl {
    values: Arc<RwLock<HashMap<String, String>>>,
}

impl FakeSysctl {
    pub fn new() -> Self {
        let mut values = HashMap::new();
        values.insert("net.ipv4.ip_forward".to_string(), "0".to_string());
        FakeSysctl {
            values: Arc::new(RwLock::new(values)),
        }
    }
}

#[async_trait]
impl Sysctl for FakeSysctl {
    async fn read(&self, key: &str) -> Result<String> {
        self.values
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| JackError::NotFound(format!("sysctl key {key}")))
    }

    async fn write(&self, key: &str, value: &str) -> Result<()> {
        self.values
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// In-memory filesystem keyed by path, for config-store and snapshot
/// tests that would otherwise need a real temp directory. Permission
/// bits are tracked alongside content so tests can assert on mode 0600.
#[derive(Default)]
pub struct FakeFilesystem {
    files: Arc<RwLock<HashMap<PathBuf, Vec<u8>>>>,
    modes: Arc<RwLock<HashMap<PathBuf, u32>>>,
}

impl FakeFilesystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn mode_of(&self, path: &Path) -> Option<u32> {
        self.modes.read().await.get(path).copied()
    }
}

#[async_trait]
impl Filesystem for FakeFilesystem {
    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        self.files
            .read()
            .await
            .get(path)
            .cloned()
            .ok_or_else(|| JackError::Io(std::io::Error::new(std::io::ErrorKind::NotFound, path.display().to_string())))
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        self.files
            .write()
            .await
            .insert(path.to_path_buf(), data.to_vec());
        Ok(())
    }

    async fn copy(&self, from: &Path, to: &Path) -> Result<()> {
        let data = self.read(from).await?;
        self.write(to, &data).await
    }

    async fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        let mut files = self.files.write().await;
        let data = files
            .remove(from)
            .ok_or_else(|| JackError::Io(std::io::Error::new(std::io::ErrorKind::NotFound, from.display().to_string())))?;
        files.insert(to.to_path_buf(), data);
        let mut modes = self.modes.write().await;
        if let Some(mode) = modes.remove(from) {
            modes.insert(to.to_path_buf(), mode);
        }
        Ok(())
    }

    async fn remove_file(&self, path: &Path) -> Result<()> {
        self.files.write().await.remove(path);
        self.modes.write().await.remove(path);
        Ok(())
    }

    async fn create_dir_all(&self, _path: &Path) -> Result<()> {
        Ok(())
    }

    async fn exists(&self, path: &Path) -> bool {
        self.files.read().await.contains_key(path)
    }

    async fn set_permissions(&self, path: &Path, mode: u32) -> Result<()> {
        self.modes.write().await.insert(path.to_path_buf(), mode);
        Ok(())
    }

    async fn list_dir(&self, dir: &Path) -> Result<Vec<String>> {
        let files = self.files.read().await;
        Ok(files
            .keys()
            .filter_map(|p| {
                if p.parent() == Some(dir) {
                    p.file_name().map(|n| n.to_string_lossy().into_owned())
                } else {
                    None
                }
            })
            .collect())
    }
}

/// Scripted subprocess fake: tests register a canned `ProcessOutput` per
/// program name and assert on the captured invocations afterward.
#[derive(Default)]
pub struct FakeSubprocess {
    responses: Arc<RwLock<HashMap<String, ProcessOutput>>>,
    calls: Arc<RwLock<Vec<(String, Vec<String>)>>>,
}

impl FakeSubprocess {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_response(&self, program: &str, output: ProcessOutput) {
        self.responses
            .write()
            .await
            .insert(program.to_string(), output);
    }

    pub async fn calls(&self) -> Vec<(String, Vec<String>)> {
        self.calls.read().await.clone()
    }
}

#[async_trait]
impl Subprocess for FakeSubprocess {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        _stdin: Option<&[u8]>,
    ) -> Result<ProcessOutput> {
        self.calls
            .write()
            .await
            .push((program.to_string(), args.to_vec()));
        Ok(self
            .responses
            .read()
            .await
            .get(program)
            .cloned()
            .unwrap_or_default())
    }
}

/// Fixed or steppable clock for deterministic checkpoint/backup naming.
/// Uses a plain `std::sync::RwLock` (not tokio's): `Clock::now` is
/// synchronous, so holding a tokio guard here would panic if ever called
/// from outside a runtime thread.
pub struct FakeClock {
    now: std::sync::RwLock<DateTime<Utc>>,
}

impl Default for FakeClock {
    fn default() -> Self {
        FakeClock {
            now: std::sync::RwLock::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
        }
    }
}

impl FakeClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, seconds: i64) {
        let mut now = self.now.write().unwrap();
        *now += chrono::Duration::seconds(seconds);
    }
}

impl Clock for FakeClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bridge_then_vlan_then_enslave() {
        let nl = FakeNetlink::new();
        let br = nl.link_add_bridge("br-lan").await.unwrap();
        let vlan = nl.link_add_vlan("eth0.10", 1, 10).await.unwrap();
        nl.link_set_master(vlan, br).await.unwrap();
        let links = nl.link_list().await.unwrap();
        let vlan_link = links.iter().find(|l| l.index == vlan).unwrap();
        assert_eq!(vlan_link.master_index, Some(br));
        assert_eq!(vlan_link.vlan_id, Some(10));
    }

    #[tokio::test]
    async fn duplicate_bridge_name_conflicts() {
        let nl = FakeNetlink::new();
        nl.link_add_bridge("br-lan").await.unwrap();
        let err = nl.link_add_bridge("br-lan").await.unwrap_err();
        assert!(matches!(err, JackError::Conflict(_)));
    }

    #[tokio::test]
    async fn sysctl_roundtrip() {
        let sc = FakeSysctl::new();
        assert_eq!(sc.read("net.ipv4.ip_forward").await.unwrap(), "0");
        sc.write("net.ipv4.ip_forward", "1").await.unwrap();
        assert_eq!(sc.read("net.ipv4.ip_forward").await.unwrap(), "1");
    }

    #[tokio::test]
    async fn filesystem_write_then_rename() {
        let fs = FakeFilesystem::new();
        let tmp = PathBuf::from("/etc/jack/interfaces.json.tmp");
        let dest = PathBuf::from("/etc/jack/interfaces.json");
        fs.write(&tmp, b"{}").await.unwrap();
        fs.rename(&tmp, &dest).await.unwrap();
        assert!(fs.exists(&dest).await);
        assert!(!fs.exists(&tmp).await);
    }
}
