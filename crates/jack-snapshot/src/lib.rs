//! Kernel-state snapshot capture/restore and the checkpoint ring.
//! `SnapshotManager` is the single entry point the apply orchestrator and
//! the control server use; `capture`/`restore`/`checkpoint` hold the
//! actual logic.

pub mod capture;
pub mod checkpoint;
pub mod model;
pub mod restore;

use std::path::PathBuf;
use std::sync::Arc;

use jack_core::Result;
use jack_osadapters::OsAdapters;

pub use checkpoint::{CheckpointRing, DEFAULT_MAX_AUTO_CHECKPOINTS};
pub use model::{
    CheckpointInfo, CheckpointKind, InterfaceSnapshot, RestoreReport, RestoreScope, RouteSnapshot,
    SystemSnapshot, VlanSnapshot,
};

const NFT_RESTORE_ARGS: &[&str] = &["-j", "-f", "-"];

pub struct SnapshotManager {
    adapters: Arc<OsAdapters>,
    ring: CheckpointRing,
}

impl SnapshotManager {
    pub fn new(adapters: Arc<OsAdapters>, checkpoint_dir: PathBuf) -> Self {
        let ring = CheckpointRing::new(
            adapters.filesystem.clone(),
            adapters.clock.clone(),
            checkpoint_dir,
        );
        SnapshotManager { adapters, ring }
    }

    pub async fn capture(&self) -> Result<SystemSnapshot> {
        capture::capture_system_snapshot(
            &self.adapters,
            String::new(),
            CheckpointKind::Manual,
            self.adapters.clock.now(),
        )
        .await
    }

    pub async fn restore(&self, snapshot: &SystemSnapshot, scope: &RestoreScope) -> Result<RestoreReport> {
        restore::restore_snapshot(&self.adapters, snapshot, scope).await
    }

    /// Captures the current state and persists it as the given kind,
    /// pruning old auto checkpoints beyond retention. Used before every
    /// apply (`kind = Auto`) and on explicit checkpoint requests
    /// (`kind = Manual`).
    pub async fn checkpoint(&self, kind: CheckpointKind) -> Result<String> {
        let snapshot = capture::capture_system_snapshot(
            &self.adapters,
            String::new(),
            kind,
            self.adapters.clock.now(),
        )
        .await?;
        self.ring.save(snapshot, kind).await
    }

    pub async fn list_checkpoints(&self) -> Result<Vec<CheckpointInfo>> {
        self.ring.list().await
    }

    /// Loads checkpoint `id`, restores with scope `all`, and replays the
    /// captured nftables blob (best-effort — a failure there is folded
    /// into the returned report, not propagated).
    pub async fn rollback_to(&self, id: &str) -> Result<RestoreReport> {
        let snapshot = self.ring.load(id).await?;
        let mut report = restore::restore_snapshot(&self.adapters, &snapshot, &RestoreScope::all()).await?;

        if let Some(blob) = &snapshot.nftables {
            let args: Vec<String> = NFT_RESTORE_ARGS.iter().map(|s| s.to_string()).collect();
            match self.adapters.subprocess.run("nft", &args, Some(blob.as_bytes())).await {
                Ok(output) if output.success() => {}
                Ok(output) => report.errors.push(format!("nft restore failed: {}", output.stderr)),
                Err(e) => report.errors.push(format!("nft restore: {e}")),
            }
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jack_osadapters::fake::{FakeClock, FakeFilesystem, FakeNetlink, FakeSubprocess, FakeSysctl};

    fn manager() -> (SnapshotManager, Arc<FakeClock>) {
        let clock = Arc::new(FakeClock::new());
        let adapters = Arc::new(OsAdapters {
            netlink: Arc::new(FakeNetlink::new()),
            sysctl: Arc::new(FakeSysctl::new()),
            filesystem: Arc::new(FakeFilesystem::new()),
            subprocess: Arc::new(FakeSubprocess::new()),
            clock: clock.clone(),
        });
        (SnapshotManager::new(adapters, PathBuf::from("/var/lib/jack/checkpoints")), clock)
    }

    #[tokio::test]
    async fn checkpoint_then_rollback_restores_ip_forward() {
        let (mgr, _clock) = manager();
        mgr.adapters.sysctl.write("net.ipv4.ip_forward", "1").await.unwrap();
        let id = mgr.checkpoint(CheckpointKind::Manual).await.unwrap();

        mgr.adapters.sysctl.write("net.ipv4.ip_forward", "0").await.unwrap();
        let report = mgr.rollback_to(&id).await.unwrap();
        assert!(report.errors.is_empty());
        assert_eq!(mgr.adapters.sysctl.read("net.ipv4.ip_forward").await.unwrap(), "1");
    }

    #[tokio::test]
    async fn list_checkpoints_returns_newest_first() {
        let (mgr, clock) = manager();
        let first = mgr.checkpoint(CheckpointKind::Manual).await.unwrap();
        clock.advance(1);
        let second = mgr.checkpoint(CheckpointKind::Manual).await.unwrap();
        let listed = mgr.list_checkpoints().await.unwrap();
        assert_eq!(listed.first().unwrap().id, second);
        assert!(listed.iter().any(|c| c.id == first));
    }
}
