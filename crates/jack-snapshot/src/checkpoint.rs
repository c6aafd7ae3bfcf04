//! The checkpoint ring: snapshots persisted as JSON under a directory,
//! retained as "N most recent auto + unbounded manual" and replayable via
//! `RollbackTo`. Grounded on the teacher's `DisasterRecoveryExport`
//! export/import shape (`op-state-store/src/disaster_recovery.rs`),
//! narrowed from a whole-system export to one checkpoint per file and
//! given a retention policy the teacher's one-shot export never needed.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::TimeZone;
use jack_core::{JackError, Result};
use jack_osadapters::{Clock, Filesystem};
use uuid::Uuid;

use crate::model::{CheckpointInfo, CheckpointKind, SystemSnapshot};

pub const DEFAULT_MAX_AUTO_CHECKPOINTS: usize = 10;

pub struct CheckpointRing {
    filesystem: Arc<dyn Filesystem>,
    clock: Arc<dyn Clock>,
    dir: PathBuf,
    max_auto: usize,
}

impl CheckpointRing {
    pub fn new(filesystem: Arc<dyn Filesystem>, clock: Arc<dyn Clock>, dir: PathBuf) -> Self {
        CheckpointRing {
            filesystem,
            clock,
            dir,
            max_auto: DEFAULT_MAX_AUTO_CHECKPOINTS,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn new_id(&self, kind: CheckpointKind) -> String {
        let epoch = self.clock.now().timestamp();
        let suffix = Uuid::new_v4().simple().to_string();
        format!("{}-{epoch}-{}", kind.as_str(), &suffix[..8])
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    /// Persist `snapshot` (already captured by the caller) and prune old
    /// auto checkpoints beyond retention. Returns the assigned id.
    pub async fn save(&self, mut snapshot: SystemSnapshot, kind: CheckpointKind) -> Result<String> {
        self.filesystem.create_dir_all(&self.dir).await?;
        let id = self.new_id(kind);
        snapshot.id = id.clone();
        snapshot.kind = kind;

        let body = serde_json::to_vec_pretty(&snapshot)?;
        let tmp = self.dir.join(format!("{id}.json.tmp"));
        self.filesystem.write(&tmp, &body).await?;
        self.filesystem.set_permissions(&tmp, 0o600).await?;
        self.filesystem.rename(&tmp, &self.path_for(&id)).await?;

        if kind == CheckpointKind::Auto {
            self.prune_auto().await?;
        }
        Ok(id)
    }

    pub async fn load(&self, id: &str) -> Result<SystemSnapshot> {
        let body = self.filesystem.read(&self.path_for(id)).await?;
        serde_json::from_slice(&body).map_err(JackError::from)
    }

    pub async fn list(&self) -> Result<Vec<CheckpointInfo>> {
        let mut entries = self.parse_entries().await?;
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(entries)
    }

    async fn prune_auto(&self) -> Result<()> {
        let mut autos: Vec<CheckpointInfo> = self
            .parse_entries()
            .await?
            .into_iter()
            .filter(|c| c.kind == CheckpointKind::Auto)
            .collect();
        autos.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        for stale in autos.into_iter().skip(self.max_auto) {
            self.filesystem.remove_file(&self.path_for(&stale.id)).await?;
        }
        Ok(())
    }

    async fn parse_entries(&self) -> Result<Vec<CheckpointInfo>> {
        let names = match self.filesystem.list_dir(&self.dir).await {
            Ok(names) => names,
            Err(_) => return Ok(Vec::new()),
        };
        let mut out = Vec::new();
        for name in names {
            let Some(stem) = name.strip_suffix(".json") else {
                continue;
            };
            if let Some(info) = parse_id(stem) {
                out.push(info);
            }
        }
        Ok(out)
    }
}

/// Recover `(kind, created_at)` from an id of the form `kind-epoch-suffix`
/// without reading the file, so listing stays cheap.
fn parse_id(id: &str) -> Option<CheckpointInfo> {
    let mut parts = id.splitn(3, '-');
    let kind_str = parts.next()?;
    let epoch_str = parts.next()?;
    let kind = match kind_str {
        "auto" => CheckpointKind::Auto,
        "manual" => CheckpointKind::Manual,
        _ => return None,
    };
    let epoch: i64 = epoch_str.parse().ok()?;
    let created_at = chrono::Utc.timestamp_opt(epoch, 0).single()?;
    Some(CheckpointInfo {
        id: id.to_string(),
        kind,
        created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use jack_osadapters::fake::{FakeClock, FakeFilesystem};

    fn ring(clock: Arc<FakeClock>) -> CheckpointRing {
        CheckpointRing::new(Arc::new(FakeFilesystem::new()), clock, PathBuf::from("/var/lib/jack/checkpoints"))
    }

    fn blank(kind: CheckpointKind) -> SystemSnapshot {
        SystemSnapshot {
            id: String::new(),
            kind,
            created_at: chrono::Utc::now(),
            ip_forward: false,
            interfaces: vec![],
            routes: vec![],
            nftables: None,
        }
    }

    #[tokio::test]
    async fn save_then_load_roundtrips() {
        let clock = Arc::new(FakeClock::new());
        let ring = ring(clock);
        let id = ring.save(blank(CheckpointKind::Manual), CheckpointKind::Manual).await.unwrap();
        let loaded = ring.load(&id).await.unwrap();
        assert_eq!(loaded.id, id);
        assert_eq!(loaded.kind, CheckpointKind::Manual);
    }

    #[tokio::test]
    async fn retains_only_most_recent_auto_checkpoints() {
        let clock = Arc::new(FakeClock::new());
        let ring = ring(clock.clone());
        for _ in 0..(DEFAULT_MAX_AUTO_CHECKPOINTS + 3) {
            ring.save(blank(CheckpointKind::Auto), CheckpointKind::Auto).await.unwrap();
            clock.advance(1);
        }
        let listed = ring.list().await.unwrap();
        let autos: Vec<_> = listed.iter().filter(|c| c.kind == CheckpointKind::Auto).collect();
        assert_eq!(autos.len(), DEFAULT_MAX_AUTO_CHECKPOINTS);
    }

    #[tokio::test]
    async fn manual_checkpoints_are_never_pruned() {
        let clock = Arc::new(FakeClock::new());
        let ring = ring(clock.clone());
        for _ in 0..(DEFAULT_MAX_AUTO_CHECKPOINTS + 5) {
            ring.save(blank(CheckpointKind::Manual), CheckpointKind::Manual).await.unwrap();
            clock.advance(1);
        }
        let listed = ring.list().await.unwrap();
        assert_eq!(listed.len(), DEFAULT_MAX_AUTO_CHECKPOINTS + 5);
    }
}
