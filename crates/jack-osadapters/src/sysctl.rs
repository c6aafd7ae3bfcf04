//! The `Sysctl` capability trait: read/write `/proc/sys` keys addressed
//! dot-separated (`net.ipv4.ip_forward`), the same spelling `sysctl(8)`
//! uses.

use async_trait::async_trait;
use jack_core::Result;
use std::path::PathBuf;

#[async_trait]
pub trait Sysctl: Send + Sync {
    async fn read(&self, key: &str) -> Result<String>;
    async fn write(&self, key: &str, value: &str) -> Result<()>;
}

pub fn proc_path(key: &str) -> PathBuf {
    PathBuf::from("/proc/sys").join(key.replace('.', "/"))
}

pub struct ProcSysctl;

#[async_trait]
impl Sysctl for ProcSysctl {
    async fn read(&self, key: &str) -> Result<String> {
        let contents = tokio::fs::read_to_string(proc_path(key)).await?;
        Ok(contents.trim().to_string())
    }

    async fn write(&self, key: &str, value: &str) -> Result<()> {
        tokio::fs::write(proc_path(key), format!("{value}\n")).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dotted_key_maps_to_proc_path() {
        assert_eq!(
            proc_path("net.ipv4.ip_forward"),
            PathBuf::from("/proc/sys/net/ipv4/ip_forward")
        );
    }
}
