//! Plugin binary discovery: scan `jack_core::config::plugin_dirs()` for
//! executable regular files named `jack-plugin-<name>`. First match
//! across the directory list wins, so an override directory placed
//! earlier in `plugin_dirs()` shadows the system install.

use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;

use jack_core::config::plugin_dirs;

const PLUGIN_PREFIX: &str = "jack-plugin-";

#[derive(Debug, Clone)]
pub struct DiscoveredPlugin {
    pub name: String,
    pub path: PathBuf,
}

fn is_executable_file(path: &std::path::Path) -> bool {
    let Ok(meta) = std::fs::metadata(path) else { return false };
    meta.is_file() && meta.permissions().mode() & 0o111 != 0
}

/// Scan every configured plugin directory, returning one entry per
/// distinct plugin name in first-match order.
pub fn discover_plugins() -> Vec<DiscoveredPlugin> {
    let mut found = Vec::new();
    let mut seen = std::collections::HashSet::new();

    for dir in plugin_dirs() {
        let Ok(entries) = std::fs::read_dir(&dir) else { continue };
        let mut names: Vec<_> = entries.filter_map(|e| e.ok()).collect();
        names.sort_by_key(|e| e.file_name());
        for entry in names {
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else { continue };
            let Some(name) = file_name.strip_prefix(PLUGIN_PREFIX) else { continue };
            if name.is_empty() || seen.contains(name) {
                continue;
            }
            let path = entry.path();
            if !is_executable_file(&path) {
                continue;
            }
            seen.insert(name.to_string());
            found.push(DiscoveredPlugin { name: name.to_string(), path });
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;
    use std::sync::Mutex;

    // JACK_PLUGIN_DIR is process-global; serialize tests that touch it.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn write_executable(dir: &std::path::Path, name: &str) {
        let path = dir.join(name);
        let mut f = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .mode(0o755)
            .open(&path)
            .unwrap();
        f.write_all(b"#!/bin/sh\n").unwrap();
    }

    #[test]
    fn finds_executables_with_matching_prefix_and_skips_others() {
        let _g = ENV_LOCK.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        write_executable(dir.path(), "jack-plugin-dhcp");
        write_executable(dir.path(), "not-a-plugin");
        std::env::set_var("JACK_PLUGIN_DIR", dir.path());

        let found = discover_plugins();
        std::env::remove_var("JACK_PLUGIN_DIR");

        assert!(found.iter().any(|p| p.name == "dhcp"));
        assert!(!found.iter().any(|p| p.name.contains("not-a-plugin")));
    }

    #[test]
    fn non_executable_file_is_ignored() {
        let _g = ENV_LOCK.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("jack-plugin-noexec"), b"nope").unwrap();
        std::env::set_var("JACK_PLUGIN_DIR", dir.path());

        let found = discover_plugins();
        std::env::remove_var("JACK_PLUGIN_DIR");

        assert!(!found.iter().any(|p| p.name == "noexec"));
    }
}
