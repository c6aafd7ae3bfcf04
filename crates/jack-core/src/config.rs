//! Environment-driven process configuration.
//!
//! jack reads a small, fixed set of environment variables rather than a
//! config file of its own (the daemon's *managed* configuration lives in
//! `jack-config-store` namespaces instead). This module is the single
//! place that knows the variable names and their defaults.

/// `JACK_CONFIG_DIR` — base directory for namespace JSON files.
pub const ENV_CONFIG_DIR: &str = "JACK_CONFIG_DIR";
pub const DEFAULT_CONFIG_DIR: &str = "/etc/jack";

/// `JACK_SOCKET_PATH` — control-server stream socket.
pub const ENV_SOCKET_PATH: &str = "JACK_SOCKET_PATH";
pub const DEFAULT_SOCKET_PATH: &str = "/var/run/jack.sock";

/// `JACK_PLUGIN_DIR` — directory scanned for `jack-plugin-<name>` binaries.
pub const ENV_PLUGIN_DIR: &str = "JACK_PLUGIN_DIR";
pub const DEFAULT_PLUGIN_DIR: &str = "/usr/lib/jack/plugins";

/// `JACK_DEBUG` — enables debug-level logging regardless of `RUST_LOG`.
pub const ENV_DEBUG: &str = "JACK_DEBUG";

/// Get a configuration value with a default.
pub fn get_config(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Get an optional configuration value (empty string treated as unset).
pub fn get_config_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Get a boolean configuration value.
pub fn get_config_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes" | "on"))
        .unwrap_or(default)
}

pub fn config_dir() -> String {
    get_config(ENV_CONFIG_DIR, DEFAULT_CONFIG_DIR)
}

pub fn socket_path() -> String {
    get_config(ENV_SOCKET_PATH, DEFAULT_SOCKET_PATH)
}

pub fn plugin_dirs() -> Vec<String> {
    let mut dirs = vec![get_config(ENV_PLUGIN_DIR, DEFAULT_PLUGIN_DIR)];
    dirs.push("./bin".to_string());
    dirs.push("/opt/jack/plugins".to_string());
    dirs
}

pub fn debug_enabled() -> bool {
    get_config_bool(ENV_DEBUG, false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Serialize env-var tests: std::env is process-global state.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn default_when_unset() {
        let _g = ENV_LOCK.lock().unwrap();
        std::env::remove_var("JACK_TEST_KEY_UNSET");
        assert_eq!(get_config("JACK_TEST_KEY_UNSET", "fallback"), "fallback");
    }

    #[test]
    fn bool_parsing() {
        let _g = ENV_LOCK.lock().unwrap();
        std::env::set_var("JACK_TEST_BOOL", "yes");
        assert!(get_config_bool("JACK_TEST_BOOL", false));
        std::env::set_var("JACK_TEST_BOOL", "0");
        assert!(!get_config_bool("JACK_TEST_BOOL", true));
        std::env::remove_var("JACK_TEST_BOOL");
    }
}
