//! Control-socket server: the one network-facing surface jackd exposes
//! to `jackctl` (or any other client), dispatching spec.md §4.8's
//! command set onto the transaction manager, apply orchestrator,
//! snapshot manager, and plugin registry.

pub mod dispatch;
pub mod framing;
pub mod protocol;
pub mod server;

pub use dispatch::Handlers;
pub use protocol::{Request, Response};
pub use server::ControlServer;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use tokio::net::UnixStream;

    use jack_apply::ApplyOrchestrator;
    use jack_config_store::ConfigStore;
    use jack_logger::{JackLogger, Level};
    use jack_network::NetworkManager;
    use jack_osadapters::OsAdapters;
    use jack_plugins::PluginRegistry;
    use jack_snapshot::SnapshotManager;
    use jack_txn::TxnManager;

    use crate::framing::{read_json, write_json};

    fn leak_logger() -> &'static JackLogger {
        Box::leak(Box::new(JackLogger::new("test", Level::Debug, vec![])))
    }

    async fn spawn_server() -> std::path::PathBuf {
        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("jack.sock");
        // Keep the tempdir alive for the process lifetime of this test
        // by leaking it; it's a throwaway path under the OS temp dir.
        std::mem::forget(dir);

        let adapters = Arc::new(OsAdapters::fake());
        let config_store = Arc::new(ConfigStore::new(adapters.filesystem.clone(), adapters.clock.clone()));
        let txn = Arc::new(TxnManager::new(config_store));
        let network = Arc::new(NetworkManager::new(adapters.clone()));
        let checkpoint_dir = std::env::temp_dir().join(format!("jack-control-test-{}", rand_suffix()));
        let snapshot = Arc::new(SnapshotManager::new(adapters.clone(), checkpoint_dir));
        let plugins = Arc::new(PluginRegistry::new(std::env::temp_dir().join("jack-control-test-reverse")));
        let apply = Arc::new(ApplyOrchestrator::new(txn.clone(), network, snapshot.clone(), plugins.clone()));

        let handlers = Arc::new(Handlers { txn, apply, snapshot, plugins });
        let logger = leak_logger();
        let server = ControlServer::new(socket_path.clone(), handlers, logger);
        tokio::spawn(async move {
            let _ = server.run().await;
        });
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        socket_path
    }

    fn rand_suffix() -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .subsec_nanos() as u64
    }

    async fn roundtrip(socket_path: &std::path::Path, request: Request) -> Response {
        let mut stream = UnixStream::connect(socket_path).await.unwrap();
        write_json(&mut stream, &request).await.unwrap();
        read_json(&mut stream).await.unwrap()
    }

    #[tokio::test]
    async fn unknown_command_is_rejected() {
        let socket_path = spawn_server().await;
        let response = roundtrip(
            &socket_path,
            Request { command: "bogus".into(), path: None, value: None, plugin: None, cli_command: None, cli_args: None, checkpoint_id: None },
        )
        .await;
        assert!(!response.success);
        assert!(response.error.unwrap().contains("unknown command"));
    }

    #[tokio::test]
    async fn set_then_get_round_trips_through_the_socket() {
        let socket_path = spawn_server().await;
        let set_request = Request {
            command: "set".into(),
            path: Some("interfaces.eth0.type".into()),
            value: Some(serde_json::json!("physical")),
            plugin: None,
            cli_command: None,
            cli_args: None,
            checkpoint_id: None,
        };
        let set_response = roundtrip(&socket_path, set_request).await;
        assert!(set_response.success);

        let get_request = Request {
            command: "get".into(),
            path: Some("interfaces.eth0.type".into()),
            value: None,
            plugin: None,
            cli_command: None,
            cli_args: None,
            checkpoint_id: None,
        };
        let get_response = roundtrip(&socket_path, get_request).await;
        assert!(get_response.success);
        assert_eq!(get_response.data, Some(serde_json::json!("physical")));
    }

    #[tokio::test]
    async fn commit_with_no_pending_changes_succeeds() {
        let socket_path = spawn_server().await;
        let response = roundtrip(
            &socket_path,
            Request { command: "commit".into(), path: None, value: None, plugin: None, cli_command: None, cli_args: None, checkpoint_id: None },
        )
        .await;
        assert!(response.success);
    }
}
