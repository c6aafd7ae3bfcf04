//! Command dispatch: turns one [`Request`] into one [`Response`],
//! routing to the transaction manager, the apply orchestrator, the
//! snapshot manager, or the plugin registry per spec.md §4.8's command
//! table. Stateful commands serialize on whatever lock the target
//! component already holds (the transaction lock for `get`/`set`/
//! `diff`/`commit`/`revert`, the apply mutex for `apply`); this module
//! adds no locking of its own.

use std::sync::Arc;

use serde_json::json;

use jack_apply::ApplyOrchestrator;
use jack_core::{JackError, Value as JackValue};
use jack_plugins::PluginRegistry;
use jack_snapshot::{CheckpointKind, SnapshotManager};
use jack_txn::TxnManager;

use crate::protocol::{Request, Response};

pub struct Handlers {
    pub txn: Arc<TxnManager>,
    pub apply: Arc<ApplyOrchestrator>,
    pub snapshot: Arc<SnapshotManager>,
    pub plugins: Arc<PluginRegistry>,
}

impl Handlers {
    pub async fn dispatch(&self, request: Request) -> Response {
        match request.command.as_str() {
            "get" => self.handle_get(request).await,
            "set" => self.handle_set(request).await,
            "diff" => self.handle_diff().await,
            "commit" => self.handle_commit().await,
            "revert" => self.handle_revert().await,
            "apply" => self.handle_apply().await,
            "info" => self.handle_info().await,
            "checkpoint-list" => self.handle_checkpoint_list().await,
            "checkpoint-create" => self.handle_checkpoint_create().await,
            "rollback" => self.handle_rollback(request).await,
            "plugin-enable" => self.handle_plugin_enable(request).await,
            "plugin-disable" => self.handle_plugin_disable(request).await,
            "plugin-rescan" => self.handle_plugin_rescan().await,
            "plugin-cli" => self.handle_plugin_cli(request).await,
            other => Response::err(format!("unknown command: {other}")),
        }
    }

    async fn handle_get(&self, request: Request) -> Response {
        let path = request.path.unwrap_or_default();
        match self.txn.get(&path).await {
            Ok(value) => Response::ok_with_data(value.to_json()),
            Err(e) => Response::from_error(&e),
        }
    }

    async fn handle_set(&self, request: Request) -> Response {
        let (Some(path), Some(value)) = (request.path, request.value) else {
            return Response::err("validation-error: set requires path and value");
        };
        match self.txn.set(&path, JackValue::from_json(value)).await {
            Ok(()) => Response::ok(),
            Err(e) => Response::from_error(&e),
        }
    }

    async fn handle_diff(&self) -> Response {
        let changes = self.txn.diff().await;
        let data = json!(changes
            .into_iter()
            .map(|c| json!({ "path": c.path, "old": c.old, "new": c.new }))
            .collect::<Vec<_>>());
        Response::ok_with_data(data)
    }

    async fn handle_commit(&self) -> Response {
        match self.txn.commit().await {
            Ok(()) => Response::ok(),
            Err(e) => Response::from_error(&e),
        }
    }

    async fn handle_revert(&self) -> Response {
        match self.txn.revert().await {
            Ok(()) => Response::ok(),
            Err(e) => Response::from_error(&e),
        }
    }

    async fn handle_apply(&self) -> Response {
        match self.apply.apply().await {
            Ok(()) => Response::ok_with_message("apply succeeded"),
            Err(e) => Response::from_error(&e),
        }
    }

    async fn handle_info(&self) -> Response {
        let namespaces = self.txn.list_namespaces().await;
        let plugins = self.plugins.list().await;
        let data = json!({
            "version": env!("CARGO_PKG_VERSION"),
            "namespaces": namespaces,
            "plugins": plugins.iter().map(|p| &p.namespace).collect::<Vec<_>>(),
        });
        Response::ok_with_data(data)
    }

    async fn handle_checkpoint_list(&self) -> Response {
        match self.snapshot.list_checkpoints().await {
            Ok(checkpoints) => {
                let data = json!(checkpoints
                    .into_iter()
                    .map(|c| json!({
                        "checkpoint_id": c.id,
                        "timestamp": c.created_at.to_rfc3339(),
                        "trigger": c.kind.as_str(),
                    }))
                    .collect::<Vec<_>>());
                Response::ok_with_data(data)
            }
            Err(e) => Response::from_error(&e),
        }
    }

    async fn handle_checkpoint_create(&self) -> Response {
        match self.snapshot.checkpoint(CheckpointKind::Manual).await {
            Ok(id) => Response::ok_with_data(json!({ "checkpoint_id": id })),
            Err(e) => Response::from_error(&e),
        }
    }

    async fn handle_rollback(&self, request: Request) -> Response {
        let Some(id) = request.checkpoint_id else {
            return Response::err("validation-error: rollback requires checkpoint_id");
        };
        match self.snapshot.rollback_to(&id).await {
            Ok(report) if report.is_clean() => Response::ok_with_message("rollback restored"),
            Ok(report) => Response::ok_with_data(json!({
                "errors": report.errors,
                "manual_intervention": report.manual_intervention,
            })),
            Err(e) => Response::from_error(&e),
        }
    }

    async fn handle_plugin_enable(&self, request: Request) -> Response {
        let Some(namespace) = request.plugin else {
            return Response::err("validation-error: plugin-enable requires plugin");
        };
        match self.plugins.enable(&namespace).await {
            Ok(()) => Response::ok(),
            Err(e) => Response::from_error(&e),
        }
    }

    async fn handle_plugin_disable(&self, request: Request) -> Response {
        let Some(namespace) = request.plugin else {
            return Response::err("validation-error: plugin-disable requires plugin");
        };
        match self.plugins.disable(&namespace).await {
            Ok(()) => Response::ok(),
            Err(e) => Response::from_error(&e),
        }
    }

    async fn handle_plugin_rescan(&self) -> Response {
        let discovered = self.plugins.discover_and_register().await;
        Response::ok_with_data(json!({ "discovered": discovered }))
    }

    async fn handle_plugin_cli(&self, request: Request) -> Response {
        let Some(command) = request.cli_command else {
            return Response::err("validation-error: plugin-cli requires cli_command");
        };
        let args = request.cli_args.unwrap_or_default();

        let namespace = match request.plugin {
            Some(p) => p,
            None => match self.plugins.find_cli_owner(&command).await {
                Some((namespace, _)) => namespace,
                None => return Response::from_error(&JackError::NotFound(format!("cli command {command}"))),
            },
        };

        match self.plugins.execute_cli_command(&namespace, &command, args).await {
            Ok(value) => Response::ok_with_data(value.to_json()),
            Err(e) => Response::from_error(&e),
        }
    }
}
