//! Plugin host: subprocess discovery, the stdio + reverse-channel
//! handshakes, length-prefixed JSON-RPC framing, and the registry that
//! ties a running plugin's namespace into the rest of the daemon.

pub mod discovery;
pub mod handshake;
pub mod process;
pub mod registry;
pub mod reverse;
pub mod rpc;
pub mod wire;

pub use discovery::{discover_plugins, DiscoveredPlugin};
pub use process::PluginProcess;
pub use registry::{PluginRegistry, RegisteredPlugin};
pub use reverse::ServiceRouter;
pub use rpc::{CliCommand, LogEvent, PluginMetadata, PluginStatus, ServiceDescriptor};
