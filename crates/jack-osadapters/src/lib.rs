//! Capability traits over everything jack touches outside its own
//! process: netlink, `/proc/sys`, the filesystem, subprocesses and the
//! clock. Every other jack crate takes an `OsAdapters` bundle instead of
//! calling the kernel directly, so the transaction manager, the network
//! reconciler, the snapshot ring and the plugin host can all be tested
//! against the `fake` implementations without root.

pub mod clock;
pub mod fake;
pub mod filesystem;
pub mod netlink;
pub mod subprocess;
pub mod sysctl;
pub mod types;

pub use clock::{Clock, SystemClock};
pub use filesystem::{Filesystem, RealFilesystem};
pub use netlink::{Netlink, RtNetlink};
pub use subprocess::{ProcessOutput, RealSubprocess, Subprocess};
pub use sysctl::{ProcSysctl, Sysctl};
pub use types::{AddrInfo, LinkInfo, NeighborInfo, RouteInfo, RouteProtocol, RouteScope};

use std::sync::Arc;

/// The bundle every higher-level crate depends on instead of the
/// individual traits, mirroring how the teacher threads a single
/// `PluginContext` through its registry rather than separate handles.
#[derive(Clone)]
pub struct OsAdapters {
    pub netlink: Arc<dyn Netlink>,
    pub sysctl: Arc<dyn Sysctl>,
    pub filesystem: Arc<dyn Filesystem>,
    pub subprocess: Arc<dyn Subprocess>,
    pub clock: Arc<dyn Clock>,
}

impl OsAdapters {
    pub fn real() -> jack_core::Result<Self> {
        Ok(OsAdapters {
            netlink: Arc::new(RtNetlink::new()?),
            sysctl: Arc::new(ProcSysctl),
            filesystem: Arc::new(RealFilesystem),
            subprocess: Arc::new(RealSubprocess),
            clock: Arc::new(SystemClock),
        })
    }

    pub fn fake() -> Self {
        OsAdapters {
            netlink: Arc::new(fake::FakeNetlink::new()),
            sysctl: Arc::new(fake::FakeSysctl::new()),
            filesystem: Arc::new(fake::FakeFilesystem::new()),
            subprocess: Arc::new(fake::FakeSubprocess::new()),
            clock: Arc::new(fake::FakeClock::new()),
        }
    }
}
