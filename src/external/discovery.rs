//! Discovery port (C1): enumerates the accelerator inventory on the local
//! node. Out of scope for this driver's implementation (spec Non-goals);
//! the port exists so the node plugin can be driven by a real enumerator
//! without the rest of the driver depending on sysfs/NVML/etc.

use crate::domain::device::DeviceInfo;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Snapshot of a node's accelerator inventory, as produced by one
/// discovery pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoverySnapshot {
    pub devices: Vec<DeviceInfo>,
}

#[async_trait]
pub trait Discoverer: Send + Sync {
    /// Enumerate all accelerators currently visible on the local node.
    async fn discover(&self) -> Result<DiscoverySnapshot>;
}

pub type DiscovererRef = Arc<dyn Discoverer>;

/// Fixed-inventory discoverer for tests and for environments where the
/// device set is provisioned out of band (e.g. fixed VM passthrough).
pub struct StaticDiscoverer {
    snapshot: DiscoverySnapshot,
}

impl StaticDiscoverer {
    pub fn new(devices: Vec<DeviceInfo>) -> Self {
        Self {
            snapshot: DiscoverySnapshot { devices },
        }
    }
}

#[async_trait]
impl Discoverer for StaticDiscoverer {
    async fn discover(&self) -> Result<DiscoverySnapshot> {
        Ok(self.snapshot.clone())
    }
}
