//! Health tainting loop (spec component C10, section 4.8)
//!
//! Polls the discovery port for current device health and reconciles it
//! into the ASR's `tainted` map: an unhealthy device gains a taint
//! reason, a recovered device loses it. Runs under the node's mutex so
//! it never races a concurrent `allocate`/`Prepare`.

use crate::allocation::NodeMutexTable;
use crate::crd::allocation_state::{AllocationState, AllocationStateStatus};
use crate::error::{Error, Result};
use crate::external::discovery::DiscovererRef;
use kube::api::{Api, Patch, PatchParams};
use kube::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const UNHEALTHY_TAINT_REASON: &str = "device-unhealthy";

pub struct HealthMonitor {
    client: Client,
    node_name: String,
    mutex_table: Arc<NodeMutexTable>,
    discoverer: DiscovererRef,
    interval: Duration,
}

impl HealthMonitor {
    pub fn new(
        client: Client,
        node_name: String,
        mutex_table: Arc<NodeMutexTable>,
        discoverer: DiscovererRef,
        interval: Duration,
    ) -> Self {
        Self {
            client,
            node_name,
            mutex_table,
            discoverer,
            interval,
        }
    }

    pub async fn poll_once(&self) -> Result<()> {
        let snapshot = self.discoverer.discover().await?;
        let _guard = self.mutex_table.lock(&self.node_name).await;

        let api: Api<AllocationState> = Api::all(self.client.clone());
        let object = api.get(&self.node_name).await.map_err(|e| match e {
            kube::Error::Api(ae) if ae.code == 404 => Error::AsrNotFound {
                node: self.node_name.clone(),
            },
            other => Error::Kube(other),
        })?;
        let mut record = object.record();

        let mut changed = false;
        for device in &snapshot.devices {
            let currently_tainted = record.is_tainted(&device.uid);
            if !device.health.healthy && !currently_tainted {
                record
                    .tainted
                    .entry(device.uid.clone())
                    .or_default()
                    .reasons
                    .insert(UNHEALTHY_TAINT_REASON.to_string());
                changed = true;
                info!(node = %self.node_name, device = %device.uid, "tainting unhealthy device");
            } else if device.health.healthy && currently_tainted {
                if let Some(taint) = record.tainted.get_mut(&device.uid) {
                    taint.reasons.remove(UNHEALTHY_TAINT_REASON);
                    if taint.reasons.is_empty() {
                        record.tainted.remove(&device.uid);
                        changed = true;
                        info!(node = %self.node_name, device = %device.uid, "clearing recovered device taint");
                    }
                }
            }
        }

        if !changed {
            return Ok(());
        }

        record.bump_generation();
        let status = AllocationStateStatus::from_record(&record);
        let patch = serde_json::json!({ "status": status });
        api.patch_status(&self.node_name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| match e {
                kube::Error::Api(ae) if ae.code == 409 => Error::Conflict {
                    node: self.node_name.clone(),
                },
                other => Error::Kube(other),
            })?;
        Ok(())
    }

    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = ticker.tick() => {
                    if let Err(e) = self.poll_once().await {
                        warn!(node = %self.node_name, error = %e, "health poll failed");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::device::Taint;

    #[test]
    fn unhealthy_taint_reason_is_stable() {
        assert_eq!(UNHEALTHY_TAINT_REASON, "device-unhealthy");
    }

    #[test]
    fn taint_removal_clears_empty_entry() {
        let mut taint = Taint::default();
        taint.reasons.insert(UNHEALTHY_TAINT_REASON.to_string());
        taint.reasons.remove(UNHEALTHY_TAINT_REASON);
        assert!(taint.is_empty());
    }
}
