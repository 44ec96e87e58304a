//! ResourceSlice publication (spec component C10, section 4.7)
//!
//! Periodically mirrors the node's `AllocationState.status.allocatable`
//! and taints into an `AccelResourceSlice` object so the scheduler can
//! pre-filter nodes without a synchronous call into the driver.

use crate::crd::allocation_state::AllocationState;
use crate::crd::resource_slice::{AccelResourceSlice, AccelResourceSliceSpec};
use crate::error::{Error, Result};
use kube::api::{Api, Patch, PatchParams};
use kube::Client;
use std::time::Duration;
use tracing::{debug, warn};
use tokio_util::sync::CancellationToken;

pub struct ResourceSlicePublisher {
    client: Client,
    node_name: String,
    driver_name: String,
    interval: Duration,
}

impl ResourceSlicePublisher {
    pub fn new(client: Client, node_name: String, driver_name: String, interval: Duration) -> Self {
        Self {
            client,
            node_name,
            driver_name,
            interval,
        }
    }

    pub async fn publish_once(&self) -> Result<()> {
        let asr_api: Api<AllocationState> = Api::all(self.client.clone());
        let object = asr_api.get(&self.node_name).await.map_err(|e| match e {
            kube::Error::Api(ae) if ae.code == 404 => Error::AsrNotFound {
                node: self.node_name.clone(),
            },
            other => Error::Kube(other),
        })?;
        let record = object.record();

        let spec = AccelResourceSliceSpec {
            node_name: self.node_name.clone(),
            driver_name: self.driver_name.clone(),
            devices: record.allocatable.values().cloned().collect(),
            tainted: record.tainted.clone(),
            generation: record.generation,
        };

        let slice_api: Api<AccelResourceSlice> = Api::all(self.client.clone());
        let patch = serde_json::json!({
            "apiVersion": "gpu.accel-fabric.io/v1alpha1",
            "kind": "AccelResourceSlice",
            "metadata": { "name": self.node_name },
            "spec": spec,
        });
        slice_api
            .patch(
                &self.node_name,
                &PatchParams::apply("accel-fabric-node-plugin").force(),
                &Patch::Apply(&patch),
            )
            .await
            .map_err(Error::Kube)?;

        debug!(node = %self.node_name, generation = record.generation, "republished resource slice");
        Ok(())
    }

    /// Runs until `cancel` fires; errors are logged and swallowed so a
    /// single failed publish doesn't take the node plugin down.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = ticker.tick() => {
                    if let Err(e) = self.publish_once().await {
                        warn!(node = %self.node_name, error = %e, "resource slice publish failed");
                    }
                }
            }
        }
    }
}
