//! Prepare / Unprepare (spec component C10, section 4.6)
//!
//! The node plugin's half of the allocation pipeline: turn a committed
//! `AllocatedClaim` into CDI device handles the kubelet injects into the
//! claiming pod's containers, materializing any still-placeholder VFs
//! along the way.

use crate::allocation::vf_carving;
use crate::allocation::NodeMutexTable;
use crate::crd::allocation_state::{AllocationState, AllocationStateStatus};
use crate::domain::device::{Capacity, Health};
use crate::error::{Error, Result};
use crate::external::injection_registry::{InjectionKey, InjectionRegistryRef};
use crate::nodeplugin::claim_preparation::{ClaimPreparation, ClaimPreparationStore, PreparedDeviceRef};
use kube::api::{Api, Patch, PatchParams};
use kube::Client;
use std::sync::Arc;
use tracing::info;

pub struct PrepareEngine {
    client: Client,
    node_name: String,
    mutex_table: Arc<NodeMutexTable>,
    injection_registry: InjectionRegistryRef,
    preparations: ClaimPreparationStore,
}

impl PrepareEngine {
    pub fn new(
        client: Client,
        node_name: String,
        mutex_table: Arc<NodeMutexTable>,
        injection_registry: InjectionRegistryRef,
        preparations: ClaimPreparationStore,
    ) -> Self {
        Self {
            client,
            node_name,
            mutex_table,
            injection_registry,
            preparations,
        }
    }

    fn api(&self) -> Api<AllocationState> {
        Api::all(self.client.clone())
    }

    /// Prepare a single claim, idempotently: a cached preparation is
    /// returned as-is so a kubelet retry after a partial failure doesn't
    /// re-materialize VFs that already exist.
    pub async fn prepare(&self, claim_uid: &str) -> Result<ClaimPreparation> {
        if let Some(cached) = self.preparations.load(claim_uid).await? {
            return Ok(cached);
        }

        let _guard = self.mutex_table.lock(&self.node_name).await;

        let object = self.api().get(&self.node_name).await.map_err(|e| match e {
            kube::Error::Api(ae) if ae.code == 404 => Error::AsrNotFound {
                node: self.node_name.clone(),
            },
            other => Error::Kube(other),
        })?;
        let mut record = object.record();

        let claim = record
            .allocated_claims
            .get(claim_uid)
            .cloned()
            .ok_or_else(|| Error::UnknownDevice {
                claim: claim_uid.to_string(),
                uid: "<claim>".to_string(),
            })?;

        let mut materialized_any = false;
        for dev in &claim.devices {
            if !dev.is_placeholder() {
                continue;
            }
            let parent_uid = dev.parent_uid.clone().ok_or_else(|| Error::VfMaterializationFailed {
                parent: "<unknown>".to_string(),
                reason: "placeholder has no parent_uid".to_string(),
            })?;
            let vf_index = dev.vf_index.ok_or_else(|| Error::VfMaterializationFailed {
                parent: parent_uid.clone(),
                reason: "placeholder has no vf_index".to_string(),
            })?;
            let new_uid = format!("{parent_uid}-vf{vf_index}");
            vf_carving::materialize(
                &mut record,
                &parent_uid,
                vf_index,
                &new_uid,
                Capacity {
                    memory: dev.memory,
                    millicores: dev.millicores,
                    max_vfs: 0,
                    ecc: true,
                },
                Health { healthy: true, serial: new_uid.clone() },
            )?;
            materialized_any = true;
        }

        if materialized_any {
            record.bump_generation();
            let status = AllocationStateStatus::from_record(&record);
            let patch = serde_json::json!({ "status": status });
            self.api()
                .patch_status(&self.node_name, &PatchParams::default(), &Patch::Merge(&patch))
                .await
                .map_err(|e| match e {
                    kube::Error::Api(ae) if ae.code == 409 => Error::Conflict {
                        node: self.node_name.clone(),
                    },
                    other => Error::Kube(other),
                })?;
        }

        let claim = record.allocated_claims.get(claim_uid).expect("just written above");
        let mut devices = Vec::with_capacity(claim.devices.len());
        for dev in &claim.devices {
            let info = record.allocatable.get(&dev.uid).ok_or_else(|| Error::UnknownDevice {
                claim: claim_uid.to_string(),
                uid: dev.uid.clone(),
            })?;
            let key = InjectionKey::for_device(info.kind, &info.uid);
            let cdi_device_ids = self.injection_registry.resolve(&key).await?;
            devices.push(PreparedDeviceRef {
                request_name: claim_uid.to_string(),
                pool_name: self.node_name.clone(),
                device_name: info.uid.clone(),
                cdi_device_ids,
            });
        }

        let prep = ClaimPreparation { devices };
        self.preparations.store(claim_uid, &prep).await?;
        info!(node = %self.node_name, claim = claim_uid, "prepared claim");
        Ok(prep)
    }

    pub async fn unprepare(&self, claim_uid: &str) -> Result<()> {
        self.preparations.remove(claim_uid).await?;
        info!(node = %self.node_name, claim = claim_uid, "unprepared claim");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unprepare_without_cached_preparation_is_a_no_op() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = ClaimPreparationStore::new(dir.path());
        store.remove("claim-a").await.unwrap();
        assert!(store.load("claim-a").await.unwrap().is_none());
    }
}
