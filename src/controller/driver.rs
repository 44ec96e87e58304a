//! The `Driver` trait (spec component C9) and its Kubernetes-backed
//! implementation: the three operations the scheduler's allocation
//! pipeline needs — `unsuitable_nodes`, `allocate`, `deallocate` — each
//! executed under the target node's mutex (C6) with the pending-claims
//! cache (C7) covering the gap until a write is observable via the watch.

use crate::allocation::pending::PendingClaims;
use crate::allocation::placement::{PlacementCandidate, PlacementEngine, PlacementPolicy};
use crate::allocation::vf_carving;
use crate::allocation::NodeMutexTable;
use crate::crd::allocation_state::{AllocationState, AllocationStateStatus};
use crate::domain::asr::{AllocationStateRecord, AsrStatus};
use crate::domain::claim::{AllocatedClaim, AllocatedDevice, ClaimRequest, ClassParameters, RequestedKind};
use crate::domain::device::DeviceInfo;
use crate::error::{Error, Result};
use crate::external::vf_profile::VfProfileTableRef;
use async_trait::async_trait;
use kube::api::{Api, Patch, PatchParams};
use kube::Client;
use std::sync::Arc;
use tracing::{debug, info};

/// Port the scheduler-facing allocation pipeline is built against. Kept
/// as a trait so the reconcile loop and tests can both drive it without
/// depending on a live API server (spec §9: avoids a cyclic dependency
/// between the controller and the node plugin by keeping this interface
/// purely Kubernetes-API-mediated, never gRPC).
#[async_trait]
pub trait Driver: Send + Sync {
    /// Which of `candidate_nodes` cannot satisfy `claim` right now.
    async fn unsuitable_nodes(
        &self,
        claim: &ClaimRequest,
        class: &ClassParameters,
        candidate_nodes: &[String],
    ) -> Result<Vec<String>>;

    /// Commit `claim` against `node_name`, returning the devices allocated.
    async fn allocate(
        &self,
        node_name: &str,
        claim_uid: &str,
        claim: &ClaimRequest,
        class: &ClassParameters,
    ) -> Result<AllocatedClaim>;

    /// Release a previously allocated claim.
    async fn deallocate(&self, node_name: &str, claim_uid: &str) -> Result<()>;
}

/// Millicores to record for a committed device: the claim's own request
/// if it asked for a share (`millicores > 0`), otherwise the device's
/// full capacity — a plain exclusive GPU request carries `millicores ==
/// 0` on the wire, and recording that verbatim would let a second
/// identical claim see the device as unused (spec §8 property 2:
/// "exclusive allocations consume the full 1000").
fn committed_millicores(claim: &ClaimRequest, info: &DeviceInfo) -> u32 {
    if claim.millicores > 0 {
        claim.millicores
    } else {
        info.capacity.millicores
    }
}

pub struct KubeDriver {
    client: Client,
    mutex_table: Arc<NodeMutexTable>,
    pending: Arc<PendingClaims>,
    vf_profiles: VfProfileTableRef,
    placement_policy: PlacementPolicy,
}

impl KubeDriver {
    pub fn new(
        client: Client,
        mutex_table: Arc<NodeMutexTable>,
        pending: Arc<PendingClaims>,
        vf_profiles: VfProfileTableRef,
        placement_policy: PlacementPolicy,
    ) -> Self {
        Self {
            client,
            mutex_table,
            pending,
            vf_profiles,
            placement_policy,
        }
    }

    fn api(&self) -> Api<AllocationState> {
        Api::all(self.client.clone())
    }

    async fn fetch_record(&self, node_name: &str) -> Result<(AllocationState, AllocationStateRecord)> {
        let object = self
            .api()
            .get(node_name)
            .await
            .map_err(|e| match e {
                kube::Error::Api(ae) if ae.code == 404 => Error::AsrNotFound {
                    node: node_name.to_string(),
                },
                other => Error::Kube(other),
            })?;
        let record = object.record();
        Ok((object, record))
    }

    async fn write_record(&self, node_name: &str, record: &AllocationStateRecord) -> Result<()> {
        if let Err(violations) = record.validate() {
            return Err(Error::Corruption {
                node: node_name.to_string(),
                reason: violations
                    .into_iter()
                    .map(|v| v.to_string())
                    .collect::<Vec<_>>()
                    .join("; "),
            });
        }

        let status = AllocationStateStatus::from_record(record);
        let patch = serde_json::json!({ "status": status });
        self.api()
            .patch_status(node_name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| match e {
                kube::Error::Api(ae) if ae.code == 409 => Error::Conflict {
                    node: node_name.to_string(),
                },
                other => Error::Kube(other),
            })?;
        Ok(())
    }

    /// Eligible devices for `claim` on `record`, after folding in claims
    /// pending from this process that haven't landed in the ASR yet.
    fn eligible_candidates(
        &self,
        node_name: &str,
        record: &AllocationStateRecord,
        claim: &ClaimRequest,
    ) -> Vec<(DeviceInfo, PlacementCandidate)> {
        let live_pending = self.pending.live_for_node(node_name, &record.allocated_claims);
        let mut used_millicores: std::collections::BTreeMap<String, u32> = std::collections::BTreeMap::new();
        for c in record.allocated_claims.values().chain(live_pending.iter()) {
            for dev in &c.devices {
                if !dev.is_placeholder() {
                    *used_millicores.entry(dev.uid.clone()).or_insert(0) += dev.millicores;
                }
            }
        }

        // Devices with at least one VF carved from them (materialized, or
        // still a placeholder in a committed or pending claim) can no
        // longer be claimed as a whole device (invariant 5: once VFs
        // exist on P, no other claim may hold P directly).
        let vf_parents: std::collections::BTreeSet<&str> = record
            .allocatable
            .values()
            .filter(|d| d.is_vf())
            .filter_map(|d| d.parent_uid.as_deref())
            .chain(
                record
                    .allocated_claims
                    .values()
                    .chain(live_pending.iter())
                    .flat_map(|c| &c.devices)
                    .filter(|d| d.is_placeholder())
                    .filter_map(|d| d.parent_uid.as_deref()),
            )
            .collect();

        record
            .allocatable
            .values()
            .filter(|d| !record.is_tainted(&d.uid))
            .filter(|d| match claim.kind {
                RequestedKind::Gpu => d.is_full_device() && !vf_parents.contains(d.uid.as_str()),
                RequestedKind::Vf => d.is_vf(),
                RequestedKind::Any => true,
            })
            .filter_map(|d| {
                let used = *used_millicores.get(&d.uid).unwrap_or(&0);
                if d.capacity.memory < claim.memory {
                    return None;
                }
                if claim.millicores > 0 && d.capacity.millicores.saturating_sub(used) < claim.millicores {
                    return None;
                }
                if claim.millicores == 0 && used > 0 {
                    // Exclusive request against an already-used device.
                    return None;
                }
                Some((
                    d.clone(),
                    PlacementCandidate {
                        uid: d.uid.clone(),
                        used_millicores: used,
                        capacity_millicores: d.capacity.millicores,
                    },
                ))
            })
            .collect()
    }
}

#[async_trait]
impl Driver for KubeDriver {
    async fn unsuitable_nodes(
        &self,
        claim: &ClaimRequest,
        _class: &ClassParameters,
        candidate_nodes: &[String],
    ) -> Result<Vec<String>> {
        let mut unsuitable = Vec::new();
        for node_name in candidate_nodes {
            let record = match self.fetch_record(node_name).await {
                Ok((_, record)) => record,
                Err(Error::AsrNotFound { .. }) => {
                    unsuitable.push(node_name.clone());
                    continue;
                }
                Err(e) => return Err(e),
            };

            if record.status != AsrStatus::Ready {
                unsuitable.push(node_name.clone());
                continue;
            }

            let candidates = self.eligible_candidates(node_name, &record, claim);
            if (candidates.len() as u32) < claim.count {
                unsuitable.push(node_name.clone());
            }
        }
        Ok(unsuitable)
    }

    async fn allocate(
        &self,
        node_name: &str,
        claim_uid: &str,
        claim: &ClaimRequest,
        class: &ClassParameters,
    ) -> Result<AllocatedClaim> {
        claim.validate(class)?;
        let _guard = self.mutex_table.lock(node_name).await;

        let (_, mut record) = self.fetch_record(node_name).await?;
        if record.status != AsrStatus::Ready {
            return Err(Error::NotReady {
                node: node_name.to_string(),
            });
        }

        // Spec §4.4 step 3 / scenario S4: a retried Allocate for a claim
        // already committed returns the prior result verbatim rather than
        // recomputing eligibility, which would otherwise count the claim's
        // own already-committed device as "used" against itself.
        if let Some(existing) = record.allocated_claims.get(claim_uid) {
            debug!(node = node_name, claim = claim_uid, "allocate retried for already-committed claim");
            return Ok(existing.clone());
        }

        let candidates = self.eligible_candidates(node_name, &record, claim);
        let placement_candidates: Vec<PlacementCandidate> =
            candidates.iter().map(|(_, p)| p.clone()).collect();

        let mut devices = Vec::new();

        if candidates.len() as u32 >= claim.count {
            let chosen = PlacementEngine::select(&placement_candidates, claim.count as usize, self.placement_policy);
            for c in chosen {
                let info = record.allocatable.get(&c.uid).expect("candidate from record");
                devices.push(AllocatedDevice {
                    uid: info.uid.clone(),
                    kind: info.kind,
                    memory: claim.memory,
                    millicores: committed_millicores(claim, info),
                    parent_uid: info.parent_uid.clone(),
                    vf_index: None,
                    profile: None,
                });
            }
        } else if matches!(claim.kind, RequestedKind::Vf | RequestedKind::Any) {
            // Try to carve new VFs from full devices that have room.
            let mut remaining = claim.count as usize - candidates.len();
            let parents: Vec<String> = record
                .allocatable
                .values()
                .filter(|d| d.is_full_device() && !record.is_tainted(&d.uid))
                .map(|d| d.uid.clone())
                .collect();

            for parent_uid in parents {
                if remaining == 0 {
                    break;
                }
                let profiles = self.vf_profiles.profiles_for_model(&record.allocatable[&parent_uid].model).await?;
                let Some(profile) = profiles.first() else {
                    continue;
                };
                if let Ok(device) = vf_carving::carve(&record, &parent_uid, profile) {
                    devices.push(device);
                    remaining -= 1;
                }
            }

            for (_, c) in &candidates {
                if devices.len() as u32 >= claim.count {
                    break;
                }
                let info = &record.allocatable[&c.uid];
                devices.push(AllocatedDevice {
                    uid: info.uid.clone(),
                    kind: info.kind,
                    memory: claim.memory,
                    millicores: committed_millicores(claim, info),
                    parent_uid: info.parent_uid.clone(),
                    vf_index: None,
                    profile: None,
                });
            }
        }

        if (devices.len() as u32) < claim.count {
            return Err(Error::InsufficientResources {
                claim: claim_uid.to_string(),
                node: node_name.to_string(),
                reason: format!("only {} of {} requested devices available", devices.len(), claim.count),
            });
        }

        let allocated = AllocatedClaim {
            devices,
            owner: Some(claim_uid.to_string()),
        };

        // Spec §4.4 step 3 / scenario S6: a monitor claim reports what it
        // would have been allocated but never commits into the ASR.
        if claim.is_monitor(class) {
            info!(node = node_name, claim = claim_uid, "monitor claim resolved without committing");
            return Ok(allocated);
        }

        record.allocated_claims.insert(claim_uid.to_string(), allocated.clone());
        record.bump_generation();

        self.pending.record(node_name, claim_uid, allocated.clone());
        self.write_record(node_name, &record).await?;
        self.pending.clear(node_name, claim_uid);

        info!(node = node_name, claim = claim_uid, "allocated claim");
        Ok(allocated)
    }

    async fn deallocate(&self, node_name: &str, claim_uid: &str) -> Result<()> {
        let _guard = self.mutex_table.lock(node_name).await;
        let (_, mut record) = self.fetch_record(node_name).await?;

        if record.allocated_claims.remove(claim_uid).is_none() {
            debug!(node = node_name, claim = claim_uid, "deallocate on unknown claim is a no-op");
            return Ok(());
        }
        record.bump_generation();
        self.write_record(node_name, &record).await?;
        self.pending.clear(node_name, claim_uid);
        info!(node = node_name, claim = claim_uid, "deallocated claim");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::device::{Capacity, DeviceKind, Health, TopologyHints};

    fn gpu_info(uid: &str) -> DeviceInfo {
        DeviceInfo {
            uid: uid.to_string(),
            model: "model-a".into(),
            kind: DeviceKind::Gpu,
            parent_uid: None,
            capacity: Capacity { memory: 16384, millicores: 1000, max_vfs: 0, ecc: true },
            topology_hints: TopologyHints::default(),
            health: Health { healthy: true, serial: "s1".into() },
        }
    }

    fn claim(millicores: u32) -> ClaimRequest {
        ClaimRequest {
            kind: RequestedKind::Gpu,
            count: 1,
            memory: 1024,
            millicores,
            shareable: millicores > 0,
            monitor: false,
        }
    }

    #[test]
    fn exclusive_request_normalizes_to_full_capacity() {
        let info = gpu_info("gpu-1");
        assert_eq!(committed_millicores(&claim(0), &info), 1000);
    }

    #[test]
    fn shared_request_keeps_its_own_value() {
        let info = gpu_info("gpu-1");
        assert_eq!(committed_millicores(&claim(250), &info), 250);
    }
}
