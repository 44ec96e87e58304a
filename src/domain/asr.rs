//! Allocation State Record (spec section 3 / 8: invariants 1-6)
//!
//! The ASR is the single per-node source of truth: what's physically
//! present (`allocatable`), what's tainted and why, and what's currently
//! committed to claims. The controller and node plugin both read and
//! write it under the per-node mutex (C6).

use crate::domain::claim::AllocatedClaim;
use crate::domain::device::{DeviceInfo, Taint};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Lifecycle status of a node's ASR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "PascalCase")]
pub enum AsrStatus {
    /// Discovery has not yet published a first snapshot.
    Pending,
    /// Usable by the allocation pipeline.
    Ready,
    /// Node plugin is shutting down or has been removed; no new claims.
    NotReady,
}

/// Per-node allocation state: the controller's only view of a node's
/// accelerator inventory and commitments.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AllocationStateRecord {
    pub node_name: String,
    pub status: AsrStatus,
    pub allocatable: BTreeMap<String, DeviceInfo>,
    #[serde(default)]
    pub tainted: BTreeMap<String, Taint>,
    #[serde(default)]
    pub allocated_claims: BTreeMap<String, AllocatedClaim>,
    /// Monotonic generation bumped on every committed write; used for
    /// optimistic-concurrency detection alongside the CRD's own
    /// `resourceVersion`.
    #[serde(default)]
    pub generation: u64,
}

/// A violated invariant, carrying enough context for `Error::Corruption`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvariantViolation {
    pub invariant: &'static str,
    pub detail: String,
}

impl std::fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.invariant, self.detail)
    }
}

impl AllocationStateRecord {
    pub fn new(node_name: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
            status: AsrStatus::Pending,
            allocatable: BTreeMap::new(),
            tainted: BTreeMap::new(),
            allocated_claims: BTreeMap::new(),
            generation: 0,
        }
    }

    /// Checks invariants 1-6. Called before every committed write; a
    /// violation means the in-memory record diverged from what the ASR
    /// is allowed to represent and should surface as `Error::Corruption`
    /// rather than be written back.
    pub fn validate(&self) -> Result<(), Vec<InvariantViolation>> {
        let mut violations = Vec::new();

        // Invariant 1 (soft): tainted keys should be a subset of allocatable
        // keys. A stray taint key is a warning-level drift, not corruption,
        // so it is reported but does not alone fail validation.
        for uid in self.tainted.keys() {
            if !self.allocatable.contains_key(uid) {
                violations.push(InvariantViolation {
                    invariant: "I1-taint-subset",
                    detail: format!("tainted device {uid} not present in allocatable"),
                });
            }
        }

        // Invariant 2: every VF's parent_uid must reference a known,
        // non-VF device.
        for dev in self.allocatable.values() {
            if let Some(parent) = &dev.parent_uid {
                match self.allocatable.get(parent) {
                    None => violations.push(InvariantViolation {
                        invariant: "I2-vf-parent-exists",
                        detail: format!("vf {} references unknown parent {parent}", dev.uid),
                    }),
                    Some(p) if p.is_vf() => violations.push(InvariantViolation {
                        invariant: "I2-vf-parent-not-vf",
                        detail: format!("vf {} parent {parent} is itself a vf", dev.uid),
                    }),
                    _ => {}
                }
            }
        }

        // Invariant 3: a device referenced by an allocated claim must exist
        // in allocatable, unless it is the VF creation placeholder (which by
        // definition has not been materialized yet).
        for (claim_uid, claim) in &self.allocated_claims {
            for dev in &claim.devices {
                if dev.is_placeholder() {
                    continue;
                }
                if !self.allocatable.contains_key(&dev.uid) {
                    violations.push(InvariantViolation {
                        invariant: "I3-claim-device-exists",
                        detail: format!(
                            "claim {claim_uid} references unknown device {}",
                            dev.uid
                        ),
                    });
                }
            }
        }

        // Committed millicores per device, summed across every allocated
        // claim referencing it (excluding still-unmaterialized VF
        // placeholders). Shared by invariants 4 and 5.
        let mut committed: BTreeMap<&str, u32> = BTreeMap::new();
        for claim in self.allocated_claims.values() {
            for dev in &claim.devices {
                if dev.is_placeholder() {
                    continue;
                }
                *committed.entry(dev.uid.as_str()).or_insert(0) += dev.millicores;
            }
        }

        // Invariant 4: a claim that alone commits a device's full capacity
        // (an exclusive request, per spec §8 property 2) must be the only
        // claim referencing that device. Two claims splitting a device's
        // capacity between them (neither taking the full amount on its
        // own) is legitimate sharing and is covered by invariant 5 instead,
        // not this one — the previous revision of this check keyed off the
        // device's static capacity field, which is always >= 1000 for a
        // full device and so fired on every shared allocation.
        for (claim_uid, claim) in &self.allocated_claims {
            for dev in &claim.devices {
                if dev.is_placeholder() {
                    continue;
                }
                let Some(info) = self.allocatable.get(&dev.uid) else {
                    continue;
                };
                if dev.millicores < info.capacity.millicores {
                    continue;
                }
                for (other_uid, other_claim) in &self.allocated_claims {
                    if other_uid == claim_uid {
                        continue;
                    }
                    if other_claim.devices.iter().any(|d| !d.is_placeholder() && d.uid == dev.uid) {
                        violations.push(InvariantViolation {
                            invariant: "I4-exclusive-single-owner",
                            detail: format!(
                                "exclusive device {} claimed by both {claim_uid} and {other_uid}",
                                dev.uid
                            ),
                        });
                    }
                }
            }
        }

        // Invariant 5: sum of millicores committed against a device must
        // not exceed its capacity.
        for (uid, total) in &committed {
            if let Some(info) = self.allocatable.get(*uid) {
                if *total > info.capacity.millicores {
                    violations.push(InvariantViolation {
                        invariant: "I5-millicore-capacity",
                        detail: format!(
                            "device {uid} committed {total}mc exceeds capacity {}mc",
                            info.capacity.millicores
                        ),
                    });
                }
            }
        }

        // Invariant 6: a tainted device (any non-empty reason set) must not
        // gain new allocations; it may only retain claims allocated before
        // the taint was applied. We can't tell "before" from the ASR alone,
        // so this check is enforced by the allocator at admission time, not
        // here (spec §9 open question: empty-reasons-set state is
        // equivalent to absence from the map).
        for (uid, taint) in &self.tainted {
            if taint.is_empty() {
                violations.push(InvariantViolation {
                    invariant: "I6-no-empty-taint",
                    detail: format!("device {uid} has an empty taint reason set; remove the entry instead"),
                });
            }
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations)
        }
    }

    pub fn is_tainted(&self, uid: &str) -> bool {
        self.tainted.get(uid).is_some_and(|t| !t.is_empty())
    }

    pub fn bump_generation(&mut self) {
        self.generation += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::claim::AllocatedDevice;
    use crate::domain::device::{Capacity, DeviceKind, Health, TopologyHints};

    fn device(uid: &str, kind: DeviceKind, parent: Option<&str>, millicores: u32) -> DeviceInfo {
        DeviceInfo {
            uid: uid.to_string(),
            model: "model-a".into(),
            kind,
            parent_uid: parent.map(str::to_string),
            capacity: Capacity {
                memory: 16384,
                millicores,
                max_vfs: 4,
                ecc: true,
            },
            topology_hints: TopologyHints::default(),
            health: Health { healthy: true, serial: "s1".into() },
        }
    }

    #[test]
    fn empty_asr_is_valid() {
        let asr = AllocationStateRecord::new("node-1");
        assert!(asr.validate().is_ok());
    }

    #[test]
    fn vf_parent_must_exist_and_not_be_vf() {
        let mut asr = AllocationStateRecord::new("node-1");
        asr.allocatable.insert(
            "vf-1".into(),
            device("vf-1", DeviceKind::Vf, Some("missing-parent"), 250),
        );
        let violations = asr.validate().unwrap_err();
        assert!(violations.iter().any(|v| v.invariant == "I2-vf-parent-exists"));
    }

    #[test]
    fn exclusive_device_rejects_double_claim() {
        let mut asr = AllocationStateRecord::new("node-1");
        asr.allocatable
            .insert("gpu-1".into(), device("gpu-1", DeviceKind::Gpu, None, 1000));
        let dev = AllocatedDevice {
            uid: "gpu-1".into(),
            kind: DeviceKind::Gpu,
            memory: 16384,
            millicores: 1000,
            parent_uid: None,
            vf_index: None,
            profile: None,
        };
        asr.allocated_claims.insert(
            "claim-a".into(),
            AllocatedClaim { devices: vec![dev.clone()], owner: None },
        );
        asr.allocated_claims.insert(
            "claim-b".into(),
            AllocatedClaim { devices: vec![dev], owner: None },
        );
        let violations = asr.validate().unwrap_err();
        assert!(violations.iter().any(|v| v.invariant == "I4-exclusive-single-owner"));
    }

    #[test]
    fn shared_device_split_between_claims_is_not_exclusive() {
        let mut asr = AllocationStateRecord::new("node-1");
        asr.allocatable
            .insert("gpu-1".into(), device("gpu-1", DeviceKind::Gpu, None, 1000));
        for (i, mc) in [500u32, 500].into_iter().enumerate() {
            let dev = AllocatedDevice {
                uid: "gpu-1".into(),
                kind: DeviceKind::Gpu,
                memory: 1024,
                millicores: mc,
                parent_uid: None,
                vf_index: None,
                profile: None,
            };
            asr.allocated_claims.insert(
                format!("claim-{i}"),
                AllocatedClaim { devices: vec![dev], owner: None },
            );
        }
        assert!(asr.validate().is_ok());
    }

    #[test]
    fn millicore_oversubscription_detected() {
        let mut asr = AllocationStateRecord::new("node-1");
        asr.allocatable
            .insert("gpu-1".into(), device("gpu-1", DeviceKind::Gpu, None, 1000));
        for (i, mc) in [600u32, 600].into_iter().enumerate() {
            let dev = AllocatedDevice {
                uid: "gpu-1".into(),
                kind: DeviceKind::Gpu,
                memory: 1024,
                millicores: mc,
                parent_uid: None,
                vf_index: None,
                profile: None,
            };
            asr.allocated_claims.insert(
                format!("claim-{i}"),
                AllocatedClaim { devices: vec![dev], owner: None },
            );
        }
        let violations = asr.validate().unwrap_err();
        assert!(violations.iter().any(|v| v.invariant == "I5-millicore-capacity"));
    }

    #[test]
    fn placeholder_devices_skip_existence_check() {
        let mut asr = AllocationStateRecord::new("node-1");
        let dev = AllocatedDevice {
            uid: crate::domain::device::NEW_VF_PLACEHOLDER.into(),
            kind: DeviceKind::Vf,
            memory: 1024,
            millicores: 250,
            parent_uid: Some("gpu-1".into()),
            vf_index: Some(0),
            profile: Some("1g.1c".into()),
        };
        asr.allocatable
            .insert("gpu-1".into(), device("gpu-1", DeviceKind::Gpu, None, 1000));
        asr.allocated_claims.insert(
            "claim-a".into(),
            AllocatedClaim { devices: vec![dev], owner: None },
        );
        assert!(asr.validate().is_ok());
    }

    #[test]
    fn empty_taint_reason_set_rejected() {
        let mut asr = AllocationStateRecord::new("node-1");
        asr.allocatable
            .insert("gpu-1".into(), device("gpu-1", DeviceKind::Gpu, None, 1000));
        asr.tainted.insert("gpu-1".into(), Taint::default());
        let violations = asr.validate().unwrap_err();
        assert!(violations.iter().any(|v| v.invariant == "I6-no-empty-taint"));
    }
}
