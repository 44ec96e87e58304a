//! SR-IOV VF carving sub-algorithm (spec section 4, component C4.5)
//!
//! Carving happens in two steps. The controller decides *that* a new VF
//! should exist on a parent GPU and commits an `AllocatedDevice` carrying
//! the `NEW_VF_PLACEHOLDER` sentinel UID plus enough metadata (parent,
//! index, profile) for the node plugin to actually create it. Only the
//! node plugin, at `Prepare` time, replaces the placeholder with a real
//! UID and inserts the resulting `DeviceInfo` into `allocatable`
//! (`materialize`, spec §9 design note on avoiding controller/node-plugin
//! cycles).

use crate::domain::asr::AllocationStateRecord;
use crate::domain::claim::AllocatedDevice;
use crate::domain::device::{Capacity, DeviceInfo, DeviceKind, Health, TopologyHints, NEW_VF_PLACEHOLDER};
use crate::error::{Error, Result};
use crate::external::vf_profile::VfProfile;

/// Decide whether `parent_uid` has room for one more VF of `profile`, and
/// if so return the placeholder device to commit into the claim.
pub fn carve(
    asr: &AllocationStateRecord,
    parent_uid: &str,
    profile: &VfProfile,
) -> Result<AllocatedDevice> {
    let parent = asr
        .allocatable
        .get(parent_uid)
        .ok_or_else(|| Error::UnknownDevice {
            claim: String::new(),
            uid: parent_uid.to_string(),
        })?;

    if parent.is_vf() {
        return Err(Error::VfMaterializationFailed {
            parent: parent_uid.to_string(),
            reason: "parent is itself a vf".into(),
        });
    }

    let existing_vfs = existing_vf_count(asr, parent_uid);
    if existing_vfs >= parent.capacity.max_vfs || existing_vfs >= profile.max_instances {
        return Err(Error::VfMaterializationFailed {
            parent: parent_uid.to_string(),
            reason: format!(
                "no free vf slots (existing {existing_vfs}, device max {}, profile max {})",
                parent.capacity.max_vfs, profile.max_instances
            ),
        });
    }

    let consumed_memory = existing_vf_memory(asr, parent_uid);
    let free_memory = parent.capacity.memory.saturating_sub(consumed_memory);
    if profile.memory > free_memory {
        return Err(Error::VfMaterializationFailed {
            parent: parent_uid.to_string(),
            reason: format!(
                "insufficient parent memory (free {free_memory} MiB, profile needs {} MiB)",
                profile.memory
            ),
        });
    }

    Ok(AllocatedDevice {
        uid: NEW_VF_PLACEHOLDER.to_string(),
        kind: DeviceKind::Vf,
        memory: profile.memory,
        millicores: profile.millicores,
        parent_uid: Some(parent_uid.to_string()),
        vf_index: Some(existing_vfs),
        profile: Some(profile.name.clone()),
    })
}

/// Count VFs already carved (materialized or still placeholders) against
/// `parent_uid` across both `allocatable` and in-flight claims.
fn existing_vf_count(asr: &AllocationStateRecord, parent_uid: &str) -> u32 {
    let materialized = asr
        .allocatable
        .values()
        .filter(|d| d.parent_uid.as_deref() == Some(parent_uid))
        .count() as u32;

    let placeholders = asr
        .allocated_claims
        .values()
        .flat_map(|c| &c.devices)
        .filter(|d| d.is_placeholder() && d.parent_uid.as_deref() == Some(parent_uid))
        .count() as u32;

    materialized + placeholders
}

/// Memory (MiB) already carved from `parent_uid` across both materialized
/// VFs and still-placeholder claims (spec §4.5 step 3's `freeMem` check).
fn existing_vf_memory(asr: &AllocationStateRecord, parent_uid: &str) -> u64 {
    let materialized: u64 = asr
        .allocatable
        .values()
        .filter(|d| d.parent_uid.as_deref() == Some(parent_uid))
        .map(|d| d.capacity.memory)
        .sum();

    let placeholders: u64 = asr
        .allocated_claims
        .values()
        .flat_map(|c| &c.devices)
        .filter(|d| d.is_placeholder() && d.parent_uid.as_deref() == Some(parent_uid))
        .map(|d| d.memory)
        .sum();

    materialized + placeholders
}

/// Replace a placeholder VF reference with its materialized identity
/// (node-plugin side, spec §4.6 step 3): inserts the concrete
/// `DeviceInfo` into `allocatable` and rewrites the matching placeholder
/// entries in `allocated_claims` to the real UID.
pub fn materialize(
    asr: &mut AllocationStateRecord,
    parent_uid: &str,
    vf_index: u32,
    new_uid: &str,
    capacity: Capacity,
    health: Health,
) -> Result<()> {
    let parent_model = asr
        .allocatable
        .get(parent_uid)
        .map(|p| p.model.clone())
        .ok_or_else(|| Error::UnknownDevice {
            claim: String::new(),
            uid: parent_uid.to_string(),
        })?;

    asr.allocatable.insert(
        new_uid.to_string(),
        DeviceInfo {
            uid: new_uid.to_string(),
            model: parent_model,
            kind: DeviceKind::Vf,
            parent_uid: Some(parent_uid.to_string()),
            capacity,
            topology_hints: TopologyHints::default(),
            health,
        },
    );

    for claim in asr.allocated_claims.values_mut() {
        for dev in claim.devices.iter_mut() {
            if dev.is_placeholder()
                && dev.parent_uid.as_deref() == Some(parent_uid)
                && dev.vf_index == Some(vf_index)
            {
                dev.uid = new_uid.to_string();
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::claim::AllocatedClaim;

    fn parent(uid: &str, max_vfs: u32) -> DeviceInfo {
        DeviceInfo {
            uid: uid.to_string(),
            model: "model-a".into(),
            kind: DeviceKind::Gpu,
            parent_uid: None,
            capacity: Capacity {
                memory: 16384,
                millicores: 1000,
                max_vfs,
                ecc: true,
            },
            topology_hints: TopologyHints::default(),
            health: Health { healthy: true, serial: "s1".into() },
        }
    }

    fn profile() -> VfProfile {
        VfProfile {
            name: "1g.1c".into(),
            memory: 1024,
            millicores: 100,
            max_instances: 4,
        }
    }

    #[test]
    fn carves_first_vf_at_index_zero() {
        let mut asr = AllocationStateRecord::new("node-1");
        asr.allocatable.insert("gpu-1".into(), parent("gpu-1", 4));
        let device = carve(&asr, "gpu-1", &profile()).unwrap();
        assert_eq!(device.vf_index, Some(0));
        assert!(device.is_placeholder());
    }

    #[test]
    fn refuses_carve_when_parent_memory_exhausted() {
        let mut asr = AllocationStateRecord::new("node-1");
        let mut gpu = parent("gpu-1", 12);
        gpu.capacity.memory = 1500;
        asr.allocatable.insert("gpu-1".into(), gpu);

        let first = carve(&asr, "gpu-1", &profile()).unwrap();
        assert_eq!(first.vf_index, Some(0));
        asr.allocated_claims.insert(
            "claim-a".into(),
            AllocatedClaim { devices: vec![first], owner: None },
        );

        // One more 1024 MiB VF would need 2048 MiB total against a 1500 MiB
        // parent; slots are nowhere near exhausted (1 of 12 used).
        let err = carve(&asr, "gpu-1", &profile()).unwrap_err();
        assert!(matches!(err, Error::VfMaterializationFailed { .. }));
    }

    #[test]
    fn refuses_carve_when_device_max_vfs_exhausted() {
        let mut asr = AllocationStateRecord::new("node-1");
        asr.allocatable.insert("gpu-1".into(), parent("gpu-1", 1));
        asr.allocatable.insert(
            "vf-0".into(),
            DeviceInfo {
                uid: "vf-0".into(),
                model: "model-a".into(),
                kind: DeviceKind::Vf,
                parent_uid: Some("gpu-1".into()),
                capacity: Capacity { memory: 1024, millicores: 100, max_vfs: 0, ecc: true },
                topology_hints: TopologyHints::default(),
                health: Health { healthy: true, serial: "s2".into() },
            },
        );
        let err = carve(&asr, "gpu-1", &profile()).unwrap_err();
        assert!(matches!(err, Error::VfMaterializationFailed { .. }));
    }

    #[test]
    fn materialize_rewrites_placeholder_to_real_uid() {
        let mut asr = AllocationStateRecord::new("node-1");
        asr.allocatable.insert("gpu-1".into(), parent("gpu-1", 4));
        let placeholder = carve(&asr, "gpu-1", &profile()).unwrap();
        asr.allocated_claims.insert(
            "claim-a".into(),
            AllocatedClaim { devices: vec![placeholder], owner: None },
        );

        materialize(
            &mut asr,
            "gpu-1",
            0,
            "vf-0",
            Capacity { memory: 1024, millicores: 100, max_vfs: 0, ecc: true },
            Health { healthy: true, serial: "s2".into() },
        )
        .unwrap();

        assert!(asr.allocatable.contains_key("vf-0"));
        let claim = &asr.allocated_claims["claim-a"];
        assert_eq!(claim.devices[0].uid, "vf-0");
        assert!(!claim.devices[0].is_placeholder());
    }
}
