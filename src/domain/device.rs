//! Device inventory types (spec section 3, `DeviceInfo`)
//!
//! One record per physical or virtual accelerator, as produced by the
//! (out-of-scope) discovery enumerator and carried in the ASR's
//! `allocatable` map.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Sentinel UID signalling that a `AllocatedDevice` has not yet been
/// materialized — the node plugin's `Prepare` is the single point that
/// replaces it with a concrete UID (spec §9 design note).
pub const NEW_VF_PLACEHOLDER: &str = "<new-VF>";

/// Kind discriminant for an accelerator device. Modeled as a tagged sum
/// rather than an inheritance hierarchy (spec §9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    /// Physical function / full discrete device
    Gpu,
    /// SR-IOV virtual function
    Vf,
    /// Non-GPU AI accelerator (e.g. Gaudi)
    Accelerator,
    /// Crypto/compression offload engine (e.g. QAT)
    CryptoEngine,
}

impl std::fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceKind::Gpu => write!(f, "gpu"),
            DeviceKind::Vf => write!(f, "vf"),
            DeviceKind::Accelerator => write!(f, "accelerator"),
            DeviceKind::CryptoEngine => write!(f, "crypto-engine"),
        }
    }
}

/// Resource capacity carried by a device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Capacity {
    /// Memory in MiB
    pub memory: u64,
    /// Thousandths of a whole device; 1000 == exclusive use
    pub millicores: u32,
    /// Maximum number of SR-IOV virtual functions this device can carve
    pub max_vfs: u32,
    /// Whether ECC is enabled
    pub ecc: bool,
}

/// PCI topology hints used by placement for locality-aware scoring.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TopologyHints {
    pub pci_root: String,
    pub device_index: u32,
}

/// Device health, as observed by discovery or the health-tainting loop.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Health {
    pub healthy: bool,
    pub serial: String,
}

/// One record per physical or virtual accelerator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    /// Globally stable, derived from PCI address and device-ID.
    pub uid: String,
    /// Opaque identifier used as a key into the VF profile table (C3).
    pub model: String,
    pub kind: DeviceKind,
    /// Set iff `kind == Vf`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_uid: Option<String>,
    pub capacity: Capacity,
    pub topology_hints: TopologyHints,
    pub health: Health,
}

impl DeviceInfo {
    pub fn is_vf(&self) -> bool {
        self.kind == DeviceKind::Vf
    }

    pub fn is_full_device(&self) -> bool {
        matches!(
            self.kind,
            DeviceKind::Gpu | DeviceKind::Accelerator | DeviceKind::CryptoEngine
        )
    }
}

/// Per-device tainted state; keys are a soft-checked subset of `allocatable`
/// keys (invariant 1 — violation is a warning, never a fault).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Taint {
    pub reasons: BTreeSet<String>,
}

impl Taint {
    pub fn is_empty(&self) -> bool {
        self.reasons.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_kind_display() {
        assert_eq!(DeviceKind::Gpu.to_string(), "gpu");
        assert_eq!(DeviceKind::Vf.to_string(), "vf");
        assert_eq!(DeviceKind::CryptoEngine.to_string(), "crypto-engine");
    }

    #[test]
    fn full_device_classification() {
        let gpu = DeviceInfo {
            uid: "pci0-gpu".into(),
            model: "model-a".into(),
            kind: DeviceKind::Gpu,
            parent_uid: None,
            capacity: Capacity::default(),
            topology_hints: TopologyHints::default(),
            health: Health::default(),
        };
        assert!(gpu.is_full_device());
        assert!(!gpu.is_vf());
    }
}
