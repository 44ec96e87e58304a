//! Claim types (spec section 3: `ClaimRequest`, `AllocatedClaim`)
//!
//! `ClaimRequest` is what the scheduler asks for; `AllocatedClaim` is what
//! the controller commits into the ASR once a claim has been satisfied.

use crate::domain::device::DeviceKind;
use crate::error::{Error, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Hard caps from spec §3.
pub const MAX_CLAIM_COUNT: u32 = 8;
pub const MAX_CLAIM_MEMORY_GIB: u64 = 128;

/// What the scheduler asks for, paired with class-level defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClaimRequest {
    pub kind: RequestedKind,
    pub count: u32,
    /// Memory request, in MiB.
    pub memory: u64,
    pub millicores: u32,
    pub shareable: bool,
    pub monitor: bool,
}

/// Device kind a claim requests; `Any` lets the controller try VF first,
/// then GPU (spec §4.4 step 6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum RequestedKind {
    Gpu,
    Vf,
    Any,
}

/// Class-level parameters shared by every claim in a resource class.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClassParameters {
    pub shared: bool,
    pub monitor: bool,
    #[serde(default)]
    pub device_selector: Option<String>,
}

impl ClaimRequest {
    /// Semantic validation rules from spec §3. Returns `Error::ValidationError`
    /// on violation; claims failing this never reach the allocation pipeline.
    pub fn validate(&self, class: &ClassParameters) -> Result<()> {
        if self.monitor && !matches!(self.kind, RequestedKind::Gpu) {
            return Err(Error::ValidationError(
                "monitor claims must request a full device (kind = gpu)".into(),
            ));
        }

        if self.millicores > 0 {
            let shared_gpu = matches!(self.kind, RequestedKind::Gpu) && (self.shareable || class.shared);
            let is_vf = matches!(self.kind, RequestedKind::Vf);
            if !shared_gpu && !is_vf {
                return Err(Error::ValidationError(
                    "millicores > 0 requires a shared gpu claim or a vf claim".into(),
                ));
            }
        }

        if self.count == 0 || self.count > MAX_CLAIM_COUNT {
            return Err(Error::ValidationError(format!(
                "count must be in 1..={MAX_CLAIM_COUNT}, got {}",
                self.count
            )));
        }

        let max_memory_mib = MAX_CLAIM_MEMORY_GIB * 1024;
        if self.memory > max_memory_mib {
            return Err(Error::ValidationError(format!(
                "memory must be <= {max_memory_mib} MiB, got {}",
                self.memory
            )));
        }

        Ok(())
    }

    /// A claim is informational only when `monitor` is set on either the
    /// claim or its class (spec §4.4 step 3).
    pub fn is_monitor(&self, class: &ClassParameters) -> bool {
        self.monitor || class.monitor
    }
}

/// A device materialized (or to-be-materialized) against a specific claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AllocatedDevice {
    pub uid: String,
    pub kind: DeviceKind,
    pub memory: u64,
    pub millicores: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_uid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vf_index: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
}

impl AllocatedDevice {
    pub fn is_placeholder(&self) -> bool {
        self.uid == crate::domain::device::NEW_VF_PLACEHOLDER
    }
}

/// What the controller commits into `AllocationStateRecord::allocated_claims`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AllocatedClaim {
    pub devices: Vec<AllocatedDevice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gpu_claim(millicores: u32, shareable: bool) -> ClaimRequest {
        ClaimRequest {
            kind: RequestedKind::Gpu,
            count: 1,
            memory: 1024,
            millicores,
            shareable,
            monitor: false,
        }
    }

    #[test]
    fn monitor_claim_must_be_full_device() {
        let mut claim = gpu_claim(0, false);
        claim.monitor = true;
        claim.kind = RequestedKind::Vf;
        assert!(claim.validate(&ClassParameters::default()).is_err());
    }

    #[test]
    fn millicores_requires_shared_gpu_or_vf() {
        let claim = gpu_claim(100, false);
        assert!(claim.validate(&ClassParameters::default()).is_err());

        let claim = gpu_claim(100, true);
        assert!(claim.validate(&ClassParameters::default()).is_ok());

        let mut claim = gpu_claim(100, false);
        claim.kind = RequestedKind::Vf;
        assert!(claim.validate(&ClassParameters::default()).is_ok());
    }

    #[test]
    fn count_and_memory_caps_enforced() {
        let mut claim = gpu_claim(0, false);
        claim.count = 9;
        assert!(claim.validate(&ClassParameters::default()).is_err());

        let mut claim = gpu_claim(0, false);
        claim.memory = MAX_CLAIM_MEMORY_GIB * 1024 + 1;
        assert!(claim.validate(&ClassParameters::default()).is_err());
    }

    #[test]
    fn placeholder_detection() {
        let dev = AllocatedDevice {
            uid: crate::domain::device::NEW_VF_PLACEHOLDER.to_string(),
            kind: DeviceKind::Vf,
            memory: 1024,
            millicores: 100,
            parent_uid: Some("parent-1".into()),
            vf_index: Some(0),
            profile: Some("1g.1c".into()),
        };
        assert!(dev.is_placeholder());
    }
}
