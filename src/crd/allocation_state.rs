//! AllocationState CRD
//!
//! One object per node, named after the node itself. `spec` is operator
//! intent (currently empty beyond identifying the node); `status` carries
//! the `AllocationStateRecord` the controller and node plugin both read
//! and write under the per-node mutex (component C6).

use crate::domain::asr::{AllocationStateRecord, AsrStatus};
use crate::domain::claim::AllocatedClaim;
use crate::domain::device::{DeviceInfo, Taint};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Intent portion of an `AllocationState`; present mostly so the object
/// has a stable spec block distinct from the status the driver owns.
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "gpu.accel-fabric.io",
    version = "v1alpha1",
    kind = "AllocationState",
    plural = "allocationstates",
    shortname = "as",
    status = "AllocationStateStatus",
    printcolumn = r#"{"name": "Node", "type": "string", "jsonPath": ".spec.nodeName"}"#,
    printcolumn = r#"{"name": "Status", "type": "string", "jsonPath": ".status.status"}"#,
    printcolumn = r#"{"name": "Devices", "type": "integer", "jsonPath": ".status.deviceCount"}"#,
    printcolumn = r#"{"name": "Age", "type": "date", "jsonPath": ".metadata.creationTimestamp"}"#,
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct AllocationStateSpec {
    pub node_name: String,
}

/// CRD-native mirror of `AllocationStateRecord`; kept as a distinct type
/// (rather than deriving `CustomResource` on the domain struct directly)
/// since `kube::CustomResource` requires the spec type itself, not a
/// status field, to carry the derive.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AllocationStateStatus {
    #[serde(default)]
    pub status: AsrStatusWire,
    #[serde(default)]
    pub allocatable: BTreeMap<String, DeviceInfo>,
    #[serde(default)]
    pub tainted: BTreeMap<String, Taint>,
    #[serde(default)]
    pub allocated_claims: BTreeMap<String, AllocatedClaim>,
    #[serde(default)]
    pub device_count: u32,
    #[serde(default)]
    pub generation: u64,
}

/// `AsrStatus` has no `JsonSchema` impl of its own (it lives in the
/// dependency-free domain layer); this wire twin carries the derive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "PascalCase")]
pub enum AsrStatusWire {
    #[default]
    Pending,
    Ready,
    NotReady,
}

impl From<AsrStatus> for AsrStatusWire {
    fn from(s: AsrStatus) -> Self {
        match s {
            AsrStatus::Pending => AsrStatusWire::Pending,
            AsrStatus::Ready => AsrStatusWire::Ready,
            AsrStatus::NotReady => AsrStatusWire::NotReady,
        }
    }
}

impl From<AsrStatusWire> for AsrStatus {
    fn from(s: AsrStatusWire) -> Self {
        match s {
            AsrStatusWire::Pending => AsrStatus::Pending,
            AsrStatusWire::Ready => AsrStatus::Ready,
            AsrStatusWire::NotReady => AsrStatus::NotReady,
        }
    }
}

impl AllocationStateStatus {
    pub fn from_record(record: &AllocationStateRecord) -> Self {
        Self {
            status: record.status.into(),
            allocatable: record.allocatable.clone(),
            tainted: record.tainted.clone(),
            allocated_claims: record.allocated_claims.clone(),
            device_count: record.allocatable.len() as u32,
            generation: record.generation,
        }
    }

    pub fn to_record(&self, node_name: &str) -> AllocationStateRecord {
        AllocationStateRecord {
            node_name: node_name.to_string(),
            status: self.status.into(),
            allocatable: self.allocatable.clone(),
            tainted: self.tainted.clone(),
            allocated_claims: self.allocated_claims.clone(),
            generation: self.generation,
        }
    }
}

impl AllocationState {
    pub fn node_name(&self) -> &str {
        &self.spec.node_name
    }

    pub fn record(&self) -> AllocationStateRecord {
        self.status
            .as_ref()
            .map(|s| s.to_record(self.node_name()))
            .unwrap_or_else(|| AllocationStateRecord::new(self.node_name()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_record() {
        let mut record = AllocationStateRecord::new("node-1");
        record.status = AsrStatus::Ready;
        record.generation = 3;
        let status = AllocationStateStatus::from_record(&record);
        let back = status.to_record("node-1");
        assert_eq!(back.status, AsrStatus::Ready);
        assert_eq!(back.generation, 3);
    }
}
