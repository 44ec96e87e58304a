//! ResourceSlice CRD
//!
//! Published periodically by the node plugin (component C10, spec §4.7)
//! so the scheduler can filter nodes without calling into the driver's
//! `UnsuitableNodes` RPC for every pod. One slice per node; republished
//! whenever the node's device inventory or taints change.

use crate::domain::device::{DeviceInfo, Taint};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "gpu.accel-fabric.io",
    version = "v1alpha1",
    kind = "AccelResourceSlice",
    plural = "accelresourceslices",
    shortname = "ars",
    printcolumn = r#"{"name": "Node", "type": "string", "jsonPath": ".spec.nodeName"}"#,
    printcolumn = r#"{"name": "Devices", "type": "integer", "jsonPath": ".spec.devices.length"}"#,
    printcolumn = r#"{"name": "Age", "type": "date", "jsonPath": ".metadata.creationTimestamp"}"#,
    namespaced = false
)]
#[serde(rename_all = "camelCase")]
pub struct AccelResourceSliceSpec {
    pub node_name: String,
    pub driver_name: String,
    #[serde(default)]
    pub devices: Vec<DeviceInfo>,
    #[serde(default)]
    pub tainted: BTreeMap<String, Taint>,
    /// Bumped on every republish; lets consumers detect a stale cached
    /// copy without relying on the object's `resourceVersion`.
    #[serde(default)]
    pub generation: u64,
}

impl AccelResourceSlice {
    pub fn untainted_devices(&self) -> impl Iterator<Item = &DeviceInfo> {
        self.spec
            .devices
            .iter()
            .filter(|d| !self.spec.tainted.get(&d.uid).is_some_and(|t| !t.is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::device::{Capacity, DeviceKind, Health, TopologyHints};
    use kube::core::ObjectMeta;

    fn device(uid: &str) -> DeviceInfo {
        DeviceInfo {
            uid: uid.to_string(),
            model: "model-a".into(),
            kind: DeviceKind::Gpu,
            parent_uid: None,
            capacity: Capacity::default(),
            topology_hints: TopologyHints::default(),
            health: Health::default(),
        }
    }

    #[test]
    fn untainted_devices_excludes_tainted_entries() {
        let mut tainted = BTreeMap::new();
        tainted.insert("gpu-1".to_string(), Taint {
            reasons: std::iter::once("ecc-error".to_string()).collect(),
        });
        let slice = AccelResourceSlice {
            metadata: ObjectMeta::default(),
            spec: AccelResourceSliceSpec {
                node_name: "node-1".into(),
                driver_name: "gpu.accel-fabric.io".into(),
                devices: vec![device("gpu-1"), device("gpu-2")],
                tainted,
                generation: 1,
            },
        };
        let untainted: Vec<_> = slice.untainted_devices().map(|d| d.uid.as_str()).collect();
        assert_eq!(untainted, vec!["gpu-2"]);
    }
}
