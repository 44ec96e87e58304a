//! ClaimParameters / ClassParameters CRDs
//!
//! The scheduler resolves a `ResourceClaim`'s parameter reference to one
//! of these objects; the controller reads them to build the domain
//! `ClaimRequest`/`ClassParameters` the allocation pipeline actually
//! operates on.

use crate::domain::claim::{ClaimRequest, ClassParameters, RequestedKind};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "gpu.accel-fabric.io",
    version = "v1alpha1",
    kind = "AccelClaimParameters",
    plural = "accelclaimparameters",
    shortname = "acp",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct AccelClaimParametersSpec {
    pub kind: RequestedKindWire,
    #[serde(default = "default_count")]
    pub count: u32,
    #[serde(default)]
    pub memory: u64,
    #[serde(default)]
    pub millicores: u32,
    #[serde(default)]
    pub shareable: bool,
    #[serde(default)]
    pub monitor: bool,
}

fn default_count() -> u32 {
    1
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum RequestedKindWire {
    Gpu,
    Vf,
    Any,
}

impl From<RequestedKindWire> for RequestedKind {
    fn from(k: RequestedKindWire) -> Self {
        match k {
            RequestedKindWire::Gpu => RequestedKind::Gpu,
            RequestedKindWire::Vf => RequestedKind::Vf,
            RequestedKindWire::Any => RequestedKind::Any,
        }
    }
}

impl From<&AccelClaimParametersSpec> for ClaimRequest {
    fn from(spec: &AccelClaimParametersSpec) -> Self {
        ClaimRequest {
            kind: spec.kind.into(),
            count: spec.count,
            memory: spec.memory,
            millicores: spec.millicores,
            shareable: spec.shareable,
            monitor: spec.monitor,
        }
    }
}

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "gpu.accel-fabric.io",
    version = "v1alpha1",
    kind = "AccelClassParameters",
    plural = "accelclassparameters",
    shortname = "acl",
    namespaced = false
)]
#[serde(rename_all = "camelCase")]
pub struct AccelClassParametersSpec {
    #[serde(default)]
    pub shared: bool,
    #[serde(default)]
    pub monitor: bool,
    #[serde(default)]
    pub device_selector: Option<String>,
}

impl From<&AccelClassParametersSpec> for ClassParameters {
    fn from(spec: &AccelClassParametersSpec) -> Self {
        ClassParameters {
            shared: spec.shared,
            monitor: spec.monitor,
            device_selector: spec.device_selector.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claim_parameters_convert_to_domain_request() {
        let spec = AccelClaimParametersSpec {
            kind: RequestedKindWire::Vf,
            count: 2,
            memory: 2048,
            millicores: 250,
            shareable: false,
            monitor: false,
        };
        let claim: ClaimRequest = (&spec).into();
        assert_eq!(claim.count, 2);
        assert_eq!(claim.kind, RequestedKind::Vf);
    }
}
