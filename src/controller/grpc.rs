//! Scheduler-facing gRPC surface (spec component C9, section 6)
//!
//! Wraps a `Driver` implementation in the `DriverController` service
//! generated from `proto/dra_v1beta1.proto`, translating between the
//! wire messages and the domain's `ClaimRequest`/`ClassParameters`/
//! `AllocatedDevice` types.

use crate::controller::driver::Driver;
use crate::domain::claim::{AllocatedDevice, ClassParameters, RequestedKind};
use crate::error::Error;
use std::sync::Arc;
use tonic::{Request, Response, Status};
use tracing::warn;

pub mod pb {
    tonic::include_proto!("v1beta1");
}

use pb::driver_controller_server::{DriverController, DriverControllerServer};
use pb::{
    AllocateRequest, AllocateResponse, ClaimRequest as PbClaimRequest, ClassParameters as PbClassParameters,
    DeallocateRequest, DeallocateResponse, UnsuitableNodesRequest, UnsuitableNodesResponse,
};

fn parse_requested_kind(raw: &str) -> Result<RequestedKind, Status> {
    match raw {
        "gpu" => Ok(RequestedKind::Gpu),
        "vf" => Ok(RequestedKind::Vf),
        "any" => Ok(RequestedKind::Any),
        other => Err(Status::invalid_argument(format!("unknown claim kind: {other}"))),
    }
}

fn claim_from_pb(pb: &PbClaimRequest) -> Result<crate::domain::claim::ClaimRequest, Status> {
    Ok(crate::domain::claim::ClaimRequest {
        kind: parse_requested_kind(&pb.kind)?,
        count: pb.count,
        memory: pb.memory,
        millicores: pb.millicores,
        shareable: pb.shareable,
        monitor: pb.monitor,
    })
}

fn class_from_pb(pb: &PbClassParameters) -> ClassParameters {
    ClassParameters {
        shared: pb.shared,
        monitor: pb.monitor,
        device_selector: if pb.device_selector.is_empty() {
            None
        } else {
            Some(pb.device_selector.clone())
        },
    }
}

fn device_to_pb(device: AllocatedDevice) -> pb::AllocatedDevice {
    pb::AllocatedDevice {
        uid: device.uid,
        kind: device.kind.to_string(),
        memory: device.memory,
        millicores: device.millicores,
        parent_uid: device.parent_uid,
        vf_index: device.vf_index,
        profile: device.profile,
    }
}

fn error_to_status(e: Error) -> Status {
    match &e {
        Error::NotReady { .. } => Status::unavailable(e.to_string()),
        Error::InsufficientResources { .. } | Error::UnknownDevice { .. } | Error::ValidationError(_) => {
            Status::failed_precondition(e.to_string())
        }
        Error::Corruption { .. } => Status::data_loss(e.to_string()),
        Error::Conflict { .. } => Status::aborted(e.to_string()),
        _ => Status::internal(e.to_string()),
    }
}

pub struct ControllerService {
    driver: Arc<dyn Driver>,
}

impl ControllerService {
    pub fn new(driver: Arc<dyn Driver>) -> Self {
        Self { driver }
    }

    pub fn into_server(self) -> DriverControllerServer<Self> {
        DriverControllerServer::new(self)
    }
}

#[tonic::async_trait]
impl DriverController for ControllerService {
    async fn unsuitable_nodes(
        &self,
        request: Request<UnsuitableNodesRequest>,
    ) -> Result<Response<UnsuitableNodesResponse>, Status> {
        let req = request.into_inner();
        let class = req.class.map(|c| class_from_pb(&c)).unwrap_or_default();

        if req.claims.is_empty() {
            return Err(Status::invalid_argument("at least one claim is required"));
        }

        // Spec §4.4 step 3: a pod's claim set is evaluated together, not
        // just its first entry — a node unsuitable for any one claim
        // (e.g. a vf request that would need a gpu claim in the same
        // batch carved first) is unsuitable for the whole batch.
        let mut unsuitable = std::collections::BTreeSet::new();
        for pb_claim in &req.claims {
            let claim = claim_from_pb(pb_claim)?;
            let nodes = self
                .driver
                .unsuitable_nodes(&claim, &class, &req.candidate_nodes)
                .await
                .map_err(error_to_status)?;
            unsuitable.extend(nodes);
        }

        Ok(Response::new(UnsuitableNodesResponse {
            unsuitable_nodes: unsuitable.into_iter().collect(),
        }))
    }

    async fn allocate(&self, request: Request<AllocateRequest>) -> Result<Response<AllocateResponse>, Status> {
        let req = request.into_inner();
        let claim = req
            .claim
            .as_ref()
            .ok_or_else(|| Status::invalid_argument("claim is required"))?;
        let claim = claim_from_pb(claim)?;
        let class = req.class.map(|c| class_from_pb(&c)).unwrap_or_default();

        match self
            .driver
            .allocate(&req.node_name, &req.claim_uid, &claim, &class)
            .await
        {
            Ok(allocated) => Ok(Response::new(AllocateResponse {
                devices: allocated.devices.into_iter().map(device_to_pb).collect(),
                error: String::new(),
            })),
            Err(e) => {
                warn!(node = %req.node_name, claim = %req.claim_uid, error = %e, "allocate failed");
                Ok(Response::new(AllocateResponse {
                    devices: Vec::new(),
                    error: e.to_string(),
                }))
            }
        }
    }

    async fn deallocate(
        &self,
        request: Request<DeallocateRequest>,
    ) -> Result<Response<DeallocateResponse>, Status> {
        let req = request.into_inner();
        match self.driver.deallocate(&req.node_name, &req.claim_uid).await {
            Ok(()) => Ok(Response::new(DeallocateResponse { error: String::new() })),
            Err(e) => Ok(Response::new(DeallocateResponse { error: e.to_string() })),
        }
    }
}
