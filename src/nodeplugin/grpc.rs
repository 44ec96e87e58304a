//! Kubelet-facing gRPC surface (spec component C10)
//!
//! Implements the `Node` service generated from `proto/dra_v1beta1.proto`
//! over a Unix domain socket under the kubelet plugin directory. Each RPC
//! just demultiplexes over the claims in the request and delegates to
//! `PrepareEngine`; a single claim failing never fails the whole call,
//! matching the upstream kubelet contract of a per-claim error map.

use crate::nodeplugin::prepare::PrepareEngine;
use std::collections::HashMap;
use std::sync::Arc;
use tonic::{Request, Response, Status};
use tracing::warn;

pub mod pb {
    tonic::include_proto!("v1beta1");
}

use pb::node_server::{Node, NodeServer};
use pb::{
    Claim, Device, NodePrepareResourceResponse, NodePrepareResourcesRequest,
    NodePrepareResourcesResponse, NodeUnprepareResourceResponse, NodeUnprepareResourcesRequest,
    NodeUnprepareResourcesResponse,
};

pub struct NodeService {
    engine: Arc<PrepareEngine>,
}

impl NodeService {
    pub fn new(engine: Arc<PrepareEngine>) -> Self {
        Self { engine }
    }

    /// Wraps this service in the tonic-generated server type, ready to
    /// hand to a `tonic::transport::Server` bound to a Unix socket.
    pub fn into_server(self) -> NodeServer<Self> {
        NodeServer::new(self)
    }

    fn claim_key(claim: &Claim) -> String {
        claim.uid.clone()
    }
}

#[tonic::async_trait]
impl Node for NodeService {
    async fn node_prepare_resources(
        &self,
        request: Request<NodePrepareResourcesRequest>,
    ) -> Result<Response<NodePrepareResourcesResponse>, Status> {
        let req = request.into_inner();
        let mut claims = HashMap::with_capacity(req.claims.len());

        for claim in &req.claims {
            let key = Self::claim_key(claim);
            let response = match self.engine.prepare(&key).await {
                Ok(prep) => NodePrepareResourceResponse {
                    devices: prep
                        .devices
                        .into_iter()
                        .map(|d| Device {
                            request_name: d.request_name,
                            pool_name: d.pool_name,
                            device_name: d.device_name,
                            cdi_device_ids: d.cdi_device_ids,
                        })
                        .collect(),
                    error: String::new(),
                },
                Err(e) => {
                    warn!(claim = %key, error = %e, "NodePrepareResources failed for claim");
                    NodePrepareResourceResponse {
                        devices: Vec::new(),
                        error: e.to_string(),
                    }
                }
            };
            claims.insert(key, response);
        }

        Ok(Response::new(NodePrepareResourcesResponse { claims }))
    }

    async fn node_unprepare_resources(
        &self,
        request: Request<NodeUnprepareResourcesRequest>,
    ) -> Result<Response<NodeUnprepareResourcesResponse>, Status> {
        let req = request.into_inner();
        let mut claims = HashMap::with_capacity(req.claims.len());

        for claim in &req.claims {
            let key = Self::claim_key(claim);
            let response = match self.engine.unprepare(&key).await {
                Ok(()) => NodeUnprepareResourceResponse { error: String::new() },
                Err(e) => {
                    warn!(claim = %key, error = %e, "NodeUnprepareResources failed for claim");
                    NodeUnprepareResourceResponse { error: e.to_string() }
                }
            };
            claims.insert(key, response);
        }

        Ok(Response::new(NodeUnprepareResourcesResponse { claims }))
    }
}
