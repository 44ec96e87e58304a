//! Node-local half of the driver (spec component C10): Unix-socket gRPC
//! server, claim preparation bookkeeping, VF materialization, ResourceSlice
//! republishing, and device health polling.

pub mod claim_preparation;
pub mod grpc;
pub mod health;
pub mod prepare;
pub mod resourceslice;

pub use claim_preparation::{ClaimPreparation, ClaimPreparationStore, PreparedDeviceRef};
pub use grpc::NodeService;
pub use health::HealthMonitor;
pub use prepare::PrepareEngine;
pub use resourceslice::ResourceSlicePublisher;
