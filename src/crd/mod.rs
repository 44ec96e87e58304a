//! Custom Resource Definitions published and consumed by the driver.
//!
//! - `AllocationState`: per-node ASR (component C4).
//! - `AccelClaimParameters` / `AccelClassParameters`: the parameter
//!   objects a `ResourceClaim`/`ResourceClass` reference resolves to.
//! - `AccelResourceSlice`: the scheduler-facing inventory publication
//!   (component C10).

pub mod allocation_state;
pub mod claim_params;
pub mod resource_slice;

pub use allocation_state::{AllocationState, AllocationStateSpec, AllocationStateStatus, AsrStatusWire};
pub use claim_params::{
    AccelClassParameters, AccelClassParametersSpec, AccelClaimParameters, AccelClaimParametersSpec,
    RequestedKindWire,
};
pub use resource_slice::{AccelResourceSlice, AccelResourceSliceSpec};
