//! Domain layer - core data model shared by the controller and node plugin
//!
//! No I/O lives here. Everything in this module is plain data plus the
//! validation rules spec'd for it; adapters and components live under
//! `external`, `allocation`, `controller`, and `nodeplugin`.

pub mod asr;
pub mod claim;
pub mod device;

pub use asr::{AllocationStateRecord, AsrStatus, InvariantViolation};
pub use claim::{AllocatedClaim, AllocatedDevice, ClaimRequest, ClassParameters, RequestedKind};
pub use device::{Capacity, DeviceInfo, DeviceKind, Health, Taint, TopologyHints, NEW_VF_PLACEHOLDER};
