//! Allocation pipeline - placement, concurrency control, and VF carving
//! shared by the controller (C9) and node plugin (C10).

pub mod mutex_table;
pub mod pending;
pub mod placement;
pub mod vf_carving;

pub use mutex_table::NodeMutexTable;
pub use pending::PendingClaims;
pub use placement::{PlacementCandidate, PlacementEngine, PlacementPolicy};
