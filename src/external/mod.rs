//! External ports - boundaries between the allocation domain and the
//! systems it depends on but does not own (spec components C1-C3).
//!
//! Each port is a trait plus an `Arc<dyn Trait>` alias, following the
//! hexagonal-adapter shape; concrete adapters live alongside the trait
//! for now since the driver ships one reference implementation of each.

pub mod discovery;
pub mod injection_registry;
pub mod vf_profile;

pub use discovery::{Discoverer, DiscovererRef};
pub use injection_registry::{InjectionRegistry, InjectionRegistryRef};
pub use vf_profile::{VfProfileTable, VfProfileTableRef};
