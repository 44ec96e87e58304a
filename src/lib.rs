//! accel-fabric-driver - Dynamic Resource Allocation driver for
//! heterogeneous accelerators
//!
//! A cluster-side resource driver implementing the Kubernetes Dynamic
//! Resource Allocation contract for GPUs, Gaudi AI accelerators, and QAT
//! crypto/compression engines. The driver is split into a controller
//! (scheduler-facing, cluster-scoped) and a node plugin (kubelet-facing,
//! one per node), connected through the `AllocationState` CRD acting as
//! the authoritative per-node allocation record.
//!
//! # Modules
//!
//! - [`domain`]: dependency-free data model (devices, claims, the ASR)
//!   and its invariants.
//! - [`external`]: ports to things outside this crate's control -
//!   hardware discovery, the CDI injection registry, VF profile tables.
//! - [`allocation`]: the allocation engine - per-node locking, the
//!   pending-claims cache, placement policy, VF carving.
//! - [`crd`]: the Kubernetes-native wire types (`AllocationState`,
//!   claim/class parameters, `AccelResourceSlice`).
//! - [`controller`]: the scheduler-facing `Driver` implementation and its
//!   reconciliation loop.
//! - [`nodeplugin`]: the kubelet-facing gRPC service, claim preparation,
//!   VF materialization, ResourceSlice publication, health polling.
//! - [`config`]: CLI configuration for both binaries.
//! - [`telemetry`]: logging, health, and metrics wiring shared by both.
//! - [`error`]: the driver's unified error type and retry policy.

pub mod allocation;
pub mod config;
pub mod controller;
pub mod crd;
pub mod domain;
pub mod error;
pub mod external;
pub mod nodeplugin;
pub mod telemetry;

pub use config::{ControllerConfig, NodePluginConfig, DRIVER_NAME};
pub use error::{Error, ErrorAction, Result};

/// Library version, as published in the crate's build metadata.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name, as published in the crate's build metadata.
pub const NAME: &str = env!("CARGO_PKG_NAME");
