//! CLI / environment configuration for both binaries.
//!
//! Every flag is mirrored by an `env` var per the teacher's convention so
//! the driver can be configured purely through a Kubernetes Deployment's
//! `env:` block without a mounted flag file.

use clap::Parser;

pub const DRIVER_NAME: &str = "gpu.accel-fabric.io";

/// Controller binary (component C9): runs the DRA `Driver` reconciliation
/// loop against the Kubernetes API server.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct ControllerConfig {
    /// Path to a kubeconfig file; falls back to in-cluster config when unset.
    #[arg(long, env = "KUBECONFIG")]
    pub kubeconfig: Option<String>,

    /// Namespace the controller's own objects (leases, events) live in.
    #[arg(long, env = "POD_NAMESPACE", default_value = "accel-fabric-system")]
    pub pod_namespace: String,

    /// Health server bind address.
    #[arg(long, env = "HEALTH_ADDR", default_value = "0.0.0.0:8081")]
    pub health_addr: String,

    /// Metrics server bind address.
    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:8080")]
    pub metrics_addr: String,

    /// Scheduler-facing gRPC server bind address (spec §6: `DriverController`).
    #[arg(long, env = "GRPC_ADDR", default_value = "0.0.0.0:8082")]
    pub grpc_addr: String,

    /// Full resync period for the reconciliation loop, in seconds.
    #[arg(long, env = "RESYNC_INTERVAL_SECS", default_value = "300")]
    pub resync_interval_secs: u64,

    /// Placement policy applied across a node's eligible devices.
    #[arg(long, env = "PLACEMENT_POLICY", default_value = "balanced")]
    pub placement_policy: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Output logs as JSON.
    #[arg(long, env = "LOG_JSON")]
    pub log_json: bool,
}

/// Node plugin binary (component C10): serves the kubelet-facing gRPC
/// contract and keeps the local node's ASR/ResourceSlice up to date.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct NodePluginConfig {
    /// Name of the Kubernetes node this plugin runs on.
    #[arg(long, env = "NODE_NAME")]
    pub node_name: String,

    #[arg(long, env = "POD_NAMESPACE", default_value = "accel-fabric-system")]
    pub pod_namespace: String,

    #[arg(long, env = "KUBECONFIG")]
    pub kubeconfig: Option<String>,

    /// Directory the kubelet plugin-registration socket lives under.
    #[arg(long, env = "KUBELET_PLUGINS_DIR", default_value = "/var/lib/kubelet/plugins")]
    pub kubelet_plugins_dir: String,

    /// Directory the kubelet's plugin-registration watcher reads from.
    #[arg(
        long,
        env = "KUBELET_REGISTRY_DIR",
        default_value = "/var/lib/kubelet/plugins_registry"
    )]
    pub kubelet_registry_dir: String,

    /// Path the node plugin writes `ClaimPreparation` records to (C5).
    #[arg(
        long,
        env = "CLAIM_PREPARATION_DIR",
        default_value = "/var/lib/kubelet/accel-fabric/claim-preparations"
    )]
    pub claim_preparation_dir: String,

    #[arg(long, env = "HEALTH_ADDR", default_value = "0.0.0.0:8081")]
    pub health_addr: String,

    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:8080")]
    pub metrics_addr: String,

    /// How often to republish the node's `AccelResourceSlice`, in seconds.
    #[arg(long, env = "RESOURCESLICE_INTERVAL_SECS", default_value = "60")]
    pub resourceslice_interval_secs: u64,

    /// How often to poll device health and update taints, in seconds.
    #[arg(long, env = "HEALTH_POLL_INTERVAL_SECS", default_value = "30")]
    pub health_poll_interval_secs: u64,

    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[arg(long, env = "LOG_JSON")]
    pub log_json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn controller_config_defaults_parse() {
        ControllerConfig::command().debug_assert();
    }

    #[test]
    fn node_plugin_config_defaults_parse() {
        NodePluginConfig::command().debug_assert();
    }
}
