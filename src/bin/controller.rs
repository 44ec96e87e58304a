//! Controller binary (spec component C9): the scheduler-facing half of
//! the driver. Serves the `DriverController` gRPC contract
//! (`UnsuitableNodes`/`Allocate`/`Deallocate`) the orchestrator's
//! allocation pipeline drives, and runs the `AllocationState`
//! reconciliation loop alongside health/metrics servers.

use accel_fabric_driver::allocation::placement::PlacementPolicy;
use accel_fabric_driver::allocation::{NodeMutexTable, PendingClaims};
use accel_fabric_driver::controller::grpc::ControllerService;
use accel_fabric_driver::controller::{reconcile, Driver, KubeDriver};
use accel_fabric_driver::external::vf_profile::StaticVfProfileTable;
use accel_fabric_driver::telemetry::{init_logging, run_health_server, run_metrics_server, Metrics, Readiness};
use accel_fabric_driver::{ControllerConfig, Error, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

fn parse_placement_policy(raw: &str) -> PlacementPolicy {
    match raw.to_lowercase().as_str() {
        "balanced" => PlacementPolicy::Balanced,
        "packed" => PlacementPolicy::Packed,
        _ => PlacementPolicy::None,
    }
}

async fn build_client(config: &ControllerConfig) -> Result<kube::Client> {
    let kube_config = match &config.kubeconfig {
        Some(path) => {
            let kubeconfig = kube::config::Kubeconfig::read_from(path)
                .map_err(|e| Error::Configuration(format!("reading kubeconfig {path}: {e}")))?;
            kube::Config::from_custom_kubeconfig(kubeconfig, &kube::config::KubeConfigOptions::default())
                .await
                .map_err(|e| Error::Configuration(format!("building config from kubeconfig: {e}")))?
        }
        None => kube::Config::infer()
            .await
            .map_err(|e| Error::Configuration(format!("inferring in-cluster config: {e}")))?,
    };
    kube::Client::try_from(kube_config).map_err(Error::Kube)
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = ControllerConfig::parse();
    init_logging(&config.log_level, config.log_json);

    info!(
        version = accel_fabric_driver::VERSION,
        namespace = %config.pod_namespace,
        "starting accel-fabric controller"
    );

    let metrics = Arc::new(Metrics::register()?);
    let _ = metrics;

    let client = build_client(&config).await?;
    let readiness = Readiness::new();

    let mutex_table = Arc::new(NodeMutexTable::default());
    let pending = Arc::new(PendingClaims::default());
    let vf_profiles = Arc::new(StaticVfProfileTable::default());
    let placement_policy = parse_placement_policy(&config.placement_policy);

    let driver: Arc<dyn Driver> = Arc::new(KubeDriver::new(
        client.clone(),
        mutex_table,
        pending,
        vf_profiles,
        placement_policy,
    ));

    let grpc_addr = config
        .grpc_addr
        .parse()
        .map_err(|e| Error::Configuration(format!("invalid grpc server address: {e}")))?;

    readiness.mark_ready();

    let resync_interval = Duration::from_secs(config.resync_interval_secs);
    let reconcile_client = client.clone();

    let reconcile_handle = tokio::spawn(async move {
        reconcile::run(reconcile_client, resync_interval).await;
    });

    let grpc_handle = tokio::spawn(async move {
        info!(addr = %grpc_addr, "scheduler-facing grpc server listening");
        if let Err(e) = tonic::transport::Server::builder()
            .add_service(ControllerService::new(driver).into_server())
            .serve(grpc_addr)
            .await
        {
            error!(error = %e, "controller grpc server exited");
        }
    });

    let health_handle = tokio::spawn({
        let addr = config.health_addr.clone();
        let readiness = readiness.clone();
        async move {
            if let Err(e) = run_health_server(&addr, readiness).await {
                error!(error = %e, "health server exited");
            }
        }
    });

    let metrics_handle = tokio::spawn({
        let addr = config.metrics_addr.clone();
        async move {
            if let Err(e) = run_metrics_server(&addr).await {
                error!(error = %e, "metrics server exited");
            }
        }
    });

    tokio::select! {
        _ = reconcile_handle => info!("reconcile loop exited"),
        _ = grpc_handle => info!("grpc server exited"),
        _ = health_handle => info!("health server exited"),
        _ = metrics_handle => info!("metrics server exited"),
    }

    Ok(())
}
