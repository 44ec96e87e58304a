//! Node plugin binary (spec component C10): the kubelet-facing half of
//! the driver, running once per node. Serves `NodePrepareResources`/
//! `NodeUnprepareResources` over a Unix domain socket under the kubelet
//! plugin directory, and runs the ResourceSlice publisher and device
//! health poller as background tasks alongside health/metrics servers.

use accel_fabric_driver::error::{Error, Result};
use accel_fabric_driver::external::discovery::StaticDiscoverer;
use accel_fabric_driver::external::injection_registry::StaticInjectionRegistry;
use accel_fabric_driver::nodeplugin::{ClaimPreparationStore, HealthMonitor, NodeService, PrepareEngine, ResourceSlicePublisher};
use accel_fabric_driver::telemetry::{init_logging, run_health_server, run_metrics_server, Metrics, Readiness};
use accel_fabric_driver::{NodePluginConfig, DRIVER_NAME};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UnixListener;
use tokio_stream::wrappers::UnixListenerStream;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

async fn build_client(config: &NodePluginConfig) -> Result<kube::Client> {
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

fn socket_path(config: &NodePluginConfig) -> PathBuf {
    PathBuf::from(&config.kubelet_plugins_dir).join("accel-fabric.sock")
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = NodePluginConfig::parse();
    init_logging(&config.log_level, config.log_json);

    info!(
        version = accel_fabric_driver::VERSION,
        node = %config.node_name,
        "starting accel-fabric node plugin"
    );

    let metrics = Arc::new(Metrics::register()?);
    let _ = metrics;

    let client = build_client(&config).await?;
    let readiness = Readiness::new();
    let cancel = CancellationToken::new();

    let mutex_table = Arc::new(accel_fabric_driver::allocation::NodeMutexTable::default());
    let injection_registry = Arc::new(StaticInjectionRegistry::default());
    let discoverer = Arc::new(StaticDiscoverer::new(Vec::new()));

    tokio::fs::create_dir_all(&config.claim_preparation_dir)
        .await
        .map_err(|e| Error::ClaimPreparationIo(format!("creating {}: {e}", config.claim_preparation_dir)))?;
    let preparations = ClaimPreparationStore::new(&config.claim_preparation_dir);

    let prepare_engine = Arc::new(PrepareEngine::new(
        client.clone(),
        config.node_name.clone(),
        mutex_table.clone(),
        injection_registry,
        preparations,
    ));

    let resourceslice_publisher = ResourceSlicePublisher::new(
        client.clone(),
        config.node_name.clone(),
        DRIVER_NAME.to_string(),
        Duration::from_secs(config.resourceslice_interval_secs),
    );

    let health_monitor = HealthMonitor::new(
        client.clone(),
        config.node_name.clone(),
        mutex_table,
        discoverer,
        Duration::from_secs(config.health_poll_interval_secs),
    );

    tokio::fs::create_dir_all(&config.kubelet_plugins_dir)
        .await
        .map_err(Error::Io)?;
    let socket = socket_path(&config);
    let _ = tokio::fs::remove_file(&socket).await;
    let listener = UnixListener::bind(&socket).map_err(Error::Io)?;
    let incoming = UnixListenerStream::new(listener);

    readiness.mark_ready();

    let grpc_handle = tokio::spawn(async move {
        info!(socket = %socket.display(), "kubelet-facing grpc server listening");
        if let Err(e) = tonic::transport::Server::builder()
            .add_service(NodeService::new(prepare_engine).into_server())
            .serve_with_incoming(incoming)
            .await
        {
            error!(error = %e, "node plugin grpc server exited");
        }
    });

    let resourceslice_handle = {
        let cancel = cancel.clone();
        tokio::spawn(async move { resourceslice_publisher.run(cancel).await })
    };

    let health_handle = {
        let cancel = cancel.clone();
        tokio::spawn(async move { health_monitor.run(cancel).await })
    };

    let http_health_handle = tokio::spawn({
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
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received, cancelling background loops");
            cancel.cancel();
        }
        _ = grpc_handle => info!("grpc server exited"),
        _ = resourceslice_handle => info!("resourceslice publisher exited"),
        _ = health_handle => info!("health monitor exited"),
        _ = http_health_handle => info!("health server exited"),
        _ = metrics_handle => info!("metrics server exited"),
    }

    Ok(())
}
