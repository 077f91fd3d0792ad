use futures::StreamExt;
use gateway_api::apis::standard::httproutes::HTTPRoute;
use isvc_ingress::config::{controller_namespace, load_ingress_config, system_namespace};
use isvc_ingress::controller::ingress::reconcile::DEFAULT_REQUEUE_SECONDS;
use isvc_ingress::controller::store::Stores;
use isvc_ingress::controller::{error_policy, reconcile, Context};
use isvc_ingress::crd::inference_service::InferenceService;
use isvc_ingress::crd::virtual_service::VirtualService;
use isvc_ingress::server::{
    create_metrics, run_health_server, shutdown_channel, wait_for_signal, ReadinessState,
};
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::networking::v1::Ingress;
use kube::runtime::{watcher, Controller};
use kube::{Api, Client};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Default port for health and metrics endpoints
const HEALTH_PORT: u16 = 8080;

/// Parse a port override, falling back to the default on absence or garbage
fn parse_port(raw: Option<&str>, default: u16) -> u16 {
    raw.and_then(|v| v.trim().parse::<u16>().ok())
        .filter(|port| *port != 0)
        .unwrap_or(default)
}

/// Parse a requeue interval in seconds, falling back to the default
fn parse_requeue(raw: Option<&str>) -> Duration {
    let secs = raw
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .unwrap_or(DEFAULT_REQUEUE_SECONDS);
    Duration::from_secs(secs)
}

/// Health server port from env (default: 8080)
fn get_health_port() -> u16 {
    parse_port(
        std::env::var("ISVC_INGRESS_HEALTH_PORT").ok().as_deref(),
        HEALTH_PORT,
    )
}

/// Requeue interval after a successful reconcile from env (default: 300s)
fn get_requeue_interval() -> Duration {
    parse_requeue(std::env::var("ISVC_INGRESS_REQUEUE_SECONDS").ok().as_deref())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("Starting InferenceService ingress controller");

    let (shutdown_controller, shutdown_signal) = shutdown_channel();

    // Not ready until the controller loop starts
    let readiness = ReadinessState::new();

    let metrics = create_metrics()?;
    info!("Prometheus metrics registry initialized");

    let client = match Client::try_default().await {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "Failed to create Kubernetes client");
            return Err(e.into());
        }
    };
    info!("Connected to Kubernetes cluster");

    let namespace = controller_namespace();
    let ingress_config = match load_ingress_config(&client, &namespace).await {
        Ok(config) => config,
        Err(e) => {
            error!(namespace = %namespace, error = %e, "Failed to load ingress config");
            return Err(e.into());
        }
    };
    info!(
        namespace = %namespace,
        ingress_domain = %ingress_config.ingress_domain,
        gateway_api = ingress_config.enable_gateway_api,
        "Ingress config loaded"
    );

    let health_port = get_health_port();
    let health_readiness = readiness.clone();
    let health_metrics = metrics.clone();
    let health_shutdown = shutdown_signal;
    let health_handle = tokio::spawn(async move {
        if let Err(e) =
            run_health_server(health_port, health_readiness, health_metrics, health_shutdown).await
        {
            warn!(error = %e, "Health server failed");
        }
    });
    info!(port = health_port, "Health server task spawned");

    let ctx = Arc::new(Context::new(
        Stores::kube(client.clone()),
        ingress_config,
        system_namespace(),
        get_requeue_interval(),
        Some(metrics.clone()),
    ));

    readiness.set_ready();
    info!("Controller ready, starting reconciliation loop");

    // error_policy already logs failures, so only successes are logged here
    let controller = Controller::new(
        Api::<InferenceService>::all(client.clone()),
        watcher::Config::default(),
    )
    .owns(Api::<Ingress>::all(client.clone()), watcher::Config::default())
    .owns(Api::<Service>::all(client.clone()), watcher::Config::default())
    .owns(Api::<HTTPRoute>::all(client.clone()), watcher::Config::default())
    .owns(Api::<VirtualService>::all(client), watcher::Config::default())
    .run(reconcile, error_policy, ctx)
    .for_each(|res| async move {
        if let Ok(o) = res {
            info!("Reconciled: {:?}", o);
        }
    });

    tokio::select! {
        _ = controller => {
            info!("Controller stream ended");
        }
        signal = wait_for_signal() => {
            match signal {
                Ok(name) => info!(signal = name, "Initiating graceful shutdown"),
                Err(e) => warn!(error = %e, "Signal handler failed, shutting down"),
            }
            // Stop receiving traffic while shutting down
            readiness.set_not_ready();
        }
    }

    shutdown_controller.shutdown();

    info!("Stopping components...");
    if let Err(e) = health_handle.await {
        warn!(error = %e, "Health server task did not stop cleanly");
    }

    info!("InferenceService ingress controller shut down gracefully");
    Ok(())
}

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;
