// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use anyhow::Result;
use axum::{
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use clap::Parser;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Node;
use kube::{
    runtime::{controller::Action, reflector::ObjectRef, watcher::Config, Controller},
    Api, Client, ResourceExt,
};
use lbsync::{
    constants::{
        DEFAULT_METRICS_ADDRESS, DEFAULT_REQUEUE_SECS, ERROR_REQUEUE_SECS,
        KIND_EXTERNAL_LOAD_BALANCER,
    },
    crd::ExternalLoadBalancer,
    metrics,
    providers::default_registry,
    reconcilers::{reconcile_external_load_balancer, Context},
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

#[derive(Debug, thiserror::Error)]
#[error(transparent)]
struct ReconcileError(#[from] anyhow::Error);

/// Keeps external load balancer appliances in sync with the cluster's nodes.
#[derive(Debug, Parser)]
#[command(name = "lbsync", version, about)]
struct Args {
    /// Address serving `/metrics` and `/healthz`
    #[arg(long, env = "LBSYNC_METRICS_ADDRESS", default_value = DEFAULT_METRICS_ADDRESS)]
    metrics_address: SocketAddr,

    /// Seconds between reconciles of a healthy resource
    #[arg(long, env = "LBSYNC_REQUEUE_SECS", default_value_t = DEFAULT_REQUEUE_SECS)]
    requeue_secs: u64,

    /// Only watch resources in this namespace
    #[arg(long, env = "LBSYNC_WATCH_NAMESPACE")]
    namespace: Option<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Build Tokio runtime with custom thread names
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .thread_name("lbsync-controller")
        .enable_all()
        .build()?;

    runtime.block_on(async_main(args))
}

async fn async_main(args: Args) -> Result<()> {
    // Respects RUST_LOG (default: info) and RUST_LOG_FORMAT (text or json)
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let log_format = std::env::var("RUST_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    match log_format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .with_ansi(true)
                .compact()
                .init();
        }
    }

    info!("Starting external load balancer controller");
    debug!(?args, "Parsed arguments");

    let client = Client::try_default().await?;
    debug!("Kubernetes client initialized successfully");

    let registry = default_registry();
    info!("Registered providers: {}", registry.list().join(", "));

    let ctx = Context {
        client,
        registry: Arc::new(registry),
    };
    let requeue = Duration::from_secs(args.requeue_secs);

    tokio::select! {
        result = run_external_load_balancer_controller(ctx, requeue, args.namespace) => {
            info!("ExternalLoadBalancer controller stopped");
            result
        }
        result = run_metrics_server(args.metrics_address) => {
            error!("CRITICAL: metrics server exited unexpectedly: {:?}", result);
            result?;
            anyhow::bail!("metrics server exited unexpectedly without error")
        }
    }
}

/// Run the `ExternalLoadBalancer` controller.
///
/// Any node change requeues every known resource, since pool membership is
/// derived from the whole node list.
async fn run_external_load_balancer_controller(
    ctx: Context,
    requeue: Duration,
    namespace: Option<String>,
) -> Result<()> {
    let client = ctx.client.clone();
    let api: Api<ExternalLoadBalancer> = match namespace.as_deref() {
        Some(namespace) => {
            info!("Watching ExternalLoadBalancers in namespace {}", namespace);
            Api::namespaced(client.clone(), namespace)
        }
        None => Api::all(client.clone()),
    };
    let nodes: Api<Node> = Api::all(client);

    let controller = Controller::new(api, Config::default());
    let store = controller.store();

    controller
        .watches(nodes, Config::default(), move |_node: Node| {
            store
                .state()
                .iter()
                .map(|lb| ObjectRef::from_obj(lb.as_ref()))
                .collect::<Vec<_>>()
        })
        .shutdown_on_signal()
        .run(reconcile_wrapper, error_policy, Arc::new((ctx, requeue)))
        .for_each(|_| futures::future::ready(()))
        .await;

    Ok(())
}

/// Reconcile wrapper for `ExternalLoadBalancer`
async fn reconcile_wrapper(
    lb: Arc<ExternalLoadBalancer>,
    ctx: Arc<(Context, Duration)>,
) -> Result<Action, ReconcileError> {
    let start = Instant::now();
    let resource = format!("{}/{}", lb.namespace().unwrap_or_default(), lb.name_any());

    match reconcile_external_load_balancer(&ctx.0, &lb).await {
        Ok(()) => {
            metrics::record_reconciliation_success(KIND_EXTERNAL_LOAD_BALANCER, start.elapsed());
            if lb.metadata.deletion_timestamp.is_some() {
                info!("Cleaned up ExternalLoadBalancer: {}", resource);
                return Ok(Action::await_change());
            }
            debug!("Successfully reconciled ExternalLoadBalancer: {}", resource);
            Ok(Action::requeue(ctx.1))
        }
        Err(e) => {
            metrics::record_reconciliation_error(KIND_EXTERNAL_LOAD_BALANCER, start.elapsed());
            error!("Failed to reconcile ExternalLoadBalancer {}: {:#}", resource, e);
            Err(e.into())
        }
    }
}

/// Error policy for controller
fn error_policy(
    _resource: Arc<ExternalLoadBalancer>,
    _err: &ReconcileError,
    _ctx: Arc<(Context, Duration)>,
) -> Action {
    metrics::record_reconciliation_requeue(KIND_EXTERNAL_LOAD_BALANCER, "error");
    Action::requeue(Duration::from_secs(ERROR_REQUEUE_SECS))
}

/// Serve `/metrics` and `/healthz`.
async fn run_metrics_server(address: SocketAddr) -> Result<()> {
    let router = Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(|| async { "ok" }));

    let listener = tokio::net::TcpListener::bind(address).await?;
    info!("Serving metrics on http://{}/metrics", address);

    axum::serve(listener, router).await?;
    Ok(())
}

async fn metrics_handler() -> impl IntoResponse {
    match metrics::gather_metrics() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}
