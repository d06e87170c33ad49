use clap::{Parser, Subcommand};
use quasar_core::GroupVersionResource;
use quasar_deletion::{
    ContentDeleter, DeletionController, DeletionControllerConfig, HttpClusterClient,
    LogicalClusterWatcher, WatcherConfig,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Parser)]
#[command(name = "quasar", about = "Quasar multi-tenant control plane")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the logical cluster deletion controller
    DeletionController {
        /// Base URL of this shard's API endpoint
        #[arg(long, env = "QUASAR_API_URL", default_value = "http://127.0.0.1:6443")]
        api_url: String,
        /// Externally reachable URL of this shard, used for owner cleanup
        #[arg(long, env = "QUASAR_SHARD_EXTERNAL_URL")]
        shard_external_url: String,
        /// Number of parallel reconcile workers
        #[arg(long, default_value_t = 2)]
        workers: usize,
        /// Seconds between logical cluster re-lists
        #[arg(long, default_value_t = 2)]
        poll_interval_secs: u64,
        /// Resource type to drain, as group/version/resource (repeatable;
        /// core-group types as version/resource, e.g. "v1/configmaps")
        #[arg(long = "drain-resource")]
        drain_resources: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> miette::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::DeletionController {
            api_url,
            shard_external_url,
            workers,
            poll_interval_secs,
            drain_resources,
        } => {
            run_deletion_controller(
                &api_url,
                &shard_external_url,
                workers,
                poll_interval_secs,
                &drain_resources,
            )
            .await
        }
    }
}

/// Run the deletion controller: watcher + event bridge + worker pool
async fn run_deletion_controller(
    api_url: &str,
    shard_external_url: &str,
    workers: usize,
    poll_interval_secs: u64,
    drain_resources: &[String],
) -> miette::Result<()> {
    info!("Starting quasar logical cluster deletion controller");

    let resources = parse_drain_resources(drain_resources)?;
    let client = Arc::new(HttpClusterClient::new(api_url));
    let deleter = Arc::new(ContentDeleter::new(client.clone(), resources));

    let shard_url = shard_external_url.to_string();
    let controller = DeletionController::new(
        client.clone(),
        deleter,
        Arc::new(move || shard_url.clone()),
        DeletionControllerConfig {
            num_workers: workers,
        },
    );

    let token = CancellationToken::new();
    let (event_tx, event_rx) = broadcast::channel(256);

    // 1. Spawn the watcher feeding the event channel
    let watcher = LogicalClusterWatcher::new(
        client,
        event_tx,
        WatcherConfig {
            poll_interval: Duration::from_secs(poll_interval_secs),
        },
    );
    let watcher_handle = tokio::spawn(watcher.run(token.clone()));

    // 2. Spawn the bridge feeding the controller's queue
    let bridge = controller.event_bridge();
    let bridge_handle = tokio::spawn(bridge.run(event_rx, token.clone()));

    // 3. Spawn the controller itself
    let controller_token = token.clone();
    let controller_handle = tokio::spawn(async move {
        controller.start(controller_token).await;
    });

    info!("All components started");

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| miette::miette!("Failed to listen for ctrl-c: {}", e))?;

    info!("Shutting down gracefully...");
    token.cancel();

    // Wait for all tasks to finish with a timeout
    let shutdown_timeout = Duration::from_secs(5);
    let _ = tokio::time::timeout(shutdown_timeout, async {
        let _ = tokio::join!(watcher_handle, bridge_handle, controller_handle);
    })
    .await;

    info!("Shutdown complete");

    Ok(())
}

/// Parse `group/version/resource` flags; two segments mean the core group
fn parse_drain_resources(specs: &[String]) -> miette::Result<Vec<GroupVersionResource>> {
    specs
        .iter()
        .map(|spec| {
            let parts: Vec<&str> = spec.split('/').collect();
            match parts.as_slice() {
                [version, resource] => Ok(GroupVersionResource::new("", *version, *resource)),
                [group, version, resource] => {
                    Ok(GroupVersionResource::new(*group, *version, *resource))
                }
                _ => Err(miette::miette!(
                    "Invalid drain resource '{}': expected group/version/resource",
                    spec
                )),
            }
        })
        .collect()
}
