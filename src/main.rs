//! MicroK8s operator - per-node configuration reconciler

use std::sync::Arc;

use clap::{Parser, Subcommand};
use futures::StreamExt;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client, CustomResourceExt};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use microk8s_operator::config::Settings;
use microk8s_operator::controller::{
    error_policy, reconcile, Context, KubeNodeStore, NodeStatusReporter,
};
use microk8s_operator::crd::{Configuration, MicroK8sNode};
use microk8s_operator::restart::ServiceManager;
use microk8s_operator::retry::{retry_with_backoff, RetryConfig};
use microk8s_operator::snapd::SnapdClient;
use microk8s_operator::FIELD_MANAGER;

/// Log filter used when RUST_LOG is not set
const DEFAULT_LOG_FILTER: &str = "info,microk8s_operator=debug,kube=info,hyper=warn";

/// MicroK8s operator - applies Configuration CRDs to the local MicroK8s node
#[derive(Parser, Debug)]
#[command(name = "microk8s-operator", version, about, long_about = None)]
struct Cli {
    /// Print the CRD manifests and exit
    #[arg(long)]
    crd: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run as controller on the current node
    ///
    /// Watches Configuration objects, applies `default` and
    /// `node.<NODE_NAME>` to the files under SNAP_DATA and keeps this node's
    /// MicroK8sNode status up to date.
    Controller(Settings),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.log_json);

    if cli.crd {
        let configuration = serde_yaml::to_string(&Configuration::crd())
            .map_err(|e| anyhow::anyhow!("Failed to serialize Configuration CRD: {}", e))?;
        let node = serde_yaml::to_string(&MicroK8sNode::crd())
            .map_err(|e| anyhow::anyhow!("Failed to serialize MicroK8sNode CRD: {}", e))?;
        println!("{configuration}---\n{node}");
        return Ok(());
    }

    match cli.command {
        Some(Commands::Controller(settings)) => run_controller(settings).await,
        None => Err(anyhow::anyhow!(
            "no command given, run `microk8s-operator controller` or pass --crd"
        )),
    }
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let (plain, json) = if json {
        (None, Some(fmt::layer().json()))
    } else {
        (Some(fmt::layer()), None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(plain)
        .with(json)
        .init();
}

/// Ensure the operator CRDs are installed
///
/// The operator installs its own CRDs on startup using server-side apply so
/// the CRD versions always match the operator version. The API server may
/// still be coming up on a freshly started node, so this is retried.
async fn ensure_crds_installed(client: &Client) -> anyhow::Result<()> {
    use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
    use kube::api::{Patch, PatchParams};

    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply(FIELD_MANAGER).force();
    let retry = RetryConfig::with_max_attempts(10);

    for (name, crd) in [
        (Configuration::crd_name(), Configuration::crd()),
        (MicroK8sNode::crd_name(), MicroK8sNode::crd()),
    ] {
        tracing::info!(crd = %name, "Installing CRD...");
        retry_with_backoff(&retry, "install_crd", || {
            let crds = crds.clone();
            let params = params.clone();
            let crd = crd.clone();
            async move { crds.patch(name, &params, &Patch::Apply(&crd)).await }
        })
        .await
        .map_err(|e| anyhow::anyhow!("Failed to install CRD {}: {}", name, e))?;
    }

    tracing::info!("All CRDs installed/updated");
    Ok(())
}

/// Run in controller mode
///
/// The Configuration controller and the node status reporter run side by
/// side. When the controller stops on SIGTERM/SIGINT the reporter is
/// cancelled, which deletes this node's MicroK8sNode object.
async fn run_controller(settings: Settings) -> anyhow::Result<()> {
    settings.validate()?;
    tracing::info!(
        node = %settings.node_name,
        snap_data = %settings.snap_data.display(),
        "MicroK8s operator starting..."
    );

    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    ensure_crds_installed(&client).await?;

    let snapd = SnapdClient::new(&settings.snap_socket);
    tracing::info!(socket = %snapd.socket_path().display(), "Using snapd");
    let manager: Arc<dyn ServiceManager> = Arc::new(snapd);

    let ctx = Arc::new(
        Context::builder(client.clone(), &settings.node_name, settings.paths())
            .service_manager(manager.clone())
            .build(),
    );

    let shutdown = CancellationToken::new();
    let reporter = NodeStatusReporter::new(
        Arc::new(KubeNodeStore::new(client.clone())),
        manager,
        settings.node_name.clone(),
        settings.status_interval(),
    );
    let reporter_task = tokio::spawn(reporter.run(shutdown.clone()));

    tracing::info!("Starting Configuration controller...");
    let configurations: Api<Configuration> = Api::all(client);
    Controller::new(configurations, WatcherConfig::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok(action) => {
                    tracing::debug!(?action, "Configuration reconciliation completed");
                }
                Err(e) => {
                    tracing::error!(error = ?e, "Configuration reconciliation error");
                }
            }
        })
        .await;

    tracing::info!("Configuration controller stopped, cleaning up node status");
    shutdown.cancel();
    if let Err(e) = reporter_task.await {
        tracing::warn!(error = %e, "Node status reporter task failed");
    }

    tracing::info!("MicroK8s operator shutting down");
    Ok(())
}
