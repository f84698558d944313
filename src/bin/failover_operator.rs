//! Gunj multi-cluster failover operator
//!
//! Runs the health-driven failover monitor against the clusters listed in the
//! operator config, or performs one-shot failover operations.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use kube::config::KubeConfigOptions;
use kube::{Client, Config, CustomResourceExt};
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use gunj_failover::cluster::{KubeHealthChecker, KubeconfigRegistry};
use gunj_failover::config::OperatorConfig;
use gunj_failover::crd::ObservabilityPlatform;
use gunj_failover::failover::{Collaborators, FailoverManager};
use gunj_failover::hub::KubeHubStore;
use gunj_failover::metrics;
use gunj_failover::networking::{LoggingNetworkHook, NetworkHook, WebhookNetworkHook};
use gunj_failover::shutdown::{ShutdownCoordinator, SignalHandler};

#[derive(Parser, Debug)]
#[command(name = "failover-operator")]
#[command(about = "Multi-cluster failover for Gunj observability platforms")]
struct Args {
    /// Operator config file (JSON)
    #[arg(short, long, env = "FAILOVER_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the failover monitor until terminated
    Run {
        /// Metrics server port
        #[arg(short, long, default_value = "8080")]
        metrics_port: u16,

        /// Health check port
        #[arg(short = 'H', long, default_value = "8081")]
        health_port: u16,
    },
    /// Fail over from one cluster to another
    Trigger {
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
    },
    /// Revert a recorded failover
    Revert {
        #[arg(long)]
        id: String,
    },
    /// Print cluster and failover status as JSON
    Status,
    /// Run a failover drill
    Drill {
        /// primary-failure, network-partition or cascading-failure
        #[arg(long)]
        scenario: String,
    },
    /// Print the ObservabilityPlatform CRD as YAML
    Crd,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .json()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    if let Command::Crd = args.command {
        print!("{}", serde_yaml::to_string(&ObservabilityPlatform::crd())?);
        return Ok(());
    }

    let config = match &args.config {
        Some(path) => OperatorConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => {
            warn!("No config file given, using defaults");
            OperatorConfig::default()
        }
    };

    let manager = build_manager(&config).await?;

    match args.command {
        Command::Run {
            metrics_port,
            health_port,
        } => run(manager, metrics_port, health_port).await?,
        Command::Trigger { from, to } => {
            let result = manager.trigger_failover(&from, &to).await;
            manager.flush_history().await;
            let event = result?;
            println!("{}", serde_json::to_string_pretty(&event)?);
        }
        Command::Revert { id } => {
            let result = manager.revert_failover(&id).await;
            manager.flush_history().await;
            let event = result?;
            println!("{}", serde_json::to_string_pretty(&event)?);
        }
        Command::Status => {
            println!("{}", serde_json::to_string_pretty(&manager.failover_status())?);
        }
        Command::Drill { scenario } => {
            let result = manager.test_failover(&scenario).await;
            manager.flush_history().await;
            result?;
            println!("{}", serde_json::to_string_pretty(&manager.failover_status())?);
        }
        Command::Crd => {}
    }

    Ok(())
}

/// Wire the Kubernetes-backed collaborators and restore state from the hub.
async fn build_manager(config: &OperatorConfig) -> anyhow::Result<FailoverManager> {
    let hub_client = match &config.hub_context {
        Some(context) => {
            let options = KubeConfigOptions {
                context: Some(context.clone()),
                ..Default::default()
            };
            Client::try_from(Config::from_kubeconfig(&options).await?)?
        }
        None => Client::try_default().await?,
    };
    let hub = KubeHubStore::connect(hub_client, &config.hub_namespace).await?;

    let network: Arc<dyn NetworkHook> = match &config.networking_webhook {
        Some(url) => Arc::new(WebhookNetworkHook::new(url.clone())?),
        None => Arc::new(LoggingNetworkHook),
    };

    let registry = Arc::new(KubeconfigRegistry::new(config.clusters.clone()));
    let manager = FailoverManager::new(
        Collaborators {
            registry: registry.clone(),
            health: Arc::new(KubeHealthChecker::new(registry)),
            hub: Arc::new(hub),
            network,
        },
        config.settings.clone(),
    );

    manager.restore_from_hub().await?;
    if manager.config().is_none() {
        if let Some(initial) = &config.failover {
            info!("No failover config on hub, applying the one from the config file");
            manager.configure_failover(initial.clone()).await?;
        }
    }

    Ok(manager)
}

async fn run(manager: FailoverManager, metrics_port: u16, health_port: u16) -> anyhow::Result<()> {
    info!(
        configured = manager.config().is_some(),
        "Starting failover operator"
    );

    let coordinator = ShutdownCoordinator::with_timeout(manager.settings().shutdown_grace);

    let signals = SignalHandler::new(coordinator.clone());
    tokio::spawn(async move {
        if let Err(e) = signals.run().await {
            error!(error = %e, "Failed to install signal handlers");
        }
    });

    let metrics_handle = tokio::spawn(metrics::run_metrics_server(metrics_port));
    let health_handle = tokio::spawn(run_health_server(health_port));

    let monitor = manager.start_monitoring(coordinator.clone());

    tokio::select! {
        _ = coordinator.wait_for_shutdown() => info!("Shutdown requested"),
        result = metrics_handle => {
            error!(result = ?result, "Metrics server stopped");
            coordinator.shutdown();
        }
        result = health_handle => {
            error!(result = ?result, "Health server stopped");
            coordinator.shutdown();
        }
    }

    monitor.join().await;
    manager.flush_history().await;
    info!("Failover operator stopped");
    Ok(())
}

async fn run_health_server(port: u16) -> std::io::Result<()> {
    use std::net::SocketAddr;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!(port = %port, "Health server started");

    loop {
        if let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;

                let response = "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 2\r\n\r\nOK";
                let _ = socket.write_all(response.as_bytes()).await;
            });
        }
    }
}
