//! PeerMatch CLI and Service Binary
//!
//! Entry point for the matchmaking service. Provides commands for
//! initializing, validating, and starting the service.

mod shutdown;

use anyhow::{Context, Result};
use cli::{Cli, Commands};
use config::{generate_default_config, load_config, save_config, validate_config, MasterConfig};
use matchmaking::{
    create_cache, create_store, ChannelNotifier, HttpProvisioner, MatchingService, MockProvisioner,
    QueueWorker, WorkspaceProvisioner,
};
use observability::{init_logging, init_metrics, LogFormat, MatchmakingMetrics};
use shutdown::ShutdownController;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();

    match cli.command {
        Commands::Start {
            config,
            domain,
            metrics_port,
            no_worker,
        } => start_service(config, domain, metrics_port, no_worker).await,
        Commands::Validate { config } => {
            init_logging("peermatch", LogFormat::Pretty, None)?;
            info!("Executing 'validate' command");
            validate_command(config).await
        }
        Commands::Init { output } => {
            init_logging("peermatch", LogFormat::Pretty, None)?;
            info!("Executing 'init' command");
            init_command(output).await
        }
    }
}

async fn start_service(
    config_path: PathBuf,
    domain_override: Option<String>,
    metrics_port_override: Option<u16>,
    no_worker: bool,
) -> Result<()> {
    let mut config = load_config(&config_path)?;
    if let Some(domain) = domain_override {
        config.service.domain = domain;
    }

    let format = LogFormat::parse(&config.service.log_format).unwrap_or_default();
    init_logging(&config.service.name, format, config.service.log_filter.as_deref())?;
    info!(service = %config.service.name, domain = %config.service.domain, "PeerMatch starting...");

    let report = validate_config(&config);
    for warning in &report.warnings {
        warn!(field = %warning.field, message = %warning.message, "Configuration warning");
    }
    if !report.is_valid() {
        error!(
            error_count = report.errors.len(),
            "Configuration validation failed"
        );
        for err in &report.errors {
            error!("{}", err);
        }
        anyhow::bail!("Cannot start service due to configuration errors");
    }

    if let Some(monitoring) = &config.monitoring {
        if monitoring.metrics_enabled {
            init_metrics(metrics_port_override.unwrap_or(monitoring.metrics_port))?;
        }
    }

    let service = Arc::new(build_service(&config).await?);
    let shutdown = ShutdownController::with_ctrl_c();

    let worker_handle = if config.worker.enabled && !no_worker {
        let worker = QueueWorker::new(service.clone(), &config.worker);
        let token = shutdown.child_token();
        Some(tokio::spawn(async move { worker.run(token).await }))
    } else {
        info!("Queue worker disabled");
        None
    };

    info!("Matchmaking service running. Press Ctrl+C to stop.");
    shutdown.wait_for_shutdown().await;

    if let Some(handle) = worker_handle {
        if let Err(e) = handle.await {
            error!("Queue worker task failed: {}", e);
        }
    }

    info!("PeerMatch stopped");
    Ok(())
}

/// Wire the matching service from configuration
async fn build_service(config: &MasterConfig) -> Result<MatchingService> {
    let store = create_store(&config.store)
        .await
        .context("Failed to create durable store")?;
    let cache = create_cache(&config.cache)
        .await
        .context("Failed to create cache")?;
    let provisioner = build_provisioner(config)?;
    let notifier = Arc::new(ChannelNotifier::new());

    debug!(
        store = %config.store.store_type,
        cache = %config.cache.cache_type,
        provider = %config.provisioning.provider,
        "Collaborators ready"
    );

    Ok(MatchingService::new(
        store,
        cache,
        provisioner,
        notifier,
        MatchmakingMetrics::new(&config.service.domain),
    ))
}

fn build_provisioner(config: &MasterConfig) -> Result<Arc<dyn WorkspaceProvisioner>> {
    let provisioning = &config.provisioning;
    match provisioning.provider.to_lowercase().as_str() {
        "mock" => {
            warn!("Using mock workspace provisioner");
            Ok(Arc::new(MockProvisioner::new()))
        }
        "http" => {
            let base_url = provisioning
                .base_url
                .as_deref()
                .context("provisioning.base_url is required for the http provider")?;
            let timeout = Duration::from_secs(provisioning.timeout_seconds);
            info!(%base_url, "Using HTTP workspace provisioner");
            Ok(Arc::new(HttpProvisioner::new(base_url, timeout)?))
        }
        other => anyhow::bail!("Unknown provisioning provider: {}", other),
    }
}

async fn validate_command<P: AsRef<Path>>(config_path: P) -> Result<()> {
    info!(path = ?config_path.as_ref(), "Validating configuration");

    let config = match load_config(&config_path) {
        Ok(c) => c,
        Err(e) => {
            error!(%e, "Failed to load configuration");
            anyhow::bail!(e);
        }
    };

    let report = validate_config(&config);

    println!("\n=== Configuration Validation Report ===\n");

    if !report.defaults_applied.is_empty() {
        println!("Defaults Applied ({}):", report.defaults_applied.len());
        for default in &report.defaults_applied {
            println!("  [info] {} = {}", default.field, default.value);
        }
        println!();
    }

    if !report.warnings.is_empty() {
        println!("Warnings ({}):", report.warnings.len());
        for warning in &report.warnings {
            println!("  [warn] [{}] {}", warning.field, warning.message);
        }
        println!();
    }

    if !report.errors.is_empty() {
        println!("Errors ({}):", report.errors.len());
        for err in &report.errors {
            println!("  [error] {}", err);
        }
        println!();
        anyhow::bail!("Configuration validation failed");
    }

    println!("[ok] Configuration is valid!");
    println!();
    println!("Service: {}", config.service.name);
    println!("Domain: {}", config.service.domain);
    println!("Store: {}", config.store.store_type);
    println!("Cache: {}", config.cache.cache_type);
    println!("Provisioning: {}", config.provisioning.provider);
    println!(
        "Worker: {} (every {}s)",
        if config.worker.enabled { "enabled" } else { "disabled" },
        config.worker.interval_seconds
    );

    Ok(())
}

async fn init_command<P: AsRef<Path>>(output_path: P) -> Result<()> {
    let output_path = output_path.as_ref();
    info!(?output_path, "Initializing new configuration file");

    let config = generate_default_config();

    if let Some(parent) = output_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {:?}", parent))?;
    }

    save_config(&config, output_path)?;

    println!("[ok] Configuration file created successfully!");
    println!();
    println!("Location: {:?}", output_path);
    println!();
    println!("Next steps:");
    println!("  1. Edit the configuration file to choose store, cache and provisioning backends");
    println!("  2. Set required environment variables (database and cache connections)");
    println!(
        "  3. Run 'peermatch validate --config {:?}' to check configuration",
        output_path
    );
    println!(
        "  4. Run 'peermatch start --config {:?}' to start the service",
        output_path
    );

    Ok(())
}
