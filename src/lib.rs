pub mod api;
pub mod cli;
pub mod client;
pub mod config;
pub mod constants;
pub mod db;
pub mod entities;
pub mod inference;
pub mod models;
pub mod services;
pub mod state;
pub mod validation;

use std::sync::Arc;
use tokio::signal;

use anyhow::Context;
use clap::Parser;
use cli::{Cli, Commands};
pub use config::Config;
use metrics_exporter_prometheus::PrometheusHandle;
use services::Maintenance;
use state::SharedState;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Entry point for the binary. `config` is already loaded and validated.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let cli = Cli::parse();

    let serving = matches!(cli.command, Some(Commands::Serve));
    init_tracing(&config, serving)?;

    match cli.command {
        Some(Commands::Serve) => {
            let prometheus_handle = init_metrics(&config)?;
            run_server(config, prometheus_handle).await
        }

        Some(Commands::Init) => {
            if Config::create_default_if_missing()? {
                println!("✓ Config file created. Edit config.toml and run again.");
            } else {
                println!("config.toml already exists, leaving it untouched.");
            }
            Ok(())
        }

        Some(Commands::Seed) => cli::cmd_seed(&config).await,
        Some(Commands::Users) => cli::cmd_list_users(&config).await,
        Some(Commands::History { email, limit }) => cli::cmd_history(&config, &email, limit).await,
        Some(Commands::Register {
            name,
            email,
            password,
        }) => cli::cmd_register(&config, &name, &email, &password).await,
        Some(Commands::Login {
            email,
            password,
            emergency,
        }) => cli::cmd_login(&config, &email, &password, emergency).await,
        Some(Commands::Logout) => cli::cmd_logout(&config),
        Some(Commands::Whoami) => cli::cmd_whoami(&config).await,
        Some(Commands::Analyze { path, emergency }) => {
            cli::cmd_analyze(&config, &path, emergency).await
        }
        Some(Commands::Report { id }) => cli::cmd_report(&config, id).await,
        Some(Commands::Status { watch }) => cli::cmd_status(&config, watch).await,

        None => {
            use clap::CommandFactory;
            Cli::command().print_help()?;
            Ok(())
        }
    }
}

/// CLI commands log quietly unless `RUST_LOG` says otherwise.
fn init_tracing(config: &Config, serving: bool) -> anyhow::Result<()> {
    use tracing_subscriber::{Layer, layer::SubscriberExt, util::SubscriberInitExt};

    let default_level = if serving {
        config.general.log_level.as_str()
    } else {
        "warn"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let fmt_layer = if config.general.log_format == "json" {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer);

    if serving && config.observability.loki_enabled {
        let url = url::Url::parse(&config.observability.loki_url).context("Invalid Loki URL")?;

        let (layer, task) = tracing_loki::builder()
            .label("app", "mediscan")?
            .extra_field("env", "production")?
            .build_url(url)?;

        tokio::spawn(task);

        registry.with(layer).init();
        info!(
            "Loki logging initialized at {}",
            config.observability.loki_url
        );
    } else {
        registry.init();
    }

    Ok(())
}

fn init_metrics(config: &Config) -> anyhow::Result<Option<PrometheusHandle>> {
    if !config.observability.metrics_enabled {
        return Ok(None);
    }

    use metrics_exporter_prometheus::PrometheusBuilder;
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install Prometheus recorder")?;
    info!("Prometheus metrics recorder initialized");
    Ok(Some(handle))
}

async fn run_server(
    config: Config,
    prometheus_handle: Option<PrometheusHandle>,
) -> anyhow::Result<()> {
    info!("MediScan v{} starting...", env!("CARGO_PKG_VERSION"));

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let shared = Arc::new(SharedState::new(config).await?);

    let mut maintenance = Maintenance::new(shared.store.clone());
    if let Err(e) = Maintenance::purge_expired_reset_tokens(&shared.store).await {
        error!("Initial reset token purge failed: {}", e);
    }
    maintenance.start().await?;

    let api_state = api::create_app_state(shared, prometheus_handle);
    let app = api::router(api_state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("🌐 Web Server running at http://{}", addr);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    maintenance.stop().await?;

    if let Err(e) = served {
        error!("Web server error: {}", e);
        return Err(e.into());
    }

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => error!("Error listening for shutdown: {}", e),
    }
}
