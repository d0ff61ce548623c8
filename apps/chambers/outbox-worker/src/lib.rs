//! Outbox Worker Service
//!
//! Background worker that drains the notification outbox: it claims due
//! email jobs from Postgres, renders them and hands them to the email
//! provider, with retry, dead-lettering and stale-lock recovery.
//!
//! ```text
//! Postgres (outbox_jobs)
//!   ↓ (poll + conditional-update claim)
//! OutboxProcessor
//!   ↓ (renders templates)
//! TemplateRenderer (Handlebars)
//!   ↓ (sends emails)
//! EmailProvider (Resend, or noop when unconfigured)
//! ```

mod directory;

use core_config::email::EmailCredentials;
use core_config::database::DatabaseConfig;
use core_config::{Environment, FromEnv};
use directory::{DirectoryConfig, HttpDirectory};
use domain_notifications::providers::{NoopProvider, ResendConfig, ResendProvider};
use domain_notifications::{EmailProvider, OutboxConfig, OutboxProcessor, PgNotificationStore, TemplateRenderer};
use eyre::{Result, WrapErr};
use metrics_exporter_prometheus::PrometheusBuilder;
use migration::{Migrator, MigratorTrait};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Run the outbox worker.
///
/// 1. Sets up structured logging (env-aware: JSON for prod, pretty for dev)
/// 2. Connects to Postgres and applies pending migrations
/// 3. Resolves email credentials (falling back to the no-op provider)
/// 4. Runs the outbox processor with graceful shutdown handling
pub async fn run() -> Result<()> {
    core_config::tracing::install_color_eyre();
    let environment = Environment::from_env();
    core_config::tracing::init_tracing(&environment);

    info!("Starting outbox worker service");
    info!("Environment: {:?}", environment);

    init_metrics_exporter();

    let db_config = DatabaseConfig::from_env().wrap_err("Failed to load database configuration")?;
    info!("Connecting to Postgres...");
    let db = sea_orm::Database::connect(&db_config.url)
        .await
        .wrap_err("Failed to connect to Postgres")?;
    Migrator::up(&db, None)
        .await
        .wrap_err("Failed to apply migrations")?;
    info!("Connected to Postgres, schema up to date");

    let store = Arc::new(PgNotificationStore::new(db));
    let templates = Arc::new(TemplateRenderer::new().wrap_err("Failed to initialize templates")?);

    let provider: Arc<dyn EmailProvider> = match EmailCredentials::resolve()
        .wrap_err("Failed to resolve email credentials")?
    {
        Some(creds) => {
            info!("Using Resend provider");
            let provider = ResendProvider::new(ResendConfig::new(
                creds.api_key,
                creds.from_email,
                creds.from_name,
            ));
            if let Err(e) = provider.health_check().await {
                warn!(error = %e, "Resend provider health check failed");
            }
            Arc::new(provider)
        }
        None => {
            warn!("No email credentials configured, using no-op provider");
            Arc::new(NoopProvider::new())
        }
    };

    let dir_config = DirectoryConfig::from_env().wrap_err("Failed to load directory configuration")?;
    let http_directory =
        Arc::new(HttpDirectory::new(dir_config).wrap_err("Failed to build directory client")?);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = shutdown_signal().await {
            error!("Error waiting for shutdown signal: {}", e);
        }
        let _ = shutdown_tx.send(true);
    });

    let processor = OutboxProcessor::new(
        store,
        http_directory,
        provider,
        templates,
        OutboxConfig::default(),
    );
    processor
        .run(shutdown_rx)
        .await
        .map_err(|e| eyre::eyre!("{}", e))?;

    info!("Outbox worker service stopped");
    Ok(())
}

/// Expose Prometheus metrics over the exporter's built-in listener.
fn init_metrics_exporter() {
    let port: u16 = std::env::var("METRICS_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(9464);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => info!(%addr, "Prometheus metrics listener started"),
        Err(e) => warn!(error = %e, "Failed to start metrics listener, continuing without"),
    }
}

/// Wait for a shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() -> Result<()> {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        },
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        },
    }

    Ok(())
}
