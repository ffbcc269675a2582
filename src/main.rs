use std::net::SocketAddr;

use sea_orm_migration::MigratorTrait;
use tokio::net::TcpListener;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sensor_dash::common::AppState;
use sensor_dash::config::Config;
use sensor_dash::database::ConnectionProvider;
use sensor_dash::layout;
use sensor_dash::routes;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sensor_dash=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting sensor-dash...");

    // Load configuration (fail-fast)
    let config = Config::from_env()?;
    tracing::info!(
        deployment = ?config.deployment,
        host = %config.api_host,
        port = config.api_port,
        colors = config.series_colors.len(),
        "Configuration loaded"
    );
    if config.secret_key.is_none() {
        tracing::warn!("SECRET_KEY is not set");
    }

    // Connect to database (fail-fast)
    tracing::info!("Connecting to database...");
    let provider = ConnectionProvider::connect(&config).await?;
    tracing::info!(
        max_connections = config.db_max_connections,
        "Database pool ready"
    );

    if config.run_migrations {
        tracing::info!("Running migrations...");
        migration::Migrator::up(provider.pool(), None).await?;
        tracing::info!("Migrations completed");
    }

    // The page cannot render without the site catalog
    let scope = provider.scope();
    let page = layout::build_layout(scope.acquire().await?).await?;
    scope.release().await?;
    tracing::info!(
        sites = page.site_select.options.len(),
        default = ?page.site_select.value,
        "Layout built"
    );

    let state = AppState::new(provider, config.clone(), page);

    // Build router
    let app = routes::build_router(state);

    // Start server with graceful shutdown
    let addr = config.bind_address();
    tracing::info!(address = %addr, "Starting server");
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, shutting down...");
        },
        () = terminate => {
            tracing::info!("Received SIGTERM, shutting down...");
        },
    }
}
