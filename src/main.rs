use std::error::Error;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use social_login::{
    AppState, GatewayConfig, IdentityStore, MemoryIdentityStore, PgIdentityStore,
    ProviderRegistry, SessionCodec, router,
};
use tokio::net::TcpListener;
use tokio::signal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Debug, Parser)]
#[command(
    name = "social-login",
    about = "Sign users in through GitHub, Facebook, Google and Instagram."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the login gateway.
    Serve {
        /// Keep users in process memory instead of Postgres.
        #[arg(long)]
        memory: bool,

        /// Apply pending migrations before serving.
        #[arg(long, conflicts_with = "memory")]
        migrate: bool,
    },
    /// Manage the database schema.
    Migrate {
        #[command(subcommand)]
        direction: Direction,
    },
}

#[derive(Debug, Subcommand)]
enum Direction {
    Up,
    Down,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json().with_target(true))
        .init();

    let cli = Cli::parse();
    let config = GatewayConfig::from_env()?;

    match cli.command {
        Command::Serve { memory, migrate } => serve(config, memory, migrate).await,
        Command::Migrate { direction } => run_migrations(config, direction).await,
    }
}

async fn serve(config: GatewayConfig, memory: bool, migrate: bool) -> Result<(), Box<dyn Error>> {
    let registry = ProviderRegistry::from_config(&config)?;
    if registry.is_empty() {
        tracing::warn!("no login providers configured");
    }

    let store: Arc<dyn IdentityStore> = if memory {
        tracing::info!("using in-memory identity store");
        Arc::new(MemoryIdentityStore::new())
    } else {
        let store =
            PgIdentityStore::connect(config.database_url()?, config.database_max_connections)
                .await?;
        if migrate {
            store.migrate().await?;
            tracing::info!("migrations applied");
        }
        Arc::new(store)
    };

    let sessions = SessionCodec::new(config.cookie_key()?).with_secure(config.secure_cookies);
    let app = router(
        AppState::new(registry, store, sessions),
        config.request_timeout,
    );

    let listener = TcpListener::bind(&config.listen_addr).await?;
    tracing::info!(
        address = %listener.local_addr()?,
        providers = ?config.providers.iter().map(|p| p.kind.as_str()).collect::<Vec<_>>(),
        "listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

async fn run_migrations(config: GatewayConfig, direction: Direction) -> Result<(), Box<dyn Error>> {
    let store = PgIdentityStore::connect(config.database_url()?, 1).await?;
    match direction {
        Direction::Up => {
            store.migrate().await?;
            tracing::info!("migrations applied");
        }
        Direction::Down => {
            store.revert().await?;
            tracing::info!("migrations reverted");
        }
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for ctrl+c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received ctrl+c, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
