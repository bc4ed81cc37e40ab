use anyhow::{Context, Result};
use authz_server::{create_app, Args, AuthzServer, ServerConfig};
use clap::Parser;
use std::future::IntoFuture;
use tokio::sync::watch;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{
    fmt::{self, time::ChronoUtc},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    init_tracing(&args);

    info!("Starting authz server");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = ServerConfig::from_args(&args)?;
    let server = AuthzServer::connect(&args.database_url, config).await?;
    let config = server.config.clone();
    let app = create_app(server.clone());

    let listener = tokio::net::TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("Failed to bind to {}", config.listen))?;
    info!("Listening on http://{}", config.listen);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let engine = server.engine.clone();
    let mut reaper = tokio::spawn(async move {
        engine
            .run_expiry_reaper(config.reaper_interval, config.reaper_policy, shutdown_rx)
            .await
    });

    let http = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .into_future();

    tokio::select! {
        result = http => {
            result.context("HTTP server error")?;
        }
        result = &mut reaper => {
            // The reaper only returns early when a sweep fails under the halt policy.
            let outcome = result.context("Expiry reaper task panicked")?;
            if let Err(err) = outcome {
                error!("Expiry reaper halted: {}", err);
                return Err(err.into());
            }
            warn!("Expiry reaper exited before shutdown");
            return Ok(());
        }
    }

    info!("Shutting down");
    // Receiver may already be gone if the reaper exited.
    let _ = shutdown_tx.send(true);
    reaper.await.context("Expiry reaper task panicked")??;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

fn init_tracing(args: &Args) {
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "authz_server={level},auth_grants={level},tower_http=info,sqlx=warn",
            level = level
        )
        .into()
    });

    if args.is_production() {
        // Structured JSON logging for production
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_ansi(false)
                    .json(),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_ansi(true),
            )
            .init();
    }
}
