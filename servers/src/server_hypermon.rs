use anyhow::Result;
use lib_common::loggers::setup_logging;
use servers::hypermon_logic::{config, routes, state};
use tokio::signal;

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
        tracing::info!("Ctrl-C received, initiating shutdown.");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut term_signal) => {
                term_signal.recv().await;
                tracing::info!("SIGTERM received, initiating shutdown.");
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = config::load_config();
    let _log_guard = setup_logging(&config.log_dir(), config.log_level(), "server_hypermon")?;

    let dispatcher = state::build_dispatcher(&config)?;
    let settings = dispatcher.settings();
    tracing::info!(
        keyed_url = %settings.keyed_url,
        search_url = %settings.search_url,
        ttl = settings.cache_ttl_seconds,
        "pipeline ready"
    );

    let app = routes::router(dispatcher, config.cors_allow_any());

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("HyperMon API listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutdown complete.");
    Ok(())
}
