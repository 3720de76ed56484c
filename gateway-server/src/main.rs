use gateway_settings::Settings;
use gateway_telemetry::LoggingConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    gateway_telemetry::logging::init(&LoggingConfig::from_env());

    let settings = Settings::from_env();
    let bind_addr = settings.bind_addr.clone();
    let state = gateway_server::build_state(settings).await?;
    let app = gateway_server::build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "gateway listening");

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
