use poem::listener::TcpListener;
use resize_engine::settings::get_config;
use resize_engine::{AppState, init_openapi_route};

use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = get_config()?;
    let log_level = config.tracing_level();

    // Logging to file when LOG_DIR is set, stdout otherwise
    let _guard = match &config.log_dir {
        Some(dir) => {
            let file_appender = tracing_appender::rolling::daily(dir, "app.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            tracing_subscriber::fmt()
                .with_writer(non_blocking)
                .with_max_level(log_level)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt().with_max_level(log_level).init();
            None
        }
    };

    tracing::info!("Initializing Resize Service...");
    tracing::info!("run with config: {:?}", config);

    let app_state = Arc::new(AppState::from_config(&config));
    let health = app_state.engine.health_check();
    tracing::info!(
        "Resize engine initialized: encoder={}, slots={}, timeout={}s",
        health.encoder,
        health.max_concurrent,
        config.request_timeout_secs
    );

    let app = init_openapi_route(app_state, &config)?;
    tracing::info!("run server on {}:{}", config.host, config.port);
    poem::Server::new(TcpListener::bind(format!(
        "{}:{}",
        config.host, config.port
    )))
    .run(app)
    .await?;

    Ok(())
}
