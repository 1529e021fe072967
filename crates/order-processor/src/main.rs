//! Order processor entry point.

use std::process::ExitCode;
use std::sync::Arc;

use domain::PostgresOrderStore;
use order_processor::config::Config;
use order_processor::error::StartupError;
use order_processor::{AppState, create_app, serve};
use order_stream::RedisOrderStream;
use processor::{OrderProcessor, Scheduler};
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

/// Installs the global subscriber. `LOG_FORMAT=json` switches to JSON lines.
fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json_layer = json.then(|| tracing_subscriber::fmt::layer().json());
    let text_layer = (!json).then(tracing_subscriber::fmt::layer);

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .init();
}

async fn run(config: Config) -> Result<(), StartupError> {
    // 1. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder()?;

    // 2. Connect to the order store and the work stream
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    let store = PostgresOrderStore::new(pool.clone());
    store.run_migrations().await?;

    let stream = RedisOrderStream::connect(&config.redis_url).await?;
    stream.ping().await?;

    // 3. Build the processor and make sure its consumer group exists
    let processor = OrderProcessor::new(stream.clone(), store, config.processor.clone())?;
    processor.ensure_group().await?;
    tracing::info!(
        stream = %config.processor.stream,
        group = %config.processor.group,
        consumer = %config.processor.consumer,
        "processor ready"
    );

    // 4. Bind the HTTP listener before any background work starts
    let state = Arc::new(
        AppState::new(Arc::new(stream), config.processor.stream.clone())
            .with_call_timeout(config.processor.call_timeout),
    );
    let app = create_app(state, metrics_handle);

    let addr = config.addr();
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            pool.close().await;
            return Err(e.into());
        }
    };

    // 5. Start the scheduler and serve until a shutdown signal
    let scheduler = Scheduler::new(processor).spawn();
    tracing::info!(%addr, "starting HTTP server");
    let served = serve(
        listener,
        app,
        scheduler,
        config.processor.shutdown_grace,
        shutdown_signal(),
    )
    .await;

    // 6. The scheduler has stopped; release the clients
    pool.close().await;

    served?;
    tracing::info!("shut down gracefully");
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));
    init_tracing(json_logs);

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "order processor failed");
            ExitCode::FAILURE
        }
    }
}
