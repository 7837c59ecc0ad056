//! API server entry point.

use api::config::Config;
use api::fixture;
use cart_store::PostgresStore;
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

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    // 1. Initialize tracing
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Pick the backend and build the application
    let policy = config.retry_policy();
    let app = match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(config.database_max_connections)
                .connect(url)
                .await
                .expect("failed to connect to PostgreSQL");
            let store = PostgresStore::with_policy(pool, policy);
            store
                .run_migrations()
                .await
                .expect("failed to run migrations");
            tracing::info!(
                max_connections = config.database_max_connections,
                "using PostgreSQL backend"
            );
            if let Some(path) = &config.catalog_file {
                let products = fixture::load_catalog(path)
                    .await
                    .expect("failed to load catalog fixture");
                let count = fixture::stock_postgres(&store, &products)
                    .await
                    .expect("failed to store catalog fixture");
                tracing::info!(%path, count, "catalog stocked from fixture");
            }
            api::create_app(api::create_postgres_state(store, policy), metrics_handle)
        }
        None => {
            let (state, catalog) = api::create_in_memory_state(policy);
            match &config.catalog_file {
                Some(path) => {
                    let products = fixture::load_catalog(path)
                        .await
                        .expect("failed to load catalog fixture");
                    let count = fixture::stock_in_memory(&catalog, products).await;
                    tracing::info!(%path, count, "using in-memory backend, catalog stocked from fixture");
                }
                None => tracing::warn!(
                    "DATABASE_URL and CATALOG_FILE not set, using in-memory backend with an empty catalog; every add will return 404"
                ),
            }
            api::create_app(state, metrics_handle)
        }
    };

    // 4. Start server
    let addr = config.addr();
    tracing::info!(%addr, attempts = policy.max_attempts, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    tracing::info!("server shut down gracefully");
}
