use dotenvy::dotenv;
use std::net::SocketAddr;
use std::sync::Arc;
use tabledrop::config::AppConfig;
use tabledrop::infrastructure::{registry, storage};
use tabledrop::services::dataset::DatasetService;
use tabledrop::services::extraction::MetadataExtractor;
use tabledrop::services::file_registry::FileRegistry;
use tabledrop::services::object_store::ObjectStore;
use tabledrop::services::worker::ExtractionWorker;
use tabledrop::{AppState, create_app};
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    // Initialize tracing with EnvFilter
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tabledrop=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("🚀 Starting tabledrop backend...");

    let config = AppConfig::from_env();

    // Setup Infrastructure
    let store: Arc<dyn ObjectStore> = storage::setup_storage(&config).await;
    let file_registry: Arc<dyn FileRegistry> = registry::setup_registry(&config).await;

    let dataset = Arc::new(DatasetService::new(store.clone(), file_registry.clone()));
    let extractor = Arc::new(MetadataExtractor::new(store.clone(), file_registry.clone()));

    // Setup Shutdown Channel
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    // Start Extraction Worker
    let (event_tx, event_rx) = tokio::sync::mpsc::channel(256);
    let worker = ExtractionWorker::new(extractor, event_rx, shutdown_rx);
    tokio::spawn(async move {
        worker.run().await;
    });

    let state = AppState {
        store,
        registry: file_registry,
        dataset,
        events: event_tx,
        config: config.clone(),
    };

    let app = create_app(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &axum::http::Request<_>| {
                    let request_id = request
                        .headers()
                        .get("x-request-id")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("unknown");
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        uri = %request.uri(),
                        request_id = %request_id,
                    )
                })
                .on_request(|request: &axum::http::Request<_>, _span: &tracing::Span| {
                    info!("📥 {} {}", request.method(), request.uri());
                })
                .on_response(
                    |response: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     _span: &tracing::Span| {
                        info!(
                            "📤 Finished in {:?} with status {}",
                            latency,
                            response.status()
                        );
                    },
                ),
        )
        .layer(axum::extract::DefaultBodyLimit::max(config.max_file_size));

    let addr: SocketAddr = config.bind_addr.parse()?;
    info!("✅ Server ready at http://{}", addr);
    info!("📖 Swagger UI: http://{}/swagger-ui", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = shutdown_tx.send(true);
        })
        .await?;

    info!("🛑 Server shut down gracefully.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("⌨️  Ctrl+C received, starting graceful shutdown...");
        },
        _ = terminate => {
            info!("💤 SIGTERM received, starting graceful shutdown...");
        },
    }
}
