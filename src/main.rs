use axum::{
    routing::{get, get_service},
    Router,
};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use idcard_portal::api::health::health_check;
use idcard_portal::api::middleware::session::{create_session_layer, AppState};
use idcard_portal::config::Config;
use idcard_portal::services::asset_loader::AssetLoader;
use idcard_portal::services::card_export::CardExporter;
use idcard_portal::services::card_template::CardTemplate;
use idcard_portal::services::portal_api::PortalApi;
use idcard_portal::services::rasterizer::Rasterizer;
use idcard_portal::services::render_target::RenderHost;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "idcard_portal=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting ID card portal...");

    // Load configuration
    let config = Config::from_env()?;
    tracing::info!(api = %config.api_base_url, "Configuration loaded successfully");

    let timeout = Duration::from_secs(config.http_timeout_secs);
    let api = PortalApi::new(&config.api_base_url, timeout)?;
    let loader = AssetLoader::new(&config.upload_base_url, timeout)?;

    // Font discovery is slow, so it happens once at startup
    let exporter = CardExporter::new(
        loader,
        CardTemplate::new(config.card_branding()),
        Rasterizer::new(),
        RenderHost::new(),
        config.card_file_prefix.clone(),
    );
    tracing::info!("Card exporter initialized");

    let session_layer = create_session_layer(config.secure_cookies);
    tracing::info!("Session layer initialized");

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    // Build application state
    let state = AppState {
        config: Arc::new(config),
        api,
        exporter: Arc::new(exporter),
    };

    let static_routes =
        Router::new().nest_service("/static", get_service(ServeDir::new("static")));

    // Build router
    let app = Router::new()
        .route("/health", get(health_check))
        .merge(idcard_portal::api::auth::router())
        .merge(idcard_portal::api::dashboard::router())
        .merge(idcard_portal::api::admin::router())
        .merge(static_routes)
        .layer(session_layer)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    tracing::info!("Listening on {}", addr);

    // Start server
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install CTRL+C signal handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, cleaning up...");
}
