use std::{net::SocketAddr, sync::Arc};

use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_governor::{governor::GovernorConfigBuilder, key_extractor::GlobalKeyExtractor, GovernorLayer};
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{info, warn};

use server::config::ServerConfig;
use server::{build_router, AppState, START_TIME};
use tts_core::{JobScheduler, JobStore, ModelManager, PiperLoader};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    async_main().await
}

fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let methods = [
        axum::http::Method::GET,
        axum::http::Method::POST,
        axum::http::Method::OPTIONS,
    ];
    let origins: Vec<axum::http::HeaderValue> = config
        .cors_allowed_origins
        .iter()
        .flatten()
        .filter_map(|origin| origin.parse::<axum::http::HeaderValue>().ok())
        .collect();

    if origins.is_empty() {
        // Development: Allow all origins
        warn!("CORS_ALLOWED_ORIGINS not set or empty, allowing all origins");
        CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods(methods)
            .allow_headers(tower_http::cors::Any)
            .allow_credentials(false)
    } else {
        info!("CORS configured for {} origin(s)", origins.len());
        CorsLayer::new()
            .allow_origin(tower_http::cors::AllowOrigin::list(origins))
            .allow_methods(methods)
            .allow_headers(tower_http::cors::Any)
            .allow_credentials(false)
    }
}

async fn async_main() -> anyhow::Result<()> {
    info!("Starting TTS job server...");
    let _ = START_TIME.get_or_init(std::time::Instant::now);

    let config = ServerConfig::from_env();
    info!(
        "Server configuration loaded: port={}, rate_limit={}/min, idle_timeout={}s, outputs={}",
        config.port,
        config.rate_limit_per_minute,
        config.idle_timeout_secs,
        config.outputs_dir.display()
    );

    // The model itself is loaded lazily by the first job.
    if !config.model_config.exists() {
        warn!(
            "Model config {} not found; jobs will fail until it is provided",
            config.model_config.display()
        );
    }
    let loader = Arc::new(PiperLoader::new(config.model_config.clone()));
    let models = ModelManager::new(loader, config.idle_timeout());
    let _reaper = models.spawn_reaper(config.reap_interval());

    let store = Arc::new(JobStore::open(&config.outputs_dir)?);
    let scheduler = JobScheduler::start(store, models, config.pipeline.clone());

    let state = AppState::new(scheduler, config.clone());

    // Using GlobalKeyExtractor to rate limit globally (all requests share the same limit)
    // This works better in Docker/proxy environments where IP extraction can be problematic
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_millisecond(config.rate_limit_replenish_ms())
            .burst_size(config.rate_limit_per_minute.max(1))
            .key_extractor(GlobalKeyExtractor)
            .finish()
            .ok_or_else(|| anyhow::anyhow!("Invalid rate limit configuration"))?,
    );
    info!("Rate limiting: {} requests per minute", config.rate_limit_per_minute);

    let middleware_stack = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(GovernorLayer::new(governor_conf))
        .layer(TimeoutLayer::new(config.request_timeout()))
        .layer(cors_layer(&config))
        .into_inner();

    let app = build_router(state).layer(middleware_stack);

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;

    let listener = TcpListener::bind(addr).await.map_err(|e| {
        anyhow::anyhow!("Failed to bind {addr}: {e}. Try a different PORT.")
    })?;

    info!("Server listening on http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}
