use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderValue;
use axum::{middleware, Router};
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use agentgate_backend::{
    logging, routes, AgentClient, AppState, Config, GoogleVerifier, IpRateLimiter, QuotaManager,
    SessionSigner, UserStore,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting AgentGate API");

    // Initialize components
    let google = GoogleVerifier::new(&config.google_issuer, &config.google_client_id).await?;
    let sessions = SessionSigner::new(&config.session_secret);
    let users = Arc::new(UserStore::new(&config.database_url)?);
    let quota = QuotaManager::new(users.clone(), config.daily_query_limit);
    let rate_limiter = IpRateLimiter::new(config.rate_limit_per_minute);
    let agent = AgentClient::new(
        &config.agent_base_url,
        Duration::from_secs(config.agent_timeout_secs),
    );

    let state = Arc::new(AppState {
        config: config.clone(),
        google,
        sessions,
        users,
        quota,
        rate_limiter,
        agent,
    });

    // Build CORS layer
    let cors = if config.cors_origins.trim() == "*" {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<HeaderValue> = config
            .cors_origins
            .split(',')
            .filter_map(|origin| origin.trim().parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any)
    };

    // Build router
    let app = Router::new()
        .merge(routes::health::router())
        .merge(routes::auth::router(state.clone()))
        .merge(routes::chat::router(state.clone()))
        .layer(cors)
        .layer(middleware::from_fn(logging::request_logger))
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = format!("{}:{}", config.host, config.port);
    tracing::info!("Listening on {}", addr);

    let listener = TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
