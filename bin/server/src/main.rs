use axum::Router;
use rstore_gateway_core::Result;
use rstore_gateway_server::{
    app,
    auth::{AppState, IdentityHandle},
    config::ServerConfig,
    error::StartupError,
    upstream::UpstreamClient,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(report) = run().await {
        tracing::error!("{report}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), StartupError> {
    // Load configuration from environment
    let config = ServerConfig::from_env().map_err(|e| StartupError::Config {
        details: e.to_string(),
    })?;
    tracing::info!("Loaded configuration");

    let public_routes = config
        .session
        .route_table()
        .map_err(|e| StartupError::Routes {
            details: e.to_string(),
        })?;
    for route in public_routes.routes() {
        tracing::debug!(%route, "public route");
    }

    // Discover the provider before accepting traffic
    tracing::info!("Discovering OIDC provider...");
    let post_logout_redirect_uri = config.oidc.post_logout_redirect_uri().to_string();
    let identity: IdentityHandle = IdentityHandle::new(config.oidc);
    identity.client().await.map_err(|e| StartupError::Identity {
        details: e.to_string(),
    })?;

    let mut state = AppState::new(
        Arc::new(identity),
        &config.session,
        public_routes,
        post_logout_redirect_uri,
    );

    if let Some(upstream) = &config.upstream {
        let client = UpstreamClient::new(upstream).map_err(|e| StartupError::Config {
            details: e.to_string(),
        })?;
        tracing::info!(base_url = %upstream.base_url, "forwarding /api/core to upstream");
        state = state.with_upstream(client);
    }

    let app = app::router(Arc::new(state), Router::new());

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .map_err(|e| StartupError::Bind {
            addr: config.bind_addr.clone(),
            details: e.to_string(),
        })?;

    tracing::info!("listening on http://{}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| StartupError::Serve {
            details: e.to_string(),
        })?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
