mod api;
mod config;
mod crypto;
mod endpoints;
mod errors;
mod headers;
mod keyset;
mod models;
mod openapi;
mod provider;
mod signer;
mod storage;
mod verifier;
#[cfg(test)]
mod test_utils;

use crate::models::{AccessTokenFormat, Client, UserinfoClaims};
use crate::provider::Provider;
use crate::storage::memory::InMemoryStorage;
use crate::storage::Storage;
use axum::Router;
use log::{error, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use utoipa::OpenApi;
use utoipa_axum::router::OpenApiRouter;
use utoipa_scalar::{Scalar, Servable};

#[tokio::main]
async fn main() {
    // Initialize logging
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    // Load configuration
    let config = match config::OpConfig::load() {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };
    let port = config.port;

    // In-memory storage seeded with a demo client and user; a real
    // deployment wires its own Storage implementation instead
    let storage = Arc::new(
        InMemoryStorage::new()
            .with_token_ttl(chrono::Duration::seconds(config.access_token_ttl as i64)),
    );
    storage
        .register_client(Client {
            id: "web".to_string(),
            secret: Some("secret".to_string()),
            redirect_uris: vec!["http://localhost:3000/auth/callback".to_string()],
            post_logout_redirect_uris: vec!["http://localhost:3000/".to_string()],
            access_token_format: AccessTokenFormat::Opaque,
            login_url: "http://localhost:3000/login".to_string(),
            id_token_ttl: config.id_token_ttl,
        })
        .await;
    storage
        .register_user(
            "demo-user",
            UserinfoClaims {
                sub: "demo-user".to_string(),
                name: Some("Demo User".to_string()),
                email: Some("demo@example.com".to_string()),
                email_verified: Some(true),
                locale: Some("en".to_string()),
            },
        )
        .await;
    info!("Registered demo client web");

    // Build the provider
    let provider = match Provider::builder(config, storage as Arc<dyn Storage>).build() {
        Ok(provider) => provider,
        Err(e) => {
            error!("Provider initialization error: {}", e);
            std::process::exit(1);
        }
    };

    // Readiness stays degraded until the first signing key arrives; the
    // server still starts so health probes can observe it
    if provider
        .signer()
        .wait_for_key(Duration::from_secs(5))
        .await
        .is_err()
    {
        warn!("No signing key delivered yet, starting unready");
    }

    // Create application
    let app = create_app(provider).await;

    // Build server address
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    // Start server
    let server = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    // Start the server and wait for it to finish
    info!("Server running on {}, press Ctrl+C to stop", addr);
    let serve = axum::serve(server, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;
    if let Err(e) = serve {
        error!("Server error: {}", e);
        std::process::exit(1);
    }
    info!("Server shutdown complete");
}

/// Create a new application instance over a built provider
pub async fn create_app(provider: Provider) -> Router {
    // Create OpenAPI documentation
    let (openapi_router, api_doc) =
        OpenApiRouter::with_openapi(openapi::ApiDoc::openapi()).split_for_parts();

    // Create base router with routes
    Router::new()
        .merge(api::router(&provider))
        .merge(openapi_router)
        .merge(Scalar::with_url("/scalar", api_doc.clone()))
        .with_state(provider)
}

// Simple signal handler that works on all platforms
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down");
        }
    }
}
