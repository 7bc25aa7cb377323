use anyhow::Result;
use axum::Router;
use std::io::ErrorKind;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod config;
mod errors;
mod handlers;
mod middleware;
mod models;
mod routes;
mod services;
mod state;

use services::{
    storage_service::StorageService,
    token_service::{TokenValidator, mint_test_token},
};
use state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug")),
        )
        .init();

    // --- Parse config + mint-token flag ---
    let (cfg, mint_token) = config::AppConfig::from_env_and_args()?;

    if mint_token {
        let token = mint_test_token("test-user-123", "testuser@example.com", "Test User")?;
        println!("{}", token);
        tracing::warn!("Demo token is only accepted in insecure token mode");
        return Ok(()); // exit after printing
    }

    tracing::info!("Starting upload gateway with config: {:?}", cfg);

    // --- Token gate ---
    let validator = TokenValidator::from_config(&cfg.auth)?;
    if validator.is_insecure() {
        tracing::warn!(
            "Token signatures are NOT verified (insecure mode). Any well-formed token is accepted."
        );
    }

    // --- Storage backend ---
    // A bad storage configuration is reported per request, not at startup.
    let storage = match StorageService::from_config(&cfg.storage, None) {
        Ok(service) => {
            tracing::info!(
                "Using {:?} storage backend, container `{}`",
                cfg.storage.backend,
                cfg.storage.container_name
            );
            Ok(service)
        }
        Err(err) => {
            tracing::warn!("Storage backend unavailable: {}", err);
            Err(err.to_string())
        }
    };

    // --- Build router ---
    let state = AppState::new(storage, validator, cfg.auth.public_paths.clone());
    let app: Router = routes::routes::routes(state);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
