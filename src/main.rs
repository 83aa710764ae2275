//! Mobilize CRM Backend
//!
//! A REST backend with SQLite persistence and bidirectional reconciliation
//! against an externally managed Supabase schema.

mod access;
mod api;
mod auth;
mod config;
mod db;
mod errors;
mod external;
mod mapper;
mod models;
mod sync;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use config::Config;
use db::Repository;
use external::{ExternalStore, MemoryStore, RestStore};
use sync::SyncEngine;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub sync: Arc<SyncEngine>,
    pub config: Arc<Config>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env();

    // Initialize logging
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Mobilize CRM Backend");
    tracing::info!("Database path: {:?}", config.db_path);
    tracing::info!("Bind address: {}", config.bind_addr);

    // Warn if PSK is not configured
    if config.api_psk.is_none() {
        tracing::warn!("No API PSK configured (MOBILIZE_API_PSK). Authentication is disabled!");
    }

    // Initialize database
    let pool = db::init_database(&config.db_path).await?;
    let repo = Repository::new(pool);

    // Wire the external store client once; the engine receives it injected.
    let store: Arc<dyn ExternalStore> = match (&config.supabase_url, &config.supabase_key) {
        (Some(url), Some(key)) => {
            tracing::info!("External store: Supabase at {}", url);
            Arc::new(RestStore::new(url, key))
        }
        _ => {
            tracing::warn!(
                "No Supabase credentials configured (SUPABASE_URL / SUPABASE_SERVICE_KEY). \
                 Using the in-memory external store."
            );
            Arc::new(MemoryStore::new())
        }
    };

    let engine = SyncEngine::new(repo.clone(), store);

    // Create application state
    let state = AppState {
        repo: Arc::new(repo),
        sync: Arc::new(engine),
        config: Arc::new(config.clone()),
    };

    // Build router
    let app = create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Create the application router with all routes.
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Clone PSK for the auth layer
    let psk = state.config.api_psk.clone();

    // API routes
    let api_routes = Router::new()
        // People
        .route("/people", get(api::list_people))
        .route("/people", post(api::create_person))
        .route("/people/{id}", get(api::get_person))
        .route("/people/{id}/conflicts", get(api::person_conflicts))
        .route(
            "/people/{id}/conflicts/resolve",
            post(api::resolve_person_conflicts),
        )
        // Churches
        .route("/churches", get(api::list_churches))
        .route("/churches", post(api::create_church))
        .route("/churches/{id}", get(api::get_church))
        .route("/churches/{id}/conflicts", get(api::church_conflicts))
        .route(
            "/churches/{id}/conflicts/resolve",
            post(api::resolve_church_conflicts),
        )
        // Tasks
        .route("/tasks", get(api::list_tasks))
        .route("/tasks", post(api::create_task))
        .route("/tasks/{id}", get(api::get_task))
        // Communications
        .route("/communications", get(api::list_communications))
        .route("/communications", post(api::create_communication))
        .route("/communications/{id}", get(api::get_communication))
        // Users and offices
        .route("/users", post(api::create_user))
        .route("/users/{id}/scope", get(api::user_scope))
        .route("/offices", post(api::create_office))
        .route("/offices/{id}/members", post(api::add_office_member))
        // Sync
        .route("/sync/{entity}/push", post(api::push_entity))
        .route("/sync/{entity}/pull", post(api::pull_entity))
        // Apply PSK auth middleware
        .layer(middleware::from_fn(move |req, next| {
            auth::psk_auth_layer(psk.clone(), req, next)
        }));

    // Health check (no auth required)
    let health_routes = Router::new().route("/health", get(health_check));

    Router::new()
        .nest("/api", api_routes)
        .merge(health_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests;
