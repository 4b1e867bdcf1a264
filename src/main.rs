//! Co-parenting Backend
//!
//! REST backend for shared custody families: transactional family, invite and
//! membership documents in SQLite, plus custody schedule rules and their
//! evaluation.

mod acceptance;
mod api;
mod auth;
mod config;
mod db;
mod errors;
mod models;
mod rules;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use acceptance::AcceptanceCoordinator;
use config::Config;
use db::{InviteBroker, MembershipLedger, Repository};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub ledger: Arc<MembershipLedger>,
    pub invites: Arc<InviteBroker>,
    pub acceptance: Arc<AcceptanceCoordinator>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Wire every component onto one connection pool.
    pub fn new(pool: sqlx::SqlitePool, config: Config) -> Self {
        let invites = InviteBroker::new(pool.clone(), config.public_url.clone());
        Self {
            repo: Arc::new(Repository::new(pool.clone())),
            ledger: Arc::new(MembershipLedger::new(pool.clone())),
            acceptance: Arc::new(AcceptanceCoordinator::new(pool, invites.clone())),
            invites: Arc::new(invites),
            config: Arc::new(config),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize logging
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let registry = tracing_subscriber::registry().with(env_filter);
    if config.log_json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    tracing::info!("Starting Co-parenting Backend");
    tracing::info!("Database path: {:?}", config.db_path);
    tracing::info!("Bind address: {}", config.bind_addr);
    tracing::info!("Invite links use {}", config.public_url);

    // Warn if PSK is not configured
    if config.api_psk.is_none() {
        tracing::warn!("No API PSK configured (COPARENT_API_PSK). Authentication is disabled!");
    }

    // Initialize database
    let pool = db::init_database(&config.db_path).await?;

    let bind_addr = config.bind_addr;
    let state = AppState::new(pool, config);

    // Build router
    let app = create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!("Server listening on {}", bind_addr);

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
        // Profile
        .route("/me", get(api::get_me).put(api::update_me))
        // Families
        .route("/families", post(api::create_family))
        .route("/families/{id}", get(api::get_family))
        .route("/families/{id}/members", get(api::list_members))
        // Invites
        .route("/families/{id}/invites", post(api::create_invite))
        .route("/families/{id}/invites/preview", get(api::preview_invite))
        .route("/invites/accept", post(api::accept_invite))
        // Schedule
        .route(
            "/families/{id}/schedule-rule",
            get(api::get_rule).put(api::put_rule),
        )
        .route("/families/{id}/schedule/owner", get(api::get_owner))
        // Children
        .route(
            "/families/{id}/children",
            get(api::list_children).post(api::create_child),
        )
        .route(
            "/families/{id}/children/{child_id}",
            get(api::get_child)
                .put(api::update_child)
                .delete(api::delete_child),
        )
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
