use std::sync::Arc;

use axum::http::Method;
use axum::routing::get;
use axum::Router;
use sqlx::SqlitePool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::authz::RedirectPaths;
use crate::errors::AppError;
use crate::events::{init_event_bus, start_activity_listener, EventBus};
use crate::jwt::JwtConfig;
use crate::profiles::SqliteProfileStore;
use crate::routes::{access, admin, health};

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub jwt: Arc<JwtConfig>,
    pub profiles: Arc<SqliteProfileStore>,
    pub redirects: Arc<RedirectPaths>,
    pub event_bus: EventBus,
}

impl AppState {
    pub fn new(pool: SqlitePool, jwt: JwtConfig, redirects: RedirectPaths, event_bus: EventBus) -> Self {
        Self {
            profiles: Arc::new(SqliteProfileStore::new(pool.clone())),
            pool,
            jwt: Arc::new(jwt),
            redirects: Arc::new(redirects),
            event_bus,
        }
    }
}

/// Builds the router and spawns the activity listener on the current runtime.
pub async fn create_app(pool: SqlitePool) -> Result<Router, AppError> {
    let jwt_config = JwtConfig::from_env()?;
    let redirects = RedirectPaths::from_env();

    let (event_bus, event_rx) = init_event_bus();
    tokio::spawn(start_activity_listener(event_rx, pool.clone()));

    let state = AppState::new(pool, jwt_config, redirects, event_bus);

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_origin(Any)
        .allow_headers(Any);

    let router = Router::new()
        .route("/api/health", get(health::health))
        .nest("/access", access::routes())
        .nest("/admin", admin::routes())
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    Ok(router)
}
