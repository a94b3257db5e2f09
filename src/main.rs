use std::sync::Arc;

use axum::routing::{delete, get, post, put};
use axum::{Extension, Router};
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use org_registry_api::database::{PartitionStore, PgPartitionStore};
use org_registry_api::handlers;
use org_registry_api::middleware::bearer_auth_middleware;
use org_registry_api::services::{AuthService, OrganizationService};

const DEFAULT_DATABASE_URL: &str = "postgres://localhost:5432/org_registry";

#[tokio::main]
async fn main() {
    // Load .env if present so cargo run picks up DATABASE_URL, JWT_SECRET, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt::init();

    let config = org_registry_api::config::config();
    tracing::info!(
        "Starting organization registry in {:?} mode",
        config.environment
    );

    let database_url = std::env::var("DATABASE_URL").unwrap_or_else(|_| {
        tracing::warn!("DATABASE_URL not set, using {}", DEFAULT_DATABASE_URL);
        DEFAULT_DATABASE_URL.to_string()
    });

    let store = PgPartitionStore::connect(config, &database_url)
        .unwrap_or_else(|e| panic!("failed to initialize store: {}", e));

    // The pool is lazy: a down database delays schema setup but does not
    // prevent startup. /health reports degraded until it recovers.
    if let Err(e) = store.ensure_schema().await {
        tracing::warn!("Registry schema not ready yet: {}", e);
    }

    let store: Arc<dyn PartitionStore> = Arc::new(store);
    let migration_timeout =
        std::time::Duration::from_secs(config.database.migration_timeout_secs);
    let org_service = Arc::new(OrganizationService::new(store.clone(), migration_timeout));
    let auth_service = Arc::new(AuthService::new(
        store.clone(),
        config.security.jwt_secret.clone(),
        config.security.token_ttl_hours,
    ));

    let app = app(org_service, auth_service, store);

    // Allow tests or deployments to override port via env
    let port = std::env::var("ORG_API_PORT")
        .ok()
        .or_else(|| std::env::var("PORT").ok())
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(8000);

    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .unwrap_or_else(|e| panic!("failed to bind {}: {}", bind_addr, e));

    tracing::info!("Organization registry listening on http://{}", bind_addr);

    axum::serve(listener, app).await.expect("server");
}

fn app(
    org_service: Arc<OrganizationService>,
    auth_service: Arc<AuthService>,
    store: Arc<dyn PartitionStore>,
) -> Router {
    let protected = Router::new()
        .route("/org/update", put(handlers::org::update))
        .route("/org/delete", delete(handlers::org::delete))
        .route_layer(axum::middleware::from_fn(bearer_auth_middleware));

    Router::new()
        // Public
        .route("/", get(root))
        .route("/health", get(health))
        .route("/org/create", post(handlers::org::create))
        .route("/org/get", get(handlers::org::get))
        .route("/admin/login", post(handlers::auth::login))
        // Token-gated tenant mutations
        .merge(protected)
        // Shared services
        .layer(Extension(org_service))
        .layer(Extension(auth_service))
        .layer(Extension(store))
        // Global middleware
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn root() -> axum::response::Json<Value> {
    let version = env!("CARGO_PKG_VERSION");

    axum::response::Json(json!({
        "success": true,
        "data": {
            "name": "Organization Registry API",
            "version": version,
            "description": "Multi-tenant organization registry with per-tenant data partitions",
            "endpoints": {
                "create": "POST /org/create (public)",
                "get": "GET /org/get?organization_name= (public)",
                "update": "PUT /org/update (bearer token)",
                "delete": "DELETE /org/delete?organization_name= (bearer token)",
                "login": "POST /admin/login (public)",
                "health": "GET /health (public)"
            }
        }
    }))
}

async fn health(
    Extension(store): Extension<Arc<dyn PartitionStore>>,
) -> impl axum::response::IntoResponse {
    let now = chrono::Utc::now();

    match store.health_check().await {
        Ok(_) => (
            axum::http::StatusCode::OK,
            axum::response::Json(json!({
                "success": true,
                "data": {
                    "status": "ok",
                    "timestamp": now,
                    "database": "ok"
                }
            })),
        ),
        Err(e) => {
            tracing::error!("Health check failed: {}", e);
            (
                axum::http::StatusCode::SERVICE_UNAVAILABLE,
                axum::response::Json(json!({
                    "success": false,
                    "error": "database unavailable",
                    "data": {
                        "status": "degraded",
                        "timestamp": now,
                        "database": "disconnected"
                    }
                })),
            )
        }
    }
}
