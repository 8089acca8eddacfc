use axum::http::HeaderValue;
use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::{auth::require_session, cache::response_cache, state::AppState};

pub mod auth;
pub mod documents;
pub mod health;

pub fn create_router(state: AppState) -> Router<()> {
    let cors = cors_layer(state.config.cors_allowed_origin.as_deref());

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/auth", post(auth::login))
        .route("/auth/:token", delete(auth::logout))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            response_cache,
        ));

    // The session check is added last so it runs before the cache lookup.
    let documents_routes = Router::new()
        .route(
            "/docs",
            get(documents::list_documents).post(documents::upload_document),
        )
        .route(
            "/docs/:id",
            get(documents::get_document).delete(documents::delete_document),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            response_cache,
        ))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_session,
        ));

    let max_upload_bytes = state.config.max_upload_bytes;

    Router::new()
        .nest(
            "/api",
            auth_routes
                .merge(documents_routes)
                .route("/health", get(health::health_check)),
        )
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(max_upload_bytes))
}

fn cors_layer(allowed: Option<&str>) -> CorsLayer {
    let allow_origin = match allowed {
        Some(origins) => {
            let headers: Vec<HeaderValue> = origins
                .split(',')
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .filter_map(|value| match value.parse::<HeaderValue>() {
                    Ok(header) => Some(header),
                    Err(_) => {
                        warn!(origin = %value, "ignoring invalid CORS allowed origin");
                        None
                    }
                })
                .collect();
            AllowOrigin::list(headers)
        }
        None => AllowOrigin::mirror_request(),
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}
