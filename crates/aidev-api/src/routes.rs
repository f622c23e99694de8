use crate::{handlers, AppState};
use axum::{
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

pub fn create_router(state: AppState) -> Router {
    let static_dir = state.config.server.static_dir.clone();

    let router = Router::new()
        .route("/health", get(handlers::health))
        .route("/api/intent", post(handlers::process_intent))
        .route(
            "/api/models",
            get(handlers::list_models).post(handlers::list_models_with_key),
        )
        .route("/api/models/select", post(handlers::select_model))
        .with_state(state);

    // Web UI assets, if configured, answer everything the API does not.
    let router = match static_dir {
        Some(dir) => router.fallback_service(ServeDir::new(dir)),
        None => router,
    };

    router.layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            ),
    )
}
