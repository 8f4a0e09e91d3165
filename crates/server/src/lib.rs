use axum::{middleware as axum_middleware, routing::get, Router};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub mod authz;
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod routes;

#[derive(Clone)]
pub struct AppState {
    pub db: db::Database,
    pub config: config::Config,
}

/// Build the full application router on top of `state`.
pub fn app(state: AppState) -> Router {
    // Protected routes (require authentication)
    let protected_routes = Router::new()
        .nest("/projects", routes::projects::router())
        .nest("/issues", routes::issues::router())
        .nest("/comments", routes::comments::router())
        .nest("/users", routes::users::router())
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::auth_middleware,
        ));

    let api_router = Router::new()
        .nest("/auth", routes::auth::router())
        .merge(protected_routes);

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api_router)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

async fn health_check() -> &'static str {
    "OK"
}
