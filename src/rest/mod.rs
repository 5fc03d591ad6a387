//! REST API for ARIZ sessions.
//!
//! Exposes the step tables, the session lifecycle and polling of step
//! executions over HTTP.

use std::net::SocketAddr;

use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod dto;
pub mod error;
pub mod openapi;
pub mod routes;
pub mod state;

pub use openapi::ApiDoc;
pub use state::ApiState;

/// Build the API router with all routes
pub fn build_router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health endpoints
        .route("/api/v1/health", get(routes::health::health))
        .route("/api/v1/status", get(routes::health::status))
        // Mode endpoints
        .route("/api/v1/modes", get(routes::modes::list))
        .route("/api/v1/modes/:mode/steps", get(routes::modes::steps))
        .route("/api/v1/modes/:mode/steps/:code", get(routes::modes::step))
        // Session endpoints
        .route(
            "/api/v1/sessions",
            get(routes::sessions::list).post(routes::sessions::create),
        )
        .route("/api/v1/sessions/:id", get(routes::sessions::get_one))
        .route(
            "/api/v1/sessions/:id/progress",
            get(routes::sessions::progress),
        )
        .route(
            "/api/v1/sessions/:id/current-step",
            get(routes::sessions::current_step),
        )
        .route("/api/v1/sessions/:id/submit", post(routes::sessions::submit))
        .route(
            "/api/v1/sessions/:id/advance",
            post(routes::sessions::advance),
        )
        .route("/api/v1/sessions/:id/back", post(routes::sessions::back))
        .route(
            "/api/v1/sessions/:id/abandon",
            post(routes::sessions::abandon),
        )
        .route(
            "/api/v1/sessions/:id/summary",
            get(routes::sessions::summary),
        )
        // Task endpoints
        .route("/api/v1/tasks/:task_id", get(routes::tasks::get_one))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Start the REST API server and run until Ctrl-C
pub async fn serve(state: ApiState, port: u16) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    serve_listener(listener, state).await
}

/// Serve on an already bound listener
pub async fn serve_listener(listener: TcpListener, state: ApiState) -> Result<()> {
    tracing::info!("REST API listening on http://{}", listener.local_addr()?);

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
            tracing::info!("Shutting down REST API");
        })
        .await?;

    Ok(())
}
