use crate::config::MapSettings;
use crate::error::ServerError;
use crate::render::Reconciler;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    pub reconciler: Arc<RwLock<Reconciler>>,
    pub map: Arc<MapSettings>,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/vehicles", get(get_vehicles))
        .route("/api/legend", get(get_legend))
        .route("/api/map", get(get_map_settings))
        .route("/health", get(health_check))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run_server(state: AppState, port: u16) -> Result<(), ServerError> {
    let addr = format!("0.0.0.0:{}", port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| ServerError::Bind(format!("bind failed on {addr}: {e}")))?;
    info!(%addr, "starting HTTP server");

    axum::serve(listener, build_router(state))
        .await
        .map_err(|e| ServerError::Serve(e.to_string()))
}

fn not_loaded() -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        [(header::CONTENT_TYPE, "text/plain")],
        "Vehicle positions not yet available",
    )
        .into_response()
}

async fn get_vehicles(State(state): State<AppState>) -> Response {
    let reconciler = state.reconciler.read().await;
    if reconciler.last_sequence().is_none() {
        return not_loaded();
    }

    Json(reconciler.records()).into_response()
}

async fn get_legend(State(state): State<AppState>) -> Response {
    let reconciler = state.reconciler.read().await;
    Json(reconciler.legend()).into_response()
}

async fn get_map_settings(State(state): State<AppState>) -> Json<MapSettings> {
    Json(state.map.as_ref().clone())
}

async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
