use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use server_api::{execute_delivery, get_facility, get_route, ApiContext};
use shared::{
    domain::{FacilityId, RouteId, StorageFacility, TransportRoute},
    error::{ApiError, ErrorCode},
    protocol::{DeliveryRequest, DeliveryResponse},
};
use storage::Storage;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod app_state;
mod config;

use app_state::AppState;
use config::{load_settings, prepare_database_url};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = load_settings();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&settings.log_filter)),
        )
        .init();

    let database_url = prepare_database_url(&settings.database_url)?;
    let storage = Storage::new(&database_url).await.map_err(|error| {
        error!(
            %database_url,
            %error,
            "failed to open SQLite database; verify parent directory exists and permissions are correct"
        );
        error
    })?;

    let state = AppState {
        api: ApiContext::new(storage),
    };
    let app = build_router(Arc::new(state), settings.max_body_bytes);

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: Arc<AppState>, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/deliveries", post(http_execute_delivery))
        .route("/routes/:route_id", get(http_get_route))
        .route("/facilities/:facility_id", get(http_get_facility))
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .with_state(state)
}

async fn healthz(State(state): State<Arc<AppState>>) -> (StatusCode, &'static str) {
    match state.api.storage.health_check().await {
        Ok(()) => (StatusCode::OK, "ok"),
        Err(error) => {
            error!(%error, "health check failed");
            (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
        }
    }
}

async fn http_execute_delivery(
    State(state): State<Arc<AppState>>,
    Json(req): Json<DeliveryRequest>,
) -> (StatusCode, Json<DeliveryResponse>) {
    match execute_delivery(&state.api, &req).await {
        Ok(response) => (StatusCode::OK, Json(response)),
        Err(err) => (status_for(err.code), Json(DeliveryResponse::failure(err))),
    }
}

async fn http_get_route(
    State(state): State<Arc<AppState>>,
    Path(route_id): Path<i64>,
) -> Result<Json<TransportRoute>, (StatusCode, Json<ApiError>)> {
    get_route(&state.api, RouteId(route_id))
        .await
        .map(Json)
        .map_err(error_response)
}

async fn http_get_facility(
    State(state): State<Arc<AppState>>,
    Path(facility_id): Path<i64>,
) -> Result<Json<StorageFacility>, (StatusCode, Json<ApiError>)> {
    get_facility(&state.api, FacilityId(facility_id))
        .await
        .map(Json)
        .map_err(error_response)
}

fn error_response(err: ApiError) -> (StatusCode, Json<ApiError>) {
    (status_for(err.code), Json(err))
}

fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::BadRequest => StatusCode::BAD_REQUEST,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::StateConflict => StatusCode::CONFLICT,
        ErrorCode::InvalidState => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
