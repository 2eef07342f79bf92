//! The HTTP skin: a thin axum surface over [`counter_core::CounterEngine`].

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use counter_core::{CounterEngine, EngineError};
use serde::Serialize;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Serialize)]
struct VisitCount {
    visits: i64,
    served_via: String,
}

#[derive(Serialize)]
struct VisitAck {
    status: &'static str,
    page_id: String,
}

pub fn router(engine: Arc<CounterEngine>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/v1/counter/visit/{page_id}", post(record_visit))
        .route("/api/v1/counter/visits/{page_id}", get(get_visits))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(engine)
}

async fn health_check() -> &'static str {
    "OK"
}

async fn record_visit(
    State(engine): State<Arc<CounterEngine>>,
    Path(page_id): Path<String>,
) -> Result<Json<VisitAck>, ApiError> {
    engine.record_visit(&page_id)?;
    Ok(Json(VisitAck {
        status: "success",
        page_id,
    }))
}

async fn get_visits(
    State(engine): State<Arc<CounterEngine>>,
    Path(page_id): Path<String>,
) -> Result<Json<VisitCount>, ApiError> {
    let (visits, served_via) = engine.query(&page_id).await?;
    Ok(Json(VisitCount { visits, served_via }))
}

/// Maps `EngineError` onto an HTTP status — the caller decides the status
/// for an engine-level failure, the engine itself stays transport-agnostic.
struct ApiError(EngineError);

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            EngineError::EmptyRing | EngineError::ShardUnavailable(_) | EngineError::ShardIoError { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            EngineError::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
        };
        (status, self.0.to_string()).into_response()
    }
}
