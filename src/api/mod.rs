// HTTP Control Surface
// "Thin on purpose: every route is one call into the service"

use crate::error::BeaconError;
use crate::service::DataService;
use crate::stream_id::StreamRequest;
use crate::timeframe::Timeframe;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

/// Build the control router over a composed service
pub fn router(service: Arc<DataService>) -> Router {
    Router::new()
        .route("/datamanager", get(status))
        .route("/datamanager/fetch", get(status))
        .route("/datamanager/fetch/start", get(fetch_start))
        .route("/datamanager/fetch/add", post(fetch_add))
        .route("/datamanager/get", post(get_range))
        .route("/datamanager/subscribe/add", post(subscribe_add))
        .with_state(service)
}

#[derive(Debug, Deserialize)]
struct FetchAddBody {
    exchange: String,
    symbol: String,
    timeframe: String,
}

#[derive(Debug, Deserialize)]
struct StreamBody {
    res: String,
    params: serde_json::Map<String, Value>,
    from: Option<i64>,
    to: Option<i64>,
}

async fn status(State(service): State<Arc<DataService>>) -> Result<Json<Value>, ApiError> {
    let fetching = service.fetch_set().await?;
    Ok(Json(json!({ "fetching": fetching })))
}

async fn fetch_start(State(service): State<Arc<DataService>>) -> Result<Json<Value>, ApiError> {
    let fetching = service.start_fetch().await?;
    Ok(Json(json!({ "fetching": fetching })))
}

async fn fetch_add(
    State(service): State<Arc<DataService>>,
    Json(body): Json<FetchAddBody>,
) -> Result<Json<Value>, ApiError> {
    let timeframe = Timeframe::parse(&body.timeframe)?;
    let fetching = service
        .add_fetch(&body.exchange, &body.symbol, timeframe)
        .await?;
    Ok(Json(json!({ "fetching": fetching })))
}

async fn get_range(
    State(service): State<Arc<DataService>>,
    Json(body): Json<StreamBody>,
) -> Result<Json<Value>, ApiError> {
    let request = StreamRequest::from_json(&body.res, &body.params)?;
    let points = service.get(&request, body.from, body.to).await?;
    Ok(Json(json!(points)))
}

async fn subscribe_add(
    State(service): State<Arc<DataService>>,
    Json(body): Json<StreamBody>,
) -> Result<Json<Value>, ApiError> {
    let request = StreamRequest::from_json(&body.res, &body.params)?;
    let (stream_id, addr) = service.subscribe_add(&request).await?;

    // Mirrors the subscribe contract: the identifier maps to its endpoint.
    let mut body = serde_json::Map::new();
    body.insert(
        stream_id.as_str().to_string(),
        json!([addr.ip().to_string(), addr.port()]),
    );
    Ok(Json(Value::Object(body)))
}

/// Maps service errors onto HTTP statuses
struct ApiError(BeaconError);

impl From<BeaconError> for ApiError {
    fn from(error: BeaconError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            BeaconError::UnknownResource { .. }
            | BeaconError::InvalidStreamId { .. }
            | BeaconError::InvalidTimeframe { .. }
            | BeaconError::UnknownExchange { .. } => StatusCode::BAD_REQUEST,
            BeaconError::DataNotAvailable => StatusCode::NOT_FOUND,
            BeaconError::InsufficientHistory { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}
