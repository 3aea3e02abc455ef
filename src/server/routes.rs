use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::compression::CompressionLayer;

use crate::error::ApiError;
use crate::log::{Cursor, EventType, StreamKey};
use crate::server::socket::{serve_push, serve_single_stream};
use crate::streaming::{pull, PullPage, PushSession, SingleStreamSession};
use crate::FlowtailEngine;

pub fn router(engine: FlowtailEngine) -> Router {
    Router::new()
        .route("/workspaces/{workspace}/flows/{flow}", put(register_flow))
        .route("/workspaces/{workspace}/flows/{flow}/stream", get(flow_stream))
        .route("/workspaces/{workspace}/flows/{flow}/events", post(append_flow_event))
        .route("/workspaces/{workspace}/flows/{flow}/actions/{action}/events", post(append_action_event))
        .route("/workspaces/{workspace}/flows/{flow}/actions/{action}/close", post(close_action))
        .route(
            "/workspaces/{workspace}/flows/{flow}/actions/{action}/history",
            get(action_history).layer(CompressionLayer::new()),
        )
        .route("/workspaces/{workspace}/flows/{flow}/actions/{action}/history/stream", get(action_history_stream))
        .route("/stats", get(get_stats))
        .with_state(engine)
}

#[derive(Deserialize)]
pub struct CursorQuery {
    pub cursor: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppendRequest {
    #[serde(default)]
    pub parent_id: String,
    pub event_type: EventType,
    #[serde(default)]
    pub payload: Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionAppendRequest {
    pub event_type: EventType,
    #[serde(default)]
    pub payload: Value,
}

// --- Streaming ---

async fn flow_stream(
    ws: WebSocketUpgrade,
    Path((workspace, flow)): Path<(String, String)>,
    State(engine): State<FlowtailEngine>,
) -> Result<Response, ApiError> {
    engine.ensure_flow(&workspace, &flow)?;

    let session = PushSession::open(workspace, flow, engine.log.clone(), engine.streaming.clone());
    let config = engine.streaming.clone();
    let shutdown = engine.shutdown.clone();

    Ok(ws.on_upgrade(move |socket| async move {
        serve_push(socket, session, &config, shutdown).await;
    }))
}

async fn action_history(
    Path((workspace, flow, action)): Path<(String, String, String)>,
    Query(query): Query<CursorQuery>,
    State(engine): State<FlowtailEngine>,
) -> Result<Json<PullPage>, ApiError> {
    engine.ensure_flow(&workspace, &flow)?;

    let cursor = Cursor::parse_or_start(query.cursor.as_deref())?;
    let key = StreamKey::for_action(&workspace, &flow, &action);
    let page = pull(&engine.log, &key, cursor, &engine.streaming).await?;
    Ok(Json(page))
}

async fn action_history_stream(
    ws: WebSocketUpgrade,
    Path((workspace, flow, action)): Path<(String, String, String)>,
    Query(query): Query<CursorQuery>,
    State(engine): State<FlowtailEngine>,
) -> Result<Response, ApiError> {
    engine.ensure_flow(&workspace, &flow)?;

    let cursor = Cursor::parse_or_start(query.cursor.as_deref())?;
    let key = StreamKey::for_action(&workspace, &flow, &action);
    let session = SingleStreamSession::open(key, cursor, engine.log.clone(), engine.streaming.clone());
    let config = engine.streaming.clone();
    let shutdown = engine.shutdown.clone();

    Ok(ws.on_upgrade(move |socket| async move {
        serve_single_stream(socket, session, &config, shutdown).await;
    }))
}

// --- Producer side (stands in for the flow engine) ---

async fn register_flow(
    Path((workspace, flow)): Path<(String, String)>,
    State(engine): State<FlowtailEngine>,
) -> StatusCode {
    engine.directory.register_flow(&workspace, &flow);
    tracing::info!(workspace = %workspace, flow = %flow, "Flow registered");
    StatusCode::NO_CONTENT
}

async fn append_flow_event(
    Path((workspace, flow)): Path<(String, String)>,
    State(engine): State<FlowtailEngine>,
    Json(req): Json<AppendRequest>,
) -> Result<impl IntoResponse, ApiError> {
    engine.ensure_flow(&workspace, &flow)?;

    let key = StreamKey::new(workspace, flow, req.parent_id);
    let cursor = engine.log.append(&key, req.event_type, req.payload).await?;
    Ok((StatusCode::CREATED, Json(json!({ "streamMessageId": cursor }))))
}

async fn append_action_event(
    Path((workspace, flow, action)): Path<(String, String, String)>,
    State(engine): State<FlowtailEngine>,
    Json(req): Json<ActionAppendRequest>,
) -> Result<impl IntoResponse, ApiError> {
    engine.ensure_flow(&workspace, &flow)?;

    let key = StreamKey::for_action(&workspace, &flow, &action);
    let cursor = engine.log.append(&key, req.event_type, req.payload).await?;
    Ok((StatusCode::CREATED, Json(json!({ "streamMessageId": cursor }))))
}

async fn close_action(
    Path((workspace, flow, action)): Path<(String, String, String)>,
    State(engine): State<FlowtailEngine>,
) -> Result<StatusCode, ApiError> {
    engine.ensure_flow(&workspace, &flow)?;

    engine.log.close(&StreamKey::for_action(&workspace, &flow, &action)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_stats(State(engine): State<FlowtailEngine>) -> Result<impl IntoResponse, ApiError> {
    let keys = engine.log.stats().await?;
    Ok(Json(json!({
        "uptimeSecs": engine.start_time.elapsed().as_secs(),
        "keys": keys,
    })))
}
