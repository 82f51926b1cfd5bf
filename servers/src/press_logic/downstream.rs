use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::{
    extract::{
        rejection::JsonRejection,
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use futures_util::StreamExt;
use lib_common::{EventRecord, Frame, SpecTable};
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::press_logic::config::Config;
use crate::press_logic::state::AppState;

static NEXT_CLIENT_ID: AtomicUsize = AtomicUsize::new(1);

/// Runs the HTTP + WebSocket front until a shutdown signal arrives.
pub async fn run(
    config: Config,
    app_state: AppState,
    mut shutdown: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/data", axum::routing::post(ingest_handler))
        .route("/data/last", get(last_handler))
        .route("/data/events", get(events_handler))
        .route("/ideal", get(spec_handler).put(replace_spec_handler))
        .route(config.ws_path(), get(ws_handler))
        .layer(build_cors(config.cors_origin()))
        .with_state(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port()));
    tracing::info!(%addr, ws_path = config.ws_path(), "press relay listening");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.recv().await.ok();
            tracing::info!("downstream server shutting down");
        })
        .await?;
    Ok(())
}

fn build_cors(origin: &str) -> CorsLayer {
    if origin == "*" {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<HeaderValue> = origin
            .split(',')
            .filter_map(|s| s.trim().parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

/// Route-level error mapping: validation failures surface as 400 with the
/// reason, anything else as an opaque 500.
enum AppError {
    BadRequest(String),
    Internal(anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_json) = match self {
            AppError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, json!({ "error": message }))
            }
            AppError::Internal(e) => {
                tracing::error!(error = %e, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "internal_error" }),
                )
            }
        };
        (status, Json(error_json)).into_response()
    }
}

async fn health_handler() -> &'static str {
    "ok"
}

async fn metrics_handler(State(state): State<AppState>) -> Result<Response, AppError> {
    let body = state
        .metrics
        .render()
        .map_err(|e| AppError::Internal(e.into()))?;
    Ok((
        [(
            header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        body,
    )
        .into_response())
}

/// `POST /data`: the request/response inbound record source. Validation
/// happens here, at the boundary; a rejected record never touches the
/// pipeline. An unparseable body gets the same `{error: ...}` shape as a
/// structurally invalid record.
async fn ingest_handler(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<StatusCode, AppError> {
    let Json(body) = body.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let record = EventRecord::from_value(&body, state.validation_mode)
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    state.ingestor.submit(record);
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /data/last`: the most recently ingested record, `{}` before the
/// first one.
async fn last_handler(State(state): State<AppState>) -> Json<Value> {
    match state.ingestor.current() {
        Some(record) => Json(json!(record)),
        None => Json(json!({})),
    }
}

/// `GET /data/events?limit=`: the history tail. The limit is clamped to
/// `[1, N]` here; a missing or unparseable limit falls back to 200.
async fn events_handler(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Vec<EventRecord>> {
    let limit = params
        .get("limit")
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(200)
        .clamp(1, state.ring_capacity);
    Json(state.ingestor.tail(limit))
}

/// `GET /ideal`: the current spec table.
async fn spec_handler(State(state): State<AppState>) -> Json<SpecTable> {
    Json(state.specs.snapshot())
}

/// `PUT /ideal`: atomic whole-table replacement, persisted, with the target
/// gauges recomputed from the new table. A body that is not a well-formed
/// spec table is a 400 in the same `{error: ...}` shape as every other
/// rejection.
async fn replace_spec_handler(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<StatusCode, AppError> {
    let Json(body) = body.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let table = parse_spec_table(body)?;
    state.metrics.set_targets(&table);
    state.specs.replace(table).map_err(AppError::Internal)?;
    Ok(StatusCode::NO_CONTENT)
}

fn parse_spec_table(body: Value) -> Result<SpecTable, AppError> {
    serde_json::from_value(body)
        .map_err(|e| AppError::BadRequest(format!("invalid spec table: {e}")))
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// One WebSocket session: duplex. Outbound, the socket drains its dispatcher
/// frame channel (records, liveness pings, eviction close). Inbound, text
/// frames are validated and ingested exactly like `POST /data`, with an
/// error reply instead of a 400.
async fn handle_socket(mut socket: WebSocket, state: AppState) {
    let client_id = format!("ws-{}", NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed));
    let mut frames = state.dispatcher.subscribe(&client_id);

    loop {
        tokio::select! {
            msg = socket.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if !handle_inbound(&state, &mut socket, text.as_str()).await {
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => state.dispatcher.mark_alive(&client_id),
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {} // binary and ping frames are ignored
                    Some(Err(_)) => break,
                }
            }
            frame = frames.recv() => {
                match frame {
                    Some(Frame::Data(text)) => {
                        if socket.send(Message::Text(text.as_ref().into())).await.is_err() {
                            break;
                        }
                    }
                    Some(Frame::Ping) => {
                        if socket.send(Message::Ping(Vec::new().into())).await.is_err() {
                            break;
                        }
                    }
                    Some(Frame::Close) | None => {
                        let _ = socket.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
        }
    }

    state.dispatcher.unsubscribe(&client_id);
    tracing::info!(subscriber = %client_id, "connection closed");
}

/// Validates and ingests one inbound producer frame. Invalid frames get a
/// `{type: "error"}` reply and the connection stays open. Returns `false`
/// only when the socket itself is gone.
async fn handle_inbound(state: &AppState, socket: &mut WebSocket, text: &str) -> bool {
    let message = match serde_json::from_str::<Value>(text) {
        Ok(value) => match EventRecord::from_value(&value, state.validation_mode) {
            Ok(record) => {
                state.ingestor.submit(record);
                return true;
            }
            Err(e) => e.to_string(),
        },
        Err(_) => "invalid_message".to_string(),
    };
    let reply = json!({ "type": "error", "message": message }).to_string();
    socket.send(Message::Text(reply.into())).await.is_ok()
}
