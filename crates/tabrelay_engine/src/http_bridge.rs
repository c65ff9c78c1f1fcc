//! HTTP polling transport: the agent polls `/get_command` for work and posts
//! replies to `/command_result`. Callers drive tasks through `/execute`.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tabrelay_core::{InboundFrame, RequestError, TaskRequest};
use tabrelay_logging::{relay_debug, relay_info, relay_warn};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

use crate::correlator::Correlator;
use crate::dispatcher::Dispatcher;
use crate::error::TaskError;
use crate::queue::CommandQueue;
use crate::report::TaskReport;

#[derive(Clone)]
pub struct BridgeState {
    pub queue: Arc<CommandQueue>,
    pub dispatcher: Arc<Dispatcher>,
}

impl BridgeState {
    fn correlator(&self) -> &Arc<Correlator> {
        self.dispatcher.correlator()
    }
}

pub fn router(state: BridgeState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/get_command", get(get_command))
        .route("/command_result", post(command_result))
        .route("/execute", post(execute))
        .route("/list_platforms", get(list_platforms))
        .layer(cors_layer())
        .with_state(state)
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
}

/// Serve `router` on `listener` until `shutdown` fires.
pub async fn serve(
    listener: TcpListener,
    state: BridgeState,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        relay_info!("HTTP bridge listening on http://{addr}");
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

async fn get_command(State(state): State<BridgeState>) -> Json<Value> {
    match state.queue.next_command() {
        Some(command) => {
            relay_debug!("Handing out command {}", command.id);
            Json(json!({ "status": "success", "command": command }))
        }
        None => Json(json!({ "status": "idle" })),
    }
}

async fn command_result(
    State(state): State<BridgeState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Response {
    let body = match payload {
        Ok(Json(body)) => body,
        Err(rejection) => {
            relay_warn!("Rejected command result: {}", rejection.body_text());
            return (
                rejection.status(),
                Json(json!({ "status": "error", "message": rejection.body_text() })),
            )
                .into_response();
        }
    };
    if body.get("id").is_none() {
        return Json(json!({ "status": "error", "message": "Missing command ID" })).into_response();
    }
    match InboundFrame::classify(body) {
        InboundFrame::Result(result) => {
            state.correlator().resolve(result);
        }
        InboundFrame::MalformedResult { id, raw } => {
            relay_warn!("Malformed result for command {id:?}: {raw}");
        }
        InboundFrame::Event(_) => {}
    }
    Json(json!({ "status": "success" })).into_response()
}

/// A request the bridge could not read, answered in the task error shape.
fn invalid_request(status: StatusCode, action: &str, message: String) -> Response {
    relay_warn!("Rejected /execute request: {message}");
    let err = TaskError::validation(message);
    (status, Json(TaskReport::failure(None, action, &err).to_value())).into_response()
}

async fn execute(
    State(state): State<BridgeState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Response {
    let body = match payload {
        Ok(Json(body)) => body,
        Err(rejection) => {
            return invalid_request(rejection.status(), "", rejection.body_text());
        }
    };
    let action = body
        .get("action")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let request = match TaskRequest::from_value(body) {
        Ok(request) => request,
        Err(err) => {
            return invalid_request(StatusCode::UNPROCESSABLE_ENTITY, &action, err.to_string());
        }
    };
    match state.dispatcher.handle(request).await {
        Ok(body) => Json(body).into_response(),
        Err(RequestError::UnknownAction(action)) => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "detail": format!("Invalid action: {action}") })),
        )
            .into_response(),
        Err(err) => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "detail": err.to_string() })),
        )
            .into_response(),
    }
}

async fn list_platforms(State(state): State<BridgeState>) -> Json<Value> {
    Json(json!({
        "status": "success",
        "platforms": state.dispatcher.list_platforms(),
    }))
}
