//! HTTP API server.
//!
//! Sends (single, templated, bulk), send-log access, backfill and reminder
//! triggers, the bridge event webhook, and a WebSocket stream of connection
//! status changes.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        DefaultBodyLimit, Multipart, Query, State,
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::NaiveDate;
use relay_channels::whatsapp::{qr_png_base64, ConnectionEvent, ConnectionManager};
use relay_core::{
    config::ApiConfig,
    error::RelayError,
    message::MediaAttachment,
    traits::{ReminderMatcher, TemplateRenderer, WhatsAppClient},
};
use relay_dispatch::{BulkDispatcher, BulkRequest, DirectSender, ReminderRunner};
use relay_sendlog::{backfill, BackfillOptions, LogQuery, LogStore};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};

/// Largest accepted request body (bulk uploads carry media).
const MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

type ApiError = (StatusCode, Json<Value>);

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub(crate) api_key: Option<String>,
    pub(crate) uptime: Instant,
    pub(crate) connection: Arc<ConnectionManager>,
    pub(crate) client: Arc<dyn WhatsAppClient>,
    pub(crate) store: LogStore,
    pub(crate) bulk: Arc<BulkDispatcher>,
    pub(crate) sender: DirectSender,
    pub(crate) renderer: Option<Arc<dyn TemplateRenderer>>,
    pub(crate) runner: Option<Arc<ReminderRunner>>,
    pub(crate) matcher: Arc<dyn ReminderMatcher>,
    pub(crate) backfill: BackfillOptions,
}

#[derive(Debug, Deserialize)]
struct SendRequest {
    #[serde(alias = "to")]
    phone: String,
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TemplateRequest {
    #[serde(alias = "to")]
    phone: String,
    #[serde(alias = "key")]
    template_key: String,
    #[serde(default)]
    params: Map<String, Value>,
}

#[derive(Debug, Default, Deserialize)]
struct LimitParams {
    limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BackfillParams {
    since_days: Option<i64>,
    limit_per_chat: Option<usize>,
    max_chats: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct RunParams {
    date: Option<NaiveDate>,
}

#[derive(Debug, Default, Deserialize)]
struct WsParams {
    token: Option<String>,
}

/// Constant-time string comparison to prevent timing attacks on API token validation.
fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes()
        .zip(b.bytes())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

fn unauthorized(message: &str) -> ApiError {
    (StatusCode::UNAUTHORIZED, Json(json!({"error": message})))
}

/// Check bearer token auth. Returns `None` if authorized, `Some(response)` if rejected.
fn check_auth(headers: &HeaderMap, api_key: &Option<String>) -> Option<ApiError> {
    let key = api_key.as_ref()?;

    let Some(header) = headers.get("authorization") else {
        return Some(unauthorized("missing Authorization header"));
    };
    let Ok(value) = header.to_str() else {
        return Some(unauthorized("invalid Authorization header"));
    };

    match value.strip_prefix("Bearer ") {
        Some(token) if constant_time_eq(token, key) => None,
        _ => Some(unauthorized("invalid token")),
    }
}

/// HTTP status for a relay error.
fn status_for(err: &RelayError) -> StatusCode {
    match err {
        RelayError::Validation(_) => StatusCode::BAD_REQUEST,
        RelayError::NotConnected => StatusCode::SERVICE_UNAVAILABLE,
        RelayError::RecipientUnregistered(_) => StatusCode::NOT_FOUND,
        RelayError::Send(_) | RelayError::Render(_) | RelayError::Source(_) => {
            StatusCode::BAD_GATEWAY
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn relay_error(err: RelayError) -> ApiError {
    let status = status_for(&err);
    if status.is_server_error() {
        warn!("request failed: {err}");
    }
    (
        status,
        Json(json!({"error": err.kind(), "message": err.to_string()})),
    )
}

fn unavailable(what: &str) -> ApiError {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({"error": format!("{what}_not_configured")})),
    )
}

/// `GET /api/health`: liveness with uptime and WhatsApp state.
async fn health(
    headers: HeaderMap,
    State(state): State<ApiState>,
) -> Result<Json<Value>, ApiError> {
    if let Some(err) = check_auth(&headers, &state.api_key) {
        return Err(err);
    }

    Ok(Json(json!({
        "status": "ok",
        "uptime_secs": state.uptime.elapsed().as_secs(),
        "whatsapp": state.connection.status().state.as_str(),
        "logs": state.store.len().await,
    })))
}

/// `GET /api/status`: connection snapshot, with the pairing QR as PNG when pending.
async fn status(
    headers: HeaderMap,
    State(state): State<ApiState>,
) -> Result<Json<Value>, ApiError> {
    if let Some(err) = check_auth(&headers, &state.api_key) {
        return Err(err);
    }

    let status = state.connection.status();
    let qr_png_base64 = match status.last_qr.as_deref() {
        Some(qr) => match qr_png_base64(qr) {
            Ok(png) => Some(png),
            Err(e) => {
                error!("QR image generation failed: {e}");
                None
            }
        },
        None => None,
    };

    Ok(Json(json!({
        "connected": status.is_ready(),
        "connection": status,
        "qrPngBase64": qr_png_base64,
        "reminders": state.runner.is_some(),
        "templates": state.renderer.is_some(),
    })))
}

/// `POST /api/send`: one text message.
async fn send(
    headers: HeaderMap,
    State(state): State<ApiState>,
    Json(req): Json<SendRequest>,
) -> Result<Json<Value>, ApiError> {
    if let Some(err) = check_auth(&headers, &state.api_key) {
        return Err(err);
    }

    let outcome = state
        .sender
        .send_text(&req.phone, &req.message)
        .await
        .map_err(relay_error)?;
    Ok(Json(json!(outcome)))
}

/// `POST /api/send-template`: render remotely, then send.
async fn send_template(
    headers: HeaderMap,
    State(state): State<ApiState>,
    Json(req): Json<TemplateRequest>,
) -> Result<Json<Value>, ApiError> {
    if let Some(err) = check_auth(&headers, &state.api_key) {
        return Err(err);
    }
    let Some(renderer) = state.renderer.as_ref() else {
        return Err(unavailable("templates"));
    };

    let outcome = state
        .sender
        .send_template(renderer.as_ref(), &req.phone, &req.template_key, &req.params)
        .await
        .map_err(relay_error)?;
    Ok(Json(json!(outcome)))
}

fn bad_request(message: String) -> ApiError {
    relay_error(RelayError::Validation(message))
}

/// Parse the multipart bulk form: `message`, `phones` (JSON array), optional
/// `image` and `document` files.
async fn read_bulk_form(mut multipart: Multipart) -> Result<BulkRequest, ApiError> {
    let mut request = BulkRequest::default();
    let mut phones_seen = false;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("invalid multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "message" => {
                request.message = field
                    .text()
                    .await
                    .map_err(|e| bad_request(format!("invalid message field: {e}")))?;
            }
            "phones" => {
                let raw = field
                    .text()
                    .await
                    .map_err(|e| bad_request(format!("invalid phones field: {e}")))?;
                let phones: Vec<Value> = serde_json::from_str(&raw)
                    .map_err(|_| bad_request("phones must be a JSON array".into()))?;
                request.recipients = phones
                    .into_iter()
                    .filter_map(|p| match p {
                        Value::String(s) => Some(s),
                        Value::Number(n) => Some(n.to_string()),
                        _ => None,
                    })
                    .collect();
                phones_seen = true;
            }
            "image" | "document" => {
                let filename = field.file_name().map(str::to_string);
                let mime = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| bad_request(format!("invalid {name} upload: {e}")))?;
                if data.is_empty() {
                    continue;
                }
                let media = MediaAttachment::new(mime, filename, data.to_vec());
                if name == "image" {
                    request.image = Some(media);
                } else {
                    request.document = Some(media);
                }
            }
            other => debug!("send-bulk: ignoring form field '{other}'"),
        }
    }

    if !phones_seen {
        return Err(bad_request("phones is required".into()));
    }
    Ok(request)
}

/// `POST /api/send-bulk`: multipart bulk send.
async fn send_bulk(
    headers: HeaderMap,
    State(state): State<ApiState>,
    multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    if let Some(err) = check_auth(&headers, &state.api_key) {
        return Err(err);
    }

    let request = read_bulk_form(multipart).await?;
    let result = state.bulk.dispatch(request).await.map_err(relay_error)?;
    Ok(Json(json!(result)))
}

/// `GET /api/logs?type=&date=&limit=`
async fn list_logs(
    headers: HeaderMap,
    State(state): State<ApiState>,
    Query(query): Query<LogQuery>,
) -> Result<Json<Value>, ApiError> {
    if let Some(err) = check_auth(&headers, &state.api_key) {
        return Err(err);
    }

    let logs = state.store.query(&query).await;
    Ok(Json(json!({"count": logs.len(), "logs": logs})))
}

/// `GET /api/logs/sent?limit=`
async fn sent_logs(
    headers: HeaderMap,
    State(state): State<ApiState>,
    Query(params): Query<LimitParams>,
) -> Result<Json<Value>, ApiError> {
    if let Some(err) = check_auth(&headers, &state.api_key) {
        return Err(err);
    }

    let messages = state.store.sent_messages(params.limit).await;
    Ok(Json(json!({"count": messages.len(), "messages": messages})))
}

/// `DELETE /api/logs`
async fn clear_logs(
    headers: HeaderMap,
    State(state): State<ApiState>,
) -> Result<Json<Value>, ApiError> {
    if let Some(err) = check_auth(&headers, &state.api_key) {
        return Err(err);
    }

    let cleared = state.store.clear().await;
    Ok(Json(json!({"cleared": cleared})))
}

/// `POST /api/logs/backfill?sinceDays=&limitPerChat=&maxChats=`
async fn run_backfill(
    headers: HeaderMap,
    State(state): State<ApiState>,
    Query(params): Query<BackfillParams>,
) -> Result<Json<Value>, ApiError> {
    if let Some(err) = check_auth(&headers, &state.api_key) {
        return Err(err);
    }

    let opts = BackfillOptions {
        since_days: params.since_days.unwrap_or(state.backfill.since_days),
        limit_per_chat: params.limit_per_chat.unwrap_or(state.backfill.limit_per_chat),
        max_chats: params.max_chats.unwrap_or(state.backfill.max_chats),
    };
    let report = backfill::reconcile(
        &state.store,
        state.client.as_ref(),
        state.matcher.as_ref(),
        opts,
    )
    .await
    .map_err(relay_error)?;
    Ok(Json(json!(report)))
}

/// `POST /api/reminders/run?date=YYYY-MM-DD`: run reminders now.
async fn run_reminders(
    headers: HeaderMap,
    State(state): State<ApiState>,
    Query(params): Query<RunParams>,
) -> Result<Json<Value>, ApiError> {
    if let Some(err) = check_auth(&headers, &state.api_key) {
        return Err(err);
    }
    let Some(runner) = state.runner.as_ref() else {
        return Err(unavailable("reminders"));
    };

    let date = params.date.unwrap_or_else(|| runner.today());
    info!("reminders triggered over the API for {date}");
    let result = runner.run(date).await;
    Ok(Json(json!(result)))
}

/// `POST /api/whatsapp/events`: connection events pushed by the bridge.
async fn whatsapp_event(
    headers: HeaderMap,
    State(state): State<ApiState>,
    Json(event): Json<ConnectionEvent>,
) -> Result<Json<Value>, ApiError> {
    if let Some(err) = check_auth(&headers, &state.api_key) {
        return Err(err);
    }

    let status = state.connection.apply(event);
    Ok(Json(json!({"ok": true, "state": status.state.as_str()})))
}

/// `GET /api/ws`: stream connection status as JSON text frames.
///
/// Browsers cannot set headers on WebSocket requests, so `?token=` is also accepted.
async fn ws(
    headers: HeaderMap,
    State(state): State<ApiState>,
    Query(params): Query<WsParams>,
    upgrade: WebSocketUpgrade,
) -> Response {
    let token_ok = match (&state.api_key, params.token.as_deref()) {
        (Some(key), Some(token)) => constant_time_eq(token, key),
        _ => false,
    };
    if !token_ok {
        if let Some(err) = check_auth(&headers, &state.api_key) {
            return err.into_response();
        }
    }

    upgrade.on_upgrade(move |socket| stream_status(socket, state.connection))
}

async fn stream_status(mut socket: WebSocket, connection: Arc<ConnectionManager>) {
    let mut transitions = connection.subscribe();

    let initial = json!(connection.status()).to_string();
    if socket.send(Message::Text(initial.into())).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            next = transitions.recv() => match next {
                Ok(status) => {
                    let frame = json!(status).to_string();
                    if socket.send(Message::Text(frame.into())).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    debug!("ws subscriber lagged, {skipped} transitions skipped");
                }
                Err(RecvError::Closed) => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            },
        }
    }
}

/// Build the axum router with shared state.
pub(crate) fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/status", get(status))
        .route("/api/send", post(send))
        .route("/api/send-template", post(send_template))
        .route("/api/send-bulk", post(send_bulk))
        .route("/api/logs", get(list_logs).delete(clear_logs))
        .route("/api/logs/sent", get(sent_logs))
        .route("/api/logs/backfill", post(run_backfill))
        .route("/api/reminders/run", post(run_reminders))
        .route("/api/whatsapp/events", post(whatsapp_event))
        .route("/api/ws", get(ws))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}

/// Bearer key from config. Empty = no auth.
pub(crate) fn api_key(config: &ApiConfig) -> Option<String> {
    Some(config.api_key.clone()).filter(|k| !k.is_empty())
}

/// Start the API server. Runs until the listener fails.
pub async fn serve(config: ApiConfig, state: ApiState) {
    let app = build_router(state);
    let addr = format!("{}:{}", config.host, config.port);

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("API server failed to bind to {addr}: {e}");
            return;
        }
    };

    info!("API server listening on {addr}");

    if let Err(e) = axum::serve(listener, app).await {
        error!("API server error: {e}");
    }
}

#[cfg(test)]
mod tests;
