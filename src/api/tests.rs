use super::*;
use axum::body::Body;
use axum::http::Request;
use http_body_util::BodyExt;
use relay_core::config::MessageMode;
use relay_core::phone::PhoneNormalizer;
use relay_core::testing::{sample_task, MockRenderer, MockTaskSource, MockWhatsApp};
use relay_core::traits::MarkerMatcher;
use std::time::Duration;
use tower::ServiceExt;

struct Harness {
    state: ApiState,
    mock: Arc<MockWhatsApp>,
    source: Arc<MockTaskSource>,
    _dir: tempfile::TempDir,
}

fn harness(api_key: Option<&str>) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let store = LogStore::new(
        dir.path().join("send_logs.json"),
        100,
        true,
        MessageMode::Preview,
        chrono_tz::UTC,
    );
    let mock = Arc::new(MockWhatsApp::connected());
    let client: Arc<dyn WhatsAppClient> = mock.clone();
    let normalizer = PhoneNormalizer::new(Some("212"), "c.us");
    let source = Arc::new(MockTaskSource::with_tasks(vec![sample_task(7, "0611111111")]));

    let connection = Arc::new(ConnectionManager::new());
    connection.apply(ConnectionEvent::Ready);

    let state = ApiState {
        api_key: api_key.map(str::to_string),
        uptime: Instant::now(),
        connection,
        client: client.clone(),
        store: store.clone(),
        bulk: Arc::new(BulkDispatcher::new(
            client.clone(),
            store.clone(),
            normalizer.clone(),
            Duration::ZERO,
        )),
        sender: DirectSender::new(client.clone(), store.clone(), normalizer.clone()),
        renderer: Some(Arc::new(MockRenderer::default())),
        runner: Some(Arc::new(ReminderRunner::new(
            client,
            source.clone(),
            store,
            normalizer,
            true,
            Duration::ZERO,
        ))),
        matcher: Arc::new(MarkerMatcher::default()),
        backfill: BackfillOptions::default(),
    };

    Harness {
        state,
        mock,
        source,
        _dir: dir,
    }
}

async fn body_json(resp: Response) -> Value {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn empty_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

const BOUNDARY: &str = "relay-test-boundary";

/// Hand-built multipart body: `(name, filename, content_type, data)`.
fn multipart_request(parts: &[(&str, Option<&str>, Option<&str>, &[u8])]) -> Request<Body> {
    let mut body = Vec::new();
    for (name, filename, content_type, data) in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        let disposition = match filename {
            Some(f) => format!("Content-Disposition: form-data; name=\"{name}\"; filename=\"{f}\"\r\n"),
            None => format!("Content-Disposition: form-data; name=\"{name}\"\r\n"),
        };
        body.extend_from_slice(disposition.as_bytes());
        if let Some(ct) = content_type {
            body.extend_from_slice(format!("Content-Type: {ct}\r\n").as_bytes());
        }
        body.extend_from_slice(b"\r\n");
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri("/api/send-bulk")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

// ---------------------------------------------------------------------------
// auth
// ---------------------------------------------------------------------------

#[test]
fn test_constant_time_eq() {
    assert!(constant_time_eq("secret", "secret"));
    assert!(!constant_time_eq("secret", "secreT"));
    assert!(!constant_time_eq("short", "longer"));
}

#[tokio::test]
async fn test_auth_required_when_key_set() {
    let h = harness(Some("k3y"));
    let app = build_router(h.state);

    let resp = app
        .clone()
        .oneshot(empty_request("GET", "/api/health"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let req = Request::builder()
        .uri("/api/health")
        .header("authorization", "Bearer wrong")
        .body(Body::empty())
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let req = Request::builder()
        .uri("/api/health")
        .header("authorization", "Bearer k3y")
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[test]
fn test_api_key_from_config() {
    let mut config = ApiConfig::default();
    assert_eq!(api_key(&config), None);
    config.api_key = "abc".into();
    assert_eq!(api_key(&config).as_deref(), Some("abc"));
}

// ---------------------------------------------------------------------------
// status
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_health_reports_state() {
    let h = harness(None);
    let resp = build_router(h.state)
        .oneshot(empty_request("GET", "/api/health"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["whatsapp"], "ready");
    assert_eq!(json["logs"], 0);
}

#[tokio::test]
async fn test_status_includes_qr_png_while_pairing() {
    let h = harness(None);
    h.state
        .connection
        .apply(ConnectionEvent::Qr("2@pairing-code".into()));
    let resp = build_router(h.state)
        .oneshot(empty_request("GET", "/api/status"))
        .await
        .unwrap();
    let json = body_json(resp).await;
    assert_eq!(json["connected"], false);
    assert_eq!(json["connection"]["state"], "qr_pending");
    assert!(json["qrPngBase64"].as_str().is_some_and(|s| !s.is_empty()));
}

#[tokio::test]
async fn test_bridge_event_updates_connection() {
    let h = harness(None);
    let connection = h.state.connection.clone();
    let resp = build_router(h.state)
        .oneshot(json_request(
            "POST",
            "/api/whatsapp/events",
            json!({"event": "disconnected", "data": "NAVIGATION"}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["state"], "disconnected");
    assert!(!connection.is_ready());
}

// ---------------------------------------------------------------------------
// sends
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_send_text_and_log() {
    let h = harness(None);
    let store = h.state.store.clone();
    let resp = build_router(h.state)
        .oneshot(json_request(
            "POST",
            "/api/send",
            json!({"phone": "0611111111", "message": "Hello"}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["success"], true);
    assert_eq!(json["jid"], "212611111111@c.us");

    let logs = store.entries().await;
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].kind, relay_sendlog::LogType::ReminderSuccess);
    assert_eq!(h.mock.sent()[0].text.as_deref(), Some("Hello"));
}

#[tokio::test]
async fn test_send_validation_and_unregistered() {
    let h = harness(None);
    h.mock.unregister("212622222222@c.us");
    let app = build_router(h.state);

    let resp = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/send",
            json!({"phone": "0611111111", "message": "  "}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(resp).await["error"], "validation_error");

    let resp = app
        .oneshot(json_request(
            "POST",
            "/api/send",
            json!({"phone": "0622222222", "message": "Hi"}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(resp).await["error"], "not_on_whatsapp");
}

#[tokio::test]
async fn test_send_when_disconnected_is_unavailable() {
    let h = harness(None);
    h.mock.set_connected(false);
    let resp = build_router(h.state)
        .oneshot(json_request(
            "POST",
            "/api/send",
            json!({"phone": "0611111111", "message": "Hi"}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(resp).await["error"], "not_connected");
}

#[tokio::test]
async fn test_send_template_renders_then_sends() {
    let h = harness(None);
    let resp = build_router(h.state)
        .oneshot(json_request(
            "POST",
            "/api/send-template",
            json!({"phone": "0611111111", "templateKey": "welcome", "params": {"name": "Sara"}}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(h.mock.sent()[0].text.as_deref(), Some("welcome: name=Sara"));
}

#[tokio::test]
async fn test_send_template_failures() {
    let mut h = harness(None);
    h.state.renderer = Some(Arc::new(MockRenderer::failing()));
    let resp = build_router(h.state.clone())
        .oneshot(json_request(
            "POST",
            "/api/send-template",
            json!({"phone": "0611111111", "templateKey": "welcome"}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    assert!(h.mock.sent().is_empty());

    h.state.renderer = None;
    let resp = build_router(h.state)
        .oneshot(json_request(
            "POST",
            "/api/send-template",
            json!({"phone": "0611111111", "templateKey": "welcome"}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(resp).await["error"], "templates_not_configured");
}

#[tokio::test]
async fn test_send_bulk_multipart() {
    let h = harness(None);
    h.mock.unregister("212622222222@c.us");
    let req = multipart_request(&[
        ("message", None, None, b"Campaign"),
        ("phones", None, None, br#"["0611111111", "0622222222"]"#),
        ("document", Some("brochure.pdf"), Some("application/pdf"), b"%PDF-1.4"),
    ]);
    let resp = build_router(h.state).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let json = body_json(resp).await;
    assert_eq!(json["total"], 2);
    assert_eq!(json["sent"], 1);
    assert_eq!(json["failed"], 1);
    assert_eq!(json["errors"][0]["recipient"], "0622222222");

    let sent = h.mock.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[1].kind, "document");
    assert_eq!(sent[1].caption.as_deref(), Some("brochure.pdf"));
}

#[tokio::test]
async fn test_send_bulk_rejects_bad_phones() {
    let h = harness(None);
    let app = build_router(h.state);

    let resp = app
        .clone()
        .oneshot(multipart_request(&[
            ("message", None, None, b"Hi"),
            ("phones", None, None, b"0611111111"),
        ]))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = app
        .oneshot(multipart_request(&[("message", None, None, b"Hi")]))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(h.mock.sent().is_empty());
}

// ---------------------------------------------------------------------------
// logs
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_logs_query_sent_view_and_clear() {
    let h = harness(None);
    let app = build_router(h.state);

    for phone in ["0611111111", "0633333333"] {
        let resp = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/send",
                json!({"phone": phone, "message": "Hello"}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    let resp = app
        .clone()
        .oneshot(empty_request("GET", "/api/logs?type=reminder_success&limit=1"))
        .await
        .unwrap();
    let json = body_json(resp).await;
    assert_eq!(json["count"], 1);
    assert_eq!(json["logs"][0]["request"]["to"], "0633333333");

    let resp = app
        .clone()
        .oneshot(empty_request("GET", "/api/logs/sent"))
        .await
        .unwrap();
    assert_eq!(body_json(resp).await["count"], 2);

    let resp = app
        .clone()
        .oneshot(empty_request("DELETE", "/api/logs"))
        .await
        .unwrap();
    assert_eq!(body_json(resp).await["cleared"], true);

    let resp = app
        .oneshot(empty_request("GET", "/api/logs"))
        .await
        .unwrap();
    assert_eq!(body_json(resp).await["count"], 0);
}

#[tokio::test]
async fn test_logs_rejects_unknown_type() {
    let h = harness(None);
    let resp = build_router(h.state)
        .oneshot(empty_request("GET", "/api/logs?type=bogus"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_backfill_with_empty_history() {
    let h = harness(None);
    let resp = build_router(h.state)
        .oneshot(empty_request("POST", "/api/logs/backfill?sinceDays=7"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["scannedChats"], 0);
    assert_eq!(json["inserted"], 0);
}

// ---------------------------------------------------------------------------
// reminders
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_run_reminders_for_date() {
    let h = harness(None);
    let resp = build_router(h.state)
        .oneshot(empty_request("POST", "/api/reminders/run?date=2024-01-15"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["ok"], true);
    assert_eq!(json["date"], "2024-01-15");
    assert_eq!(json["sent"], 1);

    let marked = h.source.marked.lock().unwrap().clone();
    assert_eq!(marked.len(), 1);
    assert_eq!(marked[0].0, 7);
}

#[tokio::test]
async fn test_run_reminders_without_runner() {
    let mut h = harness(None);
    h.state.runner = None;
    let resp = build_router(h.state)
        .oneshot(empty_request("POST", "/api/reminders/run"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(resp).await["error"], "reminders_not_configured");
}
