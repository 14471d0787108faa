use super::*;
use relay_core::message::{MediaAttachment, OutgoingContent};
use relay_core::traits::WhatsAppClient;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn bridge(uri: &str, token: &str) -> WhatsAppBridge {
    let config = WhatsAppConfig {
        bridge_url: format!("{uri}/"),
        bridge_token: token.to_string(),
        ..Default::default()
    };
    WhatsAppBridge::new(&config, Arc::new(ConnectionManager::new())).unwrap()
}

#[test]
fn test_generate_qr_terminal() {
    let qr = generate_qr_terminal("2@test-data").unwrap();
    assert!(!qr.is_empty());
    assert!(qr.contains('\n'));
}

#[test]
fn test_generate_qr_image_is_png() {
    let png = generate_qr_image("2@test-data").unwrap();
    assert_eq!(&png[..4], &[0x89, 0x50, 0x4E, 0x47]);
    assert!(qr_png_base64("2@test-data").unwrap().starts_with("iVBOR"));
}

#[test]
fn test_connection_starts_initializing() {
    let manager = ConnectionManager::new();
    let status = manager.status();
    assert_eq!(status.state, ConnectionState::Initializing);
    assert!(!manager.is_ready());
    assert!(status.last_qr.is_none());
}

#[test]
fn test_connection_pairing_flow() {
    let manager = ConnectionManager::new();

    let s = manager.apply(ConnectionEvent::Qr("2@abc".into()));
    assert_eq!(s.state, ConnectionState::QrPending);
    assert_eq!(s.last_qr.as_deref(), Some("2@abc"));

    let s = manager.apply(ConnectionEvent::Authenticated);
    assert_eq!(s.state, ConnectionState::Authenticated);
    assert!(s.last_qr.is_none());
    assert!(!manager.is_ready());

    manager.apply(ConnectionEvent::Ready);
    assert!(manager.is_ready());

    let s = manager.apply(ConnectionEvent::Disconnected("NAVIGATION".into()));
    assert_eq!(s.state, ConnectionState::Disconnected);
    assert_eq!(s.reason.as_deref(), Some("NAVIGATION"));
    assert!(!manager.is_ready());
}

#[test]
fn test_change_state_maps_raw_states() {
    let manager = ConnectionManager::new();
    let s = manager.apply(ConnectionEvent::ChangeState("OPENING".into()));
    assert_eq!(s.state, ConnectionState::Initializing);
    assert_eq!(s.raw_state.as_deref(), Some("OPENING"));

    assert!(manager
        .apply(ConnectionEvent::ChangeState("CONNECTED".into()))
        .is_ready());
    let s = manager.apply(ConnectionEvent::ChangeState("UNPAIRED".into()));
    assert_eq!(s.state, ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_subscribers_see_transitions_in_order() {
    let manager = ConnectionManager::new();
    let mut rx = manager.subscribe();

    manager.apply(ConnectionEvent::Qr("2@one".into()));
    manager.apply(ConnectionEvent::Authenticated);
    manager.apply(ConnectionEvent::Ready);

    assert_eq!(rx.recv().await.unwrap().state, ConnectionState::QrPending);
    assert_eq!(rx.recv().await.unwrap().state, ConnectionState::Authenticated);
    assert_eq!(rx.recv().await.unwrap().state, ConnectionState::Ready);
}

#[test]
fn test_event_wire_format() {
    let qr: ConnectionEvent = serde_json::from_value(json!({"event": "qr", "data": "2@x"})).unwrap();
    assert_eq!(qr, ConnectionEvent::Qr("2@x".into()));

    let ready: ConnectionEvent =
        serde_json::from_value(json!({"event": "ready", "data": null})).unwrap();
    assert_eq!(ready, ConnectionEvent::Ready);

    let failure: ConnectionEvent =
        serde_json::from_value(json!({"event": "auth_failure", "data": "bad session"})).unwrap();
    assert_eq!(failure, ConnectionEvent::AuthFailure("bad session".into()));

    assert!(serde_json::from_value::<ConnectionEvent>(json!({"event": "exploded"})).is_err());
}

#[tokio::test]
async fn test_is_connected_follows_connection_state() {
    let wa = bridge("http://127.0.0.1:9", "");
    assert!(!wa.is_connected().await);
    wa.connection().apply(ConnectionEvent::Ready);
    assert!(wa.is_connected().await);
}

#[tokio::test]
async fn test_send_text_posts_to_bridge() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/messages"))
        .and(header("authorization", "Bearer tok"))
        .and(body_partial_json(json!({
            "chatId": "212600000000@c.us",
            "content": {"type": "text", "text": "hello"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "true_212600000000@c.us_ABC"})))
        .expect(1)
        .mount(&server)
        .await;

    let wa = bridge(&server.uri(), "tok");
    let receipt = wa
        .send_message("212600000000@c.us", OutgoingContent::Text("hello".into()))
        .await
        .unwrap();
    assert_eq!(receipt.id, "true_212600000000@c.us_ABC");
}

#[tokio::test]
async fn test_send_document_encodes_media() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/messages"))
        .and(body_partial_json(json!({
            "content": {
                "type": "document",
                "mimetype": "application/pdf",
                "filename": "report.pdf",
                "data": "JVBERg==",
                "caption": "report.pdf"
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "doc1"})))
        .expect(1)
        .mount(&server)
        .await;

    let wa = bridge(&server.uri(), "");
    let media = MediaAttachment::new("application/pdf", Some("report.pdf".into()), b"%PDF".to_vec());
    let receipt = wa
        .send_message(
            "212600000000@c.us",
            OutgoingContent::Document {
                media,
                caption: Some("report.pdf".into()),
            },
        )
        .await
        .unwrap();
    assert_eq!(receipt.id, "doc1");
}

#[tokio::test]
async fn test_send_failure_is_send_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/messages"))
        .respond_with(ResponseTemplate::new(500).set_body_string("browser crashed"))
        .expect(1)
        .mount(&server)
        .await;

    let wa = bridge(&server.uri(), "");
    let err = wa
        .send_message("212600000000@c.us", OutgoingContent::Text("hi".into()))
        .await
        .unwrap_err();
    assert!(matches!(err, RelayError::Send(_)));
    assert!(err.to_string().contains("browser crashed"));
}

#[tokio::test]
async fn test_number_lookup_registered_and_unregistered() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/numbers/212600000000@c.us"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"registered": true, "jid": "212600000000@c.us"})),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/numbers/212611111111@c.us"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"registered": false})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/numbers/212622222222@c.us"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let wa = bridge(&server.uri(), "");
    let found = wa.get_number_id("212600000000@c.us").await.unwrap();
    assert_eq!(found.unwrap().jid, "212600000000@c.us");
    assert!(wa.get_number_id("212611111111@c.us").await.unwrap().is_none());
    assert!(wa.get_number_id("212622222222@c.us").await.unwrap().is_none());
}

#[tokio::test]
async fn test_history_reads() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/chats"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "212600000000@c.us", "name": "Sara", "isGroup": false},
            {"id": "1203630@g.us", "isGroup": true}
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/chats/212600000000@c.us/messages"))
        .and(query_param("limit", "5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "m1", "body": "hi", "fromMe": true, "timestamp": 1705300000, "ack": 2, "type": "chat", "isStatus": false}
        ])))
        .mount(&server)
        .await;

    let wa = bridge(&server.uri(), "");
    let chats = wa.get_chats().await.unwrap();
    assert_eq!(chats.len(), 2);
    assert!(chats[1].is_group);

    let msgs = wa.fetch_messages("212600000000@c.us", 5).await.unwrap();
    assert_eq!(msgs.len(), 1);
    assert!(msgs[0].from_me);
    assert_eq!(msgs[0].ack, 2);
    assert_eq!(msgs[0].kind, "chat");
}

#[tokio::test]
async fn test_reads_retry_then_succeed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/chats"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/chats"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let wa = bridge(&server.uri(), "");
    assert!(wa.get_chats().await.unwrap().is_empty());
}
