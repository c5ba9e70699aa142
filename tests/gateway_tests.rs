// HTTP-level tests for the REST gateway: bearer-token handling, 401
// session teardown, error-body extraction, and wire formats.

use chatpulse::api::{ApiError, ChatGateway, OutgoingMessage, RestGateway};
use chatpulse::session::{save_session, set_session_path_override, Session};
use chrono::Utc;
use once_cell::sync::Lazy;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

static SESSION_DIR: Lazy<tempfile::TempDir> =
    Lazy::new(|| tempfile::tempdir().expect("failed to create session dir"));

fn use_temp_session_path() {
    // First caller wins; later calls see the same override.
    let _ = set_session_path_override(SESSION_DIR.path().join("session.json"));
}

#[tokio::test]
async fn attaches_bearer_token_when_a_session_exists() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/chat/rooms"))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = RestGateway::new(server.uri(), Some(Session::new("test-token")));
    let rooms = gateway.get_chat_rooms().await.expect("request failed");
    assert!(rooms.is_empty());
}

#[tokio::test]
async fn omits_authorization_header_without_a_session() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/chat/rooms"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = RestGateway::new(server.uri(), None);
    gateway.get_chat_rooms().await.expect("request failed");

    let requests = server.received_requests().await.expect("recording enabled");
    assert!(!requests[0].headers.contains_key("authorization"));
}

#[tokio::test]
async fn unauthorized_response_clears_the_session() {
    use_temp_session_path();
    save_session(&Session::new("stale-token")).expect("failed to save session");

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/chat/rooms"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let gateway =
        RestGateway::from_saved_session(server.uri()).expect("failed to load session");
    let error = gateway.get_chat_rooms().await.expect_err("expected 401");
    assert!(matches!(error, ApiError::Unauthorized));

    // Persisted session is gone and the in-memory token is dropped:
    // the follow-up request goes out without an Authorization header.
    assert!(!SESSION_DIR.path().join("session.json").exists());
    let _ = gateway.get_chat_rooms().await;
    let requests = server.received_requests().await.expect("recording enabled");
    assert!(!requests
        .last()
        .expect("at least one request")
        .headers
        .contains_key("authorization"));
}

#[tokio::test]
async fn server_error_message_is_extracted_from_the_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/posts/p1/like"))
        .respond_with(
            ResponseTemplate::new(500).set_body_json(json!({ "message": "like limit reached" })),
        )
        .mount(&server)
        .await;

    let gateway = RestGateway::new(server.uri(), None);
    let error = gateway.toggle_like("p1").await.expect_err("expected 500");
    match error {
        ApiError::Status { status, message } => {
            assert_eq!(status, 500);
            assert_eq!(message, "like limit reached");
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn toggle_response_accepts_liked_and_bookmarked_field_names() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/posts/p1/like"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "liked": true, "count": 6 })),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/posts/p1/bookmark"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "bookmarked": false, "count": 2 })),
        )
        .mount(&server)
        .await;

    let gateway = RestGateway::new(server.uri(), None);

    let like = gateway.toggle_like("p1").await.expect("request failed");
    assert_eq!(like.flag, Some(true));
    assert_eq!(like.count, Some(6));

    let bookmark = gateway.toggle_bookmark("p1").await.expect("request failed");
    assert_eq!(bookmark.flag, Some(false));
    assert_eq!(bookmark.count, Some(2));
}

#[tokio::test]
async fn send_message_posts_the_wire_format_and_parses_the_confirmation() {
    let server = MockServer::start().await;
    let timestamp = Utc::now();
    Mock::given(method("POST"))
        .and(path("/chat/messages"))
        .and(body_partial_json(json!({
            "senderId": "me",
            "receiverId": "alice",
            "chatRoomId": "alice_me",
            "type": "TEXT"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "srv-1",
            "senderId": "me",
            "receiverId": "alice",
            "content": "hello",
            "timestamp": timestamp,
            "read": false,
            "chatRoomId": "alice_me"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = RestGateway::new(server.uri(), Some(Session::new("test-token")));
    let confirmed = gateway
        .send_message(&OutgoingMessage {
            sender_id: "me".to_string(),
            receiver_id: "alice".to_string(),
            content: "hello".to_string(),
            chat_room_id: "alice_me".to_string(),
            timestamp,
            read: false,
            message_type: "TEXT".to_string(),
        })
        .await
        .expect("request failed");

    assert_eq!(confirmed.id, "srv-1");
    assert_eq!(confirmed.chat_room_id, "alice_me");
}

#[tokio::test]
async fn message_history_request_carries_paging_parameters() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/chat/rooms/alice_me/messages"))
        .and(query_param("page", "0"))
        .and(query_param("size", "1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "content": [], "last": true })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let gateway = RestGateway::new(server.uri(), None);
    let page = gateway
        .get_chat_messages("alice_me", 0, 1)
        .await
        .expect("request failed");
    assert!(page.content.is_empty());
    assert!(page.last);
}
