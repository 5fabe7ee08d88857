mod common;

use actix_web::{http::StatusCode, test, web, App};
use chrono::{Duration, Utc};
use common::{token_for, TestEnv};
use housing_chat_service::middleware::error_handling::ErrorResponse;
use housing_chat_service::models::{ConversationView, Message, MessageBody, MessageView};
use housing_chat_service::repository::ChatStore;
use housing_chat_service::routes;
use serde_json::json;
use uuid::Uuid;

macro_rules! app {
    ($env:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($env.state.clone()))
                .configure(|cfg| routes::configure(cfg, $env.state.jwt.clone())),
        )
        .await
    };
}

fn bearer(user: Uuid) -> (&'static str, String) {
    ("Authorization", format!("Bearer {}", token_for(user)))
}

#[actix_web::test]
async fn api_requires_a_valid_bearer_token() {
    let env = TestEnv::new();
    let app = app!(env);

    for header in [None, Some("Bearer not-a-jwt")] {
        let mut req = test::TestRequest::get().uri("/api/v1/conversations");
        if let Some(value) = header {
            req = req.insert_header(("Authorization", value));
        }
        let status = match test::try_call_service(&app, req.to_request()).await {
            Ok(res) => res.status(),
            Err(err) => err.as_response_error().status_code(),
        };
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    let ws = test::TestRequest::get().uri("/ws").to_request();
    let res = test::call_service(&app, ws).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn conversation_and_message_flow() {
    let env = TestEnv::new();
    let app = app!(env);
    let a = env.user("Alice").await;
    let b = env.user("Bruno").await;
    let property = Uuid::new_v4();

    let req = test::TestRequest::post()
        .uri("/api/v1/conversations")
        .insert_header(bearer(a))
        .set_json(json!({"other_user_id": b, "property_id": property}))
        .to_request();
    let conversation: ConversationView = test::call_and_read_body_json(&app, req).await;
    assert_eq!(conversation.property_id, property);
    assert_eq!(conversation.unread_count[&b], 0);

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/conversations/{}/messages", conversation.id))
        .insert_header(bearer(a))
        .set_json(json!({"message_type": "text", "content": "Is the room near campus?"}))
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let sent: MessageView = test::read_body_json(res).await;
    assert_eq!(sent.message.sender_id, a);

    let req = test::TestRequest::get()
        .uri("/api/v1/conversations")
        .insert_header(bearer(b))
        .to_request();
    let listed: Vec<ConversationView> = test::call_and_read_body_json(&app, req).await;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].unread_count[&b], 1);

    let req = test::TestRequest::get()
        .uri(&format!(
            "/api/v1/conversations/{}/messages?page=1&limit=20",
            conversation.id
        ))
        .insert_header(bearer(b))
        .to_request();
    let messages: Vec<MessageView> = test::call_and_read_body_json(&app, req).await;
    assert_eq!(messages.len(), 1);
    assert!(messages[0].message.read_by.contains(&b));

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/messages/{}/reactions", sent.id()))
        .insert_header(bearer(b))
        .set_json(json!({"emoji": "🏠"}))
        .to_request();
    let reacted: MessageView = test::call_and_read_body_json(&app, req).await;
    assert_eq!(reacted.reaction_counts[0].emoji, "🏠");

    let req = test::TestRequest::patch()
        .uri(&format!("/api/v1/messages/{}", sent.id()))
        .insert_header(bearer(a))
        .set_json(json!({"content": "Is the room close to campus?"}))
        .to_request();
    let edited: MessageView = test::call_and_read_body_json(&app, req).await;
    assert!(edited.message.is_edited);

    let req = test::TestRequest::delete()
        .uri(&format!("/api/v1/messages/{}?scope=for_everyone", sent.id()))
        .insert_header(bearer(a))
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/messages/{}", sent.id()))
        .insert_header(bearer(b))
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn errors_use_the_json_envelope() {
    let env = TestEnv::new();
    let app = app!(env);
    let a = env.user("Alice").await;
    let b = env.user("Bruno").await;
    let outsider = env.user("Olga").await;
    let conv = env.conversation(a, b).await;

    // malformed body
    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/conversations/{}/messages", conv.id))
        .insert_header(bearer(a))
        .set_json(json!({"message_type": "voice", "file_url": "https://cdn.campus.test/v.webm"}))
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: ErrorResponse = test::read_body_json(res).await;
    assert_eq!(body.code, "INVALID_REQUEST");

    // limit above the maximum
    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/conversations/{}/messages?limit=500", conv.id))
        .insert_header(bearer(a))
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    // not a participant
    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/conversations/{}/messages", conv.id))
        .insert_header(bearer(outsider))
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: ErrorResponse = test::read_body_json(res).await;
    assert_eq!(body.code, "FORBIDDEN");

    // edit window elapsed
    let old = env
        .store
        .insert_message(Message::new(
            conv.id,
            a,
            MessageBody::Text {
                content: "old".into(),
            },
            None,
            Utc::now() - Duration::minutes(20),
        ))
        .await
        .unwrap();
    let req = test::TestRequest::patch()
        .uri(&format!("/api/v1/messages/{}", old.id))
        .insert_header(bearer(a))
        .set_json(json!({"content": "new"}))
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: ErrorResponse = test::read_body_json(res).await;
    assert_eq!(body.code, "EDIT_WINDOW_EXPIRED");

    // editing an attachment
    let image = env
        .store
        .insert_message(Message::new(
            conv.id,
            a,
            MessageBody::Image {
                file_url: "https://cdn.campus.test/r.jpg".into(),
                file_public_id: "r".into(),
            },
            None,
            Utc::now(),
        ))
        .await
        .unwrap();
    let req = test::TestRequest::patch()
        .uri(&format!("/api/v1/messages/{}", image.id))
        .insert_header(bearer(a))
        .set_json(json!({"content": "caption"}))
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: ErrorResponse = test::read_body_json(res).await;
    assert_eq!(body.code, "INVALID_OPERATION");

    // conversation with oneself
    let req = test::TestRequest::post()
        .uri("/api/v1/conversations")
        .insert_header(bearer(a))
        .set_json(json!({"other_user_id": a, "property_id": Uuid::new_v4()}))
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn delete_for_me_defaults_scope() {
    let env = TestEnv::new();
    let app = app!(env);
    let a = env.user("Alice").await;
    let b = env.user("Bruno").await;
    let conv = env.conversation(a, b).await;
    let m = env
        .store
        .insert_message(Message::new(
            conv.id,
            a,
            MessageBody::Text {
                content: "hello".into(),
            },
            None,
            Utc::now(),
        ))
        .await
        .unwrap();

    let req = test::TestRequest::delete()
        .uri(&format!("/api/v1/messages/{}", m.id))
        .insert_header(bearer(b))
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/messages/{}", m.id))
        .insert_header(bearer(a))
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::OK);

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/messages/{}", m.id))
        .insert_header(bearer(b))
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn health_and_metrics_are_public() {
    let env = TestEnv::new();
    let app = app!(env);

    let res = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
    assert_eq!(res.status(), StatusCode::OK);

    housing_chat_service::metrics::init();
    let res = test::call_service(&app, test::TestRequest::get().uri("/metrics").to_request()).await;
    assert_eq!(res.status(), StatusCode::OK);
    let body = test::read_body(res).await;
    assert!(String::from_utf8_lossy(&body).contains("chat_ws_connections"));
}
