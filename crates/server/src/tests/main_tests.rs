use super::*;
use axum::{body, body::Body, http::Request};
use shared::domain::Rank;
use tower::ServiceExt;

const ADMIN: i64 = 1;
const ORGANIZER: i64 = 2;

async fn test_app() -> (Router, Arc<AppState>) {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let config = BotConfig {
        admin_ids: [UserId(ADMIN)].into_iter().collect(),
    };
    let state = Arc::new(
        AppState::new(ControllerContext::new(storage, Codecs::default()), config).expect("state"),
    );
    (build_router(state.clone()), state)
}

async fn post_text(app: &Router, actor: i64, text: &str) -> Vec<Outbound> {
    let event = serde_json::json!({
        "actor_id": actor,
        "payload": { "type": "text", "payload": { "text": text } },
    });
    let request = Request::post("/updates")
        .header("content-type", "application/json")
        .body(Body::from(event.to_string()))
        .expect("request");
    let response = app.clone().oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let body = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&body).expect("json")
}

async fn register(app: &Router, actor: i64) {
    for text in ["/start", "Olga", "Ivanovna", "Petrova", "+7 900 123 45 67", "olga@example.com"] {
        post_text(app, actor, text).await;
    }
}

#[tokio::test]
async fn healthz_reports_ok_when_storage_is_ready() {
    let (app, _state) = test_app().await;
    let request = Request::get("/healthz")
        .body(Body::empty())
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let body = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    assert_eq!(body.as_ref(), b"ok");
}

#[tokio::test]
async fn updates_route_replies_to_the_actor() {
    let (app, _state) = test_app().await;

    let replies = post_text(&app, ADMIN, "/start").await;
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].chat_id, UserId(ADMIN));
    assert!(replies[0].text.contains("first name"));

    let again = post_text(&app, ADMIN, "/start").await;
    assert!(again[0].text.starts_with("You are already registered"));
}

#[tokio::test]
async fn malformed_update_is_rejected() {
    let (app, _state) = test_app().await;
    let request = Request::post("/updates")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"actor_id":"nope"}"#))
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn committed_notifications_reach_subscribers() {
    let (app, state) = test_app().await;
    let mut notifications = state.notifications.subscribe();
    register(&app, ADMIN).await;
    register(&app, ORGANIZER).await;

    post_text(&app, ADMIN, "Add organizer").await;
    let replies = post_text(&app, ADMIN, &ORGANIZER.to_string()).await;
    assert!(replies[0].text.ends_with("is now an organizer"));

    let message = notifications.try_recv().expect("notification");
    assert_eq!(message.chat_id, UserId(ORGANIZER));
    assert_eq!(message.menu, Some(shared::protocol::Menu::Main(Rank::Organizer)));
}
