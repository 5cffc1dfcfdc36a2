//! HTTP route definitions

use std::time::Duration;

use axum::{
    extract::State,
    http::{header, Method},
    middleware,
    response::Json,
    routing::{delete, get, post, put},
    Router,
};
use serde::Serialize;
use tower_http::{
    compression::CompressionLayer,
    cors::CorsLayer,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::app::AppState;
use crate::http::middleware::require_auth;
use crate::util::time::uptime_secs;
use crate::ws::handler::ws_handler;

use super::auth::{
    disable_two_factor_handler, enable_two_factor_handler, login_handler, register_handler,
    setup_two_factor_handler, verify_two_factor_handler,
};
use super::rooms::{
    create_room_handler, current_room_handler, join_room_handler, leave_room_handler,
    list_rooms_handler,
};
use super::social::{
    accept_friend_handler, decline_friend_handler, friend_requests_handler, friends_handler,
    me_handler, profile_handler, remove_friend_handler, search_handler,
    send_friend_request_handler, update_profile_handler,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    // CORS configuration - support multiple origins (comma-separated in CLIENT_ORIGIN)
    let allowed_origins: Vec<header::HeaderValue> = state
        .config
        .client_origin
        .split(',')
        .filter_map(|s| s.trim().parse::<header::HeaderValue>().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true);

    // Public routes (no auth required); the socket checks its own token
    let public_routes = Router::new()
        .route("/health", get(health_handler))
        .route("/ws", get(ws_handler))
        .route("/auth/register", post(register_handler))
        .route("/auth/login", post(login_handler))
        .route("/auth/2fa/verify", post(verify_two_factor_handler));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route("/auth/2fa/setup", post(setup_two_factor_handler))
        .route("/auth/2fa/enable", post(enable_two_factor_handler))
        .route("/auth/2fa/disable", post(disable_two_factor_handler))
        .route("/me", get(me_handler))
        .route("/profile", put(update_profile_handler))
        .route("/profile/:user_id", get(profile_handler))
        .route("/users/search", get(search_handler))
        .route("/friends", get(friends_handler))
        .route("/friends/requests", get(friend_requests_handler))
        .route("/friends/request", post(send_friend_request_handler))
        .route("/friends/:id/accept", post(accept_friend_handler))
        .route("/friends/:id/decline", post(decline_friend_handler))
        .route("/friends/:id", delete(remove_friend_handler))
        .route("/game/rooms", get(list_rooms_handler).post(create_room_handler))
        .route("/game/rooms/current", get(current_room_handler))
        .route("/game/rooms/leave", post(leave_room_handler))
        .route("/game/rooms/:id/join", post(join_room_handler))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// ============================================================================
// Health endpoint
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    active_rooms: usize,
    running_matches: usize,
    seated_players: usize,
    connected_players: usize,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: uptime_secs(),
        active_rooms: state.games.active_rooms(),
        running_matches: state.games.running_matches(),
        seated_players: state.games.seated_players(),
        connected_players: state.games.connected_players(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::totp;
    use crate::config::Config;
    use crate::util::time::unix_secs;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn app() -> Router {
        build_router(AppState::new(Config::for_tests()))
    }

    async fn call(
        app: &Router,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    async fn register(app: &Router, name: &str) -> (String, String) {
        let (status, body) = call(
            app,
            Method::POST,
            "/auth/register",
            None,
            Some(json!({
                "email": format!("{name}@example.com"),
                "password": "correct horse",
                "username": name,
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        (
            body["user_id"].as_str().unwrap().to_string(),
            body["token"].as_str().unwrap().to_string(),
        )
    }

    #[tokio::test]
    async fn health_is_public() {
        let app = app();
        let (status, body) = call(&app, Method::GET, "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["active_rooms"], 0);
    }

    #[tokio::test]
    async fn protected_routes_need_a_valid_bearer() {
        let app = app();
        let (status, body) = call(&app, Method::GET, "/me", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body["error"].is_string());

        let (status, _) = call(&app, Method::GET, "/me", Some("not-a-jwt"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn register_login_and_me() {
        let app = app();
        let (user_id, _) = register(&app, "alice").await;

        let (status, body) = call(
            &app,
            Method::POST,
            "/auth/login",
            None,
            Some(json!({"email": "ALICE@example.com", "password": "correct horse"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "authenticated");
        let token = body["token"].as_str().unwrap().to_string();

        let (status, me) = call(&app, Method::GET, "/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me["user_id"], user_id.as_str());
        assert_eq!(me["username"], "alice");
        assert_eq!(me["two_factor_enabled"], false);

        let (status, _) = call(
            &app,
            Method::POST,
            "/auth/login",
            None,
            Some(json!({"email": "alice@example.com", "password": "wrong password"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = call(
            &app,
            Method::POST,
            "/auth/register",
            None,
            Some(json!({"email": "alice@example.com", "password": "correct horse", "username": "alice2"})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn two_factor_login_flow() {
        let app = app();
        let (_, token) = register(&app, "bob").await;

        let (status, setup) = call(&app, Method::POST, "/auth/2fa/setup", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        let secret = setup["secret"].as_str().unwrap().to_string();
        assert!(setup["otpauth_uri"].as_str().unwrap().starts_with("otpauth://totp/"));

        let key = totp::base32_decode(&secret).unwrap();
        let code = format!("{:06}", totp::hotp(&key, unix_secs() / totp::STEP_SECS, totp::DIGITS).unwrap());
        let (status, enabled) = call(
            &app,
            Method::POST,
            "/auth/2fa/enable",
            Some(&token),
            Some(json!({"code": code})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let backup = enabled["backup_codes"][0].as_str().unwrap().to_string();

        let (status, login) = call(
            &app,
            Method::POST,
            "/auth/login",
            None,
            Some(json!({"email": "bob@example.com", "password": "correct horse"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(login["status"], "two_factor_required");
        let challenge = login["challenge_token"].as_str().unwrap().to_string();

        // A challenge token is not an access token
        let (status, _) = call(&app, Method::GET, "/me", Some(&challenge), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let verify = json!({"challenge_token": challenge, "code": backup});
        let (status, session) =
            call(&app, Method::POST, "/auth/2fa/verify", None, Some(verify.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert!(session["token"].is_string());

        // Backup codes are single-use
        let (status, _) = call(&app, Method::POST, "/auth/2fa/verify", None, Some(verify)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn friend_request_accept_and_list() {
        let app = app();
        let (alice_id, alice) = register(&app, "alice").await;
        let (_, bob) = register(&app, "bob").await;

        let (status, request) = call(
            &app,
            Method::POST,
            "/friends/request",
            Some(&alice),
            Some(json!({"username": "bob"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let request_id = request["id"].as_str().unwrap().to_string();

        let accept = format!("/friends/{request_id}/accept");
        let (status, _) = call(&app, Method::POST, &accept, Some(&alice), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = call(&app, Method::GET, "/friends/requests", Some(&bob), None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, accepted) = call(&app, Method::POST, &accept, Some(&bob), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(accepted["status"], "ACCEPTED");

        let (_, friends) = call(&app, Method::GET, "/friends", Some(&bob), None).await;
        assert_eq!(friends[0]["user_id"], alice_id.as_str());
        assert_eq!(friends[0]["username"], "alice");

        let (status, _) = call(
            &app,
            Method::DELETE,
            &format!("/friends/{alice_id}"),
            Some(&bob),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn room_lifecycle_over_http() {
        let app = app();
        let (_, alice) = register(&app, "alice").await;
        let (bob_id, bob) = register(&app, "bob").await;

        let (status, created) = call(&app, Method::POST, "/game/rooms", Some(&alice), None).await;
        assert_eq!(status, StatusCode::CREATED);
        let room_id = created["room"]["id"].as_str().unwrap().to_string();
        assert_eq!(created["room"]["status"], "WAITING");
        assert_eq!(created["room"]["players"][0]["display_name"], "alice");

        let (status, _) = call(&app, Method::POST, "/game/rooms", Some(&alice), None).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (_, listed) = call(&app, Method::GET, "/game/rooms", Some(&bob), None).await;
        assert_eq!(listed.as_array().unwrap().len(), 1);

        let join = format!("/game/rooms/{room_id}/join");
        let (status, joined) = call(&app, Method::POST, &join, Some(&bob), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(joined["room"]["players"][1]["user_id"], bob_id.as_str());

        let (_, current) = call(&app, Method::GET, "/game/rooms/current", Some(&bob), None).await;
        assert_eq!(current["room"]["id"], room_id.as_str());

        let (status, left) = call(&app, Method::POST, "/game/rooms/leave", Some(&bob), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(left["room_closed"], false);

        let (status, _) = call(&app, Method::POST, "/game/rooms/leave", Some(&bob), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn socket_requires_token_and_seat() {
        let app = app();
        let (_, alice) = register(&app, "alice").await;
        let room_id = uuid::Uuid::new_v4();

        let (status, _) = call(
            &app,
            Method::GET,
            &format!("/ws?token=bogus&room_id={room_id}"),
            None,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = call(
            &app,
            Method::GET,
            &format!("/ws?token={alice}&room_id={room_id}"),
            None,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }
}
