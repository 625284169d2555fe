//! Local accounts: registration, login, logout and profile management.

mod common;

use axum::http::{Method, StatusCode};
use common::TestApp;
use serde_json::json;

#[tokio::test]
async fn test_register_login_logout_round() {
    let app = TestApp::new();
    let admin_token = app.bootstrap_admin("admin1", "adminpass1").await;

    let response = app
        .request(
            Method::POST,
            "/auth/register",
            Some(&admin_token),
            Some(json!({ "username": "u1", "password": "userpass1" })),
        )
        .await;
    assert_eq!(response.status, StatusCode::CREATED);
    assert_eq!(response.body["user"]["username"], "u1");
    assert_eq!(response.body["user"]["role"], "");

    let login = app.login("u1", "userpass1").await;
    assert_eq!(login.status, StatusCode::OK);
    let token = login.body["token"].as_str().unwrap().to_string();
    assert_eq!(token.len(), 32);
    assert!(login.body["user"].get("password_hash").is_none());

    let me = app.get("/auth/me", Some(&token)).await;
    assert_eq!(me.status, StatusCode::OK);
    assert_eq!(me.body["username"], "u1");

    let logout = app.request(Method::POST, "/auth/logout", Some(&token), None).await;
    assert_eq!(logout.status, StatusCode::OK);

    let me = app.get("/auth/me", Some(&token)).await;
    assert_eq!(me.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_first_account_becomes_global_admin() {
    let app = TestApp::new();
    let token = app.bootstrap_admin("founder", "founderpass").await;

    let me = app.get("/auth/me", Some(&token)).await;
    assert_eq!(me.body["role"], "global_admin");
    assert_eq!(me.body["auth_method"], "local");
}

#[tokio::test]
async fn test_registration_closed_without_caller() {
    let app = TestApp::new();
    app.bootstrap_admin("admin1", "adminpass1").await;

    let response = app
        .request(
            Method::POST,
            "/auth/register",
            None,
            Some(json!({ "username": "intruder", "password": "password1" })),
        )
        .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_member_cannot_register_users() {
    let app = TestApp::new();
    let admin_token = app.bootstrap_admin("admin1", "adminpass1").await;
    app.request(
        Method::POST,
        "/auth/register",
        Some(&admin_token),
        Some(json!({ "username": "member1", "password": "password1" })),
    )
    .await;
    let member_token = app.session_token("member1", "password1").await;

    let response = app
        .request(
            Method::POST,
            "/auth/register",
            Some(&member_token),
            Some(json!({ "username": "member2", "password": "password2" })),
        )
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_duplicate_username_conflicts() {
    let app = TestApp::new();
    let admin_token = app.bootstrap_admin("admin1", "adminpass1").await;

    let response = app
        .request(
            Method::POST,
            "/auth/register",
            Some(&admin_token),
            Some(json!({ "username": "admin1", "password": "another1" })),
        )
        .await;
    assert_eq!(response.status, StatusCode::CONFLICT);
    assert_eq!(response.error(), "User already exists");
}

#[tokio::test]
async fn test_register_rejects_invalid_body() {
    let app = TestApp::new();

    let short = app
        .request(
            Method::POST,
            "/auth/register",
            None,
            Some(json!({ "username": "a", "password": "password1" })),
        )
        .await;
    assert_eq!(short.status, StatusCode::BAD_REQUEST);

    let long = app
        .request(
            Method::POST,
            "/auth/register",
            None,
            Some(json!({ "username": "longpass", "password": "x".repeat(73) })),
        )
        .await;
    assert_eq!(long.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_login_with_wrong_password() {
    let app = TestApp::new();
    app.bootstrap_admin("admin1", "adminpass1").await;

    let wrong = app.login("admin1", "not-the-password").await;
    assert_eq!(wrong.status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong.error(), "Invalid credentials");

    let unknown = app.login("ghost", "adminpass1").await;
    assert_eq!(unknown.status, StatusCode::UNAUTHORIZED);
    assert_eq!(unknown.error(), "Invalid credentials");
}

#[tokio::test]
async fn test_logout_requires_authorization_header() {
    let app = TestApp::new();

    let response = app.request(Method::POST, "/auth/logout", None, None).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    // Unknown tokens are accepted so logout stays idempotent
    let response = app
        .request(Method::POST, "/auth/logout", Some("no-such-session"), None)
        .await;
    assert_eq!(response.status, StatusCode::OK);
}

#[tokio::test]
async fn test_me_requires_authentication() {
    let app = TestApp::new();

    let anonymous = app.get("/auth/me", None).await;
    assert_eq!(anonymous.status, StatusCode::UNAUTHORIZED);

    let unknown = app.get("/auth/me", Some("not-a-session-token")).await;
    assert_eq!(unknown.status, StatusCode::UNAUTHORIZED);
    assert_eq!(unknown.error(), "Authentication required");

    for header in ["", "Bearer ", "Bearer"] {
        let response = app.get("/auth/me", Some(header)).await;
        assert_eq!(response.status, StatusCode::UNAUTHORIZED, "header {header:?}");
    }
}

#[tokio::test]
async fn test_update_profile() {
    let app = TestApp::new();
    let admin_token = app.bootstrap_admin("admin1", "adminpass1").await;
    app.request(
        Method::POST,
        "/auth/register",
        Some(&admin_token),
        Some(json!({ "username": "u1", "password": "userpass1" })),
    )
    .await;
    let token = app.session_token("u1", "userpass1").await;

    let updated = app
        .request(
            Method::PUT,
            "/auth/me",
            Some(&token),
            Some(json!({ "email": "u1@fleet.example.com", "password": "newpass123" })),
        )
        .await;
    assert_eq!(updated.status, StatusCode::OK);
    assert_eq!(updated.body["email"], "u1@fleet.example.com");

    assert_eq!(app.login("u1", "userpass1").await.status, StatusCode::UNAUTHORIZED);
    assert_eq!(app.login("u1", "newpass123").await.status, StatusCode::OK);

    let clash = app
        .request(Method::PUT, "/auth/me", Some(&token), Some(json!({ "username": "admin1" })))
        .await;
    assert_eq!(clash.status, StatusCode::CONFLICT);
    assert_eq!(clash.error(), "Username already taken");
}

#[tokio::test]
async fn test_delete_account_ends_sessions() {
    let app = TestApp::new();
    let admin_token = app.bootstrap_admin("admin1", "adminpass1").await;
    app.request(
        Method::POST,
        "/auth/register",
        Some(&admin_token),
        Some(json!({ "username": "leaver", "password": "leaverpass" })),
    )
    .await;
    let token = app.session_token("leaver", "leaverpass").await;

    let deleted = app.request(Method::DELETE, "/auth/me", Some(&token), None).await;
    assert_eq!(deleted.status, StatusCode::OK);

    assert_eq!(app.get("/auth/me", Some(&token)).await.status, StatusCode::UNAUTHORIZED);
    assert_eq!(app.login("leaver", "leaverpass").await.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_login_is_rate_limited_per_ip() {
    let mut config = common::test_config();
    config.rate_limit.login_attempts = 2;
    let app = &TestApp::with_config(config, None);

    let attempt = || async move {
        let request = axum::http::Request::builder()
            .method(Method::POST)
            .uri("/auth/login")
            .header("content-type", "application/json")
            .header("x-forwarded-for", "203.0.113.7")
            .body(axum::body::Body::from(
                json!({ "username": "nobody", "password": "whatever" }).to_string(),
            ))
            .unwrap();
        app.send(request).await.status
    };

    assert_eq!(attempt().await, StatusCode::UNAUTHORIZED);
    assert_eq!(attempt().await, StatusCode::UNAUTHORIZED);
    assert_eq!(attempt().await, StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_login_rejects_password_extending_stored_one() {
    let app = TestApp::new();
    let password = "a".repeat(72);
    app.bootstrap_admin("longpw", &password).await;

    let extended = app.login("longpw", &format!("{password}EXTRA")).await;
    assert_eq!(extended.status, StatusCode::UNAUTHORIZED);
    assert_eq!(extended.error(), "Invalid credentials");

    assert_eq!(app.login("longpw", &password).await.status, StatusCode::OK);
}
