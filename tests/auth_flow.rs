mod common;

use anyhow::Result;
use axum::http::StatusCode;
use chrono::{Duration, Utc};
use common::{body_json, TestApp};
use docshare::repo::TokenRepo;

const PASSWORD: &str = "Passw0rd!";

#[tokio::test]
async fn register_login_logout_roundtrip() -> Result<()> {
    let app = TestApp::new();

    let response = app.register("alice1234", PASSWORD).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response.into_body()).await?;
    assert_eq!(body["response"]["login"], "alice1234");

    let token = app.login_token("alice1234", PASSWORD).await?;
    assert_eq!(token.len(), 64);
    assert!(token.chars().all(|ch| ch.is_ascii_alphanumeric()));

    // Still active: same token comes back.
    let again = app.login_token("alice1234", PASSWORD).await?;
    assert_eq!(again, token);

    let response = app.get("/api/docs", Some(&token)).await?;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.delete(&format!("/api/auth/{token}"), None).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response.into_body()).await?;
    assert_eq!(body["response"][token.as_str()], true);

    let response = app.get("/api/docs", Some(&token)).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app.delete(&format!("/api/auth/{token}"), None).await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response.into_body()).await?;
    assert_eq!(body["error"]["code"], 404);
    Ok(())
}

#[tokio::test]
async fn register_requires_admin_token() -> Result<()> {
    let app = TestApp::new();

    let response = app
        .send(
            axum::http::Method::POST,
            "/api/register?token=nope&login=alice1234&pswd=Passw0rd%21",
            None,
            axum::body::Body::empty(),
            None,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let response = app.login("alice1234", PASSWORD).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn register_enforces_login_and_password_rules() -> Result<()> {
    let app = TestApp::new();

    for (login, password) in [
        ("short", PASSWORD),
        ("alice_1234", PASSWORD),
        ("alice1234", "password"),
        ("alice1234", "Passw0rd"),
        ("alice1234", "P0!a"),
    ] {
        let response = app.register(login, password).await?;
        assert_eq!(
            response.status(),
            StatusCode::BAD_REQUEST,
            "{login}/{password} accepted"
        );
    }
    Ok(())
}

#[tokio::test]
async fn overlong_login_is_bad_request() -> Result<()> {
    let app = TestApp::new();

    let response = app.register(&"a".repeat(65), PASSWORD).await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response.into_body()).await?;
    assert_eq!(body["error"]["code"], 400);

    let longest = "a".repeat(64);
    assert_eq!(app.register(&longest, PASSWORD).await?.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn duplicate_registration_conflicts() -> Result<()> {
    let app = TestApp::new();
    assert_eq!(app.register("alice1234", PASSWORD).await?.status(), StatusCode::OK);

    let response = app.register("alice1234", "0ther-Pass").await?;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    Ok(())
}

#[tokio::test]
async fn bad_credentials_are_unauthorized() -> Result<()> {
    let app = TestApp::new();
    app.register("alice1234", PASSWORD).await?;

    let response = app.login("alice1234", "Wr0ng-Pass").await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let response = app.login("nobody123", PASSWORD).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response.into_body()).await?;
    assert_eq!(body["error"]["code"], 401);
    Ok(())
}

#[tokio::test]
async fn document_routes_reject_missing_or_unknown_tokens() -> Result<()> {
    let app = TestApp::new();

    let response = app.get("/api/docs", None).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app.get("/api/docs", Some("not-a-real-token")).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app.get("/api/docs?token=not-a-real-token", None).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn expired_token_is_unauthorized_until_next_login() -> Result<()> {
    let app = TestApp::new();
    let token = app.signup("alice1234", PASSWORD).await?;
    app.store
        .extend_session(&token, Utc::now() - Duration::hours(1))
        .await?;

    let response = app.get("/api/docs", Some(&token)).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response.into_body()).await?;
    assert_eq!(body["error"]["text"], "token expired");

    let response = app.get(&format!("/api/docs?token={token}"), None).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let refreshed = app.login_token("alice1234", PASSWORD).await?;
    assert_eq!(refreshed, token);
    let response = app.get("/api/docs", Some(&token)).await?;
    assert_eq!(response.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn token_query_parameter_is_accepted() -> Result<()> {
    let app = TestApp::new();
    let token = app.signup("alice1234", PASSWORD).await?;

    let response = app.get(&format!("/api/docs?token={token}"), None).await?;
    assert_eq!(response.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn health_is_public() -> Result<()> {
    let app = TestApp::new();
    let response = app.get("/api/health", None).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response.into_body()).await?;
    assert_eq!(body["status"], "ok");
    Ok(())
}
