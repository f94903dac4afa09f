//! CLI tests driving the built binary against a mock API.

mod common;

use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{run_cli, run_cli_async, stdout_of};

const OFFLINE_API: &str = "http://127.0.0.1:9";

async fn mock_login(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/auth/jwt/create/"))
        .and(body_json(json!({"email": "ada@example.com", "password": "hunter22"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access": "A1",
            "refresh": "R1"
        })))
        .mount(server)
        .await;
}

async fn login(home: &TempDir, server: &MockServer) {
    let args = [
        "auth",
        "login",
        "--email",
        "ada@example.com",
        "--password",
        "hunter22",
    ];
    let output = run_cli_async(&args, home.path(), &server.uri()).await;
    let stdout = stdout_of(&output, &args);
    assert!(stdout.contains("Logged in successfully"));
}

#[test]
fn test_help_lists_commands() {
    let home = TempDir::new().unwrap();
    let output = run_cli(&["--help"], home.path(), OFFLINE_API);
    let stdout = stdout_of(&output, &["--help"]);
    assert!(stdout.contains("auth"));
    assert!(stdout.contains("api"));
    assert!(stdout.contains("chat"));
}

#[test]
fn test_version() {
    let home = TempDir::new().unwrap();
    let output = run_cli(&["--version"], home.path(), OFFLINE_API);
    let stdout = stdout_of(&output, &["--version"]);
    assert!(stdout.starts_with("svat "));
}

#[test]
fn test_status_when_logged_out() {
    let home = TempDir::new().unwrap();
    let output = run_cli(&["auth", "status"], home.path(), OFFLINE_API);
    let stdout = stdout_of(&output, &["auth", "status"]);
    assert!(stdout.contains("logged out"));
}

#[test]
fn test_api_requires_login() {
    let home = TempDir::new().unwrap();
    let output = run_cli(&["api", "news"], home.path(), OFFLINE_API);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Not logged in"));
}

#[test]
fn test_invalid_collection_is_refused() {
    let home = TempDir::new().unwrap();
    let output = run_cli(&["api", "result", "../etc"], home.path(), OFFLINE_API);
    assert!(!output.status.success());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_login_status_logout() {
    let server = MockServer::start().await;
    mock_login(&server).await;
    let home = TempDir::new().unwrap();

    login(&home, &server).await;

    let output = run_cli_async(&["auth", "status"], home.path(), &server.uri()).await;
    let stdout = stdout_of(&output, &["auth", "status"]);
    assert!(stdout.contains("logged in"));

    let output = run_cli_async(&["auth", "logout"], home.path(), &server.uri()).await;
    let stdout = stdout_of(&output, &["auth", "logout"]);
    assert!(stdout.contains("Logged out"));

    let output = run_cli_async(&["auth", "status"], home.path(), &server.uri()).await;
    let stdout = stdout_of(&output, &["auth", "status"]);
    assert!(stdout.contains("logged out"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_wrong_password_fails() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/jwt/create/"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "detail": "No active account found with the given credentials"
        })))
        .mount(&server)
        .await;
    let home = TempDir::new().unwrap();

    let args = ["auth", "login", "--email", "ada@example.com", "--password", "nope"];
    let output = run_cli_async(&args, home.path(), &server.uri()).await;
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("invalid credentials"));

    let output = run_cli_async(&["auth", "status"], home.path(), &server.uri()).await;
    assert!(stdout_of(&output, &["auth", "status"]).contains("logged out"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_news_refreshes_expired_token_and_persists_it() {
    let server = MockServer::start().await;
    mock_login(&server).await;

    Mock::given(method("GET"))
        .and(path("/news/"))
        .and(header("authorization", "Bearer A2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "news": {
                "The Hacker News": [
                    {"title": "Patch now", "link": "https://example.com/1", "published": "today"}
                ]
            }
        })))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/news/"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "detail": "Given token not valid for any token type"
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/jwt/refresh/"))
        .and(body_json(json!({"refresh": "R1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access": "A2"})))
        .expect(1)
        .mount(&server)
        .await;

    let home = TempDir::new().unwrap();
    login(&home, &server).await;

    let args = ["api", "news", "--json"];
    let output = run_cli_async(&args, home.path(), &server.uri()).await;
    let stdout = stdout_of(&output, &args);
    assert!(stdout.contains("Patch now"));

    // The refreshed token was written back: a second run needs no refresh.
    let output = run_cli_async(&args, home.path(), &server.uri()).await;
    assert!(stdout_of(&output, &args).contains("Patch now"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_rejected_refresh_logs_out() {
    let server = MockServer::start().await;
    mock_login(&server).await;
    Mock::given(method("GET"))
        .and(path("/news/"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/jwt/refresh/"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "detail": "Token is invalid or expired"
        })))
        .mount(&server)
        .await;

    let home = TempDir::new().unwrap();
    login(&home, &server).await;

    let output = run_cli_async(&["api", "news"], home.path(), &server.uri()).await;
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("session expired"));

    let output = run_cli_async(&["auth", "status"], home.path(), &server.uri()).await;
    assert!(stdout_of(&output, &["auth", "status"]).contains("logged out"));
}
