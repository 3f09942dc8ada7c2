//! Process-level tests for the `gh-app-token` binary.

use assert_cmd::assert::OutputAssertExt;
use assert_cmd::Command;
use predicates::prelude::*;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const KEY_FIXTURE: &str = concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/../gh-app-token-core/tests/fixtures/test_app_key.pem"
);

/// The binary with every setting it reads from the environment cleared.
fn gh_app_token() -> Command {
    let mut cmd = Command::cargo_bin("gh-app-token").unwrap();
    for var in [
        "GITHUB_APP_ID",
        "GITHUB_APP_PRIVATE_KEY_PATH",
        "GITHUB_APP_PRIVATE_KEY",
        "GITHUB_APP_INSTALLATION_ID",
        "GITHUB_API_URL",
        "GH_APP_TOKEN_CONFIG",
        "GH_APP_TOKEN__APP_ID",
        "GH_APP_TOKEN__INSTALLATION_ID",
        "GH_APP_TOKEN__PRIVATE_KEY",
        "GH_APP_TOKEN__PRIVATE_KEY_PATH",
        "RUST_LOG",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

#[test]
fn test_help() {
    gh_app_token()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--installation-id"))
        .stdout(predicate::str::contains("--output-format"));
}

/// Verify a missing App id exits with the configuration code and nothing on stdout.
#[test]
fn test_missing_app_id() {
    gh_app_token()
        .args(["--installation-id", "1", "--private-key-path", KEY_FIXTURE])
        .assert()
        .code(1)
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("app_id"));
}

/// Verify errors reach stderr even with logging switched off.
#[test]
fn test_error_reported_with_logging_off() {
    gh_app_token()
        .env("RUST_LOG", "off")
        .args(["--installation-id", "1", "--private-key-path", KEY_FIXTURE])
        .assert()
        .code(1)
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("app_id"));
}

/// Verify clone output without a repository exits with the argument code.
#[test]
fn test_clone_needs_repository() {
    gh_app_token()
        .args(["--app-id", "1", "--output-format", "clone"])
        .assert()
        .code(3);
}

/// Verify the environment variables are honored and the token alone reaches stdout.
#[tokio::test(flavor = "multi_thread")]
async fn test_token_from_environment() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/app/installations/42/access_tokens"))
        .and(header("x-github-api-version", "2022-11-28"))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "token": "ghs_from_env",
            "expires_at": "2099-01-01T00:00:00Z"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let uri = server.uri();
    let output = tokio::task::spawn_blocking(move || {
        gh_app_token()
            .env("GITHUB_APP_ID", "1")
            .env("GITHUB_APP_PRIVATE_KEY_PATH", KEY_FIXTURE)
            .env("GITHUB_APP_INSTALLATION_ID", "42")
            .env("GITHUB_API_URL", uri)
            .output()
            .unwrap()
    })
    .await
    .unwrap();

    output
        .assert()
        .success()
        .stdout("ghs_from_env\n")
        .stderr(predicate::str::contains("ghs_from_env").not());
}

/// Verify JSON output for a repository lookup.
#[tokio::test(flavor = "multi_thread")]
async fn test_json_output_for_repository() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/widgets/installation"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": 42})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/app/installations/42/access_tokens"))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "token": "ghs_json",
            "expires_at": "2099-01-01T00:00:00Z"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let uri = server.uri();
    let output = tokio::task::spawn_blocking(move || {
        gh_app_token()
            .args([
                "acme",
                "widgets",
                "--app-id",
                "1",
                "--private-key-path",
                KEY_FIXTURE,
                "--api-url",
                uri.as_str(),
                "-o",
                "json",
            ])
            .output()
            .unwrap()
    })
    .await
    .unwrap();

    assert!(output.status.success());
    let document: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(document["token"], "ghs_json");
    assert_eq!(document["token_type"], "installation");
    assert_eq!(document["installation_id"], 42);
}

/// Verify a repository without the App installed exits with the auth code.
#[tokio::test(flavor = "multi_thread")]
async fn test_app_not_installed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/private/installation"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let uri = server.uri();
    let output = tokio::task::spawn_blocking(move || {
        gh_app_token()
            .args([
                "acme",
                "private",
                "--app-id",
                "1",
                "--private-key-path",
                KEY_FIXTURE,
                "--api-url",
                uri.as_str(),
            ])
            .output()
            .unwrap()
    })
    .await
    .unwrap();

    output
        .assert()
        .code(2)
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("not installed on acme/private"));
}
