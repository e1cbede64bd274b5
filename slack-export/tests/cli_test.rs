use assert_cmd::Command;
use predicates::str::contains;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// The binary with no config file and none of its environment variables set.
fn slack_export(config_home: &TempDir) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_slack-export"));
    cmd.env("XDG_CONFIG_HOME", config_home.path())
        .env_remove("SLACK_TOKEN")
        .env_remove("SLACK_EXPORT_DIR")
        .env_remove("SLACK_API_URL")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_missing_token_exits_with_error() {
    let config_home = TempDir::new().unwrap();
    let dir = TempDir::new().unwrap();

    slack_export(&config_home)
        .arg("--output-dir")
        .arg(dir.path())
        .assert()
        .failure()
        .code(1)
        .stderr(contains("Error: no token given"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_rejected_token_exits_with_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users.list"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"ok": false, "error": "invalid_auth"})),
        )
        .mount(&server)
        .await;

    let config_home = TempDir::new().unwrap();
    let dir = TempDir::new().unwrap();
    let output_dir = dir.path().join("export");

    slack_export(&config_home)
        .args(["--token", "xoxp-test", "--api-url", &server.uri(), "--log-level", "off"])
        .arg("--output-dir")
        .arg(&output_dir)
        .assert()
        .failure()
        .code(1)
        .stderr(contains("Error:"))
        .stderr(contains("invalid_auth"));

    assert!(!output_dir.exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_successful_export_exits_cleanly() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users.list"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true, "members": []})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/conversations.list"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "channels": [{"id": "C1", "name": "general", "is_channel": true}]
            })),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/conversations.history"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "messages": [{"type": "message", "ts": "1.0", "text": "hi"}]
        })))
        .mount(&server)
        .await;

    let config_home = TempDir::new().unwrap();
    let dir = TempDir::new().unwrap();

    slack_export(&config_home)
        .args(["--token", "xoxp-test", "--api-url", &server.uri()])
        .args(["--output-format", "jsonl"])
        .arg("--output-dir")
        .arg(dir.path())
        .assert()
        .success();

    assert!(dir.path().join("general.jsonl").exists());
}
