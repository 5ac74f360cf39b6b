//! Integration tests for the MCP client.
//!
//! These drive the real client against the `mock-mcp-server` binary.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use serde_json::json;
use toolbridge_mcp::{
    CallToolResult, ConnectionState, ENABLE_ALL_TOOLS_VAR, McpClient, McpError, McpManager,
    McpServerConfig,
};

fn mock_server_path() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_mock-mcp-server"))
}

fn mock_config(args: &[&str]) -> McpServerConfig {
    McpServerConfig::new("mock", mock_server_path())
        .with_args(args.iter().map(|a| a.to_string()).collect())
}

async fn connected_client(args: &[&str]) -> McpClient {
    let client = McpClient::new(mock_config(args));
    assert!(client.connect().await, "mock server failed to connect");
    client
}

fn text_result(text: &str) -> CallToolResult {
    CallToolResult {
        content: vec![json!({"type": "text", "text": text})],
        is_error: false,
    }
}

#[tokio::test]
async fn test_connect_and_discover() {
    let client = connected_client(&[]).await;

    assert!(client.is_connected());
    assert_eq!(client.state(), ConnectionState::Connected);
    assert!(client.has_tool("echo"));

    let info = client.server_info().unwrap();
    assert_eq!(info.name, "mock-mcp-server");
    assert_eq!(info.version, "1.0.0");

    let names: Vec<_> = client.get_tools().into_iter().map(|t| t.name).collect();
    assert_eq!(names, vec!["add", "crash", "echo", "env", "slow"]);

    let echo = client.get_tool("echo").unwrap();
    assert_eq!(echo.description, "Echo back the input");

    // Missing or null schemas normalize to an empty object.
    assert_eq!(client.get_tool("env").unwrap().input_schema, json!({}));
    assert_eq!(client.get_tool("crash").unwrap().input_schema, json!({}));
}

#[tokio::test]
async fn test_call_echo_result_shape() {
    let client = connected_client(&[]).await;

    let result = client.call_tool("echo", json!({"x": 1})).await;
    assert_eq!(result, text_result("1"));
    assert_eq!(
        serde_json::to_value(&result).unwrap(),
        json!({"content": [{"type": "text", "text": "1"}], "isError": false})
    );

    let result = client
        .call_tool("echo", json!({"message": "Hello, MCP!"}))
        .await;
    assert_eq!(result.text(), "Hello, MCP!");
}

#[tokio::test]
async fn test_call_add_tool() {
    let client = connected_client(&[]).await;
    let result = client.call_tool("add", json!({"a": 5, "b": 3})).await;
    assert!(!result.is_error());
    assert_eq!(result.text(), "8");
}

#[tokio::test]
async fn test_missing_tool_resolves_with_error_result() {
    let client = connected_client(&[]).await;

    let result = client.call_tool("missing", json!({})).await;
    assert!(result.is_error());
    assert_eq!(result.content, vec![json!({"type": "text", "text": "no such tool"})]);
    assert!(client.is_connected());
}

#[tokio::test]
async fn test_nonexistent_path_does_not_connect() {
    let client = McpClient::new(McpServerConfig::new(
        "missing",
        "/definitely/not/a/real/mcp-server-12345",
    ));

    assert!(!client.connect().await);
    assert!(!client.is_connected());
    assert!(client.discover_tools().await.is_empty());
}

#[tokio::test]
async fn test_candidate_probing_picks_existing_path() {
    let config = McpServerConfig::new("probe", "/nope/first/mcp-server")
        .with_candidate(mock_server_path())
        .with_candidate("/nope/last/mcp-server");
    let client = McpClient::new(config);

    assert_eq!(client.executable(), Some(mock_server_path().as_path()));
    assert!(client.connect().await);
}

#[tokio::test]
async fn test_process_exit_rejects_pending_requests() {
    let client = connected_client(&[]).await;

    let started = Instant::now();
    let slow = client.request(
        "tools/call",
        Some(json!({"name": "slow", "arguments": {"delay_ms": 10_000}})),
    );
    let crash = async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        client.call_tool("crash", json!({})).await
    };
    let (slow, crash) = tokio::join!(slow, crash);

    let err = slow.unwrap_err();
    assert!(err.is_process_exit(), "unexpected error: {err}");
    assert!(!err.is_timeout());
    assert!(crash.is_error());
    assert!(started.elapsed() < Duration::from_secs(5));

    assert!(!client.is_connected());
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert!(client.get_tools().is_empty());
    assert_eq!(client.pending_requests(), 0);
}

#[tokio::test]
async fn test_reconnect_after_crash() {
    let client = connected_client(&[]).await;

    let crashed = client.call_tool("crash", json!({})).await;
    assert!(crashed.is_error());
    assert!(!client.is_connected());

    // The next call spawns a fresh process.
    let result = client.call_tool("echo", json!({"message": "again"})).await;
    assert_eq!(result, text_result("again"));
    assert!(client.is_connected());
}

#[tokio::test]
async fn test_timeout_isolation() {
    let client = McpClient::new(mock_config(&[]).with_timeout(Duration::from_millis(500)));
    assert!(client.connect().await);

    let slow = client.request(
        "tools/call",
        Some(json!({"name": "slow", "arguments": {"delay_ms": 3_000}})),
    );
    let fast = client.call_tool("echo", json!({"message": "quick"}));
    let (slow, fast) = tokio::join!(slow, fast);

    match slow.unwrap_err() {
        McpError::Timeout { elapsed, .. } => assert_eq!(elapsed, Duration::from_millis(500)),
        other => panic!("expected timeout, got {other}"),
    }
    assert_eq!(fast, text_result("quick"));
    assert!(client.is_connected());
}

#[tokio::test]
async fn test_concurrent_calls_complete_out_of_order() {
    let client = connected_client(&["--slow-tool", "add:400"]).await;

    let started = Instant::now();
    let add = client.call_tool("add", json!({"a": 1, "b": 2}));
    let echo = async {
        let result = client.call_tool("echo", json!({"message": "first"})).await;
        (result, started.elapsed())
    };
    let (add, (echo, echo_elapsed)) = tokio::join!(add, echo);

    assert_eq!(add.text(), "3");
    assert_eq!(echo.text(), "first");
    assert!(echo_elapsed < Duration::from_millis(400));
}

#[tokio::test]
async fn test_newline_delimited_server() {
    let client = connected_client(&["--newline", "--banner"]).await;
    assert!(client.has_tool("echo"));

    let result = client.call_tool("echo", json!({"message": "lines"})).await;
    assert_eq!(result, text_result("lines"));
}

#[tokio::test]
async fn test_banner_and_stderr_noise_are_tolerated() {
    let client = connected_client(&["--banner", "--stderr-noise"]).await;
    let result = client.call_tool("add", json!({"a": 2, "b": 2})).await;
    assert_eq!(result.text(), "4");
}

#[tokio::test]
async fn test_initialize_timeout() {
    let client = McpClient::new(
        mock_config(&["--hang-on-init"]).with_timeout(Duration::from_millis(300)),
    );

    let err = client.try_connect().await.unwrap_err();
    assert!(matches!(err, McpError::Initialization(_)), "unexpected error: {err}");
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert_eq!(client.pending_requests(), 0);
}

#[tokio::test]
async fn test_failed_discovery_still_connects() {
    let client = connected_client(&["--fail-tools-list"]).await;

    assert!(client.is_connected());
    assert!(client.get_tools().is_empty());
    assert!(client.discover_tools().await.is_empty());
}

#[tokio::test]
async fn test_disconnect_is_idempotent_and_reconnects() {
    let client = connected_client(&[]).await;

    client.disconnect();
    assert_eq!(client.state(), ConnectionState::Disconnected);
    client.disconnect();
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert!(client.get_tools().is_empty());
    assert!(client.server_info().is_none());

    let err = client.request("tools/list", None).await.unwrap_err();
    assert!(matches!(err, McpError::NotConnected));

    let tools = client.discover_tools().await;
    assert_eq!(tools.len(), 5);
    assert!(client.is_connected());
}

#[tokio::test]
async fn test_notifications_are_published() {
    let client = McpClient::new(mock_config(&["--notify"]));
    let mut notifications = client.subscribe_notifications();
    assert!(client.connect().await);

    let notification = tokio::time::timeout(Duration::from_secs(5), notifications.recv())
        .await
        .expect("no notification received")
        .unwrap();
    assert_eq!(notification.method, "notifications/message");
    assert_eq!(notification.params.unwrap()["level"], "info");
}

#[tokio::test]
async fn test_environment_overlay() {
    let config = mock_config(&[]).with_env_var("PROJECT_ID", "demo-project");
    let client = McpClient::new(config);
    assert!(client.connect().await);

    let result = client.call_tool("env", json!({"name": "PROJECT_ID"})).await;
    assert_eq!(result.text(), "demo-project");

    if std::env::var_os(ENABLE_ALL_TOOLS_VAR).is_none() {
        let result = client
            .call_tool("env", json!({"name": ENABLE_ALL_TOOLS_VAR}))
            .await;
        assert_eq!(result.text(), "true");
    }
}

#[tokio::test]
async fn test_raw_request_errors() {
    let client = connected_client(&[]).await;

    let response = client.request("ping", None).await.unwrap();
    assert_eq!(response.result, Some(json!({})));

    match client.request("resources/list", None).await.unwrap_err() {
        McpError::ServerError { code, message, .. } => {
            assert_eq!(code, -32601);
            assert!(message.contains("resources/list"));
        }
        other => panic!("expected server error, got {other}"),
    }
}

#[tokio::test]
async fn test_nonstandard_error_settles_without_timeout() {
    let client = McpClient::new(mock_config(&[]).with_timeout(Duration::from_secs(5)));
    assert!(client.connect().await);

    let started = Instant::now();
    let result = client.call_tool("bad-error", json!({})).await;
    assert!(result.is_error);
    assert!(result.text().contains("boom"), "unexpected text: {}", result.text());

    match client
        .request("tools/call", Some(json!({"name": "bad-error"})))
        .await
        .unwrap_err()
    {
        McpError::ServerError { code, message, .. } => {
            assert_eq!(code, -32603);
            assert_eq!(message, "boom");
        }
        other => panic!("expected server error, got {other}"),
    }

    let err = client
        .request("tools/call", Some(json!({"name": "garbled-error"})))
        .await
        .unwrap_err();
    assert!(matches!(err, McpError::Protocol(_)), "unexpected error: {err}");

    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(client.pending_requests(), 0);
    assert!(client.is_connected());
}

#[tokio::test]
async fn test_sloppy_tool_list_keeps_good_entries() {
    let client = connected_client(&["--sloppy-tools-list"]).await;

    let mut names: Vec<String> = client.get_tools().into_iter().map(|t| t.name).collect();
    names.sort();
    assert_eq!(names, vec!["add", "echo"]);
    assert_eq!(client.get_tool("add").unwrap().description, "");
}

#[tokio::test]
async fn test_manager_across_servers() {
    let mut manager = McpManager::new();
    manager.add_server(McpServerConfig::new("one", mock_server_path()));
    manager.add_server(McpServerConfig::new("two", mock_server_path()).with_arg("--newline"));
    manager.add_server(McpServerConfig::new("broken", "/nonexistent/mcp-server-12345"));

    assert_eq!(manager.connect_all().await, 2);
    assert_eq!(manager.connected_server_names(), vec!["one", "two"]);
    assert_eq!(manager.tool_count(), 10);
    assert_eq!(manager.find_tool("echo"), Some("one"));

    let result = manager
        .call_tool("two", "echo", json!({"message": "via manager"}))
        .await;
    assert_eq!(result.text(), "via manager");

    manager.disconnect_all();
    assert_eq!(manager.connected_count(), 0);
    assert_eq!(manager.config_count(), 3);
}
