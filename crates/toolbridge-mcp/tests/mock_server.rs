//! Mock MCP server for integration testing.
//!
//! Answers initialize, tools/list and tools/call over stdio. Tool calls run on
//! their own threads so responses may come back out of order.
//!
//! Usage:
//!   mock-mcp-server [OPTIONS]
//!
//! Options:
//!   --delay-ms N        Add N ms delay to all responses
//!   --crash-on TOOL     Exit with code 1 when TOOL is called
//!   --slow-tool T:MS    Add MS delay when tool T is called
//!   --newline           Write responses as newline-delimited JSON
//!   --banner            Print a plain-text line on stdout before anything else
//!   --hang-on-init      Never answer initialize
//!   --fail-tools-list   Answer tools/list with a JSON-RPC error
//!   --stderr-noise      Write a few diagnostic lines to stderr at startup
//!   --notify            Send a notification once the client is initialized
//!   --sloppy-tools-list List tools alongside entries with no usable name
//!
//! Unlisted tools `bad-error` and `garbled-error` answer with error objects
//! that do not follow JSON-RPC.

use std::env;
use std::io::{BufRead, BufReader, Read, Write};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{Value, json};

#[derive(Debug, Deserialize)]
struct Incoming {
    #[serde(default)]
    id: Option<u64>,
    method: String,
    #[serde(default)]
    params: Option<Value>,
}

#[derive(Default)]
struct ServerConfig {
    delay_ms: u64,
    crash_on: Option<String>,
    slow_tools: Vec<(String, u64)>,
    newline: bool,
    banner: bool,
    hang_on_init: bool,
    fail_tools_list: bool,
    stderr_noise: bool,
    notify: bool,
    sloppy_tools_list: bool,
}

impl ServerConfig {
    fn from_args() -> Self {
        let mut config = Self::default();
        let mut args = env::args().skip(1);

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--delay-ms" => {
                    config.delay_ms = args.next().and_then(|v| v.parse().ok()).unwrap_or(0);
                }
                "--crash-on" => config.crash_on = args.next(),
                "--slow-tool" => {
                    let value = args.next().unwrap_or_default();
                    if let Some((tool, ms)) = value.split_once(':')
                        && let Ok(ms) = ms.parse()
                    {
                        config.slow_tools.push((tool.to_string(), ms));
                    }
                }
                "--newline" => config.newline = true,
                "--banner" => config.banner = true,
                "--hang-on-init" => config.hang_on_init = true,
                "--fail-tools-list" => config.fail_tools_list = true,
                "--stderr-noise" => config.stderr_noise = true,
                "--notify" => config.notify = true,
                "--sloppy-tools-list" => config.sloppy_tools_list = true,
                _ => {}
            }
        }

        config
    }

    fn tool_delay(&self, tool_name: &str) -> u64 {
        self.slow_tools
            .iter()
            .find(|(tool, _)| tool == tool_name)
            .map(|(_, ms)| *ms)
            .unwrap_or(0)
    }
}

/// Serializes whole frames onto stdout.
#[derive(Clone)]
struct Output {
    stdout: Arc<Mutex<std::io::Stdout>>,
    newline: bool,
}

impl Output {
    fn send(&self, message: &Value) {
        let body = serde_json::to_string(message).unwrap();
        let mut stdout = self.stdout.lock().unwrap();
        if self.newline {
            writeln!(stdout, "{body}").unwrap();
        } else {
            write!(stdout, "Content-Length: {}\r\n\r\n{}", body.len(), body).unwrap();
        }
        stdout.flush().unwrap();
    }

    fn respond(&self, id: u64, outcome: Result<Value, Value>) {
        let message = match outcome {
            Ok(result) => json!({"jsonrpc": "2.0", "id": id, "result": result}),
            Err(error) => json!({"jsonrpc": "2.0", "id": id, "error": error}),
        };
        self.send(&message);
    }
}

fn main() {
    let config = Arc::new(ServerConfig::from_args());
    let output = Output {
        stdout: Arc::new(Mutex::new(std::io::stdout())),
        newline: config.newline,
    };

    if config.stderr_noise {
        eprintln!("mock server starting");
        eprintln!();
        eprintln!("Error: simulated startup warning");
    }
    if config.banner {
        let mut stdout = output.stdout.lock().unwrap();
        writeln!(stdout, "mock-mcp-server ready").unwrap();
        stdout.flush().unwrap();
    }

    let stdin = std::io::stdin();
    let mut reader = BufReader::new(stdin.lock());

    while let Some(body) = read_frame(&mut reader) {
        let Ok(message) = serde_json::from_slice::<Incoming>(&body) else {
            continue;
        };

        let Some(id) = message.id else {
            if message.method == "notifications/initialized" && config.notify {
                output.send(&json!({
                    "jsonrpc": "2.0",
                    "method": "notifications/message",
                    "params": {"level": "info", "data": "mock server ready"}
                }));
            }
            continue;
        };

        match message.method.as_str() {
            "tools/call" => {
                let config = Arc::clone(&config);
                let output = output.clone();
                thread::spawn(move || {
                    apply_delay(config.delay_ms);
                    let params = message.params.unwrap_or(Value::Null);
                    match params.get("name").and_then(Value::as_str) {
                        // Error object without a code.
                        Some("bad-error") => output.respond(id, Err(json!({"message": "boom"}))),
                        // Error object nothing can make sense of.
                        Some("garbled-error") => {
                            output.respond(id, Err(json!({"code": "bad", "message": 42})))
                        }
                        _ => output.respond(id, Ok(call_tool(params, &config))),
                    }
                });
            }
            "initialize" if config.hang_on_init => {}
            method => {
                apply_delay(config.delay_ms);
                output.respond(id, handle_request(method, &config));
            }
        }
    }
}

/// Read one Content-Length framed body; `None` on EOF.
fn read_frame(reader: &mut impl BufRead) -> Option<Vec<u8>> {
    loop {
        let mut content_length = None;
        let mut line = String::new();
        loop {
            line.clear();
            if reader.read_line(&mut line).ok()? == 0 {
                return None;
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                break;
            }
            if let Some((name, value)) = trimmed.split_once(':')
                && name.eq_ignore_ascii_case("content-length")
            {
                content_length = value.trim().parse::<usize>().ok();
            }
        }

        if let Some(len) = content_length {
            let mut body = vec![0u8; len];
            reader.read_exact(&mut body).ok()?;
            return Some(body);
        }
    }
}

fn apply_delay(ms: u64) {
    if ms > 0 {
        thread::sleep(Duration::from_millis(ms));
    }
}

fn handle_request(method: &str, config: &ServerConfig) -> Result<Value, Value> {
    match method {
        "initialize" => Ok(json!({
            "protocolVersion": "2024-11-05",
            "capabilities": {"tools": {}},
            "serverInfo": {"name": "mock-mcp-server", "version": "1.0.0"}
        })),
        "tools/list" if config.fail_tools_list => Err(json!({
            "code": -32603,
            "message": "tool listing unavailable"
        })),
        "tools/list" if config.sloppy_tools_list => Ok(json!({
            "tools": [
                {"name": "echo", "description": "Echo back the input"},
                {"description": "missing a name"},
                {"name": "add", "description": 12},
                {"name": ""}
            ]
        })),
        "tools/list" => Ok(json!({
            "tools": [
                {
                    "name": "echo",
                    "description": "Echo back the input",
                    "inputSchema": {
                        "type": "object",
                        "properties": {"message": {"type": "string"}}
                    }
                },
                {
                    "name": "add",
                    "description": "Add two numbers",
                    "inputSchema": {
                        "type": "object",
                        "properties": {"a": {"type": "number"}, "b": {"type": "number"}},
                        "required": ["a", "b"]
                    }
                },
                {
                    "name": "slow",
                    "description": "Sleep before answering",
                    "inputSchema": {
                        "type": "object",
                        "properties": {"delay_ms": {"type": "number"}}
                    }
                },
                {
                    "name": "crash",
                    "description": "Exit the server"
                },
                {
                    "name": "env",
                    "description": "Report an environment variable",
                    "inputSchema": null
                }
            ]
        })),
        "ping" => Ok(json!({})),
        other => Err(json!({
            "code": -32601,
            "message": format!("Method not found: {other}")
        })),
    }
}

fn call_tool(params: Value, config: &ServerConfig) -> Value {
    let tool_name = params.get("name").and_then(Value::as_str).unwrap_or("");
    let args = params.get("arguments").cloned().unwrap_or(json!({}));

    if config.crash_on.as_deref() == Some(tool_name) || tool_name == "crash" {
        std::process::exit(1);
    }
    apply_delay(config.tool_delay(tool_name));

    let text = match tool_name {
        "echo" => match args.get("message").and_then(Value::as_str) {
            Some(message) => message.to_string(),
            None => args
                .as_object()
                .and_then(|map| map.values().next())
                .map(|value| match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .unwrap_or_default(),
        },
        "add" => {
            let a = args.get("a").and_then(Value::as_f64).unwrap_or(0.0);
            let b = args.get("b").and_then(Value::as_f64).unwrap_or(0.0);
            format!("{}", a + b)
        }
        "slow" => {
            let delay = args.get("delay_ms").and_then(Value::as_u64).unwrap_or(1000);
            thread::sleep(Duration::from_millis(delay));
            format!("Slept for {delay} ms")
        }
        "env" => {
            let name = args.get("name").and_then(Value::as_str).unwrap_or("");
            env::var(name).unwrap_or_else(|_| "<unset>".to_string())
        }
        _ => {
            return json!({
                "content": [{"type": "text", "text": "no such tool"}],
                "isError": true
            });
        }
    };

    json!({"content": [{"type": "text", "text": text}]})
}
