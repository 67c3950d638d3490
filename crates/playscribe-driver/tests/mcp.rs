//! The MCP server end to end over in-memory pipes.

use std::sync::Arc;

use playscribe_driver::{mcp, Driver, Router, SimLauncher, SiteCatalog, ToolName};
use serde_json::{json, Value};
use tokio::io::{duplex, AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines};

struct Client {
    lines: Lines<BufReader<DuplexStream>>,
    writer: DuplexStream,
}

impl Client {
    async fn send(&mut self, frame: Value) {
        let line = format!("{}\n", frame);
        self.writer.write_all(line.as_bytes()).await.unwrap();
    }

    /// Send a request and wait for the response with the same id.
    async fn request(&mut self, id: u64, method: &str, params: Value) -> Value {
        self.send(json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params}))
            .await;
        loop {
            let line = self.lines.next_line().await.unwrap().expect("server closed");
            let frame: Value = serde_json::from_str(&line).unwrap();
            if frame["id"] == id {
                return frame;
            }
        }
    }

    async fn call(&mut self, id: u64, name: &str, arguments: Value) -> Value {
        let frame = self
            .request(id, "tools/call", json!({"name": name, "arguments": arguments}))
            .await;
        assert!(frame.get("error").is_none(), "protocol error: {frame}");
        frame["result"].clone()
    }
}

async fn connect() -> Client {
    let (client_out, server_in) = duplex(64 * 1024);
    let (server_out, client_in) = duplex(64 * 1024);
    let router = Arc::new(Router::new(
        Driver::new(Arc::new(SimLauncher::new()), SiteCatalog::empty()).with_headless(true),
    ));
    tokio::spawn(mcp::serve(router, server_in, server_out));

    let mut client = Client {
        lines: BufReader::new(client_in).lines(),
        writer: client_out,
    };
    let init = client
        .request(
            1,
            "initialize",
            json!({
                "protocolVersion": "2024-11-05",
                "capabilities": {},
                "clientInfo": {"name": "test", "version": "0"}
            }),
        )
        .await;
    assert_eq!(init["result"]["serverInfo"]["name"], "playscribe-driver");
    client
        .send(json!({"jsonrpc": "2.0", "method": "notifications/initialized"}))
        .await;
    client
}

fn first_text(result: &Value) -> &str {
    result["content"][0]["text"].as_str().unwrap()
}

#[tokio::test]
async fn test_tools_list_matches_router() {
    let mut client = connect().await;
    let frame = client.request(2, "tools/list", json!({})).await;
    let tools = frame["result"]["tools"].as_array().unwrap();

    let names: Vec<&str> = tools.iter().map(|t| t["name"].as_str().unwrap()).collect();
    let expected: Vec<&str> = ToolName::ALL.iter().map(|t| t.as_str()).collect();
    assert_eq!(names, expected);

    let generate = tools.iter().find(|t| t["name"] == "generate_test").unwrap();
    assert!(generate["inputSchema"]["properties"]["testName"].is_object());
}

#[tokio::test]
async fn test_unknown_tool_is_an_error_envelope() {
    let mut client = connect().await;
    let result = client.call(2, "teleport", json!({})).await;
    assert_eq!(result["isError"], true);
    assert_eq!(
        first_text(&result),
        "Error executing teleport: unknown tool: teleport"
    );
}

#[tokio::test]
async fn test_bad_arguments_are_an_error_envelope() {
    let mut client = connect().await;
    let result = client.call(2, "navigate_to", json!({})).await;
    assert_eq!(result["isError"], true);
    let text = first_text(&result);
    assert!(text.starts_with("Error executing navigate_to: "), "{text}");
    assert!(text.contains("invalid arguments for navigate_to"), "{text}");
}

#[tokio::test]
async fn test_calls_carry_recorded_actions() {
    let mut client = connect().await;

    let launch = client.call(2, "launch_browser", json!({})).await;
    assert_eq!(launch["isError"], false);
    assert!(launch.get("structuredContent").is_none());

    let nav = client
        .call(3, "navigate_to", json!({"url": "https://x.test"}))
        .await;
    assert_eq!(nav["isError"], false);
    let recorded = &nav["structuredContent"]["recorded"];
    assert_eq!(recorded[0]["kind"], "navigate");
    assert_eq!(recorded[0]["source"], "await page.goto('https://x.test');");

    // No arguments at all is the same as an empty object.
    let frame = client
        .request(4, "tools/call", json!({"name": "get_content"}))
        .await;
    assert_eq!(frame["result"]["isError"], false, "{frame}");
    assert!(first_text(&frame["result"]).starts_with("URL: https://x.test"));
}
