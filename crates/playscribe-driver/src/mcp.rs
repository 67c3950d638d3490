//! MCP server. Tool listing and calls go straight through the [`Router`], so
//! the catalog and the error envelopes are the router's own.

use std::sync::Arc;

use rmcp::{model::*, service::RequestContext, RoleServer, ServerHandler, ServiceExt};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::catalog::ToolDescriptor;
use crate::router::{self, Router, ToolResult};
use crate::READY_MARKER;

fn into_tool(descriptor: ToolDescriptor) -> Tool {
    let schema = match descriptor.input_schema {
        Value::Object(map) => map,
        _ => JsonObject::new(),
    };
    Tool::new(descriptor.name, descriptor.description, Arc::new(schema))
}

fn into_call_result(result: ToolResult) -> CallToolResult {
    let content = result
        .content
        .into_iter()
        .filter_map(|c| match c {
            router::Content::Text { text } => Some(Content::text(text)),
            router::Content::Image { data, mime_type } => Some(Content::image(data, mime_type)),
            router::Content::Other => None,
        })
        .collect();
    let mut call = if result.is_error {
        CallToolResult::error(content)
    } else {
        CallToolResult::success(content)
    };
    call.structured_content = result.structured_content;
    call
}

#[derive(Clone)]
pub struct DriverServer {
    router: Arc<Router>,
}

impl DriverServer {
    pub fn new(router: Arc<Router>) -> Self {
        Self { router }
    }
}

impl ServerHandler for DriverServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "playscribe-driver".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                title: None,
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Browser automation server that records what it does. Call 'launch_browser' first, \
                 then navigate_to, click_element, fill_input, search_site and friends. \
                 'inspect_page' lists forms, inputs and buttons with selectors. \
                 'generate_test' turns the recorded session into a Playwright test."
                    .into(),
            ),
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, ErrorData> {
        let tools = self.router.list_tools().into_iter().map(into_tool).collect();
        Ok(ListToolsResult::with_all_items(tools))
    }

    /// Unknown tools and bad arguments come back as error envelopes, never as
    /// protocol errors.
    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        let args = request.arguments.map(Value::Object).unwrap_or(Value::Null);
        let result = self.router.call_tool(&request.name, args).await;
        Ok(into_call_result(result))
    }
}

/// Serve `router` over a reader/writer pair until the client disconnects.
pub async fn serve<R, W>(router: Arc<Router>, reader: R, writer: W) -> anyhow::Result<()>
where
    R: AsyncRead + Send + Unpin + 'static,
    W: AsyncWrite + Send + Unpin + 'static,
{
    let service = DriverServer::new(router).serve((reader, writer)).await?;
    service.waiting().await?;
    Ok(())
}

/// Serve `router` on stdin/stdout.
pub async fn run_server(router: Arc<Router>) -> anyhow::Result<()> {
    // Clients wait for this line before sending `initialize`.
    eprintln!("{}", READY_MARKER);
    serve(router, tokio::io::stdin(), tokio::io::stdout()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{self, ToolName};

    #[test]
    fn test_tools_come_from_catalog() {
        let tools: Vec<Tool> = catalog::descriptors().into_iter().map(into_tool).collect();
        let names: Vec<&str> = tools.iter().map(|t| t.name.as_ref()).collect();
        let expected: Vec<&str> = ToolName::ALL.iter().map(|t| t.as_str()).collect();
        assert_eq!(names, expected);
        assert!(tools.iter().all(|t| t.input_schema.get("type").is_some()));
    }

    #[test]
    fn test_error_envelope_converts() {
        let result = into_call_result(ToolResult::error("navigate_to", "no session"));
        assert_eq!(result.is_error, Some(true));
        assert!(result.structured_content.is_none());
    }

    #[test]
    fn test_structured_content_is_kept() {
        use crate::action::{ActionKind, ExecutedAction};

        let result = into_call_result(
            ToolResult::text("Navigated")
                .with_recorded(vec![ExecutedAction::new(ActionKind::Navigate, "https://x.test")]),
        );
        assert_eq!(result.is_error, Some(false));
        let structured = result.structured_content.unwrap();
        assert_eq!(structured["recorded"][0]["target"], "https://x.test");
    }
}
