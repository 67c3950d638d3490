//! Name-based dispatch with result-or-error envelopes.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::action::ExecutedAction;
use crate::catalog::{self, ToolCall, ToolDescriptor};
use crate::driver::Driver;

/// One item of a tool result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Content {
    Text {
        text: String,
    },
    Image {
        /// Base64 payload.
        data: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
    #[serde(other)]
    Other,
}

impl Content {
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text { text: s.into() }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// Normalized outcome of a tool call.
///
/// `structured_content` carries `{"recorded": [...]}`: the actions the call
/// appended to the session log, which is what a script must replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub content: Vec<Content>,
    #[serde(rename = "isError", default)]
    pub is_error: bool,
    #[serde(
        rename = "structuredContent",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub structured_content: Option<Value>,
}

impl ToolResult {
    pub fn success(content: Vec<Content>) -> Self {
        Self {
            content,
            is_error: false,
            structured_content: None,
        }
    }

    /// Attach the actions this call executed. An empty list attaches nothing.
    pub fn with_recorded(mut self, recorded: Vec<ExecutedAction>) -> Self {
        if !recorded.is_empty() {
            self.structured_content = Some(json!({ "recorded": recorded }));
        }
        self
    }

    /// Actions this call executed, if the result carries them.
    pub fn recorded(&self) -> Vec<ExecutedAction> {
        self.structured_content
            .as_ref()
            .and_then(|v| v.get("recorded"))
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default()
    }

    pub fn text(s: impl Into<String>) -> Self {
        Self::success(vec![Content::text(s)])
    }

    pub fn error(tool: &str, message: impl std::fmt::Display) -> Self {
        Self {
            content: vec![Content::text(format!("Error executing {}: {}", tool, message))],
            is_error: true,
            structured_content: None,
        }
    }

    pub fn first_text(&self) -> Option<String> {
        self.content.iter().find_map(|c| c.as_text()).map(String::from)
    }
}

/// Routes tool calls to one driver, one at a time.
pub struct Router {
    driver: Mutex<Driver>,
}

impl Router {
    pub fn new(driver: Driver) -> Self {
        Self {
            driver: Mutex::new(driver),
        }
    }

    pub fn list_tools(&self) -> Vec<ToolDescriptor> {
        catalog::descriptors()
    }

    /// Parse and execute a call by name. Never fails: errors come back as
    /// an error envelope.
    pub async fn call_tool(&self, name: &str, args: Value) -> ToolResult {
        match ToolCall::parse(name, args) {
            Ok(call) => self.dispatch(call).await,
            Err(e) => {
                warn!(tool = name, error = %e, "rejected tool call");
                ToolResult::error(name, e)
            }
        }
    }

    pub async fn dispatch(&self, call: ToolCall) -> ToolResult {
        let tool = call.name();
        let mut driver = self.driver.lock().await;
        let before = driver.session().map(|s| s.log().len());
        match driver.execute(call).await {
            Ok(content) => {
                info!(%tool, "tool ok");
                let recorded = match driver.session() {
                    Some(session) => {
                        let entries = session.log().entries();
                        entries
                            .get(before.unwrap_or(0)..)
                            .unwrap_or_default()
                            .to_vec()
                    }
                    None => Vec::new(),
                };
                debug!(%tool, recorded = recorded.len(), "recorded actions");
                ToolResult::success(content).with_recorded(recorded)
            }
            Err(e) => {
                warn!(%tool, error = %e, "tool failed");
                ToolResult::error(tool.as_str(), e)
            }
        }
    }

    /// Whether a browser session is currently open.
    pub async fn is_active(&self) -> bool {
        self.driver.lock().await.is_active()
    }
}
