//! # playscribe-driver
//!
//! Browser tool server for AI-planned automation. Every tool call that
//! touches the page is appended to an action log, and the log can be turned
//! into a Playwright test at any time.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use playscribe_driver::{ChromeLauncher, Driver, Router, SiteCatalog};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let driver = Driver::new(Arc::new(ChromeLauncher), SiteCatalog::builtin());
//! let router = Router::new(driver);
//!
//! router.call_tool("launch_browser", serde_json::json!({ "headless": true })).await;
//! router.call_tool("navigate_to", serde_json::json!({ "url": "https://example.com" })).await;
//! let script = router
//!     .call_tool("generate_test", serde_json::json!({ "testName": "example", "description": "" }))
//!     .await;
//! println!("{}", script.first_text().unwrap_or_default());
//! # }
//! ```

pub mod action;
pub mod browser;
pub mod catalog;
pub mod config;
pub mod driver;
pub mod mcp;
pub mod resolve;
pub mod router;
pub mod script;
pub mod search;
pub mod sites;

pub use action::{ActionDetail, ActionKind, ActionLog, ActionRecord, ExecutedAction, PlannedAction};
pub use browser::chrome::ChromeLauncher;
pub use browser::sim::{SimElement, SimLauncher, SimPage, SimWorld};
pub use browser::{
    BrowserLauncher, BrowserPage, ElementQuery, ElementSummary, ElementType, PageInspection,
};
pub use catalog::{ToolCall, ToolDescriptor, ToolName};
pub use config::DriverConfig;
pub use driver::{Driver, Session};
pub use router::{Content, Router, ToolResult};
pub use search::SearchStrategy;
pub use sites::{SiteCatalog, SiteProfile};

/// Line written to stderr once the driver is serving on stdio.
pub const READY_MARKER: &str = "playscribe-driver running on stdio";

/// Result type for driver operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by driver operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("No browser session. Call launch_browser first.")]
    NoSession,

    #[error(
        "{action} failed for every selector [{}]. Last error: {last_error}\nElements on page:\n{elements}",
        .tried.join(", ")
    )]
    Exhausted {
        action: &'static str,
        tried: Vec<String>,
        last_error: String,
        elements: String,
    },

    #[error(
        "{action} failed for every selector [{}]. Last error: {last_error}. Collecting page elements also failed: {diagnostic_error}",
        .tried.join(", ")
    )]
    DiagnosticsFailed {
        action: &'static str,
        tried: Vec<String>,
        last_error: String,
        diagnostic_error: String,
    },

    #[error("timed out after {timeout_ms}ms waiting for {selector}")]
    Timeout { selector: String, timeout_ms: u64 },

    #[error("every search strategy failed: {0}")]
    SearchFailed(String),

    #[error("invalid arguments for {tool}: {message}")]
    InvalidArgs { tool: String, message: String },

    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("element error: {0}")]
    Element(String),

    #[error("browser error: {0}")]
    Browser(#[from] eoka::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("yaml parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("config error: {0}")]
    Config(String),
}
