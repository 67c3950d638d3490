//! The fixed tool catalog: wire names, argument types and schemas.

use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::action::{ActionRecord, PlannedAction};
use crate::browser::ElementType;
use crate::{Error, Result};

/// Default timeout for click and wait, in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
/// Default screenshot file name.
pub const DEFAULT_SCREENSHOT: &str = "screenshot.png";

/// Every tool the driver exposes, by wire name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolName {
    LaunchBrowser,
    NavigateTo,
    ClickElement,
    FillInput,
    WaitForElement,
    TakeScreenshot,
    InspectPage,
    SearchSite,
    PressKey,
    GetContent,
    GenerateTest,
    CloseBrowser,
}

impl ToolName {
    pub const ALL: [ToolName; 12] = [
        Self::LaunchBrowser,
        Self::NavigateTo,
        Self::ClickElement,
        Self::FillInput,
        Self::WaitForElement,
        Self::TakeScreenshot,
        Self::InspectPage,
        Self::SearchSite,
        Self::PressKey,
        Self::GetContent,
        Self::GenerateTest,
        Self::CloseBrowser,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::LaunchBrowser => "launch_browser",
            Self::NavigateTo => "navigate_to",
            Self::ClickElement => "click_element",
            Self::FillInput => "fill_input",
            Self::WaitForElement => "wait_for_element",
            Self::TakeScreenshot => "take_screenshot",
            Self::InspectPage => "inspect_page",
            Self::SearchSite => "search_site",
            Self::PressKey => "press_key",
            Self::GetContent => "get_content",
            Self::GenerateTest => "generate_test",
            Self::CloseBrowser => "close_browser",
        }
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| Error::UnknownTool(s.into()))
    }
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_screenshot() -> String {
    DEFAULT_SCREENSHOT.into()
}

// ---------------------------------------------------------------------------
// Arguments
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LaunchArgs {
    #[serde(default)]
    #[schemars(description = "Run without a visible window (default false)")]
    pub headless: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NavigateArgs {
    #[schemars(description = "URL to navigate to")]
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClickArgs {
    #[schemars(description = "CSS selector, text=..., or xpath=... of the element to click")]
    pub selector: String,
    #[serde(default = "default_timeout")]
    #[schemars(description = "Total time budget in milliseconds (default 30000)")]
    pub timeout: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FillArgs {
    #[schemars(description = "Selector of the input to fill")]
    pub selector: String,
    #[schemars(description = "Text to enter")]
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WaitArgs {
    #[schemars(description = "Selector to wait for")]
    pub selector: String,
    #[serde(default = "default_timeout")]
    #[schemars(description = "Timeout in milliseconds (default 30000)")]
    pub timeout: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScreenshotArgs {
    #[serde(default = "default_screenshot")]
    #[schemars(description = "Output file (default screenshot.png)")]
    pub filename: String,
}

impl Default for ScreenshotArgs {
    fn default() -> Self {
        Self {
            filename: default_screenshot(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct InspectArgs {
    #[serde(default)]
    #[schemars(description = "One of forms, inputs, buttons, all (default all)")]
    pub element_type: ElementType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SearchArgs {
    #[schemars(description = "Search query")]
    pub query: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PressKeyArgs {
    #[schemars(description = "Key to press (e.g. Enter, Tab, Escape, ArrowDown)")]
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenerateTestArgs {
    #[schemars(description = "Name of the generated test")]
    pub test_name: String,
    #[serde(default)]
    #[schemars(description = "Description emitted as comments at the top of the test")]
    pub description: String,
    #[serde(default)]
    #[schemars(
        description = "Recorded actions (as returned in structuredContent.recorded) to render instead of the session log"
    )]
    pub records: Option<Vec<ActionRecord>>,
    #[serde(default)]
    #[schemars(description = "Planned actions to render when no records are given")]
    pub actions: Option<Vec<PlannedAction>>,
    #[serde(default)]
    #[schemars(description = "Also write the script to this path")]
    pub output_path: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EmptyArgs {}

// ---------------------------------------------------------------------------
// Calls
// ---------------------------------------------------------------------------

/// A validated tool invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolCall {
    Launch(LaunchArgs),
    Navigate(NavigateArgs),
    Click(ClickArgs),
    Fill(FillArgs),
    Wait(WaitArgs),
    Screenshot(ScreenshotArgs),
    Inspect(InspectArgs),
    Search(SearchArgs),
    PressKey(PressKeyArgs),
    GetContent,
    GenerateTest(GenerateTestArgs),
    Close,
}

impl ToolCall {
    pub fn name(&self) -> ToolName {
        match self {
            Self::Launch(_) => ToolName::LaunchBrowser,
            Self::Navigate(_) => ToolName::NavigateTo,
            Self::Click(_) => ToolName::ClickElement,
            Self::Fill(_) => ToolName::FillInput,
            Self::Wait(_) => ToolName::WaitForElement,
            Self::Screenshot(_) => ToolName::TakeScreenshot,
            Self::Inspect(_) => ToolName::InspectPage,
            Self::Search(_) => ToolName::SearchSite,
            Self::PressKey(_) => ToolName::PressKey,
            Self::GetContent => ToolName::GetContent,
            Self::GenerateTest(_) => ToolName::GenerateTest,
            Self::Close => ToolName::CloseBrowser,
        }
    }

    /// Validate `args` against the named tool. `null` counts as `{}`.
    pub fn parse(name: &str, args: Value) -> Result<Self> {
        let spec = TOOLS
            .iter()
            .find(|t| t.name.as_str() == name)
            .ok_or_else(|| Error::UnknownTool(name.into()))?;
        let args = if args.is_null() {
            Value::Object(Default::default())
        } else {
            args
        };
        (spec.parse)(args).map_err(|e| Error::InvalidArgs {
            tool: name.into(),
            message: e.to_string(),
        })
    }
}

/// Introspection entry for one tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

struct ToolSpec {
    name: ToolName,
    description: &'static str,
    schema: fn() -> Value,
    parse: fn(Value) -> serde_json::Result<ToolCall>,
}

fn schema<T: JsonSchema>() -> Value {
    schemars::schema_for!(T).to_value()
}

static TOOLS: &[ToolSpec] = &[
    ToolSpec {
        name: ToolName::LaunchBrowser,
        description: "Launch a browser session. Reports the current session if one is already running.",
        schema: schema::<LaunchArgs>,
        parse: |v| serde_json::from_value(v).map(ToolCall::Launch),
    },
    ToolSpec {
        name: ToolName::NavigateTo,
        description: "Navigate the page to a URL.",
        schema: schema::<NavigateArgs>,
        parse: |v| serde_json::from_value(v).map(ToolCall::Navigate),
    },
    ToolSpec {
        name: ToolName::ClickElement,
        description: "Click an element. Known selectors for the current site are tried before the given one.",
        schema: schema::<ClickArgs>,
        parse: |v| serde_json::from_value(v).map(ToolCall::Click),
    },
    ToolSpec {
        name: ToolName::FillInput,
        description: "Clear an input and type text into it. Reports the value the field holds afterwards.",
        schema: schema::<FillArgs>,
        parse: |v| serde_json::from_value(v).map(ToolCall::Fill),
    },
    ToolSpec {
        name: ToolName::WaitForElement,
        description: "Wait until an element is visible.",
        schema: schema::<WaitArgs>,
        parse: |v| serde_json::from_value(v).map(ToolCall::Wait),
    },
    ToolSpec {
        name: ToolName::TakeScreenshot,
        description: "Save a PNG screenshot of the page and return it as an image.",
        schema: schema::<ScreenshotArgs>,
        parse: |v| serde_json::from_value(v).map(ToolCall::Screenshot),
    },
    ToolSpec {
        name: ToolName::InspectPage,
        description: "Describe the page's forms, inputs and buttons with candidate selectors for each.",
        schema: schema::<InspectArgs>,
        parse: |v| serde_json::from_value(v).map(ToolCall::Inspect),
    },
    ToolSpec {
        name: ToolName::SearchSite,
        description: "Search the current site: search box, then keyboard shortcut, then search URL.",
        schema: schema::<SearchArgs>,
        parse: |v| serde_json::from_value(v).map(ToolCall::Search),
    },
    ToolSpec {
        name: ToolName::PressKey,
        description: "Press a keyboard key (e.g. Enter, Tab, Escape).",
        schema: schema::<PressKeyArgs>,
        parse: |v| serde_json::from_value(v).map(ToolCall::PressKey),
    },
    ToolSpec {
        name: ToolName::GetContent,
        description: "Get the page URL, title and visible text.",
        schema: schema::<EmptyArgs>,
        parse: |v| serde_json::from_value::<EmptyArgs>(v).map(|_| ToolCall::GetContent),
    },
    ToolSpec {
        name: ToolName::GenerateTest,
        description: "Generate a Playwright test from the given actions, or from everything executed in this session.",
        schema: schema::<GenerateTestArgs>,
        parse: |v| serde_json::from_value(v).map(ToolCall::GenerateTest),
    },
    ToolSpec {
        name: ToolName::CloseBrowser,
        description: "Close the browser session and discard its action log.",
        schema: schema::<EmptyArgs>,
        parse: |v| serde_json::from_value::<EmptyArgs>(v).map(|_| ToolCall::Close),
    },
];

/// Descriptors for every tool, in catalog order.
pub fn descriptors() -> Vec<ToolDescriptor> {
    TOOLS
        .iter()
        .map(|t| ToolDescriptor {
            name: t.name.as_str().into(),
            description: t.description.into(),
            input_schema: (t.schema)(),
        })
        .collect()
}
