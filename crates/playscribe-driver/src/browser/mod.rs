//! Browser backends behind the driver.
//!
//! The driver only talks to a [`BrowserPage`]; `chrome` drives a real
//! Chrome over CDP, `sim` is an in-memory page model.

pub mod chrome;
pub mod sim;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::Result;

/// Interval between visibility checks while waiting.
const VISIBILITY_POLL: Duration = Duration::from_millis(100);

/// Starts browser sessions.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self, headless: bool) -> Result<Box<dyn BrowserPage>>;
}

/// The single page a session drives.
///
/// Selectors are CSS by default; `text=...` and `xpath=...` (or a bare
/// `//...`) are also understood.
#[async_trait]
pub trait BrowserPage: Send {
    async fn goto(&mut self, url: &str) -> Result<()>;
    async fn url(&mut self) -> Result<String>;
    async fn title(&mut self) -> Result<String>;
    /// Visible text of the whole page.
    async fn text(&mut self) -> Result<String>;

    /// Whether the selector matches an element that is currently rendered.
    async fn is_visible(&mut self, selector: &str) -> Result<bool>;

    /// Poll until the selector is visible. `Ok(false)` means the timeout elapsed.
    async fn wait_visible(&mut self, selector: &str, timeout_ms: u64) -> Result<bool> {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        loop {
            if self.is_visible(selector).await? {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(VISIBILITY_POLL).await;
        }
    }

    async fn is_enabled(&mut self, selector: &str) -> Result<bool>;
    async fn scroll_into_view(&mut self, selector: &str) -> Result<()>;
    async fn click(&mut self, selector: &str) -> Result<()>;
    async fn clear(&mut self, selector: &str) -> Result<()>;
    async fn fill(&mut self, selector: &str, text: &str) -> Result<()>;
    /// Current value of a form field (text content for non-form elements).
    async fn input_value(&mut self, selector: &str) -> Result<String>;

    async fn press_key(&mut self, key: &str) -> Result<()>;
    /// Type into whatever element has focus.
    async fn type_text(&mut self, text: &str) -> Result<()>;
    /// Whether the focused element accepts typed text.
    async fn focused_is_editable(&mut self) -> Result<bool>;

    /// PNG bytes of the viewport.
    async fn screenshot(&mut self) -> Result<Vec<u8>>;

    /// Best-effort snapshot of elements plausible for a query, used in
    /// resolution diagnostics.
    async fn collect_elements(&mut self, query: ElementQuery) -> Result<Vec<ElementSummary>>;

    async fn inspect(&mut self) -> Result<PageInspection>;

    async fn pause(&mut self, ms: u64);

    async fn close(&mut self) -> Result<()>;
}

/// Which elements a diagnostic snapshot should collect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementQuery {
    /// Links, buttons, and anything with a click handler or button role.
    Clickable,
    /// Inputs, textareas, selects and editable regions.
    InputLike,
}

impl ElementQuery {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Clickable => "clickable",
            Self::InputLike => "input",
        }
    }
}

/// Compact description of a live element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementSummary {
    pub tag: String,
    #[serde(default)]
    pub text: String,
    pub id: Option<String>,
    pub name: Option<String>,
    pub input_type: Option<String>,
    pub placeholder: Option<String>,
    pub selector: String,
}

impl fmt::Display for ElementSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}", self.tag)?;
        if let Some(ref t) = self.input_type {
            if t != "text" {
                write!(f, " type=\"{}\"", t)?;
            }
        }
        if let Some(ref n) = self.name {
            write!(f, " name=\"{}\"", n)?;
        }
        f.write_str(">")?;
        if !self.text.is_empty() {
            write!(f, " \"{}\"", self.text)?;
        }
        if let Some(ref p) = self.placeholder {
            write!(f, " placeholder=\"{}\"", p)?;
        }
        write!(f, " selector={}", self.selector)
    }
}

/// Element categories accepted by `inspect_page`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    Forms,
    Inputs,
    Buttons,
    #[default]
    All,
}

/// Structured description of the page's forms, inputs and buttons.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInspection {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub forms: Vec<FormInfo>,
    #[serde(default)]
    pub inputs: Vec<InputInfo>,
    #[serde(default)]
    pub buttons: Vec<ButtonInfo>,
}

impl PageInspection {
    /// Drop every category not covered by `element_type`.
    pub fn retain(&mut self, element_type: ElementType) {
        match element_type {
            ElementType::All => {}
            ElementType::Forms => {
                self.inputs.clear();
                self.buttons.clear();
            }
            ElementType::Inputs => {
                self.forms.clear();
                self.buttons.clear();
            }
            ElementType::Buttons => {
                self.forms.clear();
                self.inputs.clear();
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormInfo {
    pub id: Option<String>,
    pub name: Option<String>,
    pub action: Option<String>,
    pub method: Option<String>,
    #[serde(default)]
    pub field_count: usize,
    /// Candidate selectors, most specific first.
    #[serde(default)]
    pub selectors: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputInfo {
    pub tag: String,
    pub input_type: Option<String>,
    pub name: Option<String>,
    pub id: Option<String>,
    pub placeholder: Option<String>,
    /// Text of the associated `<label>`, if any.
    pub label: Option<String>,
    #[serde(default)]
    pub selectors: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ButtonInfo {
    pub tag: String,
    #[serde(default)]
    pub text: String,
    pub button_type: Option<String>,
    #[serde(default)]
    pub selectors: Vec<String>,
}
