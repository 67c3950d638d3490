//! In-memory browser: a scripted page model for tests and dry runs.
//!
//! Pages are keyed by exact URL. Every interaction is recorded on the
//! shared [`SimWorld`] so callers can assert what happened.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use super::{
    BrowserLauncher, BrowserPage, ButtonInfo, ElementQuery, ElementSummary, FormInfo, InputInfo,
    PageInspection,
};
use crate::{Error, Result};

/// Bytes returned by `screenshot()`: a bare PNG signature.
pub const SIM_PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

/// A simulated DOM element.
#[derive(Debug, Clone, PartialEq)]
pub struct SimElement {
    pub tag: String,
    /// The one selector this element answers to.
    pub selector: String,
    pub text: String,
    pub id: Option<String>,
    pub name: Option<String>,
    pub input_type: Option<String>,
    pub placeholder: Option<String>,
    pub label: Option<String>,
    pub role: Option<String>,
    pub value: String,
    pub visible: bool,
    pub enabled: bool,
    /// Like the `maxlength` attribute: longer writes are truncated.
    pub max_length: Option<usize>,
    /// Clicking (or pressing Enter while focused) loads this URL.
    pub navigates_to: Option<String>,
}

impl SimElement {
    pub fn new(tag: &str, selector: &str) -> Self {
        Self {
            tag: tag.into(),
            selector: selector.into(),
            text: String::new(),
            id: selector.strip_prefix('#').map(String::from),
            name: None,
            input_type: None,
            placeholder: None,
            label: None,
            role: None,
            value: String::new(),
            visible: true,
            enabled: true,
            max_length: None,
            navigates_to: None,
        }
    }

    pub fn input(selector: &str) -> Self {
        let mut el = Self::new("input", selector);
        el.input_type = Some("text".into());
        el
    }

    pub fn button(selector: &str, text: &str) -> Self {
        Self::new("button", selector).text(text)
    }

    pub fn link(selector: &str, text: &str) -> Self {
        Self::new("a", selector).text(text)
    }

    pub fn text(mut self, text: &str) -> Self {
        self.text = text.into();
        self
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn input_type(mut self, t: &str) -> Self {
        self.input_type = Some(t.into());
        self
    }

    pub fn placeholder(mut self, p: &str) -> Self {
        self.placeholder = Some(p.into());
        self
    }

    pub fn label(mut self, l: &str) -> Self {
        self.label = Some(l.into());
        self
    }

    pub fn role(mut self, r: &str) -> Self {
        self.role = Some(r.into());
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn max_length(mut self, n: usize) -> Self {
        self.max_length = Some(n);
        self
    }

    pub fn navigates_to(mut self, url: &str) -> Self {
        self.navigates_to = Some(url.into());
        self
    }

    fn is_editable(&self) -> bool {
        matches!(self.tag.as_str(), "input" | "textarea" | "select")
    }

    fn is_clickable(&self) -> bool {
        matches!(self.tag.as_str(), "a" | "button")
            || (self.tag == "input"
                && matches!(self.input_type.as_deref(), Some("submit") | Some("button")))
            || matches!(self.role.as_deref(), Some("button") | Some("link"))
    }

    fn summary(&self) -> ElementSummary {
        ElementSummary {
            tag: self.tag.clone(),
            text: self.text.clone(),
            id: self.id.clone(),
            name: self.name.clone(),
            input_type: self.input_type.clone(),
            placeholder: self.placeholder.clone(),
            selector: self.selector.clone(),
        }
    }

    fn candidates(&self, with_text: bool) -> Vec<String> {
        let mut out = vec![self.selector.clone()];
        if let Some(ref id) = self.id {
            out.push(format!("#{}", id));
        }
        if let Some(ref name) = self.name {
            out.push(format!("{}[name=\"{}\"]", self.tag, name));
        }
        if let Some(ref p) = self.placeholder {
            out.push(format!("{}[placeholder=\"{}\"]", self.tag, p));
        }
        if with_text && !self.text.is_empty() {
            out.push(format!("text=\"{}\"", self.text));
        }
        let mut seen = Vec::with_capacity(out.len());
        out.retain(|s| {
            if seen.contains(s) {
                false
            } else {
                seen.push(s.clone());
                true
            }
        });
        out
    }
}

/// A simulated document.
#[derive(Debug, Clone, Default)]
pub struct SimPage {
    pub title: String,
    pub elements: Vec<SimElement>,
    /// Key → selector focused when that key is pressed (in-page search shortcuts).
    pub shortcuts: HashMap<String, String>,
}

impl SimPage {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn with(mut self, element: SimElement) -> Self {
        self.elements.push(element);
        self
    }

    pub fn shortcut(mut self, key: &str, selector: &str) -> Self {
        self.shortcuts.insert(key.into(), selector.into());
        self
    }
}

/// Shared state of every simulated session from one launcher.
#[derive(Debug, Default)]
pub struct SimWorld {
    pub pages: HashMap<String, SimPage>,
    /// When set, unknown selectors materialize as visible text inputs.
    pub permissive: bool,
    /// Makes `collect_elements` fail, for exercising diagnostic errors.
    pub fail_collection: bool,
    pub current_url: String,
    pub focused: Option<String>,
    pub history: Vec<String>,
    pub clicks: Vec<String>,
    pub keys: Vec<String>,
    pub launches: usize,
    pub closes: usize,
    pub last_headless: Option<bool>,
}

impl SimWorld {
    fn page_mut(&mut self) -> &mut SimPage {
        let url = self.current_url.clone();
        self.pages.entry(url).or_default()
    }

    fn page(&self) -> Option<&SimPage> {
        self.pages.get(&self.current_url)
    }

    fn element(&mut self, selector: &str) -> Option<&mut SimElement> {
        let permissive = self.permissive;
        let page = self.page_mut();
        let pos = page.elements.iter().position(|e| e.selector == selector);
        match pos {
            Some(i) => page.elements.get_mut(i),
            None if permissive => {
                page.elements.push(SimElement::input(selector));
                page.elements.last_mut()
            }
            None => None,
        }
    }

    fn require(&mut self, selector: &str) -> Result<&mut SimElement> {
        self.element(selector)
            .ok_or_else(|| Error::Element(format!("{} not found", selector)))
    }

    fn load(&mut self, url: &str) {
        self.current_url = url.into();
        self.focused = None;
        self.history.push(url.into());
    }

    fn activate(&mut self, selector: &str) {
        let target = self
            .page()
            .and_then(|p| p.elements.iter().find(|e| e.selector == selector))
            .and_then(|e| e.navigates_to.clone());
        if let Some(url) = target {
            self.load(&url);
        }
    }
}

fn lock(world: &Mutex<SimWorld>) -> MutexGuard<'_, SimWorld> {
    world.lock().unwrap_or_else(|e| e.into_inner())
}

/// Launcher for simulated sessions; clones share one world.
#[derive(Debug, Clone, Default)]
pub struct SimLauncher {
    world: Arc<Mutex<SimWorld>>,
}

impl SimLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every selector resolves; used for dry runs without a browser.
    pub fn permissive() -> Self {
        let launcher = Self::default();
        lock(&launcher.world).permissive = true;
        launcher
    }

    pub fn with_page(self, url: &str, page: SimPage) -> Self {
        lock(&self.world).pages.insert(url.into(), page);
        self
    }

    pub fn failing_collection(self) -> Self {
        lock(&self.world).fail_collection = true;
        self
    }

    pub fn world(&self) -> Arc<Mutex<SimWorld>> {
        self.world.clone()
    }

    /// Read the shared world under its lock.
    pub fn inspect_world<T>(&self, f: impl FnOnce(&SimWorld) -> T) -> T {
        f(&lock(&self.world))
    }
}

#[async_trait]
impl BrowserLauncher for SimLauncher {
    async fn launch(&self, headless: bool) -> Result<Box<dyn BrowserPage>> {
        {
            let mut world = lock(&self.world);
            world.launches += 1;
            world.last_headless = Some(headless);
            world.current_url = "about:blank".into();
            world.focused = None;
        }
        Ok(Box::new(SimBrowserPage {
            world: self.world.clone(),
        }))
    }
}

/// Page handle of a simulated session.
pub struct SimBrowserPage {
    world: Arc<Mutex<SimWorld>>,
}

impl SimBrowserPage {
    fn world(&self) -> MutexGuard<'_, SimWorld> {
        lock(&self.world)
    }
}

#[async_trait]
impl BrowserPage for SimBrowserPage {
    async fn goto(&mut self, url: &str) -> Result<()> {
        self.world().load(url);
        Ok(())
    }

    async fn url(&mut self) -> Result<String> {
        Ok(self.world().current_url.clone())
    }

    async fn title(&mut self) -> Result<String> {
        Ok(self.world().page().map(|p| p.title.clone()).unwrap_or_default())
    }

    async fn text(&mut self) -> Result<String> {
        let world = self.world();
        Ok(world
            .page()
            .map(|p| {
                p.elements
                    .iter()
                    .filter(|e| e.visible && !e.text.is_empty())
                    .map(|e| e.text.as_str())
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .unwrap_or_default())
    }

    async fn is_visible(&mut self, selector: &str) -> Result<bool> {
        Ok(self.world().element(selector).map(|e| e.visible).unwrap_or(false))
    }

    async fn wait_visible(&mut self, selector: &str, _timeout_ms: u64) -> Result<bool> {
        self.is_visible(selector).await
    }

    async fn is_enabled(&mut self, selector: &str) -> Result<bool> {
        Ok(self.world().require(selector)?.enabled)
    }

    async fn scroll_into_view(&mut self, selector: &str) -> Result<()> {
        self.world().require(selector)?;
        Ok(())
    }

    async fn click(&mut self, selector: &str) -> Result<()> {
        let mut world = self.world();
        let el = world.require(selector)?;
        if !el.visible {
            return Err(Error::Element(format!("{} is not visible", selector)));
        }
        if !el.enabled {
            return Err(Error::Element(format!("{} is disabled", selector)));
        }
        world.clicks.push(selector.into());
        world.focused = Some(selector.into());
        world.activate(selector);
        Ok(())
    }

    async fn clear(&mut self, selector: &str) -> Result<()> {
        let mut world = self.world();
        let el = world.require(selector)?;
        if !el.is_editable() {
            return Err(Error::Element(format!("{} is not editable", selector)));
        }
        el.value.clear();
        Ok(())
    }

    async fn fill(&mut self, selector: &str, text: &str) -> Result<()> {
        let mut world = self.world();
        let el = world.require(selector)?;
        if !el.is_editable() {
            return Err(Error::Element(format!("{} is not editable", selector)));
        }
        el.value = match el.max_length {
            Some(n) => text.chars().take(n).collect(),
            None => text.into(),
        };
        world.focused = Some(selector.into());
        Ok(())
    }

    async fn input_value(&mut self, selector: &str) -> Result<String> {
        Ok(self.world().require(selector)?.value.clone())
    }

    async fn press_key(&mut self, key: &str) -> Result<()> {
        let mut world = self.world();
        world.keys.push(key.into());
        let shortcut = world.page().and_then(|p| p.shortcuts.get(key).cloned());
        if let Some(selector) = shortcut {
            world.focused = Some(selector);
        } else if key == "Enter" {
            if let Some(focused) = world.focused.clone() {
                world.activate(&focused);
            }
        }
        Ok(())
    }

    async fn type_text(&mut self, text: &str) -> Result<()> {
        let mut world = self.world();
        let Some(focused) = world.focused.clone() else {
            return Ok(());
        };
        if let Some(el) = world.element(&focused) {
            if el.is_editable() {
                el.value.push_str(text);
            }
        }
        Ok(())
    }

    async fn focused_is_editable(&mut self) -> Result<bool> {
        let mut world = self.world();
        let Some(focused) = world.focused.clone() else {
            return Ok(false);
        };
        Ok(world.element(&focused).map(|e| e.is_editable()).unwrap_or(false))
    }

    async fn screenshot(&mut self) -> Result<Vec<u8>> {
        Ok(SIM_PNG.to_vec())
    }

    async fn collect_elements(&mut self, query: ElementQuery) -> Result<Vec<ElementSummary>> {
        let world = self.world();
        if world.fail_collection {
            return Err(Error::Element("page is not scriptable".into()));
        }
        Ok(world
            .page()
            .map(|p| {
                p.elements
                    .iter()
                    .filter(|e| e.visible)
                    .filter(|e| match query {
                        ElementQuery::Clickable => e.is_clickable(),
                        ElementQuery::InputLike => e.is_editable(),
                    })
                    .map(SimElement::summary)
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn inspect(&mut self) -> Result<PageInspection> {
        let world = self.world();
        let mut out = PageInspection {
            url: world.current_url.clone(),
            ..Default::default()
        };
        let Some(page) = world.page() else {
            return Ok(out);
        };
        out.title = page.title.clone();
        let fields = page.elements.iter().filter(|e| e.is_editable()).count();
        for el in page.elements.iter().filter(|e| e.visible) {
            if el.tag == "form" {
                out.forms.push(FormInfo {
                    id: el.id.clone(),
                    name: el.name.clone(),
                    action: el.navigates_to.clone(),
                    method: None,
                    field_count: fields,
                    selectors: el.candidates(false),
                });
            } else if el.is_clickable() {
                out.buttons.push(ButtonInfo {
                    tag: el.tag.clone(),
                    text: el.text.clone(),
                    button_type: el.input_type.clone(),
                    selectors: el.candidates(true),
                });
            } else if el.is_editable() {
                out.inputs.push(InputInfo {
                    tag: el.tag.clone(),
                    input_type: el.input_type.clone(),
                    name: el.name.clone(),
                    id: el.id.clone(),
                    placeholder: el.placeholder.clone(),
                    label: el.label.clone(),
                    selectors: el.candidates(false),
                });
            }
        }
        Ok(out)
    }

    async fn pause(&mut self, _ms: u64) {}

    async fn close(&mut self) -> Result<()> {
        let mut world = self.world();
        world.closes += 1;
        world.current_url = "about:blank".into();
        world.focused = None;
        Ok(())
    }
}
