//! Real Chrome backend over CDP (eoka). Element checks run as injected JS.

use async_trait::async_trait;
use eoka::{Browser, Page, StealthConfig};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::{BrowserLauncher, BrowserPage, ElementQuery, ElementSummary, PageInspection};
use crate::{Error, Result};

/// Shared helpers injected in front of every element check.
const LOCATE_JS: &str = r#"
function __psLocate(sel) {
    if (sel.startsWith('xpath=') || sel.startsWith('//')) {
        const xp = sel.startsWith('xpath=') ? sel.slice(6) : sel;
        return document.evaluate(xp, document, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue;
    }
    if (sel.startsWith('text=')) {
        let t = sel.slice(5).trim();
        if (t.length > 1 && (t[0] === '"' || t[0] === "'") && t[t.length - 1] === t[0]) t = t.slice(1, -1);
        t = t.toLowerCase();
        const all = [...document.querySelectorAll('a,button,input,select,textarea,label,summary,[role],[onclick],[tabindex]')];
        return all.find(el => (el.innerText || el.value || el.getAttribute('aria-label') || '').trim().toLowerCase().includes(t)) || null;
    }
    return document.querySelector(sel);
}
function __psVisible(el) {
    if (!el) return false;
    const r = el.getBoundingClientRect();
    const s = getComputedStyle(el);
    return r.width > 0 && r.height > 0 && s.visibility !== 'hidden' && s.display !== 'none';
}
"#;

/// Builds unique selectors and label text; shared by collect and inspect.
const DESCRIBE_JS: &str = r#"
function __psSelector(el) {
    if (el.id) return '#' + CSS.escape(el.id);
    const tag = el.tagName.toLowerCase();
    const name = el.getAttribute('name');
    if (name) return tag + '[name=' + JSON.stringify(name) + ']';
    const testid = el.getAttribute('data-testid');
    if (testid) return '[data-testid=' + JSON.stringify(testid) + ']';
    const aria = el.getAttribute('aria-label');
    if (aria) return tag + '[aria-label=' + JSON.stringify(aria) + ']';
    const parts = [];
    let node = el;
    while (node && node !== document.body && parts.length < 4) {
        let s = node.tagName.toLowerCase();
        if (node.id) { parts.unshift('#' + CSS.escape(node.id)); break; }
        const parent = node.parentElement;
        if (parent) {
            const sibs = Array.from(parent.children).filter(c => c.tagName === node.tagName);
            if (sibs.length > 1) s += ':nth-of-type(' + (sibs.indexOf(node) + 1) + ')';
        }
        parts.unshift(s);
        node = parent;
    }
    return parts.join(' > ');
}
function __psCandidates(el, withText) {
    const out = [];
    const tag = el.tagName.toLowerCase();
    if (el.id) out.push('#' + CSS.escape(el.id));
    const name = el.getAttribute('name');
    if (name) out.push(tag + '[name=' + JSON.stringify(name) + ']');
    const testid = el.getAttribute('data-testid');
    if (testid) out.push('[data-testid=' + JSON.stringify(testid) + ']');
    const aria = el.getAttribute('aria-label');
    if (aria) out.push(tag + '[aria-label=' + JSON.stringify(aria) + ']');
    const ph = el.getAttribute('placeholder');
    if (ph) out.push(tag + '[placeholder=' + JSON.stringify(ph) + ']');
    const text = (el.innerText || el.value || '').trim();
    if (withText && text && text.length <= 40) out.push('text=' + JSON.stringify(text));
    const structural = __psSelector(el);
    if (!out.includes(structural)) out.push(structural);
    return out;
}
function __psLabel(el) {
    if (el.id) {
        const l = document.querySelector('label[for=' + JSON.stringify(el.id) + ']');
        if (l) return l.innerText.trim();
    }
    const wrap = el.closest('label');
    if (wrap) return wrap.innerText.trim();
    const by = el.getAttribute('aria-labelledby');
    if (by) {
        const l = document.getElementById(by);
        if (l) return l.innerText.trim();
    }
    return null;
}
function __psText(el) {
    let t = (el.innerText || el.value || el.getAttribute('aria-label') || el.title || '').trim().replace(/\s+/g, ' ');
    if (t.length > 60) t = t.substring(0, 57) + '...';
    return t;
}
"#;

const COLLECT_JS: &str = r#"
((kind) => {
    const query = kind === 'input'
        ? 'input:not([type=hidden]),textarea,select,[contenteditable=""],[contenteditable=true]'
        : 'a,button,input[type=submit],input[type=button],[role=button],[role=link],[onclick]';
    const out = [];
    for (const el of document.querySelectorAll(query)) {
        if (!__psVisible(el)) continue;
        out.push({
            tag: el.tagName.toLowerCase(),
            text: __psText(el),
            id: el.id || null,
            name: el.getAttribute('name'),
            inputType: el.tagName.toLowerCase() === 'input' ? (el.type || 'text') : null,
            placeholder: el.getAttribute('placeholder'),
            selector: __psSelector(el),
        });
        if (out.length >= 50) break;
    }
    return JSON.stringify(out);
})"#;

const INSPECT_JS: &str = r#"
(() => {
    const forms = [...document.forms].map(f => ({
        id: f.id || null,
        name: f.getAttribute('name'),
        action: f.getAttribute('action'),
        method: f.getAttribute('method'),
        fieldCount: f.elements.length,
        selectors: __psCandidates(f, false),
    }));
    const inputs = [...document.querySelectorAll('input:not([type=hidden]),textarea,select')]
        .filter(__psVisible)
        .map(el => ({
            tag: el.tagName.toLowerCase(),
            inputType: el.tagName.toLowerCase() === 'input' ? (el.type || 'text') : null,
            name: el.getAttribute('name'),
            id: el.id || null,
            placeholder: el.getAttribute('placeholder'),
            label: __psLabel(el),
            selectors: __psCandidates(el, false),
        }));
    const buttons = [...document.querySelectorAll('button,input[type=submit],input[type=button],[role=button]')]
        .filter(__psVisible)
        .map(el => ({
            tag: el.tagName.toLowerCase(),
            text: __psText(el),
            buttonType: el.getAttribute('type'),
            selectors: __psCandidates(el, true),
        }));
    return JSON.stringify({ url: location.href, title: document.title, forms, inputs, buttons });
})()"#;

const FOCUSED_EDITABLE_JS: &str = r#"
(() => {
    const a = document.activeElement;
    if (!a) return false;
    const t = a.tagName.toLowerCase();
    return t === 'input' || t === 'textarea' || a.isContentEditable;
})()"#;

/// Quote a string as a JS literal.
fn js_str(s: &str) -> String {
    serde_json::Value::from(s).to_string()
}

/// Wrap `body` so it runs with `el` bound to the selector's element.
fn element_script(selector: &str, body: &str) -> String {
    format!(
        "(() => {{ {}\n const el = __psLocate({}); {} }})()",
        LOCATE_JS,
        js_str(selector),
        body
    )
}

/// eoka's own click/fill take CSS; other selector engines go through JS.
fn is_css(selector: &str) -> bool {
    !(selector.starts_with("text=") || selector.starts_with("xpath=") || selector.starts_with("//"))
}

/// Launches a Chrome instance per session.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChromeLauncher;

#[async_trait]
impl BrowserLauncher for ChromeLauncher {
    async fn launch(&self, headless: bool) -> Result<Box<dyn BrowserPage>> {
        let config = StealthConfig {
            headless,
            ..Default::default()
        };
        debug!(headless, "launching chrome");
        let browser = Browser::launch_with_config(config).await?;
        let page = browser.new_page("about:blank").await?;
        Ok(Box::new(ChromePage {
            browser: Some(browser),
            page,
        }))
    }
}

/// One Chrome instance and its single page.
pub struct ChromePage {
    browser: Option<Browser>,
    page: Page,
}

impl ChromePage {
    async fn eval<T: DeserializeOwned>(&self, js: &str) -> Result<T> {
        Ok(self.page.evaluate(js).await?)
    }

    /// Run an element check that returns `true` when it found its element.
    async fn act(&self, selector: &str, body: &str) -> Result<()> {
        let found: bool = self.eval(&element_script(selector, body)).await?;
        if found {
            Ok(())
        } else {
            Err(Error::Element(format!("{} not found", selector)))
        }
    }
}

#[async_trait]
impl BrowserPage for ChromePage {
    async fn goto(&mut self, url: &str) -> Result<()> {
        self.page.goto(url).await?;
        let _ = self.page.wait_for_network_idle(200, 2000).await;
        Ok(())
    }

    async fn url(&mut self) -> Result<String> {
        Ok(self.page.url().await?)
    }

    async fn title(&mut self) -> Result<String> {
        Ok(self.page.title().await?)
    }

    async fn text(&mut self) -> Result<String> {
        Ok(self.page.text().await?)
    }

    async fn is_visible(&mut self, selector: &str) -> Result<bool> {
        self.eval(&element_script(selector, "return __psVisible(el);")).await
    }

    async fn is_enabled(&mut self, selector: &str) -> Result<bool> {
        self.eval(&element_script(
            selector,
            "if (!el) return false; return !el.disabled && el.getAttribute('aria-disabled') !== 'true';",
        ))
        .await
    }

    async fn scroll_into_view(&mut self, selector: &str) -> Result<()> {
        self.act(
            selector,
            "if (!el) return false; el.scrollIntoView({block: 'center', inline: 'center'}); return true;",
        )
        .await?;
        self.page.wait(100).await;
        Ok(())
    }

    async fn click(&mut self, selector: &str) -> Result<()> {
        if is_css(selector) {
            self.page.click(selector).await?;
        } else {
            self.act(selector, "if (!el) return false; el.click(); return true;")
                .await?;
        }
        let _ = self.page.wait_for_network_idle(200, 800).await;
        Ok(())
    }

    async fn clear(&mut self, selector: &str) -> Result<()> {
        self.act(
            selector,
            "if (!el) return false; el.focus(); \
             if ('value' in el) { el.value = ''; } else { el.textContent = ''; } \
             el.dispatchEvent(new Event('input', {bubbles: true})); return true;",
        )
        .await
    }

    async fn fill(&mut self, selector: &str, text: &str) -> Result<()> {
        if is_css(selector) {
            self.page.fill(selector, text).await?;
            return Ok(());
        }
        let body = format!(
            "if (!el) return false; el.focus(); \
             if ('value' in el) {{ el.value = {v}; }} else {{ el.textContent = {v}; }} \
             el.dispatchEvent(new Event('input', {{bubbles: true}})); \
             el.dispatchEvent(new Event('change', {{bubbles: true}})); return true;",
            v = js_str(text)
        );
        self.act(selector, &body).await
    }

    async fn input_value(&mut self, selector: &str) -> Result<String> {
        let value: Option<String> = self
            .eval(&element_script(
                selector,
                "if (!el) return null; return ('value' in el) ? String(el.value) : (el.textContent || '');",
            ))
            .await?;
        value.ok_or_else(|| Error::Element(format!("{} not found", selector)))
    }

    async fn press_key(&mut self, key: &str) -> Result<()> {
        self.page.human().press_key(key).await?;
        Ok(())
    }

    async fn type_text(&mut self, text: &str) -> Result<()> {
        self.page.type_text(text).await?;
        Ok(())
    }

    async fn focused_is_editable(&mut self) -> Result<bool> {
        self.eval(FOCUSED_EDITABLE_JS).await
    }

    async fn screenshot(&mut self) -> Result<Vec<u8>> {
        Ok(self.page.screenshot().await?)
    }

    async fn collect_elements(&mut self, query: ElementQuery) -> Result<Vec<ElementSummary>> {
        let js = format!(
            "(() => {{ {}\n{}\n return {}({}); }})()",
            LOCATE_JS,
            DESCRIBE_JS,
            COLLECT_JS.trim(),
            js_str(query.as_str())
        );
        let json: String = self.eval(&js).await?;
        Ok(serde_json::from_str(&json)?)
    }

    async fn inspect(&mut self) -> Result<PageInspection> {
        let js = format!(
            "(() => {{ {}\n{}\n return {}; }})()",
            LOCATE_JS,
            DESCRIBE_JS,
            INSPECT_JS.trim()
        );
        let json: String = self.eval(&js).await?;
        Ok(serde_json::from_str(&json)?)
    }

    async fn pause(&mut self, ms: u64) {
        self.page.wait(ms).await;
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(browser) = self.browser.take() {
            browser.close().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_css() {
        assert!(is_css("#email"));
        assert!(is_css("form button[type=submit]"));
        assert!(!is_css("text=Sign in"));
        assert!(!is_css("xpath=//button"));
        assert!(!is_css("//a[@href]"));
    }

    #[test]
    fn test_element_script_quotes_selector() {
        let js = element_script("a[title=\"it's\"]", "return 1;");
        assert!(js.contains(r#"__psLocate("a[title=\"it's\"]")"#));
        assert!(js.ends_with("return 1; })()"));
    }
}
