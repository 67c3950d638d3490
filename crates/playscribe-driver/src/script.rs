//! Playwright Test source generation.
//!
//! Executed records contribute the source fragment the driver attached when
//! it ran them. Planned records are translated by tool name. Output is a
//! pure function of the inputs.

use std::fmt::Write;

use serde_json::Value;

use crate::action::{ActionRecord, PlannedAction};
use crate::catalog::{ToolName, DEFAULT_SCREENSHOT, DEFAULT_TIMEOUT_MS};

const INDENT: &str = "  ";

/// Selector used when replaying a planned `search_site` without site knowledge.
const GENERIC_SEARCH_INPUT: &str = "input[type=\"search\"], input[name=\"q\"]";

/// Quote a string as a single-quoted JavaScript literal.
pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            c if c.is_control() => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// Render a complete test file.
pub fn generate(test_name: &str, description: &str, records: &[ActionRecord]) -> String {
    let mut body: Vec<String> = Vec::new();
    for line in description.lines().filter(|l| !l.trim().is_empty()) {
        body.push(format!("// {}", line.trim_end()));
    }

    let mut any = false;
    for record in records {
        let source = match record {
            ActionRecord::Executed(action) => action.source.clone(),
            ActionRecord::Planned(action) => translate(action),
        };
        if let Some(source) = source {
            any = true;
            body.extend(source.lines().map(String::from));
        }
    }
    if !any {
        body.push("// No actions recorded".into());
    }

    let mut out = String::from("import { test } from '@playwright/test';\n\n");
    let _ = writeln!(out, "test({}, async ({{ page }}) => {{", quote(test_name));
    for line in body {
        if line.is_empty() {
            out.push('\n');
        } else {
            let _ = writeln!(out, "{}{}", INDENT, line);
        }
    }
    out.push_str("});\n");
    out
}

fn arg<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key).and_then(Value::as_str)
}

fn missing(tool: ToolName, key: &str) -> Option<String> {
    Some(format!("// {}: missing '{}' argument", tool, key))
}

/// Source for one planned tool call; `None` for tools with no page effect.
fn translate(action: &PlannedAction) -> Option<String> {
    let Ok(tool) = action.name.parse::<ToolName>() else {
        return Some(format!("// Unsupported action: {}", action.name));
    };
    let args = &action.arguments;
    match tool {
        ToolName::LaunchBrowser
        | ToolName::CloseBrowser
        | ToolName::InspectPage
        | ToolName::GetContent
        | ToolName::GenerateTest => None,
        ToolName::NavigateTo => match arg(args, "url") {
            Some(url) => Some(format!("await page.goto({});", quote(url))),
            None => missing(tool, "url"),
        },
        ToolName::ClickElement => match arg(args, "selector") {
            Some(sel) => Some(format!("await page.click({});", quote(sel))),
            None => missing(tool, "selector"),
        },
        ToolName::FillInput => match (arg(args, "selector"), arg(args, "text")) {
            (Some(sel), Some(text)) => {
                Some(format!("await page.fill({}, {});", quote(sel), quote(text)))
            }
            (None, _) => missing(tool, "selector"),
            (_, None) => missing(tool, "text"),
        },
        ToolName::WaitForElement => match arg(args, "selector") {
            Some(sel) => {
                let timeout = args
                    .get("timeout")
                    .and_then(Value::as_u64)
                    .unwrap_or(DEFAULT_TIMEOUT_MS);
                Some(format!(
                    "await page.waitForSelector({}, {{ timeout: {} }});",
                    quote(sel),
                    timeout
                ))
            }
            None => missing(tool, "selector"),
        },
        ToolName::TakeScreenshot => {
            let file = arg(args, "filename").unwrap_or(DEFAULT_SCREENSHOT);
            Some(format!("await page.screenshot({{ path: {} }});", quote(file)))
        }
        ToolName::SearchSite => match arg(args, "query") {
            Some(query) => Some(format!(
                "await page.fill({}, {});\nawait page.keyboard.press('Enter');",
                quote(GENERIC_SEARCH_INPUT),
                quote(query)
            )),
            None => missing(tool, "query"),
        },
        ToolName::PressKey => match arg(args, "key") {
            Some(key) => Some(format!("await page.keyboard.press({});", quote(key))),
            None => missing(tool, "key"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{ActionKind, ExecutedAction};
    use serde_json::json;

    fn planned(name: &str, args: Value) -> ActionRecord {
        PlannedAction::new(name, args).into()
    }

    #[test]
    fn test_quote_escapes() {
        assert_eq!(quote("it's"), "'it\\'s'");
        assert_eq!(quote("a\\b\nc"), "'a\\\\b\\nc'");
        assert_eq!(quote("\u{1}"), "'\\u0001'");
    }

    #[test]
    fn test_navigate_and_launch() {
        let script = generate(
            "nav",
            "",
            &[
                planned("launch_browser", json!({"headless": true})),
                planned("navigate_to", json!({"url": "https://x.test"})),
            ],
        );
        assert_eq!(
            script,
            "import { test } from '@playwright/test';\n\n\
             test('nav', async ({ page }) => {\n  \
             await page.goto('https://x.test');\n\
             });\n"
        );
    }

    #[test]
    fn test_empty_list() {
        let script = generate("empty", "Nothing\nat all", &[]);
        assert!(script.contains("  // Nothing\n  // at all\n  // No actions recorded\n"));
    }

    #[test]
    fn test_executed_fragments_are_indented() {
        let records = vec![
            ExecutedAction::new(ActionKind::Search, "#q")
                .source("await page.fill('#q', 'x');\nawait page.press('#q', 'Enter');")
                .into(),
            ExecutedAction::new(ActionKind::Inspect, "https://a.test").into(),
        ];
        let script = generate("s", "", &records);
        assert!(script.contains(
            "  await page.fill('#q', 'x');\n  await page.press('#q', 'Enter');\n});"
        ));
    }

    #[test]
    fn test_unknown_and_missing() {
        let script = generate(
            "odd",
            "",
            &[
                planned("hover_element", json!({})),
                planned("click_element", json!({})),
            ],
        );
        assert!(script.contains("// Unsupported action: hover_element"));
        assert!(script.contains("// click_element: missing 'selector' argument"));
    }

    #[test]
    fn test_order_preserved_and_not_deduplicated() {
        let click = planned("click_element", json!({"selector": "#next"}));
        let records = vec![
            click.clone(),
            planned("wait_for_element", json!({"selector": ".page"})),
            click,
        ];
        let script = generate("paging", "", &records);
        let lines: Vec<&str> = script.lines().skip(3).take(3).collect();
        assert_eq!(
            lines,
            vec![
                "  await page.click('#next');",
                "  await page.waitForSelector('.page', { timeout: 30000 });",
                "  await page.click('#next');",
            ]
        );
        assert_eq!(script, generate("paging", "", &records));
    }
}
