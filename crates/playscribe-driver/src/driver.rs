//! The driver: one optional browser session and the tool handlers.

use std::path::Path;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use tracing::{debug, info};

use crate::action::{ActionDetail, ActionKind, ActionLog, ActionRecord, ExecutedAction};
use crate::browser::{BrowserLauncher, BrowserPage};
use crate::catalog::{
    ClickArgs, FillArgs, GenerateTestArgs, InspectArgs, LaunchArgs, NavigateArgs, PressKeyArgs,
    ScreenshotArgs, SearchArgs, ToolCall, WaitArgs, DEFAULT_TIMEOUT_MS,
};
use crate::router::Content;
use crate::script::{self, quote};
use crate::sites::{Intent, SiteCatalog};
use crate::{resolve, search, Error, Result};

/// Characters of page text returned by `get_content`.
const MAX_CONTENT_CHARS: usize = 10_000;

/// A live page plus everything executed against it.
pub struct Session {
    page: Box<dyn BrowserPage>,
    log: ActionLog,
    headless: bool,
}

impl Session {
    fn new(page: Box<dyn BrowserPage>, headless: bool) -> Self {
        Self {
            page,
            log: ActionLog::new(),
            headless,
        }
    }

    pub fn log(&self) -> &ActionLog {
        &self.log
    }

    pub fn headless(&self) -> bool {
        self.headless
    }

    fn record(&mut self, action: ExecutedAction) {
        debug!(action = %action, "recorded");
        self.log.push(action);
    }
}

/// Executes tool calls against at most one browser session.
pub struct Driver {
    launcher: Arc<dyn BrowserLauncher>,
    sites: SiteCatalog,
    default_headless: bool,
    session: Option<Session>,
}

impl Driver {
    pub fn new(launcher: Arc<dyn BrowserLauncher>, sites: SiteCatalog) -> Self {
        Self {
            launcher,
            sites,
            default_headless: false,
            session: None,
        }
    }

    /// Headless mode used when `launch_browser` doesn't say.
    pub fn with_headless(mut self, headless: bool) -> Self {
        self.default_headless = headless;
        self
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub async fn execute(&mut self, call: ToolCall) -> Result<Vec<Content>> {
        let Driver {
            launcher,
            sites,
            default_headless,
            session,
        } = self;

        match call {
            ToolCall::Launch(args) => {
                launch(launcher.as_ref(), session, args, *default_headless).await
            }
            ToolCall::Close => close(session).await,
            ToolCall::GenerateTest(args) => {
                generate_test(session.as_ref().map(Session::log), args).await
            }
            ToolCall::Navigate(args) => navigate(active(session)?, args).await,
            ToolCall::Click(args) => click(active(session)?, sites, args).await,
            ToolCall::Fill(args) => fill(active(session)?, sites, args).await,
            ToolCall::Wait(args) => wait(active(session)?, args).await,
            ToolCall::Screenshot(args) => screenshot(active(session)?, args).await,
            ToolCall::Inspect(args) => inspect(active(session)?, args).await,
            ToolCall::Search(args) => search_site(active(session)?, sites, args).await,
            ToolCall::PressKey(args) => press_key(active(session)?, args).await,
            ToolCall::GetContent => get_content(active(session)?).await,
        }
    }
}

fn active(session: &mut Option<Session>) -> Result<&mut Session> {
    session.as_mut().ok_or(Error::NoSession)
}

fn text(s: impl Into<String>) -> Result<Vec<Content>> {
    Ok(vec![Content::text(s)])
}

async fn launch(
    launcher: &dyn BrowserLauncher,
    slot: &mut Option<Session>,
    args: LaunchArgs,
    default_headless: bool,
) -> Result<Vec<Content>> {
    if let Some(session) = slot.as_mut() {
        let url = session.page.url().await?;
        info!(url = %url, "launch requested with active session");
        return text(format!(
            "Browser already running (headless: {}) at {}. {} actions recorded.",
            session.headless,
            url,
            session.log.len()
        ));
    }
    let headless = args.headless.unwrap_or(default_headless);
    let page = launcher.launch(headless).await?;
    *slot = Some(Session::new(page, headless));
    info!(headless, "browser launched");
    text(format!("Browser launched (headless: {})", headless))
}

async fn close(slot: &mut Option<Session>) -> Result<Vec<Content>> {
    let Some(mut session) = slot.take() else {
        return text("No browser session to close.");
    };
    let discarded = session.log.len();
    session.page.close().await?;
    info!(discarded, "browser closed");
    text(format!("Browser closed. {} recorded actions discarded.", discarded))
}

async fn navigate(session: &mut Session, args: NavigateArgs) -> Result<Vec<Content>> {
    session.page.goto(&args.url).await?;
    let title = session.page.title().await?;
    session.record(
        ExecutedAction::new(ActionKind::Navigate, &args.url)
            .source(format!("await page.goto({});", quote(&args.url))),
    );
    text(format!("Navigated to {}\nTitle: {}", args.url, title))
}

async fn click(session: &mut Session, sites: &SiteCatalog, args: ClickArgs) -> Result<Vec<Content>> {
    let url = session.page.url().await?;
    let known = sites.known_selectors(&url, &args.selector, Intent::Click);
    let candidates = resolve::candidates(known, &args.selector);
    let used = resolve::click(session.page.as_mut(), &candidates, args.timeout).await?;

    session.record(
        ExecutedAction::new(ActionKind::Click, &used)
            .detail(ActionDetail::Timeout {
                timeout_ms: args.timeout,
            })
            .source(format!("await page.click({});", quote(&used))),
    );
    text(resolved_message("Clicked", &used, &args.selector))
}

async fn fill(session: &mut Session, sites: &SiteCatalog, args: FillArgs) -> Result<Vec<Content>> {
    let url = session.page.url().await?;
    let known = sites.known_selectors(&url, &args.selector, Intent::Fill);
    let candidates = resolve::candidates(known, &args.selector);
    let (used, confirmed) = resolve::fill(
        session.page.as_mut(),
        &candidates,
        &args.text,
        DEFAULT_TIMEOUT_MS,
    )
    .await?;

    let mut msg = resolved_message("Filled", &used, &args.selector);
    msg.push_str(&format!(" with \"{}\"", args.text));
    if confirmed != args.text {
        msg.push_str(&format!("\nWarning: field now reads \"{}\"", confirmed));
    }
    session.record(
        ExecutedAction::new(ActionKind::Fill, &used)
            .detail(ActionDetail::Fill {
                text: args.text.clone(),
                confirmed,
            })
            .source(format!("await page.fill({}, {});", quote(&used), quote(&args.text))),
    );
    text(msg)
}

fn resolved_message(verb: &str, used: &str, requested: &str) -> String {
    if used == requested {
        format!("{} {}", verb, used)
    } else {
        format!("{} {} (known selector for {})", verb, used, requested)
    }
}

async fn wait(session: &mut Session, args: WaitArgs) -> Result<Vec<Content>> {
    if !session.page.wait_visible(&args.selector, args.timeout).await? {
        return Err(Error::Timeout {
            selector: args.selector,
            timeout_ms: args.timeout,
        });
    }
    session.record(
        ExecutedAction::new(ActionKind::Wait, &args.selector)
            .detail(ActionDetail::Timeout {
                timeout_ms: args.timeout,
            })
            .source(format!(
                "await page.waitForSelector({}, {{ timeout: {} }});",
                quote(&args.selector),
                args.timeout
            )),
    );
    text(format!("Element {} is visible", args.selector))
}

async fn screenshot(session: &mut Session, args: ScreenshotArgs) -> Result<Vec<Content>> {
    let bytes = session.page.screenshot().await?;
    write_file(&args.filename, &bytes).await?;
    let url = session.page.url().await?;
    session.record(
        ExecutedAction::new(ActionKind::Screenshot, url)
            .detail(ActionDetail::File {
                filename: args.filename.clone(),
            })
            .source(format!(
                "await page.screenshot({{ path: {} }});",
                quote(&args.filename)
            )),
    );
    Ok(vec![
        Content::text(format!("Screenshot saved to {}", args.filename)),
        Content::Image {
            data: BASE64.encode(&bytes),
            mime_type: "image/png".into(),
        },
    ])
}

async fn inspect(session: &mut Session, args: InspectArgs) -> Result<Vec<Content>> {
    let mut found = session.page.inspect().await?;
    found.retain(args.element_type);
    session.record(ExecutedAction::new(ActionKind::Inspect, &found.url));
    text(serde_json::to_string_pretty(&found)?)
}

async fn search_site(
    session: &mut Session,
    sites: &SiteCatalog,
    args: SearchArgs,
) -> Result<Vec<Content>> {
    let url = session.page.url().await?;
    let profile = sites.search_for(&url);
    let outcome = search::run(session.page.as_mut(), profile, &args.query).await?;
    let now = session.page.url().await?;
    session.record(
        ExecutedAction::new(ActionKind::Search, &outcome.target)
            .detail(ActionDetail::Search {
                query: args.query.clone(),
                strategy: outcome.strategy,
            })
            .source(outcome.source),
    );
    text(format!(
        "Searched for \"{}\" using the {} strategy\nNow at: {}",
        args.query, outcome.strategy, now
    ))
}

async fn press_key(session: &mut Session, args: PressKeyArgs) -> Result<Vec<Content>> {
    session.page.press_key(&args.key).await?;
    session.record(
        ExecutedAction::new(ActionKind::Custom, &args.key)
            .detail(ActionDetail::Key {
                key: args.key.clone(),
            })
            .source(format!("await page.keyboard.press({});", quote(&args.key))),
    );
    text(format!("Pressed {}", args.key))
}

async fn get_content(session: &mut Session) -> Result<Vec<Content>> {
    let url = session.page.url().await?;
    let title = session.page.title().await?;
    let body = session.page.text().await?;
    let mut out = format!("URL: {}\nTitle: {}\n\n", url, title);
    if body.chars().count() > MAX_CONTENT_CHARS {
        out.extend(body.chars().take(MAX_CONTENT_CHARS));
        out.push_str("\n... (truncated)");
    } else {
        out.push_str(&body);
    }
    text(out)
}

async fn generate_test(log: Option<&ActionLog>, args: GenerateTestArgs) -> Result<Vec<Content>> {
    let records: Vec<ActionRecord> = match (args.records, args.actions) {
        (Some(records), _) => records,
        (None, Some(actions)) => actions.into_iter().map(ActionRecord::Planned).collect(),
        (None, None) => log.map(ActionLog::records).unwrap_or_default(),
    };
    let source = script::generate(&args.test_name, &args.description, &records);
    debug!(test = %args.test_name, records = records.len(), "generated test");

    let mut content = vec![Content::text(source.clone())];
    if let Some(path) = args.output_path {
        write_file(&path, source.as_bytes()).await?;
        info!(path = %path, "test written");
        content.push(Content::text(format!("Test written to {}", path)));
    }
    Ok(content)
}

async fn write_file(path: &str, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    tokio::fs::write(path, bytes).await?;
    Ok(())
}
