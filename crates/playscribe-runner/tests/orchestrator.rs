//! Prompt processing against an in-process router and the simulated browser.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use playscribe_driver::sites::SearchProfile;
use playscribe_driver::{
    ActionKind, ActionRecord, Driver, Router, SimElement, SimLauncher, SimPage, SiteCatalog,
    SiteProfile,
};
use playscribe_runner::{
    Error, Orchestrator, PlanRequest, Planner, ProgressEvent, StaticPlanner,
};
use tokio::sync::mpsc;

const FORM: &str = "https://form.test/";

fn router(launcher: SimLauncher) -> Router {
    router_with(launcher, SiteCatalog::builtin())
}

fn router_with(launcher: SimLauncher, sites: SiteCatalog) -> Router {
    Router::new(Driver::new(Arc::new(launcher), sites).with_headless(true))
}

fn form_launcher() -> SimLauncher {
    SimLauncher::new().with_page(
        FORM,
        SimPage::new("Form")
            .with(SimElement::input("#q").name("q"))
            .with(SimElement::button("#go", "Go")),
    )
}

fn temp_path(name: &str) -> String {
    std::env::temp_dir()
        .join(format!("playscribe-{}-{}", std::process::id(), name))
        .to_string_lossy()
        .into_owned()
}

/// Hands out canned outputs in turn and remembers what it was asked.
struct ScriptedPlanner {
    outputs: Mutex<VecDeque<String>>,
    states: Arc<Mutex<Vec<String>>>,
}

impl ScriptedPlanner {
    fn new(outputs: &[&str]) -> Self {
        Self {
            outputs: Mutex::new(outputs.iter().map(|s| s.to_string()).collect()),
            states: Arc::default(),
        }
    }
}

#[async_trait]
impl Planner for ScriptedPlanner {
    async fn plan(&self, request: &PlanRequest<'_>) -> playscribe_runner::Result<String> {
        assert!(!request.tools.is_empty());
        self.states
            .lock()
            .unwrap()
            .push(request.session_state.to_string());
        Ok(self
            .outputs
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| "[]".into()))
    }
}

#[tokio::test]
async fn test_navigate_then_screenshot() {
    let shot = temp_path("e2e.png");
    let plan = format!(
        r#"Here you go:
```json
[
  {{"name": "launch_browser", "arguments": {{"headless": true}}}},
  {{"name": "navigate_to", "arguments": {{"url": "https://x.test"}}}},
  {{"name": "take_screenshot", "arguments": {{"filename": "{}"}}}}
]
```"#,
        shot
    );
    let mut orchestrator =
        Orchestrator::new(router(SimLauncher::new()), StaticPlanner::new(plan)).test_name("smoke");

    let outcome = orchestrator
        .process_prompt("open x.test and take a screenshot", None)
        .await
        .unwrap();

    assert!(outcome.succeeded());
    let names: Vec<&str> = outcome.actions.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(names, ["launch_browser", "navigate_to", "take_screenshot"]);
    assert_eq!(outcome.results.len(), 3);
    assert!(std::path::Path::new(&shot).exists());

    let script = &outcome.script;
    assert!(script.starts_with("import { test } from '@playwright/test';"));
    assert!(script.contains("test('smoke', async ({ page }) => {"));
    assert!(script.contains("// open x.test and take a screenshot"));
    let goto = script.find("await page.goto('https://x.test');").unwrap();
    let screenshot = script.find("await page.screenshot(").unwrap();
    assert!(goto < screenshot);
    assert!(!script.contains("launch"));

    let _ = std::fs::remove_file(&shot);
}

#[tokio::test]
async fn test_failure_stops_remaining_actions() {
    let plan = format!(
        r##"[
  {{"name": "launch_browser", "arguments": {{}}}},
  {{"name": "navigate_to", "arguments": {{"url": "{FORM}"}}}},
  {{"name": "click_element", "arguments": {{"selector": "#missing", "timeout": 100}}}},
  {{"name": "fill_input", "arguments": {{"selector": "#q", "text": "never"}}}}
]"##
    );
    let mut orchestrator = Orchestrator::new(router(form_launcher()), StaticPlanner::new(plan));

    let outcome = orchestrator.process_prompt("click missing", None).await.unwrap();
    assert!(!outcome.succeeded());
    let failure = outcome.failure.clone().unwrap();
    assert_eq!(failure.index, 3);
    assert_eq!(failure.tool, "click_element");
    assert!(failure.message.contains("#missing"));
    assert!(failure.message.contains("Go"));

    assert_eq!(outcome.actions.len(), 2);
    assert!(outcome.script.contains("await page.goto('https://form.test/');"));
    assert!(!outcome.script.contains("page.fill"));
    assert!(!outcome.script.contains("#missing"));

    // The browser survives the failed action.
    assert!(orchestrator.browser_running());
    assert!(orchestrator.invoker().is_active().await);

    let err = outcome.into_result().unwrap_err();
    assert!(matches!(err, Error::ActionFailed { index: 3, .. }));
}

#[tokio::test]
async fn test_script_replays_known_selector_that_won() {
    const SHOP: &str = "https://shop.test/";
    let sites = SiteCatalog::empty().with_profile(SiteProfile::new("shop.test").alias(
        "buy",
        &["#buy-button"],
        &[],
    ));
    let launcher = SimLauncher::new().with_page(
        SHOP,
        SimPage::new("Shop").with(SimElement::button("#buy-button", "Buy now")),
    );
    let plan = format!(
        r##"[
  {{"name": "launch_browser"}},
  {{"name": "navigate_to", "arguments": {{"url": "{SHOP}"}}}},
  {{"name": "click_element", "arguments": {{"selector": "#buy", "timeout": 100}}}}
]"##
    );
    let mut orchestrator =
        Orchestrator::new(router_with(launcher, sites), StaticPlanner::new(plan));

    let outcome = orchestrator.process_prompt("buy it", None).await.unwrap();
    assert!(outcome.succeeded());
    assert_eq!(
        outcome.results[2].first_text().unwrap(),
        "Clicked #buy-button (known selector for #buy)"
    );
    assert!(outcome.script.contains("await page.click('#buy-button');"));
    assert!(!outcome.script.contains("page.click('#buy')"));

    assert!(matches!(&outcome.records[0], ActionRecord::Planned(a) if a.name == "launch_browser"));
    match &outcome.records[2] {
        ActionRecord::Executed(a) => {
            assert_eq!(a.kind, ActionKind::Click);
            assert_eq!(a.target, "#buy-button");
        }
        other => panic!("expected executed click, got {other:?}"),
    }
}

#[tokio::test]
async fn test_script_replays_winning_search_strategy() {
    let sites = SiteCatalog::empty().with_profile(SiteProfile::new("docs.test").search(
        SearchProfile {
            inputs: vec![],
            shortcut: None,
            url: Some("https://docs.test/search?q={query}".into()),
            results: None,
        },
    ));
    let launcher = SimLauncher::new().with_page("https://docs.test/", SimPage::new("Docs"));
    let plan = r##"[
  {"name": "launch_browser"},
  {"name": "navigate_to", "arguments": {"url": "https://docs.test/"}},
  {"name": "search_site", "arguments": {"query": "async fn"}}
]"##;
    let mut orchestrator =
        Orchestrator::new(router_with(launcher, sites), StaticPlanner::new(plan));

    let outcome = orchestrator.process_prompt("search docs", None).await.unwrap();
    assert!(outcome.succeeded());
    assert!(outcome
        .script
        .contains("await page.goto('https://docs.test/search?q=async+fn');"));
    assert!(!outcome.script.contains("page.fill"));
}

#[tokio::test]
async fn test_unknown_tool_in_plan_fails_that_action() {
    let plan = r#"[{"name": "launch_browser"}, {"name": "teleport", "arguments": {}}]"#;
    let mut orchestrator =
        Orchestrator::new(router(SimLauncher::new()), StaticPlanner::new(plan));

    let outcome = orchestrator.process_prompt("teleport", None).await.unwrap();
    let failure = outcome.failure.unwrap();
    assert_eq!(failure.index, 2);
    assert!(failure.message.contains("unknown tool: teleport"));
    assert!(outcome.script.contains("// No actions recorded"));
}

#[tokio::test]
async fn test_session_state_follows_launch_and_close() {
    let planner = ScriptedPlanner::new(&[
        r#"[{"name": "launch_browser", "arguments": {}}]"#,
        r#"[{"name": "close_browser", "arguments": {}}]"#,
    ]);
    let states = planner.states.clone();
    let mut orchestrator = Orchestrator::new(router(SimLauncher::new()), planner);

    orchestrator.process_prompt("start", None).await.unwrap();
    assert!(orchestrator.browser_running());
    orchestrator.process_prompt("stop", None).await.unwrap();
    assert!(!orchestrator.browser_running());
    orchestrator.process_prompt("idle", None).await.unwrap();

    assert_eq!(
        *states.lock().unwrap(),
        [
            "no browser running",
            "browser already running",
            "no browser running"
        ]
    );
}

#[tokio::test]
async fn test_continuing_prompt_reuses_browser() {
    let open = format!(
        r#"[{{"name": "launch_browser"}}, {{"name": "navigate_to", "arguments": {{"url": "{FORM}"}}}}]"#
    );
    let planner = ScriptedPlanner::new(&[
        open.as_str(),
        r##"[{"name": "fill_input", "arguments": {"selector": "#q", "text": "quux"}}]"##,
    ]);
    let launcher = form_launcher();
    let mut orchestrator = Orchestrator::new(router(launcher.clone()), planner);

    orchestrator.process_prompt("open the form", None).await.unwrap();
    let outcome = orchestrator.process_prompt("type quux", None).await.unwrap();

    assert!(outcome.succeeded());
    assert_eq!(
        outcome.results[0].first_text().unwrap(),
        "Filled #q with \"quux\""
    );
    assert!(outcome.script.contains("await page.fill('#q', 'quux');"));
    assert!(!outcome.script.contains("page.goto"));
    assert_eq!(launcher.inspect_world(|w| w.launches), 1);
}

#[tokio::test]
async fn test_unparseable_plan() {
    let mut orchestrator = Orchestrator::new(
        router(SimLauncher::new()),
        StaticPlanner::new("Sorry, I can't do that."),
    );
    let err = orchestrator.process_prompt("anything", None).await.unwrap_err();
    assert!(matches!(err, Error::Plan(_)));
    assert!(!orchestrator.invoker().is_active().await);
}

#[tokio::test]
async fn test_progress_events() {
    let plan = r##"[
  {"name": "launch_browser"},
  {"name": "navigate_to", "arguments": {"url": "https://x.test"}},
  {"name": "wait_for_element", "arguments": {"selector": "#nope", "timeout": 50}}
]"##;
    let mut orchestrator =
        Orchestrator::new(router(SimLauncher::new()), StaticPlanner::new(plan));
    let (tx, mut rx) = mpsc::unbounded_channel();

    orchestrator.process_prompt("wait", Some(&tx)).await.unwrap();
    drop(tx);

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    assert_eq!(events.len(), 4);
    assert!(matches!(events[0], ProgressEvent::Planned { count: 3 }));
    match &events[1] {
        ProgressEvent::ActionCompleted { index, action, .. } => {
            assert_eq!(*index, 1);
            assert_eq!(action.name, "launch_browser");
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(matches!(events[2], ProgressEvent::ActionCompleted { index: 2, .. }));
    match &events[3] {
        ProgressEvent::ActionFailed { index, error, .. } => {
            assert_eq!(*index, 3);
            assert!(error.contains("#nope"));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn test_output_path_receives_script() {
    let path = temp_path("out/generated.spec.ts");
    let plan = r#"[{"name": "launch_browser"}, {"name": "press_key", "arguments": {"key": "Escape"}}]"#;
    let mut orchestrator = Orchestrator::new(router(SimLauncher::new()), StaticPlanner::new(plan))
        .output_path(path.clone());

    let outcome = orchestrator.process_prompt("press escape", None).await.unwrap();
    let written = std::fs::read_to_string(&path).unwrap();
    assert_eq!(written, outcome.script);
    assert!(written.contains("await page.keyboard.press('Escape');"));

    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn test_shutdown_closes_browser() {
    let launcher = SimLauncher::new();
    let mut orchestrator = Orchestrator::new(
        router(launcher.clone()),
        StaticPlanner::new(r#"[{"name": "launch_browser"}]"#),
    );
    orchestrator.process_prompt("start", None).await.unwrap();
    orchestrator.shutdown().await.unwrap();

    assert!(!orchestrator.browser_running());
    assert!(!orchestrator.invoker().is_active().await);
    assert_eq!(launcher.inspect_world(|w| w.closes), 1);
}
