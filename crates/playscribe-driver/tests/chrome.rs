//! End-to-end tool calls against a real Chrome.
//!
//! Run with: cargo test --test chrome -- --ignored

use std::sync::Arc;

use playscribe_driver::{ChromeLauncher, Driver, Router, SiteCatalog};
use serde_json::json;

const PAGE: &str = r##"data:text/html,
    <form id="login" action="/login">
      <label for="user">Username</label>
      <input id="user" name="user" placeholder="Username">
      <button type="submit" id="go">Sign in</button>
    </form>
    <a href="details.html">Details</a>
"##;

fn chrome_available() -> bool {
    eoka::stealth::patcher::find_chrome().is_ok()
}

fn router() -> Router {
    Router::new(Driver::new(Arc::new(ChromeLauncher), SiteCatalog::builtin()))
}

#[tokio::test]
#[ignore = "requires Chrome"]
async fn test_fill_click_and_generate() {
    if !chrome_available() {
        eprintln!("Chrome not found, skipping test");
        return;
    }
    let router = router();

    let launched = router.call_tool("launch_browser", json!({"headless": true})).await;
    assert!(!launched.is_error, "{:?}", launched);
    let nav = router.call_tool("navigate_to", json!({ "url": PAGE })).await;
    assert!(!nav.is_error, "{:?}", nav);

    let fill = router
        .call_tool("fill_input", json!({"selector": "#user", "text": "quux"}))
        .await;
    assert_eq!(fill.first_text().unwrap(), "Filled #user with \"quux\"");

    let click = router
        .call_tool("click_element", json!({"selector": "text=Details"}))
        .await;
    assert!(!click.is_error, "{:?}", click);

    let script = router
        .call_tool("generate_test", json!({"testName": "login"}))
        .await
        .first_text()
        .unwrap();
    assert!(script.contains("await page.fill('#user', 'quux');"));
    assert!(script.contains("await page.click('text=Details');"));

    router.call_tool("close_browser", json!({})).await;
}

#[tokio::test]
#[ignore = "requires Chrome"]
async fn test_inspect_and_exhaustion() {
    if !chrome_available() {
        eprintln!("Chrome not found, skipping test");
        return;
    }
    let router = router();
    router.call_tool("launch_browser", json!({"headless": true})).await;
    router.call_tool("navigate_to", json!({ "url": PAGE })).await;

    let inspected = router.call_tool("inspect_page", json!({})).await;
    let parsed: serde_json::Value =
        serde_json::from_str(&inspected.first_text().unwrap()).unwrap();
    assert_eq!(parsed["forms"][0]["id"], "login");
    assert_eq!(parsed["inputs"][0]["label"], "Username");
    assert_eq!(parsed["buttons"][0]["text"], "Sign in");

    let missing = router
        .call_tool("click_element", json!({"selector": "#nope", "timeout": 500}))
        .await;
    assert!(missing.is_error);
    let msg = missing.first_text().unwrap();
    assert!(msg.contains("#nope"));
    assert!(msg.contains("Sign in"));

    router.call_tool("close_browser", json!({})).await;
}
