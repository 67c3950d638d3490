//! Site search: input box, then keyboard shortcut, then results URL.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::browser::BrowserPage;
use crate::script::quote;
use crate::sites::SearchProfile;
use crate::{Error, Result};

/// Wait for each search input to become visible.
const INPUT_WAIT_MS: u64 = 2_000;
/// Delay after pressing a search shortcut before checking focus.
const SHORTCUT_SETTLE_MS: u64 = 300;
/// Bound on waiting for the results selector.
const RESULTS_WAIT_MS: u64 = 5_000;
/// Fixed delay when results can't be detected.
const RESULTS_FALLBACK_MS: u64 = 1_000;

/// Strategy that ran a search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum SearchStrategy {
    Input,
    Shortcut,
    Url,
}

impl fmt::Display for SearchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Input => "input",
            Self::Shortcut => "shortcut",
            Self::Url => "url",
        })
    }
}

/// A successful search.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOutcome {
    pub strategy: SearchStrategy,
    /// Input selector, shortcut key or results URL.
    pub target: String,
    pub source: String,
}

/// Try each strategy in order; the first success wins.
pub async fn run(
    page: &mut dyn BrowserPage,
    profile: &SearchProfile,
    query: &str,
) -> Result<SearchOutcome> {
    let mut errors = Vec::new();

    for strategy in [SearchStrategy::Input, SearchStrategy::Shortcut, SearchStrategy::Url] {
        let attempt = match strategy {
            SearchStrategy::Input => by_input(page, profile, query, &mut errors).await,
            SearchStrategy::Shortcut => by_shortcut(page, profile, query).await,
            SearchStrategy::Url => by_url(page, profile, query).await,
        };
        match attempt {
            Ok(Some(outcome)) => {
                info!(%strategy, target = %outcome.target, "search submitted");
                await_results(page, profile).await?;
                return Ok(outcome);
            }
            Ok(None) => debug!(%strategy, "search strategy not applicable"),
            Err(e) => {
                debug!(%strategy, error = %e, "search strategy failed");
                errors.push(format!("{}: {}", strategy, e));
            }
        }
    }

    if errors.is_empty() {
        errors.push("no search strategy configured for this page".into());
    }
    Err(Error::SearchFailed(errors.join("; ")))
}

async fn by_input(
    page: &mut dyn BrowserPage,
    profile: &SearchProfile,
    query: &str,
    errors: &mut Vec<String>,
) -> Result<Option<SearchOutcome>> {
    for selector in &profile.inputs {
        if !page.wait_visible(selector, INPUT_WAIT_MS).await? {
            errors.push(format!("input: {} not visible", selector));
            continue;
        }
        match submit(page, selector, query).await {
            Ok(()) => {
                let sel = quote(selector);
                return Ok(Some(SearchOutcome {
                    strategy: SearchStrategy::Input,
                    target: selector.clone(),
                    source: format!(
                        "await page.fill({}, {});\nawait page.press({}, 'Enter');",
                        sel,
                        quote(query),
                        sel
                    ),
                }));
            }
            Err(e) => errors.push(format!("input: {}: {}", selector, e)),
        }
    }
    Ok(None)
}

async fn submit(page: &mut dyn BrowserPage, selector: &str, query: &str) -> Result<()> {
    page.fill(selector, query).await?;
    page.press_key("Enter").await
}

async fn by_shortcut(
    page: &mut dyn BrowserPage,
    profile: &SearchProfile,
    query: &str,
) -> Result<Option<SearchOutcome>> {
    let Some(ref key) = profile.shortcut else {
        return Ok(None);
    };
    page.press_key(key).await?;
    page.pause(SHORTCUT_SETTLE_MS).await;
    if !page.focused_is_editable().await? {
        return Err(Error::Element(format!(
            "shortcut {} did not focus a search box",
            key
        )));
    }
    page.type_text(query).await?;
    page.press_key("Enter").await?;
    Ok(Some(SearchOutcome {
        strategy: SearchStrategy::Shortcut,
        target: key.clone(),
        source: format!(
            "await page.keyboard.press({});\nawait page.keyboard.type({});\nawait page.keyboard.press('Enter');",
            quote(key),
            quote(query)
        ),
    }))
}

async fn by_url(
    page: &mut dyn BrowserPage,
    profile: &SearchProfile,
    query: &str,
) -> Result<Option<SearchOutcome>> {
    let Some(ref template) = profile.url else {
        return Ok(None);
    };
    let url = search_url(template, query);
    page.goto(&url).await?;
    Ok(Some(SearchOutcome {
        strategy: SearchStrategy::Url,
        source: format!("await page.goto({});", quote(&url)),
        target: url,
    }))
}

async fn await_results(page: &mut dyn BrowserPage, profile: &SearchProfile) -> Result<()> {
    let found = match profile.results {
        Some(ref results) => page.wait_visible(results, RESULTS_WAIT_MS).await?,
        None => false,
    };
    if !found {
        page.pause(RESULTS_FALLBACK_MS).await;
    }
    Ok(())
}

/// Substitute the form-encoded query into a `{query}` template.
pub fn search_url(template: &str, query: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(query.as_bytes()).collect();
    template.replace("{query}", &encoded)
}
