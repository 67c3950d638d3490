//! Selector resolution for click and fill.
//!
//! Candidates are tried strictly in order: site-known selectors first, the
//! caller's selector last. The first candidate that accepts the action wins.
//! When none does, the page is queried for plausible elements so the error
//! tells the caller what was actually there.

use tracing::{debug, warn};

use crate::browser::{BrowserPage, ElementQuery};
use crate::{Error, Result};

/// Upper bound on the visibility wait for a single candidate.
pub const MAX_CANDIDATE_WAIT_MS: u64 = 5_000;

/// Build the ordered, de-duplicated candidate list.
pub fn candidates(known: Vec<String>, selector: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(known.len() + 1);
    for s in known.into_iter().chain(std::iter::once(selector.to_string())) {
        if !out.contains(&s) {
            out.push(s);
        }
    }
    out
}

/// Visibility wait per candidate so the whole list stays within `total_ms`.
pub fn per_candidate_timeout(total_ms: u64, count: usize) -> u64 {
    (total_ms / count.max(1) as u64).clamp(1, MAX_CANDIDATE_WAIT_MS)
}

/// Click the first candidate that is visible and enabled. Returns the
/// selector that worked.
pub async fn click(
    page: &mut dyn BrowserPage,
    candidates: &[String],
    timeout_ms: u64,
) -> Result<String> {
    let wait = per_candidate_timeout(timeout_ms, candidates.len());
    let mut last_error = String::from("no candidates");

    for selector in candidates {
        match try_click(page, selector, wait).await {
            Ok(()) => {
                debug!(selector = %selector, "click resolved");
                return Ok(selector.clone());
            }
            Err(e) => {
                debug!(selector = %selector, error = %e, "click candidate failed");
                last_error = e.to_string();
            }
        }
    }

    Err(exhausted(page, "click", candidates, last_error, ElementQuery::Clickable).await)
}

async fn try_click(page: &mut dyn BrowserPage, selector: &str, wait_ms: u64) -> Result<()> {
    if !page.wait_visible(selector, wait_ms).await? {
        return Err(Error::Timeout {
            selector: selector.into(),
            timeout_ms: wait_ms,
        });
    }
    if !page.is_enabled(selector).await? {
        return Err(Error::Element(format!("{} is disabled", selector)));
    }
    page.scroll_into_view(selector).await?;
    page.click(selector).await
}

/// Fill the first candidate that accepts text. Returns the selector that
/// worked and the value read back from it.
pub async fn fill(
    page: &mut dyn BrowserPage,
    candidates: &[String],
    text: &str,
    timeout_ms: u64,
) -> Result<(String, String)> {
    let wait = per_candidate_timeout(timeout_ms, candidates.len());
    let mut last_error = String::from("no candidates");

    for selector in candidates {
        match try_fill(page, selector, text, wait).await {
            Ok(confirmed) => {
                if confirmed != text {
                    warn!(
                        selector = %selector,
                        expected = text,
                        actual = %confirmed,
                        "field value differs after fill"
                    );
                }
                return Ok((selector.clone(), confirmed));
            }
            Err(e) => {
                debug!(selector = %selector, error = %e, "fill candidate failed");
                last_error = e.to_string();
            }
        }
    }

    Err(exhausted(page, "fill", candidates, last_error, ElementQuery::InputLike).await)
}

async fn try_fill(
    page: &mut dyn BrowserPage,
    selector: &str,
    text: &str,
    wait_ms: u64,
) -> Result<String> {
    if !page.wait_visible(selector, wait_ms).await? {
        return Err(Error::Timeout {
            selector: selector.into(),
            timeout_ms: wait_ms,
        });
    }
    page.clear(selector).await?;
    page.fill(selector, text).await?;
    page.input_value(selector).await
}

async fn exhausted(
    page: &mut dyn BrowserPage,
    action: &'static str,
    tried: &[String],
    last_error: String,
    query: ElementQuery,
) -> Error {
    match page.collect_elements(query).await {
        Ok(found) => {
            let elements = if found.is_empty() {
                format!("  (no {} elements found)", query.as_str())
            } else {
                found
                    .iter()
                    .map(|el| format!("  - {}", el))
                    .collect::<Vec<_>>()
                    .join("\n")
            };
            Error::Exhausted {
                action,
                tried: tried.to_vec(),
                last_error,
                elements,
            }
        }
        Err(e) => Error::DiagnosticsFailed {
            action,
            tried: tried.to_vec(),
            last_error,
            diagnostic_error: e.to_string(),
        },
    }
}
