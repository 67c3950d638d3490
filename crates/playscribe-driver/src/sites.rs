//! Per-site knowledge: known-good selectors and search strategies.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{Error, Result};

/// What a resolved selector is going to be used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Click,
    Fill,
}

/// Known selectors for a concept on a site, keyed by a keyword that the
/// caller's selector must contain (case-insensitive).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectorAlias {
    pub keyword: String,
    #[serde(default)]
    pub click: Vec<String>,
    #[serde(default)]
    pub fill: Vec<String>,
}

impl SelectorAlias {
    fn matches(&self, selector_lower: &str) -> bool {
        selector_lower.contains(&self.keyword.to_lowercase())
    }

    fn selectors(&self, intent: Intent) -> &[String] {
        match intent {
            Intent::Click => &self.click,
            Intent::Fill => &self.fill,
        }
    }
}

/// How to run a search on a site.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchProfile {
    /// Search input selectors, tried in order.
    #[serde(default)]
    pub inputs: Vec<String>,
    /// Key that focuses an in-page search box.
    pub shortcut: Option<String>,
    /// Results URL with a `{query}` placeholder.
    pub url: Option<String>,
    /// Selector that appears once results have rendered.
    pub results: Option<String>,
}

/// Everything known about one host (and its subdomains).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteProfile {
    pub host: String,
    #[serde(default)]
    pub aliases: Vec<SelectorAlias>,
    pub search: Option<SearchProfile>,
}

impl SiteProfile {
    pub fn new(host: &str) -> Self {
        Self {
            host: normalize_host(host),
            aliases: Vec::new(),
            search: None,
        }
    }

    pub fn alias(mut self, keyword: &str, click: &[&str], fill: &[&str]) -> Self {
        self.aliases.push(SelectorAlias {
            keyword: keyword.into(),
            click: click.iter().map(|s| s.to_string()).collect(),
            fill: fill.iter().map(|s| s.to_string()).collect(),
        });
        self
    }

    pub fn search(mut self, search: SearchProfile) -> Self {
        self.search = Some(search);
        self
    }

    /// `host` must already be normalized.
    fn covers(&self, host: &str) -> bool {
        let own = normalize_host(&self.host);
        host == own || host.strip_suffix(own.as_str()).is_some_and(|p| p.ends_with('.'))
    }
}

/// Lowercase, trimmed, without a leading `www.`.
fn normalize_host(host: &str) -> String {
    let host = host.trim().to_lowercase();
    match host.strip_prefix("www.") {
        Some(rest) => rest.to_string(),
        None => host,
    }
}

#[derive(Debug, Deserialize)]
struct SitesFile {
    #[serde(default)]
    sites: Vec<SiteProfile>,
}

/// Lookup table of site profiles.
#[derive(Debug, Clone)]
pub struct SiteCatalog {
    profiles: Vec<SiteProfile>,
    generic_search: SearchProfile,
}

impl Default for SiteCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl SiteCatalog {
    /// A catalog with no site profiles, only generic search.
    pub fn empty() -> Self {
        Self {
            profiles: Vec::new(),
            generic_search: generic_search(),
        }
    }

    /// Profiles for a handful of popular sites.
    pub fn builtin() -> Self {
        let mut catalog = Self::empty();
        for profile in builtin_profiles() {
            catalog = catalog.with_profile(profile);
        }
        catalog
    }

    /// Built-in profiles plus those in a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Built-in profiles plus those in `yaml`. A profile for an already
    /// known host replaces the built-in one.
    pub fn parse(yaml: &str) -> Result<Self> {
        let file: SitesFile = serde_yaml::from_str(yaml)?;
        let mut catalog = Self::builtin();
        for profile in file.sites {
            catalog = catalog.with_profile(profile);
        }
        catalog.validate()?;
        Ok(catalog)
    }

    /// Add a profile, replacing any for the same host.
    pub fn with_profile(mut self, mut profile: SiteProfile) -> Self {
        profile.host = normalize_host(&profile.host);
        self.profiles.retain(|p| normalize_host(&p.host) != profile.host);
        self.profiles.push(profile);
        self
    }

    pub fn profiles(&self) -> &[SiteProfile] {
        &self.profiles
    }

    pub fn validate(&self) -> Result<()> {
        for profile in &self.profiles {
            if profile.host.trim().is_empty() {
                return Err(Error::Config("site host is required".into()));
            }
            if profile.aliases.iter().any(|a| a.keyword.trim().is_empty()) {
                return Err(Error::Config(format!(
                    "{}: alias keyword must not be empty",
                    profile.host
                )));
            }
            if let Some(ref search) = profile.search {
                if search.url.as_deref().is_some_and(|u| !u.contains("{query}")) {
                    return Err(Error::Config(format!(
                        "{}: search url must contain {{query}}",
                        profile.host
                    )));
                }
            }
        }
        Ok(())
    }

    /// The profile whose host equals, or is a parent domain of, the URL's host.
    pub fn profile_for(&self, page_url: &str) -> Option<&SiteProfile> {
        let parsed = url::Url::parse(page_url).ok()?;
        let host = normalize_host(parsed.host_str()?);
        self.profiles.iter().find(|p| p.covers(&host))
    }

    /// Known-good selectors for `selector` on the page at `page_url`, in
    /// priority order. Does not include `selector` itself.
    pub fn known_selectors(&self, page_url: &str, selector: &str, intent: Intent) -> Vec<String> {
        let Some(profile) = self.profile_for(page_url) else {
            return Vec::new();
        };
        let lower = selector.to_lowercase();
        let found: Vec<String> = profile
            .aliases
            .iter()
            .filter(|a| a.matches(&lower))
            .flat_map(|a| a.selectors(intent).iter().cloned())
            .collect();
        if !found.is_empty() {
            debug!(host = %profile.host, selector, count = found.len(), "site selectors");
        }
        found
    }

    /// Search profile for the page, falling back to generic search inputs.
    pub fn search_for(&self, page_url: &str) -> &SearchProfile {
        self.profile_for(page_url)
            .and_then(|p| p.search.as_ref())
            .unwrap_or(&self.generic_search)
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn generic_search() -> SearchProfile {
    SearchProfile {
        inputs: strings(&[
            "input[type=\"search\"]",
            "input[name=\"q\"]",
            "input[name=\"search\"]",
            "[role=\"searchbox\"]",
        ]),
        shortcut: Some("/".into()),
        url: None,
        results: None,
    }
}

fn builtin_profiles() -> Vec<SiteProfile> {
    vec![
        SiteProfile::new("youtube.com")
            .alias(
                "search",
                &["button#search-icon-legacy", "#search-icon-legacy"],
                &["input[name=\"search_query\"]", "input#search"],
            )
            .alias("video", &["ytd-video-renderer a#video-title", "a#video-title"], &[])
            .search(SearchProfile {
                inputs: strings(&["input[name=\"search_query\"]", "input#search"]),
                shortcut: Some("/".into()),
                url: Some("https://www.youtube.com/results?search_query={query}".into()),
                results: Some("ytd-video-renderer".into()),
            }),
        SiteProfile::new("google.com")
            .alias(
                "search",
                &["input[name=\"btnK\"]"],
                &["textarea[name=\"q\"]", "input[name=\"q\"]"],
            )
            .alias("result", &["#search a h3"], &[])
            .search(SearchProfile {
                inputs: strings(&["textarea[name=\"q\"]", "input[name=\"q\"]"]),
                shortcut: None,
                url: Some("https://www.google.com/search?q={query}".into()),
                results: Some("#search".into()),
            }),
        SiteProfile::new("github.com")
            .alias(
                "search",
                &["button[data-target=\"qbsearch-input.inputButton\"]"],
                &["input#query-builder-test", "input[name=\"q\"]"],
            )
            .search(SearchProfile {
                inputs: strings(&["input#query-builder-test", "input[name=\"q\"]"]),
                shortcut: Some("/".into()),
                url: Some("https://github.com/search?q={query}".into()),
                results: Some("[data-testid=\"results-list\"]".into()),
            }),
        SiteProfile::new("wikipedia.org")
            .alias(
                "search",
                &["#searchButton"],
                &["#searchInput", "input[name=\"search\"]"],
            )
            .search(SearchProfile {
                inputs: strings(&["#searchInput", "input[name=\"search\"]"]),
                shortcut: None,
                url: Some("https://en.wikipedia.org/w/index.php?search={query}".into()),
                results: Some("#firstHeading".into()),
            }),
        SiteProfile::new("amazon.com")
            .alias(
                "search",
                &["#nav-search-submit-button"],
                &["#twotabsearchtextbox"],
            )
            .alias("cart", &["#add-to-cart-button"], &[])
            .search(SearchProfile {
                inputs: strings(&["#twotabsearchtextbox"]),
                shortcut: None,
                url: Some("https://www.amazon.com/s?k={query}".into()),
                results: Some("[data-component-type=\"s-search-result\"]".into()),
            }),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_for_subdomains() {
        let catalog = SiteCatalog::builtin();
        assert_eq!(
            catalog.profile_for("https://www.youtube.com/watch?v=1").map(|p| p.host.as_str()),
            Some("youtube.com")
        );
        assert_eq!(
            catalog.profile_for("https://en.wikipedia.org/wiki/Rust").map(|p| p.host.as_str()),
            Some("wikipedia.org")
        );
        assert!(catalog.profile_for("https://notyoutube.com/").is_none());
        assert!(catalog.profile_for("about:blank").is_none());
    }

    #[test]
    fn test_known_selectors_by_keyword() {
        let catalog = SiteCatalog::builtin();
        let fill = catalog.known_selectors(
            "https://www.youtube.com/",
            "input#SEARCH-box",
            Intent::Fill,
        );
        assert_eq!(fill, vec!["input[name=\"search_query\"]", "input#search"]);

        let none = catalog.known_selectors("https://www.youtube.com/", "#login", Intent::Click);
        assert!(none.is_empty());
    }

    #[test]
    fn test_search_falls_back_to_generic() {
        let catalog = SiteCatalog::builtin();
        let search = catalog.search_for("https://docs.rs/");
        assert!(search.url.is_none());
        assert_eq!(search.inputs[0], "input[type=\"search\"]");
    }

    #[test]
    fn test_parse_overrides_builtin() {
        let yaml = r##"
sites:
  - host: youtube.com
    aliases:
      - keyword: subscribe
        click: ["#subscribe-button"]
  - host: example.test
    search:
      inputs: ["#q"]
      url: "https://example.test/find?q={query}"
"##;
        let catalog = SiteCatalog::parse(yaml).unwrap();
        let yt = catalog.profile_for("https://youtube.com/").unwrap();
        assert_eq!(yt.aliases.len(), 1);
        assert!(yt.search.is_none());
        assert_eq!(
            catalog.search_for("https://example.test/").inputs,
            vec!["#q".to_string()]
        );
    }

    #[test]
    fn test_parse_override_matches_www_and_case() {
        let yaml = r##"
sites:
  - host: WWW.YouTube.com
    aliases:
      - keyword: subscribe
        click: ["#subscribe-button"]
"##;
        let catalog = SiteCatalog::parse(yaml).unwrap();
        let youtube: Vec<&SiteProfile> = catalog
            .profiles()
            .iter()
            .filter(|p| p.host.contains("youtube"))
            .collect();
        assert_eq!(youtube.len(), 1);
        assert_eq!(youtube[0].host, "youtube.com");

        let click = catalog.known_selectors(
            "https://www.youtube.com/watch?v=1",
            "subscribe",
            Intent::Click,
        );
        assert_eq!(click, vec!["#subscribe-button"]);
    }

    #[test]
    fn test_with_profile_normalizes_host() {
        let catalog = SiteCatalog::empty()
            .with_profile(SiteProfile::new("shop.test").alias("buy", &["#old"], &[]))
            .with_profile(SiteProfile {
                host: " www.Shop.test ".into(),
                aliases: Vec::new(),
                search: None,
            });
        assert_eq!(catalog.profiles().len(), 1);
        assert_eq!(catalog.profiles()[0].host, "shop.test");
        assert!(catalog.profile_for("https://WWW.shop.test/cart").is_some());
    }

    #[test]
    fn test_parse_rejects_url_without_placeholder() {
        let yaml = r#"
sites:
  - host: example.test
    search:
      url: "https://example.test/find"
"#;
        assert!(SiteCatalog::parse(yaml).is_err());
    }
}
