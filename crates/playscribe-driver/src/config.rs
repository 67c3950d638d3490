//! Driver process configuration: CLI flags layered over environment.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use crate::browser::chrome::ChromeLauncher;
use crate::browser::sim::SimLauncher;
use crate::browser::BrowserLauncher;
use crate::driver::Driver;
use crate::sites::SiteCatalog;
use crate::{Error, Result};

/// Default headless mode for launches that don't specify one.
pub const HEADLESS_ENV: &str = "PLAYSCRIBE_HEADLESS";
/// YAML file with extra site profiles.
pub const SITES_ENV: &str = "PLAYSCRIBE_SITES";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DriverConfig {
    pub headless: bool,
    pub sites: Option<PathBuf>,
    /// Use the in-memory browser instead of Chrome.
    pub simulate: bool,
}

impl DriverConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let headless = match var(HEADLESS_ENV) {
            Some(v) => parse_bool(HEADLESS_ENV, &v)?,
            None => false,
        };
        let sites = var(SITES_ENV)
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);
        Ok(Self {
            headless,
            sites,
            simulate: false,
        })
    }

    pub fn site_catalog(&self) -> Result<SiteCatalog> {
        match self.sites {
            Some(ref path) => {
                let catalog = SiteCatalog::load(path)?;
                info!(path = %path.display(), profiles = catalog.profiles().len(), "loaded site profiles");
                Ok(catalog)
            }
            None => Ok(SiteCatalog::builtin()),
        }
    }

    pub fn launcher(&self) -> Arc<dyn BrowserLauncher> {
        if self.simulate {
            Arc::new(SimLauncher::permissive())
        } else {
            Arc::new(ChromeLauncher)
        }
    }

    pub fn build_driver(&self) -> Result<Driver> {
        Ok(Driver::new(self.launcher(), self.site_catalog()?).with_headless(self.headless))
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "" | "0" | "false" | "no" | "off" => Ok(false),
        other => Err(Error::Config(format!(
            "{} must be a boolean, got '{}'",
            key, other
        ))),
    }
}
