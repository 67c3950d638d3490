use crate::{Error, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// Top-level runner configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunnerConfig {
    /// How to start the driver process.
    #[serde(default)]
    pub driver: DriverCommand,

    /// External planning command (optional; a plan file can be used instead).
    pub planner: Option<PlannerCommand>,

    /// Where generated tests go.
    #[serde(default)]
    pub output: OutputConfig,

    /// Ask the driver to launch browsers headless.
    #[serde(default)]
    pub headless: bool,
}

impl RunnerConfig {
    /// Load config from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Parse config from a YAML string.
    pub fn parse(yaml: &str) -> Result<Self> {
        let config: RunnerConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the config.
    pub fn validate(&self) -> Result<()> {
        if self.driver.program.trim().is_empty() {
            return Err(Error::Config("driver.program is required".into()));
        }
        if self.driver.call_timeout_ms == 0 {
            return Err(Error::Config(
                "driver.call_timeout_ms must be at least 1".into(),
            ));
        }
        if self.driver.ready_timeout_ms == 0 {
            return Err(Error::Config(
                "driver.ready_timeout_ms must be at least 1".into(),
            ));
        }
        if let Some(ref planner) = self.planner {
            if planner.program.trim().is_empty() {
                return Err(Error::Config("planner.program is required".into()));
            }
        }
        if self.output.test_name.trim().is_empty() {
            return Err(Error::Config("output.test_name must not be empty".into()));
        }
        Ok(())
    }
}

fn default_driver_program() -> String {
    "playscribe-driver".into()
}

fn default_call_timeout() -> u64 {
    30_000
}

fn default_ready_timeout() -> u64 {
    15_000
}

fn default_planner_timeout() -> u64 {
    120_000
}

fn default_test_name() -> String {
    "generated test".into()
}

/// Driver child process.
#[derive(Debug, Clone, Deserialize)]
pub struct DriverCommand {
    /// Executable to run.
    #[serde(default = "default_driver_program")]
    pub program: String,

    #[serde(default)]
    pub args: Vec<String>,

    /// Extra environment variables.
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Per-call timeout in milliseconds.
    #[serde(default = "default_call_timeout")]
    pub call_timeout_ms: u64,

    /// How long to wait for the driver's startup line.
    #[serde(default = "default_ready_timeout")]
    pub ready_timeout_ms: u64,
}

impl Default for DriverCommand {
    fn default() -> Self {
        Self {
            program: default_driver_program(),
            args: Vec::new(),
            env: HashMap::new(),
            call_timeout_ms: default_call_timeout(),
            ready_timeout_ms: default_ready_timeout(),
        }
    }
}

/// Planning command: reads the prompt on stdin, writes a plan on stdout.
#[derive(Debug, Clone, Deserialize)]
pub struct PlannerCommand {
    pub program: String,

    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default = "default_planner_timeout")]
    pub timeout_ms: u64,
}

/// Generated test output.
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Name passed to `test(...)`.
    #[serde(default = "default_test_name")]
    pub test_name: String,

    /// File the driver writes the script to.
    pub script_path: Option<String>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            test_name: default_test_name(),
            script_path: None,
        }
    }
}
