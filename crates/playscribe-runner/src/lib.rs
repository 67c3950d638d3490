//! # playscribe-runner
//!
//! Prompt in, browser actions executed, Playwright test out. A planner turns
//! the prompt into tool calls, the orchestrator runs them through the driver
//! (a child process, or in-process) and asks the driver for the script.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use playscribe_runner::{Bridge, Orchestrator, RunnerConfig, StaticPlanner};
//!
//! # #[tokio::main]
//! # async fn main() -> playscribe_runner::Result<()> {
//! let config = RunnerConfig::load("playscribe.yaml")?;
//! let bridge = Bridge::spawn(&config.driver, config.headless)?;
//! bridge.connect().await?;
//!
//! let planner = StaticPlanner::from_file("plan.json")?;
//! let mut orchestrator = Orchestrator::new(bridge, planner);
//! let outcome = orchestrator.process_prompt("open example.com", None).await?;
//! println!("{}", outcome.script);
//! # Ok(())
//! # }
//! ```

mod config;
mod runner;

pub use config::{DriverCommand, OutputConfig, PlannerCommand, RunnerConfig};
pub use runner::bridge::{Bridge, BridgeConfig};
pub use runner::planner::{parse_plan, CommandPlanner, PlanRequest, Planner, StaticPlanner};
pub use runner::{ActionFailure, Orchestrator, ProgressEvent, PromptOutcome, ToolInvoker};

/// Result type for playscribe-runner operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while planning or running actions.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("yaml parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("not connected to driver")]
    NotConnected,

    #[error("{method} (id {id}) timed out after {timeout_ms}ms")]
    Timeout {
        id: u64,
        method: String,
        timeout_ms: u64,
    },

    #[error("JSON-RPC error {code}: {message}")]
    Remote { code: i64, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    /// A tool answered with an error envelope; the message is its text.
    #[error("{0}")]
    Tool(String),

    #[error("plan error: {0}")]
    Plan(String),

    #[error("action {index} ({tool}) failed: {message}")]
    ActionFailed {
        index: usize,
        tool: String,
        message: String,
    },

    #[error("driver error: {0}")]
    Driver(#[from] playscribe_driver::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_empty_config() {
        let config = RunnerConfig::parse("{}").unwrap();
        assert_eq!(config.driver.program, "playscribe-driver");
        assert_eq!(config.driver.call_timeout_ms, 30_000);
        assert_eq!(config.driver.ready_timeout_ms, 15_000);
        assert!(config.planner.is_none());
        assert_eq!(config.output.test_name, "generated test");
        assert!(!config.headless);
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
headless: true
driver:
  program: "/usr/local/bin/playscribe-driver"
  args: ["--sites", "sites.yaml"]
  env:
    RUST_LOG: debug
  call_timeout_ms: 60000
planner:
  program: "llm"
  args: ["-m", "planner"]
output:
  test_name: "checkout flow"
  script_path: "tests/checkout.spec.ts"
"#;
        let config = RunnerConfig::parse(yaml).unwrap();
        assert!(config.headless);
        assert_eq!(config.driver.args, vec!["--sites", "sites.yaml"]);
        assert_eq!(config.driver.env.get("RUST_LOG").map(String::as_str), Some("debug"));
        assert_eq!(config.driver.call_timeout_ms, 60_000);
        assert_eq!(config.driver.ready_timeout_ms, 15_000);
        let planner = config.planner.unwrap();
        assert_eq!(planner.program, "llm");
        assert_eq!(planner.timeout_ms, 120_000);
        assert_eq!(config.output.test_name, "checkout flow");
        assert_eq!(
            config.output.script_path.as_deref(),
            Some("tests/checkout.spec.ts")
        );
    }

    #[test]
    fn test_validation_zero_timeout() {
        let yaml = r#"
driver:
  call_timeout_ms: 0
"#;
        let err = RunnerConfig::parse(yaml).unwrap_err();
        assert!(err.to_string().contains("call_timeout_ms"));
    }

    #[test]
    fn test_validation_empty_planner() {
        let yaml = r#"
planner:
  program: ""
"#;
        assert!(RunnerConfig::parse(yaml).is_err());
    }

    #[test]
    fn test_validation_empty_test_name() {
        let yaml = r#"
output:
  test_name: "  "
"#;
        assert!(RunnerConfig::parse(yaml).is_err());
    }

    #[test]
    fn test_action_failed_display() {
        let err = Error::ActionFailed {
            index: 2,
            tool: "click_element".into(),
            message: "Error executing click_element: boom".into(),
        };
        assert_eq!(
            err.to_string(),
            "action 2 (click_element) failed: Error executing click_element: boom"
        );
    }
}
