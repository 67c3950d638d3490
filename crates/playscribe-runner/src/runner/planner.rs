//! Planning collaborators: prompt in, JSON action list out.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use playscribe_driver::{PlannedAction, ToolDescriptor};

use crate::config::PlannerCommand;
use crate::{Error, Result};

/// Everything a planner gets to see for one prompt.
#[derive(Debug, Clone, Copy)]
pub struct PlanRequest<'a> {
    pub prompt: &'a str,
    /// "browser already running" or "no browser running".
    pub session_state: &'a str,
    pub tools: &'a [ToolDescriptor],
}

impl PlanRequest<'_> {
    /// Render the request as the text handed to a language model.
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(
            "You control a browser through the tools below. Reply with a JSON array of \
             actions, each {\"name\": <tool>, \"arguments\": {...}}, to be run in order.\n",
        );
        out.push_str("Skip launch_browser if a browser is already running.\n\n");
        out.push_str("Tools:\n");
        for tool in self.tools {
            out.push_str(&format!("- {}: {}\n", tool.name, tool.description));
            if let Some(props) = tool.input_schema.get("properties").and_then(Value::as_object) {
                if !props.is_empty() {
                    let names: Vec<&str> = props.keys().map(String::as_str).collect();
                    out.push_str(&format!("  arguments: {}\n", names.join(", ")));
                }
            }
        }
        out.push_str(&format!("\nSession: {}\n", self.session_state));
        out.push_str(&format!("Task: {}\n", self.prompt));
        out
    }
}

/// Turns a prompt into raw model output. Parsing happens in [`parse_plan`].
#[async_trait]
pub trait Planner: Send + Sync {
    async fn plan(&self, request: &PlanRequest<'_>) -> Result<String>;
}

#[async_trait]
impl<P: Planner + ?Sized> Planner for Box<P> {
    async fn plan(&self, request: &PlanRequest<'_>) -> Result<String> {
        (**self).plan(request).await
    }
}

/// Runs an external command with the rendered request on stdin and takes
/// its stdout as the plan.
#[derive(Debug, Clone)]
pub struct CommandPlanner {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandPlanner {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }
}

impl From<&PlannerCommand> for CommandPlanner {
    fn from(cmd: &PlannerCommand) -> Self {
        Self::new(
            cmd.program.clone(),
            cmd.args.clone(),
            Duration::from_millis(cmd.timeout_ms),
        )
    }
}

#[async_trait]
impl Planner for CommandPlanner {
    async fn plan(&self, request: &PlanRequest<'_>) -> Result<String> {
        debug!(program = %self.program, "asking planner");
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Plan(format!("failed to start '{}': {}", self.program, e)))?;

        let input = request.render();
        if let Some(mut stdin) = child.stdin.take() {
            tokio::spawn(async move {
                let _ = stdin.write_all(input.as_bytes()).await;
                let _ = stdin.shutdown().await;
            });
        }

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                Error::Plan(format!(
                    "'{}' did not answer within {}ms",
                    self.program,
                    self.timeout.as_millis()
                ))
            })??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(program = %self.program, status = %output.status, "planner failed");
            return Err(Error::Plan(format!(
                "'{}' exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Answers every request with the same text.
#[derive(Debug, Clone)]
pub struct StaticPlanner {
    output: String,
}

impl StaticPlanner {
    pub fn new(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
        }
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::new(std::fs::read_to_string(path.as_ref())?))
    }
}

#[async_trait]
impl Planner for StaticPlanner {
    async fn plan(&self, _request: &PlanRequest<'_>) -> Result<String> {
        Ok(self.output.clone())
    }
}

/// Pull the first well-formed action array out of model output.
///
/// Prose and markdown fences around the array are ignored. An array that
/// parses as JSON but isn't a list of `{name, arguments}` objects is skipped
/// in favor of a later one.
pub fn parse_plan(output: &str) -> Result<Vec<PlannedAction>> {
    for (start, _) in output.match_indices('[') {
        let mut values = serde_json::Deserializer::from_str(&output[start..]).into_iter::<Value>();
        let Some(Ok(value)) = values.next() else {
            continue;
        };
        if !value.is_array() {
            continue;
        }
        if let Ok(actions) = serde_json::from_value::<Vec<PlannedAction>>(value) {
            return Ok(actions);
        }
    }
    Err(Error::Plan(format!(
        "no JSON action array in planner output: {}",
        preview(output)
    )))
}

fn preview(output: &str) -> String {
    let trimmed = output.trim();
    if trimmed.chars().count() > 200 {
        let head: String = trimmed.chars().take(200).collect();
        format!("{}...", head)
    } else {
        trimmed.to_string()
    }
}
