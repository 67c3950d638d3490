pub mod bridge;
pub mod planner;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use playscribe_driver::{ActionRecord, PlannedAction, Router, ToolDescriptor, ToolName, ToolResult};

use crate::{Error, Result};
use bridge::Bridge;
use planner::{parse_plan, PlanRequest, Planner};

const BROWSER_RUNNING: &str = "browser already running";
const NO_BROWSER: &str = "no browser running";

/// Something that can execute driver tools: the bridge to a child process,
/// or a router in the same process.
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    /// Call one tool. An error envelope comes back as [`Error::Tool`].
    async fn invoke(&self, tool: &str, args: Value) -> Result<ToolResult>;

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>>;

    /// Release the browser.
    async fn shutdown(&self) -> Result<()> {
        self.invoke(ToolName::CloseBrowser.as_str(), json!({}))
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl ToolInvoker for Bridge {
    async fn invoke(&self, tool: &str, args: Value) -> Result<ToolResult> {
        Bridge::invoke(self, tool, args).await
    }

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>> {
        Bridge::list_tools(self).await
    }

    async fn shutdown(&self) -> Result<()> {
        Bridge::shutdown(self).await
    }
}

#[async_trait]
impl ToolInvoker for Router {
    async fn invoke(&self, tool: &str, args: Value) -> Result<ToolResult> {
        let result = self.call_tool(tool, args).await;
        if result.is_error {
            return Err(Error::Tool(result.first_text().unwrap_or_default()));
        }
        Ok(result)
    }

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>> {
        Ok(Router::list_tools(self))
    }
}

/// Emitted while a prompt runs. `index` counts plan positions from 1.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    Planned {
        count: usize,
    },
    ActionCompleted {
        index: usize,
        action: PlannedAction,
        result: ToolResult,
    },
    ActionFailed {
        index: usize,
        action: PlannedAction,
        error: String,
    },
}

/// The action that stopped a prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionFailure {
    /// Plan position, from 1.
    pub index: usize,
    pub tool: String,
    pub message: String,
}

impl From<ActionFailure> for Error {
    fn from(f: ActionFailure) -> Self {
        Error::ActionFailed {
            index: f.index,
            tool: f.tool,
            message: f.message,
        }
    }
}

/// What one prompt produced.
#[derive(Debug, Clone)]
pub struct PromptOutcome {
    /// Planned actions that ran successfully, in order.
    pub actions: Vec<PlannedAction>,
    /// One result per entry in `actions`.
    pub results: Vec<ToolResult>,
    /// What the script was generated from: the actions the driver reported
    /// executing, or the planned action when it reported none.
    pub records: Vec<ActionRecord>,
    /// Playwright test for `records`.
    pub script: String,
    /// Set when an action failed and the rest of the plan was skipped.
    pub failure: Option<ActionFailure>,
}

impl PromptOutcome {
    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }

    /// Turn a stopped run into [`Error::ActionFailed`].
    pub fn into_result(self) -> Result<Self> {
        match self.failure {
            Some(failure) => Err(failure.into()),
            None => Ok(self),
        }
    }
}

/// Plans prompts and runs them against the driver.
pub struct Orchestrator<I, P> {
    invoker: I,
    planner: P,
    browser_running: bool,
    test_name: String,
    output_path: Option<String>,
    tools: Option<Vec<ToolDescriptor>>,
}

impl<I: ToolInvoker, P: Planner> Orchestrator<I, P> {
    pub fn new(invoker: I, planner: P) -> Self {
        Self {
            invoker,
            planner,
            browser_running: false,
            test_name: "generated test".into(),
            output_path: None,
            tools: None,
        }
    }

    /// Name for generated tests.
    pub fn test_name(mut self, name: impl Into<String>) -> Self {
        self.test_name = name.into();
        self
    }

    /// Have the driver also write each generated test to `path`.
    pub fn output_path(mut self, path: impl Into<String>) -> Self {
        self.output_path = Some(path.into());
        self
    }

    pub fn invoker(&self) -> &I {
        &self.invoker
    }

    /// Whether a launch succeeded more recently than a close.
    pub fn browser_running(&self) -> bool {
        self.browser_running
    }

    /// Plan `prompt`, run the plan in order, and generate a test from the
    /// actions that ran.
    ///
    /// A failing action stops the plan. The browser and its action log stay
    /// as they are, the script still covers the actions that ran, and the
    /// failure is reported in [`PromptOutcome::failure`]. Planning and
    /// transport problems outside the actions themselves are returned as
    /// errors.
    pub async fn process_prompt(
        &mut self,
        prompt: &str,
        progress: Option<&mpsc::UnboundedSender<ProgressEvent>>,
    ) -> Result<PromptOutcome> {
        let emit = |event: ProgressEvent| {
            if let Some(tx) = progress {
                let _ = tx.send(event);
            }
        };

        if self.tools.is_none() {
            self.tools = Some(self.invoker.list_tools().await?);
        }
        let tools = self.tools.as_deref().unwrap_or_default();
        let session_state = if self.browser_running {
            BROWSER_RUNNING
        } else {
            NO_BROWSER
        };

        let request = PlanRequest {
            prompt,
            session_state,
            tools,
        };
        let output = self.planner.plan(&request).await?;
        let plan = parse_plan(&output)?;
        info!(actions = plan.len(), session = session_state, "plan ready");
        emit(ProgressEvent::Planned { count: plan.len() });

        let mut actions = Vec::with_capacity(plan.len());
        let mut results = Vec::with_capacity(plan.len());
        let mut records = Vec::new();
        let mut failure = None;

        for (i, action) in plan.into_iter().enumerate() {
            let index = i + 1;
            debug!(index, tool = %action.name, "running action");
            let args = match &action.arguments {
                Value::Null => Value::Object(Map::new()),
                other => other.clone(),
            };

            match self.invoker.invoke(&action.name, args).await {
                Ok(result) => {
                    if action.name == ToolName::LaunchBrowser.as_str() {
                        self.browser_running = true;
                    } else if action.name == ToolName::CloseBrowser.as_str() {
                        self.browser_running = false;
                    }
                    emit(ProgressEvent::ActionCompleted {
                        index,
                        action: action.clone(),
                        result: result.clone(),
                    });
                    let recorded = result.recorded();
                    if recorded.is_empty() {
                        records.push(ActionRecord::Planned(action.clone()));
                    } else {
                        records.extend(recorded.into_iter().map(ActionRecord::Executed));
                    }
                    actions.push(action);
                    results.push(result);
                }
                Err(e) => {
                    let message = e.to_string();
                    warn!(index, tool = %action.name, error = %message, "action failed, skipping the rest");
                    emit(ProgressEvent::ActionFailed {
                        index,
                        action: action.clone(),
                        error: message.clone(),
                    });
                    failure = Some(ActionFailure {
                        index,
                        tool: action.name,
                        message,
                    });
                    break;
                }
            }
        }

        let script = self.generate(prompt, &records).await?;
        Ok(PromptOutcome {
            actions,
            results,
            records,
            script,
            failure,
        })
    }

    async fn generate(&self, prompt: &str, records: &[ActionRecord]) -> Result<String> {
        let mut args = json!({
            "testName": self.test_name,
            "description": prompt,
            "records": records,
        });
        if let Some(ref path) = self.output_path {
            args["outputPath"] = json!(path);
        }
        let result = self
            .invoker
            .invoke(ToolName::GenerateTest.as_str(), args)
            .await?;
        result
            .first_text()
            .ok_or_else(|| Error::Tool("generate_test returned no script".into()))
    }

    /// Close the browser and release the invoker.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.browser_running = false;
        self.invoker.shutdown().await
    }
}
