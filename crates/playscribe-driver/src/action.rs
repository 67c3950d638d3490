//! Action records: what the driver executed, or what a planner asked for.

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::search::SearchStrategy;

/// Category of an executed browser operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Navigate,
    Click,
    Fill,
    Wait,
    Screenshot,
    Inspect,
    Search,
    Custom,
}

impl ActionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Navigate => "navigate",
            Self::Click => "click",
            Self::Fill => "fill",
            Self::Wait => "wait",
            Self::Screenshot => "screenshot",
            Self::Inspect => "inspect",
            Self::Search => "search",
            Self::Custom => "custom",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operation-specific payload of an executed action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ActionDetail {
    None,
    #[serde(rename_all = "camelCase")]
    Timeout { timeout_ms: u64 },
    /// `confirmed` is the value read back from the field after writing.
    Fill { text: String, confirmed: String },
    File { filename: String },
    #[serde(rename_all = "camelCase")]
    Search {
        query: String,
        strategy: SearchStrategy,
    },
    Key { key: String },
}

/// One operation the driver actually performed against the page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExecutedAction {
    pub kind: ActionKind,
    /// Selector or URL, depending on `kind`.
    pub target: String,
    pub detail: ActionDetail,
    /// Script source reproducing this action (may span several lines).
    pub source: Option<String>,
}

impl ExecutedAction {
    pub fn new(kind: ActionKind, target: impl Into<String>) -> Self {
        Self {
            kind,
            target: target.into(),
            detail: ActionDetail::None,
            source: None,
        }
    }

    pub fn detail(mut self, detail: ActionDetail) -> Self {
        self.detail = detail;
        self
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl fmt::Display for ExecutedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.target)?;
        match &self.detail {
            ActionDetail::None => Ok(()),
            ActionDetail::Timeout { timeout_ms } => write!(f, " (timeout {}ms)", timeout_ms),
            ActionDetail::Fill { text, confirmed } if text == confirmed => {
                write!(f, " = \"{}\"", text)
            }
            ActionDetail::Fill { text, confirmed } => {
                write!(f, " = \"{}\" (field reads \"{}\")", text, confirmed)
            }
            ActionDetail::File { filename } => write!(f, " -> {}", filename),
            ActionDetail::Search { query, strategy } => {
                write!(f, " \"{}\" via {}", query, strategy)
            }
            ActionDetail::Key { key } => write!(f, " key {}", key),
        }
    }
}

/// A tool invocation as a planner expressed it: a name plus raw arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PlannedAction {
    #[schemars(description = "Tool name, e.g. navigate_to")]
    pub name: String,
    #[serde(default)]
    #[schemars(description = "Tool arguments object")]
    pub arguments: Value,
}

impl PlannedAction {
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }
}

/// Input to the script generator. Both shapes can appear in one list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "origin", rename_all = "lowercase")]
pub enum ActionRecord {
    Executed(ExecutedAction),
    Planned(PlannedAction),
}

impl From<ExecutedAction> for ActionRecord {
    fn from(a: ExecutedAction) -> Self {
        Self::Executed(a)
    }
}

impl From<PlannedAction> for ActionRecord {
    fn from(a: PlannedAction) -> Self {
        Self::Planned(a)
    }
}

/// Append-only log of executed actions for one browser session.
///
/// There is no way to remove or edit an entry; a fresh log is created
/// when a session starts and dropped when it ends.
#[derive(Debug, Default)]
pub struct ActionLog {
    entries: Vec<ExecutedAction>,
}

impl ActionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, action: ExecutedAction) {
        self.entries.push(action);
    }

    pub fn entries(&self) -> &[ExecutedAction] {
        &self.entries
    }

    pub fn last(&self) -> Option<&ExecutedAction> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot the log as generator input.
    pub fn records(&self) -> Vec<ActionRecord> {
        self.entries.iter().cloned().map(ActionRecord::Executed).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_is_ordered() {
        let mut log = ActionLog::new();
        log.push(ExecutedAction::new(ActionKind::Navigate, "https://a.test"));
        log.push(ExecutedAction::new(ActionKind::Click, "#b"));
        assert_eq!(log.len(), 2);
        assert_eq!(log.entries()[0].target, "https://a.test");
        assert_eq!(log.last().map(|a| a.kind), Some(ActionKind::Click));

        let records = log.records();
        assert!(matches!(&records[1], ActionRecord::Executed(a) if a.target == "#b"));
    }

    #[test]
    fn test_display_fill() {
        let action = ExecutedAction::new(ActionKind::Fill, "#email").detail(ActionDetail::Fill {
            text: "a@b.test".into(),
            confirmed: "a@b.test".into(),
        });
        assert_eq!(action.to_string(), "fill #email = \"a@b.test\"");

        let truncated = ExecutedAction::new(ActionKind::Fill, "#code").detail(ActionDetail::Fill {
            text: "123456".into(),
            confirmed: "1234".into(),
        });
        assert!(truncated.to_string().contains("field reads \"1234\""));
    }

    #[test]
    fn test_planned_action_defaults_arguments() {
        let a: PlannedAction = serde_json::from_str(r#"{"name":"close_browser"}"#).unwrap();
        assert_eq!(a.name, "close_browser");
        assert!(a.arguments.is_null());
    }

    #[test]
    fn test_record_serde_tags() {
        let rec = ActionRecord::from(PlannedAction::new(
            "navigate_to",
            serde_json::json!({"url": "https://x.test"}),
        ));
        let v = serde_json::to_value(&rec).unwrap();
        assert_eq!(v["origin"], "planned");
        assert_eq!(v["name"], "navigate_to");
    }
}
