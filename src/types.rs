use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of a single planner decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Click,
    Type,
    ClearAndType,
    PressEnter,
    Wait,
    Scroll,
    Done,
    Error,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Click => "click",
            ActionKind::Type => "type",
            ActionKind::ClearAndType => "clear_and_type",
            ActionKind::PressEnter => "press_enter",
            ActionKind::Wait => "wait",
            ActionKind::Scroll => "scroll",
            ActionKind::Done => "done",
            ActionKind::Error => "error",
        }
    }

    /// Case-insensitive lookup of the wire name.
    pub fn parse(raw: &str) -> Option<Self> {
        let kind = match raw.trim().to_ascii_lowercase().as_str() {
            "click" => ActionKind::Click,
            "type" => ActionKind::Type,
            "clear_and_type" => ActionKind::ClearAndType,
            "press_enter" => ActionKind::PressEnter,
            "wait" => ActionKind::Wait,
            "scroll" => ActionKind::Scroll,
            "done" => ActionKind::Done,
            "error" => ActionKind::Error,
            _ => return None,
        };
        Some(kind)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One action the planner asks the agent to perform.
///
/// `selector` and `text` stay optional here: the planner is untrusted, and a
/// missing field is an execution failure rather than a parse failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentAction {
    pub action: ActionKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    pub reason: String,
    /// Set when the planner output could not be interpreted and this action
    /// was synthesized in its place.
    #[serde(skip)]
    pub malformed: bool,
}

impl AgentAction {
    pub fn new(action: ActionKind, reason: impl Into<String>) -> Self {
        Self {
            action,
            selector: None,
            text: None,
            reason: reason.into(),
            malformed: false,
        }
    }

    pub fn with_selector(mut self, selector: impl Into<String>) -> Self {
        self.selector = Some(selector.into());
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// An `error` action standing in for output that could not be read.
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self {
            malformed: true,
            ..Self::new(ActionKind::Error, reason)
        }
    }

    /// Name of the first field this kind requires but does not carry.
    pub fn missing_field(&self) -> Option<&'static str> {
        match self.action {
            ActionKind::Click if self.selector.is_none() => Some("selector"),
            ActionKind::Type | ActionKind::ClearAndType => {
                if self.selector.is_none() {
                    Some("selector")
                } else if self.text.is_none() {
                    Some("text")
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// True for `done` and `error` decisions the planner actually made.
    pub fn ends_run(&self) -> bool {
        matches!(self.action, ActionKind::Done | ActionKind::Error) && !self.malformed
    }

    /// Human-readable label used in the run log.
    pub fn label(&self) -> String {
        let mut label = self.action.as_str().to_string();
        if let Some(selector) = &self.selector {
            label.push_str(" → ");
            label.push_str(&truncate_chars(selector, 50));
        }
        if let Some(text) = &self.text {
            label.push_str(&format!(" (\"{text}\")"));
        }
        label
    }

    /// The line fed back to the planner as history.
    pub fn history_line(&self, step: usize, success: bool) -> String {
        format!(
            "Step {step}: {} - {} ({})",
            self.action,
            self.reason,
            if success { "OK" } else { "FAIL" }
        )
    }
}

/// One entry of the audit trail. Created once per loop iteration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunLogEntry {
    pub step: usize,
    pub action: String,
    pub reason: String,
    pub success: bool,
}

impl RunLogEntry {
    pub fn for_action(step: usize, action: &AgentAction, success: bool) -> Self {
        Self {
            step,
            action: action.label(),
            reason: action.reason.clone(),
            success,
        }
    }

    pub fn internal_error(step: usize, error: &str) -> Self {
        Self {
            step,
            action: "internal error".to_string(),
            reason: truncate_chars(error, 100),
            success: false,
        }
    }
}

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    Done,
    Failed,
    BudgetExhausted,
    /// The caller's wall-clock limit elapsed before the loop finished.
    TimedOut,
    SetupFault,
}

/// What a run hands back to its caller.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub success: bool,
    pub termination: Termination,
    pub logs: Vec<RunLogEntry>,
    pub remaining: Vec<String>,
}

impl RunOutcome {
    pub fn new(termination: Termination, logs: Vec<RunLogEntry>, remaining: Vec<String>) -> Self {
        Self {
            success: remaining.is_empty(),
            termination,
            logs,
            remaining,
        }
    }

    /// A run that never reached the loop.
    pub fn setup_fault(remaining: Vec<String>) -> Self {
        Self {
            success: false,
            termination: Termination::SetupFault,
            logs: Vec::new(),
            remaining,
        }
    }
}

/// Truncate to at most `max` characters, never splitting a code point.
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}
