use serde::Serialize;

use crate::config::SiteProfile;
use crate::types::{ActionKind, AgentAction};

pub const COMPLETION_OBJECTIVE: &str = "All items added. Finish.";

/// Decides, from an executed action, whether the setup gate was passed or
/// the current goal was acquired.
///
/// The default implementation only reads action metadata. A verified check
/// (reading the cart badge, say) can replace it without touching the loop.
pub trait GoalCompletionOracle: Send + Sync {
    fn setup_completed(&self, action: &AgentAction, success: bool) -> bool;
    fn goal_acquired(&self, action: &AgentAction, success: bool) -> bool;
}

/// String matching on what the planner said it was doing.
///
/// Known to miscount: a click whose reason mentions adding but which did
/// not add anything still removes a goal, and an add described otherwise
/// is missed.
#[derive(Debug, Clone)]
pub struct HeuristicCompletion {
    setup_code: String,
    reason_markers: Vec<String>,
    selector_markers: Vec<String>,
}

impl HeuristicCompletion {
    /// Spanish markers come from the shop's own button labels. The English
    /// "add to cart" is there because the planner prompt is in English and
    /// its reasons often are too.
    pub fn new(setup_code: impl Into<String>) -> Self {
        Self {
            setup_code: setup_code.into(),
            reason_markers: vec!["añadir".into(), "add to cart".into()],
            selector_markers: vec!["add".into(), "añadir".into()],
        }
    }

    pub fn for_site(site: &SiteProfile) -> Self {
        Self::new(site.setup_code.clone())
    }

    pub fn with_markers(mut self, reason: Vec<String>, selector: Vec<String>) -> Self {
        self.reason_markers = reason;
        self.selector_markers = selector;
        self
    }
}

impl GoalCompletionOracle for HeuristicCompletion {
    fn setup_completed(&self, action: &AgentAction, success: bool) -> bool {
        success
            && action.action == ActionKind::Type
            && action.text.as_deref() == Some(self.setup_code.as_str())
    }

    fn goal_acquired(&self, action: &AgentAction, success: bool) -> bool {
        if !success || action.action != ActionKind::Click {
            return false;
        }
        let reason = action.reason.to_lowercase();
        let selector = action.selector.as_deref().unwrap_or_default().to_lowercase();
        self.reason_markers.iter().any(|m| reason.contains(m.as_str()))
            || self.selector_markers.iter().any(|m| selector.contains(m.as_str()))
    }
}

/// Trim each item and drop the blank ones, keeping order.
pub fn clean_goals<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    items
        .into_iter()
        .map(|item| item.as_ref().trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

/// Non-terminal states of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Setup,
    Searching,
    Complete,
}

/// Per-run progress. Never shared between runs.
#[derive(Debug, Clone)]
pub struct GoalState {
    remaining: Vec<String>,
    step: usize,
    setup_entered: bool,
}

impl GoalState {
    pub fn new<I, S>(goals: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            remaining: goals.into_iter().map(Into::into).collect(),
            step: 0,
            setup_entered: false,
        }
    }

    pub fn phase(&self) -> Phase {
        if !self.setup_entered {
            Phase::Setup
        } else if self.remaining.is_empty() {
            Phase::Complete
        } else {
            Phase::Searching
        }
    }

    /// The instruction for the next planner call, derived only from state.
    pub fn objective(&self, site: &SiteProfile) -> String {
        match self.phase() {
            Phase::Setup => format!(
                "Enter postal code {} and confirm to enter the store",
                site.setup_code
            ),
            Phase::Searching => {
                format!("Search for and add to the cart: \"{}\"", self.remaining[0])
            }
            Phase::Complete => COMPLETION_OBJECTIVE.to_string(),
        }
    }

    pub fn advance_step(&mut self) -> usize {
        self.step += 1;
        self.step
    }

    pub fn step(&self) -> usize {
        self.step
    }

    pub fn remaining(&self) -> &[String] {
        &self.remaining
    }

    pub fn into_remaining(self) -> Vec<String> {
        self.remaining
    }

    /// Fold one executed action into the state. Returns the goal that was
    /// acquired, if any.
    pub fn record(
        &mut self,
        action: &AgentAction,
        success: bool,
        oracle: &dyn GoalCompletionOracle,
    ) -> Option<String> {
        if !self.setup_entered && oracle.setup_completed(action, success) {
            self.setup_entered = true;
        }
        if !self.remaining.is_empty() && oracle.goal_acquired(action, success) {
            return Some(self.remaining.remove(0));
        }
        None
    }
}
