use std::fmt;
use std::time::Duration;

use crate::error::AgentError;

pub const DEFAULT_PLANNER_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_MAX_STEPS: usize = 60;
pub const DEFAULT_HISTORY_WINDOW: usize = 8;
pub const DEFAULT_MAX_ELEMENTS: usize = 40;
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Everything the loop needs to know before it starts.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub planner_model: String,
    pub max_steps: usize,
    /// Pause between loop iterations.
    pub step_settle_ms: u64,
    /// Upper bound for waiting on a selector to attach.
    pub action_timeout_ms: u64,
    pub history_window: usize,
    pub max_elements: usize,
    /// Pause after the first navigation, before the first snapshot.
    pub initial_settle_ms: u64,
    pub timings: ActionTimings,
    pub site: SiteProfile,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            planner_model: DEFAULT_PLANNER_MODEL.to_string(),
            max_steps: DEFAULT_MAX_STEPS,
            step_settle_ms: 800,
            action_timeout_ms: 5_000,
            history_window: DEFAULT_HISTORY_WINDOW,
            max_elements: DEFAULT_MAX_ELEMENTS,
            initial_settle_ms: 3_000,
            timings: ActionTimings::default(),
            site: SiteProfile::default(),
        }
    }
}

impl AgentConfig {
    pub fn validate(&self) -> Result<(), AgentError> {
        if self.max_steps == 0 {
            return Err(AgentError::Config("max_steps must be at least 1".into()));
        }
        if self.history_window == 0 {
            return Err(AgentError::Config("history_window must be at least 1".into()));
        }
        if self.max_elements == 0 {
            return Err(AgentError::Config("max_elements must be at least 1".into()));
        }
        if self.planner_model.trim().is_empty() {
            return Err(AgentError::Config("planner_model is empty".into()));
        }
        Ok(())
    }

    pub fn step_settle(&self) -> Duration {
        Duration::from_millis(self.step_settle_ms)
    }

    pub fn action_timeout(&self) -> Duration {
        Duration::from_millis(self.action_timeout_ms)
    }

    pub fn initial_settle(&self) -> Duration {
        Duration::from_millis(self.initial_settle_ms)
    }
}

/// Settle delays applied by the executor after each kind of action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionTimings {
    pub click_settle_ms: u64,
    pub type_settle_ms: u64,
    pub key_delay_ms: u64,
    pub select_pause_ms: u64,
    pub enter_settle_ms: u64,
    pub wait_ms: u64,
    pub scroll_settle_ms: u64,
    pub scroll_px: i64,
}

impl Default for ActionTimings {
    fn default() -> Self {
        Self {
            click_settle_ms: 1_500,
            type_settle_ms: 500,
            key_delay_ms: 50,
            select_pause_ms: 100,
            enter_settle_ms: 2_000,
            wait_ms: 2_500,
            scroll_settle_ms: 1_000,
            scroll_px: 400,
        }
    }
}

impl ActionTimings {
    /// No delays at all. Useful against pages that render synchronously.
    pub fn instant() -> Self {
        Self {
            click_settle_ms: 0,
            type_settle_ms: 0,
            key_delay_ms: 0,
            select_pause_ms: 0,
            enter_settle_ms: 0,
            wait_ms: 0,
            scroll_settle_ms: 0,
            ..Self::default()
        }
    }
}

/// The shop being automated: where it lives, how its setup gate looks, and
/// the labels the planner should look for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteProfile {
    pub name: String,
    pub start_url: String,
    /// Postal code typed into the setup gate.
    pub setup_code: String,
    /// Matches the setup-code input when it is on screen.
    pub setup_input_selector: String,
    pub confirm_label: String,
    pub cookie_label: String,
    pub guest_label: String,
    pub add_label: String,
}

impl SiteProfile {
    pub fn mercadona() -> Self {
        Self {
            name: "Mercadona".to_string(),
            start_url: "https://tienda.mercadona.es/".to_string(),
            setup_code: "37001".to_string(),
            setup_input_selector:
                r#"input[placeholder*="postal"], input[placeholder*="CP"], input[name*="postal"]"#
                    .to_string(),
            confirm_label: "Continuar".to_string(),
            cookie_label: "Aceptar".to_string(),
            guest_label: "Continuar sin cuenta".to_string(),
            add_label: "Añadir".to_string(),
        }
    }
}

impl Default for SiteProfile {
    fn default() -> Self {
        Self::mercadona()
    }
}

/// Connection settings for an OpenAI-compatible chat-completions endpoint.
#[derive(Clone)]
pub struct OracleConfig {
    pub api_key: String,
    pub base_url: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

impl OracleConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            temperature: 0.1,
            max_tokens: 300,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Reads `OPENAI_API_KEY` and, optionally, `OPENAI_BASE_URL`.
    pub fn from_env() -> Result<Self, AgentError> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| AgentError::Config("OPENAI_API_KEY not set in environment".into()))?;
        let config = Self::new(api_key);
        Ok(match std::env::var("OPENAI_BASE_URL") {
            Ok(url) if !url.trim().is_empty() => config.with_base_url(url),
            _ => config,
        })
    }

    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

impl fmt::Debug for OracleConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OracleConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}
