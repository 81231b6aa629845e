#![allow(dead_code)]

use anyhow::{Result, bail};
use async_trait::async_trait;
use cart_agent::config::ActionTimings;
use cart_agent::error::OracleError;
use cart_agent::hands::Session;
use cart_agent::page::{Modifier, Page};
use cart_agent::{AgentConfig, Oracle};
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// An in-memory page: a set of attached selectors, text fields keyed by
/// selector, and a list of (tag, innerText) pairs for text lookups.
#[derive(Default)]
pub struct FakeState {
    pub attached: HashSet<String>,
    /// Present in the DOM but never reported as attached by `wait_for`.
    pub detached: HashSet<String>,
    pub fields: HashMap<String, String>,
    pub texts: Vec<(String, String)>,
    pub focused: Option<String>,
    pub selected: bool,
    pub clicks: Vec<String>,
    pub keys: Vec<String>,
    pub navigations: Vec<String>,
    pub scrolled: i64,
    pub snapshot: String,
    pub fail_navigation: bool,
    pub fail_select: bool,
}

pub struct FakePage {
    pub state: Mutex<FakeState>,
}

impl FakePage {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState {
                snapshot: "{}".to_string(),
                ..FakeState::default()
            }),
        }
    }

    pub fn with_elements(selectors: &[&str]) -> Self {
        let page = Self::new();
        page.state
            .lock()
            .unwrap()
            .attached
            .extend(selectors.iter().map(|s| s.to_string()));
        page
    }

    pub fn with_field(self, selector: &str, value: &str) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.attached.insert(selector.to_string());
            state.fields.insert(selector.to_string(), value.to_string());
        }
        self
    }

    pub fn field(&self, selector: &str) -> String {
        self.state
            .lock()
            .unwrap()
            .fields
            .get(selector)
            .cloned()
            .unwrap_or_default()
    }

    pub fn clicks(&self) -> Vec<String> {
        self.state.lock().unwrap().clicks.clone()
    }

    fn exists(state: &FakeState, css: &str) -> bool {
        state.attached.contains(css) || state.detached.contains(css)
    }
}

impl Page for FakePage {
    fn navigate(&self, url: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_navigation {
            bail!("net::ERR_NAME_NOT_RESOLVED");
        }
        state.navigations.push(url.to_string());
        Ok(())
    }

    fn evaluate(&self, _script: &str) -> Result<Value> {
        Ok(Value::String(self.state.lock().unwrap().snapshot.clone()))
    }

    fn wait_for(&self, css: &str, _timeout: Duration) -> Result<()> {
        if self.state.lock().unwrap().attached.contains(css) {
            Ok(())
        } else {
            bail!("timed out waiting for {css}")
        }
    }

    fn click(&self, css: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if !Self::exists(&state, css) {
            bail!("no node found for {css}");
        }
        state.clicks.push(css.to_string());
        state.focused = Some(css.to_string());
        state.selected = false;
        Ok(())
    }

    fn type_text(&self, text: &str, _key_delay: Duration) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let Some(focused) = state.focused.clone() else {
            bail!("nothing focused");
        };
        let replace = std::mem::take(&mut state.selected);
        let field = state.fields.entry(focused).or_default();
        if replace {
            field.clear();
        }
        field.push_str(text);
        Ok(())
    }

    fn press_key(&self, key: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.keys.push(key.to_string());
        if key == "Backspace" {
            let selected = std::mem::take(&mut state.selected);
            if let Some(focused) = state.focused.clone() {
                let field = state.fields.entry(focused).or_default();
                if selected {
                    field.clear();
                } else {
                    field.pop();
                }
            }
        }
        Ok(())
    }

    fn press_key_with_modifiers(&self, key: &str, modifiers: &[Modifier]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.keys.push(format!("{modifiers:?}+{key}"));
        if key == "a" && modifiers.contains(&Modifier::Ctrl) && state.focused.is_some() {
            state.selected = true;
        }
        Ok(())
    }

    fn click_first_with_text(&self, tag: &str, text: &str) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        let hit = state
            .texts
            .iter()
            .find(|(t, inner)| (tag == "*" || t == tag) && inner.contains(text))
            .cloned();
        match hit {
            Some((t, inner)) => {
                state.clicks.push(format!("{t}[{inner}]"));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn dispatch_click(&self, css: &str) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        if Self::exists(&state, css) {
            state.clicks.push(format!("dispatch:{css}"));
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn select_contents(&self, css: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_select {
            bail!("select() is not available");
        }
        if !Self::exists(&state, css) {
            bail!("no element matches {css}");
        }
        state.focused = Some(css.to_string());
        state.selected = true;
        Ok(())
    }

    fn scroll_by(&self, dy: i64) -> Result<()> {
        self.state.lock().unwrap().scrolled += dy;
        Ok(())
    }
}

/// Replays canned oracle replies and records every prompt it was given.
pub struct ScriptedOracle {
    replies: Mutex<VecDeque<Result<String, OracleError>>>,
    fallback: String,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedOracle {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(|r| Ok(r.into())).collect()),
            fallback: r#"{"action":"wait","reason":"page is loading"}"#.to_string(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn with_failure_first(self, error: OracleError) -> Self {
        self.replies.lock().unwrap().push_front(Err(error));
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Oracle for ScriptedOracle {
    async fn complete(&self, prompt: &str) -> Result<String, OracleError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(self.fallback.clone()))
    }
}

pub struct FakeSession {
    pub page: Arc<FakePage>,
    pub closed: Arc<AtomicBool>,
}

impl FakeSession {
    pub fn new(page: Arc<FakePage>) -> Self {
        Self {
            page,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl Session for FakeSession {
    fn page(&self) -> Arc<dyn Page> {
        self.page.clone()
    }

    fn close(self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Default configuration with every delay removed.
pub fn instant_config() -> AgentConfig {
    AgentConfig {
        step_settle_ms: 0,
        initial_settle_ms: 0,
        timings: ActionTimings::instant(),
        ..AgentConfig::default()
    }
}
