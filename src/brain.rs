use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::{OracleConfig, SiteProfile};
use crate::dom::PageSnapshot;
use crate::error::OracleError;
use crate::types::{ActionKind, AgentAction, truncate_chars};

/// A stateless language-model call: one prompt in, raw text out.
#[async_trait]
pub trait Oracle: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, OracleError>;
}

/// Chat-completions client for OpenAI and compatible endpoints.
pub struct OpenAiOracle {
    client: Client,
    config: OracleConfig,
    model: String,
}

impl OpenAiOracle {
    pub fn new(config: OracleConfig, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            config,
            model: model.into(),
        }
    }
}

#[async_trait]
impl Oracle for OpenAiOracle {
    async fn complete(&self, prompt: &str) -> Result<String, OracleError> {
        let response = self
            .client
            .post(self.config.completions_url())
            .bearer_auth(&self.config.api_key)
            .json(&json!({
                "model": self.model,
                "messages": [{"role": "user", "content": prompt}],
                "temperature": self.config.temperature,
                "max_tokens": self.config.max_tokens,
                "response_format": {"type": "json_object"},
            }))
            .send()
            .await?;

        let status = response.status();
        let body: Value = response.json().await?;

        if !status.is_success() {
            let message = body["error"]["message"]
                .as_str()
                .unwrap_or("Unknown API error")
                .to_string();
            warn!(target: "brain", "API error ({status}): {message}");
            return Err(OracleError::Status {
                status: status.as_u16(),
                message,
            });
        }

        body["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or(OracleError::EmptyResponse)
    }
}

/// Turns page state into exactly one [`AgentAction`].
pub struct Planner {
    oracle: Arc<dyn Oracle>,
    site: SiteProfile,
    history_window: usize,
}

impl Planner {
    pub fn new(oracle: Arc<dyn Oracle>, site: SiteProfile, history_window: usize) -> Self {
        Self {
            oracle,
            site,
            history_window,
        }
    }

    /// Ask the oracle for the next action.
    ///
    /// Output that cannot be read is coerced into a malformed `error`
    /// action; only transport failures come back as `Err`.
    pub async fn plan(
        &self,
        snapshot: &PageSnapshot,
        objective: &str,
        remaining: &[String],
        history: &[String],
    ) -> Result<AgentAction, OracleError> {
        let prompt = build_prompt(
            &self.site,
            snapshot,
            objective,
            remaining,
            recent(history, self.history_window),
        );
        let content = self.oracle.complete(&prompt).await?;
        debug!(target: "brain", "LLM says: {content}");
        Ok(parse_action(&content))
    }
}

/// The tail of `history`, at most `window` lines long.
pub fn recent(history: &[String], window: usize) -> &[String] {
    &history[history.len().saturating_sub(window)..]
}

pub fn build_prompt(
    site: &SiteProfile,
    snapshot: &PageSnapshot,
    objective: &str,
    remaining: &[String],
    history: &[String],
) -> String {
    let goals = if remaining.is_empty() {
        "None, all items added".to_string()
    } else {
        remaining
            .iter()
            .enumerate()
            .map(|(i, item)| format!("{}. {item}", i + 1))
            .collect::<Vec<_>>()
            .join("\n")
    };
    let history = if history.is_empty() {
        "No previous actions".to_string()
    } else {
        history.join("\n")
    };

    format!(
        r#"You are an AI agent that automates grocery shopping on the {name} web shop ({url}).

CURRENT OBJECTIVE: {objective}

ITEMS STILL TO ADD TO THE CART:
{goals}

ACTION HISTORY (most recent last):
{history}

CURRENT PAGE CONTEXT:
{snapshot}

Analyse the page and decide the NEXT action. Reply ONLY with a valid JSON object:
{{
  "action": "click" | "type" | "clear_and_type" | "press_enter" | "wait" | "scroll" | "done" | "error",
  "selector": "CSS selector of the element",
  "text": "text to type (type/clear_and_type only)",
  "reason": "short explanation"
}}

EXPECTED FLOW:
1. Landing page: type the postal code "{code}" into its input
2. IMPORTANT: after typing the postal code, CLICK the "{confirm}" button (do not just press Enter)
3. If a popup asks whether you have an account, click "{guest}" or any option to continue without one
4. Use the search bar to look for products
5. For EVERY new product use "clear_and_type" so the previous search is removed first
6. In the results, click "{add}" next to the right product
7. Repeat for each product

RULES:
- If there is a cookie banner, close it (look for "{cookie}")
- Selectors of the form tag:has-text("...") are allowed and match an element by its visible text
- To add to the cart look for buttons with "{add}", "+" or a cart icon
- Use "wait" if the page is still loading
- Use "scroll" if the product is not on screen
- Use "done" when ALL products have been added
- Use "error" only if something keeps failing (more than 3 attempts)

Reply with the JSON object only, no extra explanation."#,
        name = site.name,
        url = site.start_url,
        code = site.setup_code,
        confirm = site.confirm_label,
        guest = site.guest_label,
        add = site.add_label,
        cookie = site.cookie_label,
        snapshot = snapshot.to_prompt_json(),
    )
}

/// Read planner output into an action, never failing.
pub fn parse_action(content: &str) -> AgentAction {
    let uninterpretable = || {
        AgentAction::malformed(format!(
            "could not interpret planner output: {}",
            truncate_chars(content, 100)
        ))
    };

    let cleaned = strip_code_fences(content);
    let Ok(Value::Object(map)) = serde_json::from_str::<Value>(&cleaned) else {
        return uninterpretable();
    };
    let Some(kind) = map
        .get("action")
        .and_then(Value::as_str)
        .and_then(ActionKind::parse)
    else {
        return uninterpretable();
    };

    AgentAction {
        action: kind,
        selector: string_field(&map, "selector"),
        text: string_field(&map, "text"),
        reason: string_field(&map, "reason").unwrap_or_else(|| "no reason given".to_string()),
        malformed: false,
    }
}

/// Remove ```json and ``` markers wherever they appear.
pub fn strip_code_fences(content: &str) -> String {
    let mut out = String::with_capacity(content.len());
    let mut rest = content;
    while let Some(idx) = rest.find("```") {
        out.push_str(&rest[..idx]);
        rest = &rest[idx + 3..];
        if rest.get(..4).is_some_and(|tag| tag.eq_ignore_ascii_case("json")) {
            rest = &rest[4..];
        }
    }
    out.push_str(rest);
    out.trim().to_string()
}

fn string_field(map: &Map<String, Value>, key: &str) -> Option<String> {
    let value = match map.get(key)? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!value.is_empty()).then_some(value)
}
