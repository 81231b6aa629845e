use anyhow::{Context, Result, anyhow};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::ActionTimings;
use crate::locator::Locator;
use crate::page::{Modifier, Page};
use crate::types::{ActionKind, AgentAction};

/// Performs planner actions against a page.
///
/// Every action is followed by a settle delay; the page renders
/// asynchronously and the next snapshot must see the result.
#[derive(Debug, Clone)]
pub struct Executor {
    timings: ActionTimings,
    action_timeout: Duration,
}

impl Executor {
    pub fn new(timings: ActionTimings, action_timeout: Duration) -> Self {
        Self {
            timings,
            action_timeout,
        }
    }

    /// Run one action. Never fails: anything that goes wrong is logged and
    /// reported as `false`.
    pub fn execute(&self, page: &dyn Page, action: &AgentAction) -> bool {
        if let Some(field) = action.missing_field() {
            warn!(target: "executor", "{} is missing its {field}", action.action);
            return false;
        }

        let selector = action.selector.as_deref().unwrap_or_default();
        let text = action.text.as_deref().unwrap_or_default();

        let outcome = match action.action {
            ActionKind::Click => self.click(page, selector),
            ActionKind::Type => self.type_into(page, selector, text),
            ActionKind::ClearAndType => self.clear_and_type(page, selector, text),
            ActionKind::PressEnter => self.press_enter(page),
            ActionKind::Wait => {
                pause(self.timings.wait_ms);
                Ok(true)
            }
            ActionKind::Scroll => self.scroll(page),
            ActionKind::Done => Ok(true),
            ActionKind::Error => Ok(!action.malformed),
        };

        match outcome {
            Ok(success) => success,
            Err(e) => {
                warn!(target: "executor", "{} failed: {e:#}", action.action);
                false
            }
        }
    }

    fn click(&self, page: &dyn Page, selector: &str) -> Result<bool> {
        let locator = Locator::parse(selector);

        match self.click_locator(page, &locator) {
            Ok(true) => {
                pause(self.timings.click_settle_ms);
                return Ok(true);
            }
            Ok(false) => debug!(target: "executor", "no element for {locator}"),
            Err(e) => debug!(target: "executor", "primary click on {locator} failed: {e:#}"),
        }

        let Some(css) = locator.to_css() else {
            return Ok(false);
        };
        if page.dispatch_click(&css)? {
            pause(self.timings.click_settle_ms);
            return Ok(true);
        }
        Ok(false)
    }

    /// Resolve a locator to an element and click it.
    fn click_locator(&self, page: &dyn Page, locator: &Locator) -> Result<bool> {
        match locator {
            Locator::ByVisibleText { tag, text } => page.click_first_with_text(tag, text),
            Locator::ByTestId { .. }
            | Locator::ById { .. }
            | Locator::ByAriaLabel { .. }
            | Locator::ByCssCompound { .. } => {
                let css = locator.to_string();
                page.wait_for(&css, self.action_timeout)?;
                page.click(&css)?;
                Ok(true)
            }
        }
    }

    fn type_into(&self, page: &dyn Page, selector: &str, text: &str) -> Result<bool> {
        let css = field_css(selector)?;
        page.wait_for(&css, self.action_timeout)?;
        page.click(&css)?;
        page.type_text(text, self.key_delay())?;
        pause(self.timings.type_settle_ms);
        Ok(true)
    }

    /// Replace the field's contents instead of appending to them.
    fn clear_and_type(&self, page: &dyn Page, selector: &str, text: &str) -> Result<bool> {
        let css = field_css(selector)?;

        let primary = (|| -> Result<()> {
            page.wait_for(&css, self.action_timeout)?;
            page.select_contents(&css)?;
            pause(self.timings.select_pause_ms);
            page.press_key("Backspace")?;
            pause(self.timings.select_pause_ms);
            page.type_text(text, self.key_delay())
        })();

        if let Err(e) = primary {
            debug!(target: "executor", "select-and-replace on {css} failed, retrying with Ctrl+A: {e:#}");
            page.click(&css)?;
            page.press_key_with_modifiers("a", &[Modifier::Ctrl])?;
            page.press_key("Backspace")?;
            page.type_text(text, self.key_delay())
                .context("typing after select-all")?;
        }

        pause(self.timings.type_settle_ms);
        Ok(true)
    }

    fn press_enter(&self, page: &dyn Page) -> Result<bool> {
        page.press_key("Enter")?;
        pause(self.timings.enter_settle_ms);
        Ok(true)
    }

    fn scroll(&self, page: &dyn Page) -> Result<bool> {
        page.scroll_by(self.timings.scroll_px)?;
        pause(self.timings.scroll_settle_ms);
        Ok(true)
    }

    fn key_delay(&self) -> Duration {
        Duration::from_millis(self.timings.key_delay_ms)
    }
}

fn field_css(selector: &str) -> Result<String> {
    Locator::parse(selector)
        .to_css()
        .ok_or_else(|| anyhow!("{selector} cannot address an input field"))
}

fn pause(ms: u64) {
    if ms > 0 {
        std::thread::sleep(Duration::from_millis(ms));
    }
}
