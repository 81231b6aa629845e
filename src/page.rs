//! The surface of a live page that the agent drives.
//!
//! Every method is blocking. The agent calls them from
//! `tokio::task::spawn_blocking`, the same way the Chrome session is driven.

use anyhow::{Result, bail};
use serde_json::Value;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modifier {
    Alt,
    Ctrl,
    Meta,
    Shift,
}

pub trait Page: Send + Sync {
    fn navigate(&self, url: &str) -> Result<()>;

    /// Evaluate a script and return its (by-value) result.
    fn evaluate(&self, script: &str) -> Result<Value>;

    /// Block until `css` matches an element or `timeout` passes.
    fn wait_for(&self, css: &str, timeout: Duration) -> Result<()>;

    /// A real pointer click on the first match for `css`.
    fn click(&self, css: &str) -> Result<()>;

    /// Type into whatever has focus, one character at a time.
    fn type_text(&self, text: &str, key_delay: Duration) -> Result<()>;

    fn press_key(&self, key: &str) -> Result<()>;

    fn press_key_with_modifiers(&self, key: &str, modifiers: &[Modifier]) -> Result<()>;

    /// Click the first `tag` element whose visible text contains `text`.
    /// Returns whether anything matched.
    fn click_first_with_text(&self, tag: &str, text: &str) -> Result<bool> {
        let clicked = self.evaluate(&scripts::click_first_with_text(tag, text))?;
        Ok(clicked.as_bool().unwrap_or(false))
    }

    /// Query `css` and fire a DOM click on it without waiting.
    fn dispatch_click(&self, css: &str) -> Result<bool> {
        let clicked = self.evaluate(&scripts::dispatch_click(css))?;
        Ok(clicked.as_bool().unwrap_or(false))
    }

    /// Focus the field and select its whole contents, like a triple click.
    fn select_contents(&self, css: &str) -> Result<()> {
        let selected = self.evaluate(&scripts::select_contents(css))?;
        if !selected.as_bool().unwrap_or(false) {
            bail!("no element matches {css}");
        }
        Ok(())
    }

    fn scroll_by(&self, dy: i64) -> Result<()> {
        self.evaluate(&format!("(() => {{ window.scrollBy(0, {dy}); return true; }})()"))?;
        Ok(())
    }
}

pub(crate) mod scripts {
    /// Quote a Rust string as a JS string literal.
    pub fn literal(s: &str) -> String {
        serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
    }

    pub fn click_first_with_text(tag: &str, text: &str) -> String {
        format!(
            r#"(() => {{
  const needle = {text};
  for (const el of document.querySelectorAll({tag})) {{
    if ((el.innerText || '').includes(needle)) {{
      el.click();
      return true;
    }}
  }}
  return false;
}})()"#,
            tag = literal(tag),
            text = literal(text),
        )
    }

    pub fn dispatch_click(css: &str) -> String {
        format!(
            r#"(() => {{
  try {{
    const el = document.querySelector({css});
    if (!el) return false;
    el.click();
    return true;
  }} catch (e) {{
    return false;
  }}
}})()"#,
            css = literal(css),
        )
    }

    pub fn select_contents(css: &str) -> String {
        format!(
            r#"(() => {{
  const el = document.querySelector({css});
  if (!el) return false;
  el.focus();
  if (typeof el.select === 'function') {{
    el.select();
  }} else {{
    const range = document.createRange();
    range.selectNodeContents(el);
    const selection = window.getSelection();
    selection.removeAllRanges();
    selection.addRange(range);
  }}
  return true;
}})()"#,
            css = literal(css),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::scripts;

    #[test]
    fn literals_escape_quotes() {
        assert_eq!(scripts::literal(r#"a"b"#), r#""a\"b""#);
    }

    #[test]
    fn text_click_script_embeds_tag_and_needle() {
        let script = scripts::click_first_with_text("a", "Aceptar");
        assert!(script.contains(r#"document.querySelectorAll("a")"#));
        assert!(script.contains(r#"const needle = "Aceptar";"#));
    }
}
