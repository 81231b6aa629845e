use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::AgentError;
use crate::locator::Locator;
use crate::page::{Page, scripts};
use crate::types::truncate_chars;

const TEXT_MAX_CHARS: usize = 80;
const CLASS_MAX_CHARS: usize = 80;
const VALUE_MAX_CHARS: usize = 50;
const LINK_TEXT_LIMIT: usize = 60;

/// JavaScript injected into the page to describe what can be acted on.
/// NON-DESTRUCTIVE: reads the DOM, never writes to it.
///
/// Elements are collected in four buckets (buttons, text inputs, links,
/// generic clickables) and kept only when their bounding box is non-empty
/// and intersects the viewport. An element whose description throws is
/// dropped. Each one carries the locator the script judged most stable.
/// The payload comes back as a JSON string so it survives `evaluate`
/// returning by value.
const SNAPSHOT_JS: &str = r#"
((targetSelector) => {
  const locatorFor = (el) => {
    const testId = el.getAttribute('data-testid');
    if (testId) return { kind: 'byTestId', value: testId };
    if (el.id) return { kind: 'byId', value: el.id };
    const aria = el.getAttribute('aria-label');
    if (aria) return { kind: 'byAriaLabel', value: aria };
    const tag = el.tagName.toLowerCase();
    if (typeof el.className === 'string' && el.className) {
      const classes = el.className.split(' ').filter(c => c && !c.includes(':') && c.length < 30);
      if (classes.length > 0) {
        const css = tag + '.' + classes.slice(0, 2).join('.');
        try {
          if (document.querySelectorAll(css).length === 1) return { kind: 'byCssCompound', css };
        } catch (e) {}
      }
    }
    const text = (el.innerText || '').trim().slice(0, 30);
    if (text) return { kind: 'byVisibleText', tag, text };
    return { kind: 'byCssCompound', css: tag };
  };

  const describe = (el) => {
    try {
      const rect = el.getBoundingClientRect();
      const visible = rect.width > 0 && rect.height > 0 &&
        rect.top < window.innerHeight && rect.bottom > 0;
      if (!visible) return null;
      return {
        tag: el.tagName.toLowerCase(),
        text: (el.innerText || '').slice(0, 200).trim(),
        placeholder: el.placeholder || '',
        ariaLabel: el.getAttribute('aria-label') || '',
        id: el.id || '',
        className: typeof el.className === 'string' ? el.className : '',
        type: typeof el.type === 'string' ? el.type : '',
        value: typeof el.value === 'string' ? el.value.slice(0, 100) : '',
        testId: el.getAttribute('data-testid') || '',
        locator: locatorFor(el),
      };
    } catch (e) {
      return null;
    }
  };

  const collect = (selector) =>
    Array.from(document.querySelectorAll(selector)).map(describe).filter(Boolean);

  let hasTargetInput = false;
  try { hasTargetInput = !!document.querySelector(targetSelector); } catch (e) {}

  return JSON.stringify({
    url: window.location.href,
    title: document.title,
    hasModal: !!document.querySelector('[role="dialog"], .modal, [class*="modal"], [class*="overlay"]'),
    hasTargetInput,
    buttons: collect('button, [role="button"], input[type="submit"], input[type="button"]'),
    inputs: collect('input[type="text"], input[type="search"], input[type="number"], input[type="tel"], input:not([type]), textarea'),
    links: collect('a[href]'),
    clickables: collect('[onclick], [data-testid], [role="listitem"], [role="option"]'),
  });
})
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    Button,
    Input,
    Link,
    Clickable,
}

/// One visible, actionable element as the planner sees it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementDescriptor {
    pub kind: ElementKind,
    pub tag: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub text: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub placeholder: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub aria_label: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub class_name: String,
    #[serde(rename = "type", skip_serializing_if = "String::is_empty")]
    pub input_type: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub value: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub test_id: String,
    pub selector: String,
}

/// A bounded, point-in-time view of the page. Rebuilt every iteration.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSnapshot {
    pub url: String,
    pub title: String,
    pub has_modal: bool,
    pub has_target_input: bool,
    pub elements: Vec<ElementDescriptor>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RawSnapshot {
    pub url: String,
    pub title: String,
    pub has_modal: bool,
    pub has_target_input: bool,
    pub buttons: Vec<RawElement>,
    pub inputs: Vec<RawElement>,
    pub links: Vec<RawElement>,
    pub clickables: Vec<RawElement>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RawElement {
    pub tag: String,
    pub text: String,
    pub placeholder: String,
    pub aria_label: String,
    pub id: String,
    pub class_name: String,
    #[serde(rename = "type")]
    pub input_type: String,
    pub value: String,
    pub test_id: String,
    pub locator: Option<Locator>,
}

impl RawElement {
    fn into_descriptor(self, kind: ElementKind) -> ElementDescriptor {
        let text = truncate_chars(self.text.trim(), TEXT_MAX_CHARS);
        let selector = match self.locator {
            Some(Locator::ByVisibleText { tag, text }) => Locator::visible_text(tag, &text),
            Some(locator) => locator,
            None => Locator::ByCssCompound {
                css: self.tag.clone(),
            },
        };
        ElementDescriptor {
            kind,
            tag: self.tag,
            text,
            placeholder: truncate_chars(&self.placeholder, TEXT_MAX_CHARS),
            aria_label: truncate_chars(&self.aria_label, TEXT_MAX_CHARS),
            id: self.id,
            class_name: truncate_chars(&self.class_name, CLASS_MAX_CHARS),
            input_type: self.input_type,
            value: truncate_chars(&self.value, VALUE_MAX_CHARS),
            test_id: self.test_id,
            selector: selector.to_string(),
        }
    }
}

impl PageSnapshot {
    /// Apply bucket filters, truncation and the element cap to a raw payload.
    /// Buckets are drained in order, so earlier ones win when the cap hits.
    pub fn from_raw(raw: RawSnapshot, max_elements: usize) -> Self {
        let buckets = [
            (ElementKind::Button, raw.buttons),
            (ElementKind::Input, raw.inputs),
            (ElementKind::Link, raw.links),
            (ElementKind::Clickable, raw.clickables),
        ];

        let elements = buckets
            .into_iter()
            .flat_map(|(kind, bucket)| bucket.into_iter().map(move |el| (kind, el)))
            .filter_map(|(kind, el)| {
                let descriptor = el.into_descriptor(kind);
                let keep = match kind {
                    ElementKind::Link => {
                        !descriptor.text.is_empty()
                            && descriptor.text.chars().count() < LINK_TEXT_LIMIT
                    }
                    ElementKind::Clickable => !descriptor.text.is_empty(),
                    ElementKind::Button | ElementKind::Input => true,
                };
                keep.then_some(descriptor)
            })
            .take(max_elements)
            .collect();

        Self {
            url: raw.url,
            title: raw.title,
            has_modal: raw.has_modal,
            has_target_input: raw.has_target_input,
            elements,
        }
    }

    pub fn to_prompt_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Capture a snapshot of the current page.
///
/// Per-element problems are absorbed by the script; only a failure of the
/// whole evaluation (page gone, payload not JSON) is returned.
pub fn extract(
    page: &dyn Page,
    target_input_selector: &str,
    max_elements: usize,
) -> Result<PageSnapshot, AgentError> {
    let script = format!("{SNAPSHOT_JS}({})", scripts::literal(target_input_selector));
    let value = page
        .evaluate(&script)
        .map_err(|e| AgentError::Snapshot(format!("{e:#}")))?;
    let payload = value
        .as_str()
        .ok_or_else(|| AgentError::Snapshot(format!("expected a JSON string, got {value}")))?;
    let raw: RawSnapshot =
        serde_json::from_str(payload).map_err(|e| AgentError::Snapshot(e.to_string()))?;

    let snapshot = PageSnapshot::from_raw(raw, max_elements);
    debug!(
        target: "dom",
        url = %snapshot.url,
        elements = snapshot.elements.len(),
        has_modal = snapshot.has_modal,
        "captured page snapshot"
    );
    Ok(snapshot)
}
