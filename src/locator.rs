use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::truncate_chars;

const HAS_TEXT_OPEN: &str = ":has-text(\"";

/// Longest visible text carried by a [`Locator::ByVisibleText`].
pub const VISIBLE_TEXT_MAX_CHARS: usize = 30;

/// A best-effort way of finding one element again.
///
/// The in-page snapshot script emits these as `{"kind": "byTestId", ...}`;
/// the planner sees and returns their rendered string form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Locator {
    ByTestId { value: String },
    ById { value: String },
    ByAriaLabel { value: String },
    ByCssCompound { css: String },
    /// `tag:has-text("…")`. Not a query selector; resolved by scanning `tag`
    /// elements for visible text containing `text`.
    ByVisibleText { tag: String, text: String },
}

impl Locator {
    pub fn visible_text(tag: impl Into<String>, text: &str) -> Self {
        Locator::ByVisibleText {
            tag: tag.into(),
            text: truncate_chars(text.trim(), VISIBLE_TEXT_MAX_CHARS),
        }
    }

    /// Read a selector string coming back from the planner.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();

        if let Some(locator) = parse_has_text(raw) {
            return locator;
        }
        if let Some(value) = attribute_value(raw, "data-testid") {
            return Locator::ByTestId { value };
        }
        if let Some(value) = attribute_value(raw, "aria-label") {
            return Locator::ByAriaLabel { value };
        }
        if let Some(id) = raw.strip_prefix('#') {
            if !id.is_empty() && !id.contains(|c: char| " .#[]:>+~,()".contains(c)) {
                return Locator::ById {
                    value: id.to_string(),
                };
            }
        }
        Locator::ByCssCompound {
            css: raw.to_string(),
        }
    }

    /// The standard query selector for this locator, if it has one.
    pub fn to_css(&self) -> Option<String> {
        match self {
            Locator::ByVisibleText { .. } => None,
            other => Some(other.to_string()),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::ByTestId { value } => write!(f, "[data-testid=\"{value}\"]"),
            Locator::ById { value } => write!(f, "#{value}"),
            Locator::ByAriaLabel { value } => write!(f, "[aria-label=\"{value}\"]"),
            Locator::ByCssCompound { css } => f.write_str(css),
            Locator::ByVisibleText { tag, text } => write!(f, "{tag}:has-text(\"{text}\")"),
        }
    }
}

fn parse_has_text(raw: &str) -> Option<Locator> {
    let start = raw.find(HAS_TEXT_OPEN)?;
    let rest = &raw[start + HAS_TEXT_OPEN.len()..];
    let end = rest.find('"')?;
    let text = &rest[..end];
    if text.is_empty() || !rest[end + 1..].starts_with(')') {
        return None;
    }
    let tag = raw[..start].split(':').next().unwrap_or_default();
    Some(Locator::ByVisibleText {
        tag: if tag.is_empty() { "*".to_string() } else { tag.to_string() },
        text: text.to_string(),
    })
}

fn attribute_value(raw: &str, attribute: &str) -> Option<String> {
    let inner = raw.strip_prefix('[')?.strip_suffix(']')?;
    let value = inner.strip_prefix(attribute)?.strip_prefix('=')?;
    let value = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))?;
    if value.contains(['"', '\'', ']']) {
        return None;
    }
    Some(value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_text_fallback_marker() {
        assert_eq!(
            Locator::parse(r#"a:has-text("Aceptar")"#),
            Locator::ByVisibleText {
                tag: "a".into(),
                text: "Aceptar".into()
            }
        );
    }

    #[test]
    fn text_fallback_without_tag_scans_everything() {
        assert_eq!(
            Locator::parse(r#":has-text("Añadir")"#),
            Locator::ByVisibleText {
                tag: "*".into(),
                text: "Añadir".into()
            }
        );
    }

    #[test]
    fn text_fallback_has_no_css_form() {
        let locator = Locator::visible_text("button", "  Continuar  ");
        assert_eq!(locator.to_css(), None);
        assert_eq!(locator.to_string(), r#"button:has-text("Continuar")"#);
    }

    #[test]
    fn parses_attribute_locators() {
        assert_eq!(
            Locator::parse(r#"[data-testid="product-add"]"#),
            Locator::ByTestId {
                value: "product-add".into()
            }
        );
        assert_eq!(
            Locator::parse(r#"[aria-label="Buscar productos"]"#),
            Locator::ByAriaLabel {
                value: "Buscar productos".into()
            }
        );
    }

    #[test]
    fn simple_hash_is_an_id_but_compound_is_css() {
        assert_eq!(
            Locator::parse("#postal"),
            Locator::ById {
                value: "postal".into()
            }
        );
        assert_eq!(
            Locator::parse("#form input.code"),
            Locator::ByCssCompound {
                css: "#form input.code".into()
            }
        );
    }

    #[test]
    fn rendered_selectors_parse_back() {
        for locator in [
            Locator::ByTestId { value: "x".into() },
            Locator::ById { value: "search".into() },
            Locator::ByAriaLabel { value: "Cerrar".into() },
            Locator::ByCssCompound { css: "button.primary.big".into() },
            Locator::visible_text("a", "Aceptar todas"),
        ] {
            assert_eq!(Locator::parse(&locator.to_string()), locator);
        }
    }

    #[test]
    fn multi_attribute_and_descendant_selectors_stay_verbatim() {
        for raw in [
            "[data-testid='product'][aria-label='Añadir']",
            "[aria-label='Cerrar'] button",
            "[data-testid='product-cell'] [aria-label='Añadir al carro']",
            r#"[data-testid="a"][data-testid="b"]"#,
        ] {
            let locator = Locator::parse(raw);
            assert_eq!(locator, Locator::ByCssCompound { css: raw.into() });
            assert_eq!(locator.to_css().as_deref(), Some(raw));
        }
    }

    #[test]
    fn single_quoted_attribute_is_still_recognized() {
        assert_eq!(
            Locator::parse("[data-testid='product-add']"),
            Locator::ByTestId {
                value: "product-add".into()
            }
        );
    }

    #[test]
    fn deserializes_script_payload() {
        let locator: Locator =
            serde_json::from_str(r#"{"kind":"byVisibleText","tag":"a","text":"Aceptar"}"#)
                .unwrap();
        assert_eq!(locator.to_string(), r#"a:has-text("Aceptar")"#);
    }
}
