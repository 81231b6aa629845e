mod common;

use cart_agent::config::ActionTimings;
use cart_agent::executor::Executor;
use cart_agent::{ActionKind, AgentAction};
use common::FakePage;
use std::time::Duration;

fn executor() -> Executor {
    Executor::new(ActionTimings::instant(), Duration::from_millis(10))
}

#[test]
fn actions_missing_required_fields_fail_without_touching_the_page() {
    let page = FakePage::with_elements(&["#q"]);
    let cases = [
        AgentAction::new(ActionKind::Click, "no selector"),
        AgentAction::new(ActionKind::Type, "no selector").with_text("milk"),
        AgentAction::new(ActionKind::Type, "no text").with_selector("#q"),
        AgentAction::new(ActionKind::ClearAndType, "no text").with_selector("#q"),
        AgentAction::new(ActionKind::ClearAndType, "nothing"),
    ];
    for action in &cases {
        assert!(!executor().execute(&page, action), "{action:?}");
    }
    assert!(page.clicks().is_empty());
}

#[test]
fn clear_and_type_replaces_previous_contents() {
    let page = FakePage::new().with_field("#search", "");
    let exec = executor();

    let first = AgentAction::new(ActionKind::ClearAndType, "search milk")
        .with_selector("#search")
        .with_text("leche");
    let second = AgentAction::new(ActionKind::ClearAndType, "search bread")
        .with_selector("#search")
        .with_text("pan");

    assert!(exec.execute(&page, &first));
    assert_eq!(page.field("#search"), "leche");
    assert!(exec.execute(&page, &second));
    assert_eq!(page.field("#search"), "pan");
}

#[test]
fn clear_and_type_falls_back_to_select_all_shortcut() {
    let page = FakePage::new().with_field("#search", "leche entera");
    page.state.lock().unwrap().fail_select = true;

    let action = AgentAction::new(ActionKind::ClearAndType, "search bread")
        .with_selector("#search")
        .with_text("pan");
    assert!(executor().execute(&page, &action));
    assert_eq!(page.field("#search"), "pan");
    assert!(
        page.state
            .lock()
            .unwrap()
            .keys
            .iter()
            .any(|k| k == "[Ctrl]+a")
    );
}

#[test]
fn plain_type_appends() {
    let page = FakePage::new().with_field("#search", "le");
    let action = AgentAction::new(ActionKind::Type, "finish word")
        .with_selector("#search")
        .with_text("che");
    assert!(executor().execute(&page, &action));
    assert_eq!(page.field("#search"), "leche");
}

#[test]
fn type_into_missing_field_fails() {
    let page = FakePage::new();
    let action = AgentAction::new(ActionKind::Type, "postal")
        .with_selector("#postal")
        .with_text("37001");
    assert!(!executor().execute(&page, &action));
}

#[test]
fn text_fallback_clicks_first_matching_tag() {
    let page = FakePage::new();
    page.state.lock().unwrap().texts = vec![
        ("button".into(), "Aceptar".into()),
        ("a".into(), "Ver política".into()),
        ("a".into(), "Aceptar todas".into()),
        ("a".into(), "Aceptar solo necesarias".into()),
    ];

    let action =
        AgentAction::new(ActionKind::Click, "accept cookies").with_selector(r#"a:has-text("Aceptar")"#);
    assert!(executor().execute(&page, &action));
    assert_eq!(page.clicks(), vec!["a[Aceptar todas]"]);
}

#[test]
fn text_fallback_without_match_fails() {
    let page = FakePage::new();
    let action =
        AgentAction::new(ActionKind::Click, "close").with_selector(r#"button:has-text("Cerrar")"#);
    assert!(!executor().execute(&page, &action));
}

#[test]
fn click_waits_then_clicks() {
    let page = FakePage::with_elements(&["button.continue"]);
    let action = AgentAction::new(ActionKind::Click, "confirm").with_selector("button.continue");
    assert!(executor().execute(&page, &action));
    assert_eq!(page.clicks(), vec!["button.continue"]);
}

#[test]
fn click_falls_back_to_direct_dispatch() {
    let page = FakePage::new();
    page.state
        .lock()
        .unwrap()
        .detached
        .insert(r#"[data-testid="product-add"]"#.to_string());

    let action = AgentAction::new(ActionKind::Click, "Añadir")
        .with_selector(r#"[data-testid="product-add"]"#);
    assert!(executor().execute(&page, &action));
    assert_eq!(page.clicks(), vec![r#"dispatch:[data-testid="product-add"]"#]);
}

#[test]
fn click_on_absent_element_fails() {
    let page = FakePage::new();
    let action = AgentAction::new(ActionKind::Click, "ghost").with_selector("#nowhere");
    assert!(!executor().execute(&page, &action));
}

#[test]
fn scroll_enter_and_wait_succeed() {
    let page = FakePage::new();
    let exec = executor();

    assert!(exec.execute(&page, &AgentAction::new(ActionKind::Scroll, "look further")));
    assert!(exec.execute(&page, &AgentAction::new(ActionKind::PressEnter, "search")));
    assert!(exec.execute(&page, &AgentAction::new(ActionKind::Wait, "loading")));

    let state = page.state.lock().unwrap();
    assert_eq!(state.scrolled, 400);
    assert_eq!(state.keys, vec!["Enter"]);
}

#[test]
fn terminal_actions_report_success_unless_malformed() {
    let page = FakePage::new();
    let exec = executor();
    assert!(exec.execute(&page, &AgentAction::new(ActionKind::Done, "all added")));
    assert!(exec.execute(&page, &AgentAction::new(ActionKind::Error, "stuck")));
    assert!(!exec.execute(&page, &AgentAction::malformed("could not interpret")));
}
