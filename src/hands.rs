use anyhow::Result;
use headless_chrome::browser::tab::ModifierKey;
use headless_chrome::{Browser, LaunchOptions, Tab};
use serde_json::Value;
use std::ffi::OsStr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::AgentError;
use crate::page::{Modifier, Page};

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// A driving session owned by exactly one run.
pub trait Session: Send + 'static {
    fn page(&self) -> Arc<dyn Page>;

    /// Tear the session down. Blocking.
    fn close(self) -> Result<()>
    where
        Self: Sized;
}

/// What happens to a session when a run ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposal {
    /// Hand the live session back so a human can inspect or continue.
    LeaveOpen,
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitKind {
    Graceful,
    FatalFault,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionPolicy {
    pub on_graceful_exit: Disposal,
    pub on_fatal_fault: Disposal,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            on_graceful_exit: Disposal::LeaveOpen,
            on_fatal_fault: Disposal::Close,
        }
    }
}

impl SessionPolicy {
    pub fn always_close() -> Self {
        Self {
            on_graceful_exit: Disposal::Close,
            on_fatal_fault: Disposal::Close,
        }
    }

    pub fn disposal(&self, exit: ExitKind) -> Disposal {
        match exit {
            ExitKind::Graceful => self.on_graceful_exit,
            ExitKind::FatalFault => self.on_fatal_fault,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BrowserOptions {
    pub headless: bool,
    pub chrome_path: Option<PathBuf>,
    /// Persistent profile so cookie consent and the postal code survive runs.
    pub profile_dir: Option<PathBuf>,
    /// Attach to an already running Chrome instead of launching one.
    pub debug_ws_url: Option<String>,
    pub user_agent: String,
    pub window_size: (u32, u32),
}

impl Default for BrowserOptions {
    fn default() -> Self {
        Self {
            headless: false,
            chrome_path: None,
            profile_dir: default_profile_dir(),
            debug_ws_url: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            window_size: (1366, 900),
        }
    }
}

pub fn default_profile_dir() -> Option<PathBuf> {
    dirs::cache_dir().map(|dir| dir.join("cart-agent").join("chrome-profile"))
}

/// A Chrome instance plus the tab the agent drives.
pub struct BrowserSession {
    browser: Browser,
    page: Arc<ChromePage>,
}

impl BrowserSession {
    pub fn launch(options: &BrowserOptions) -> Result<Self, AgentError> {
        Self::try_launch(options).map_err(|e| AgentError::Launch(format!("{e:#}")))
    }

    fn try_launch(options: &BrowserOptions) -> Result<Self> {
        if let Some(ws_url) = &options.debug_ws_url {
            info!(target: "hands", "attaching to existing Chrome at {ws_url}");
            let browser = Browser::connect(ws_url.clone())?;
            let tab = browser.new_tab()?;
            return Ok(Self::from_parts(browser, tab));
        }

        if let Some(dir) = &options.profile_dir {
            std::fs::create_dir_all(dir)?;
        }

        let launch = LaunchOptions {
            headless: options.headless,
            path: options.chrome_path.clone().or_else(find_chrome),
            user_data_dir: options.profile_dir.clone(),
            window_size: Some(options.window_size),
            args: vec![
                OsStr::new("--no-first-run"),
                OsStr::new("--no-default-browser-check"),
                OsStr::new("--disable-blink-features=AutomationControlled"),
                OsStr::new("--disable-infobars"),
                OsStr::new("--start-maximized"),
            ],
            // The session may be left open for a human after the run ends.
            idle_browser_timeout: Duration::from_secs(60 * 60),
            ..Default::default()
        };

        info!(target: "hands", headless = options.headless, "starting Chrome");
        let browser = Browser::new(launch)?;
        let tab = browser.new_tab()?;
        tab.set_user_agent(&options.user_agent, None, None)?;
        info!(target: "hands", "Chrome ready");

        Ok(Self::from_parts(browser, tab))
    }

    fn from_parts(browser: Browser, tab: Arc<Tab>) -> Self {
        Self {
            browser,
            page: Arc::new(ChromePage { tab }),
        }
    }
}

impl Session for BrowserSession {
    fn page(&self) -> Arc<dyn Page> {
        self.page.clone()
    }

    fn close(self) -> Result<()> {
        if let Err(e) = self.page.tab.close(true) {
            warn!(target: "hands", "closing tab failed: {e:#}");
        }
        drop(self.browser);
        info!(target: "hands", "browser session closed");
        Ok(())
    }
}

/// [`Page`] over a `headless_chrome` tab.
pub struct ChromePage {
    tab: Arc<Tab>,
}

impl Page for ChromePage {
    fn navigate(&self, url: &str) -> Result<()> {
        self.tab.navigate_to(url)?.wait_until_navigated()?;
        Ok(())
    }

    fn evaluate(&self, script: &str) -> Result<Value> {
        let result = self.tab.evaluate(script, false)?;
        Ok(result.value.unwrap_or(Value::Null))
    }

    fn wait_for(&self, css: &str, timeout: Duration) -> Result<()> {
        self.tab.wait_for_element_with_custom_timeout(css, timeout)?;
        Ok(())
    }

    fn click(&self, css: &str) -> Result<()> {
        self.tab.find_element(css)?.click()?;
        Ok(())
    }

    fn type_text(&self, text: &str, key_delay: Duration) -> Result<()> {
        for ch in text.chars() {
            self.tab.type_str(&ch.to_string())?;
            if !key_delay.is_zero() {
                std::thread::sleep(key_delay);
            }
        }
        Ok(())
    }

    fn press_key(&self, key: &str) -> Result<()> {
        self.tab.press_key(key)?;
        Ok(())
    }

    fn press_key_with_modifiers(&self, key: &str, modifiers: &[Modifier]) -> Result<()> {
        let modifiers: Vec<ModifierKey> = modifiers
            .iter()
            .map(|m| match m {
                Modifier::Alt => ModifierKey::Alt,
                Modifier::Ctrl => ModifierKey::Ctrl,
                Modifier::Meta => ModifierKey::Meta,
                Modifier::Shift => ModifierKey::Shift,
            })
            .collect();
        self.tab.press_key_with_modifiers(key, Some(&modifiers))?;
        Ok(())
    }
}

/// Look for a Chrome binary in the usual places. `None` lets
/// `headless_chrome` fall back to its own detection.
fn find_chrome() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("CHROME_PATH") {
        let path = PathBuf::from(path);
        if path.exists() {
            return Some(path);
        }
    }

    let mut candidates = vec![
        PathBuf::from("/usr/bin/google-chrome"),
        PathBuf::from("/usr/bin/google-chrome-stable"),
        PathBuf::from("/usr/bin/chromium"),
        PathBuf::from("/usr/bin/chromium-browser"),
        PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome"),
        PathBuf::from(r"C:\Program Files\Google\Chrome\Application\chrome.exe"),
        PathBuf::from(r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe"),
    ];
    if let Some(local) = dirs::data_local_dir() {
        candidates.push(local.join(r"Google\Chrome\Application\chrome.exe"));
    }

    candidates.into_iter().find(|p| p.exists())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_leaves_graceful_runs_open() {
        let policy = SessionPolicy::default();
        assert_eq!(policy.disposal(ExitKind::Graceful), Disposal::LeaveOpen);
        assert_eq!(policy.disposal(ExitKind::FatalFault), Disposal::Close);
        assert_eq!(
            SessionPolicy::always_close().disposal(ExitKind::Graceful),
            Disposal::Close
        );
    }

    #[test]
    fn profile_lives_under_the_cache_dir() {
        if let Some(dir) = default_profile_dir() {
            assert!(dir.ends_with("cart-agent/chrome-profile"));
        }
    }
}
