use anyhow::{Context, Result, anyhow, bail};
use cart_agent::config::DEFAULT_PLANNER_MODEL;
use cart_agent::face::{self, AppState};
use cart_agent::hands::{BrowserOptions, BrowserSession, SessionPolicy};
use cart_agent::progress::clean_goals;
use cart_agent::{Agent, AgentConfig, OpenAiOracle, OracleConfig, RunLogEntry, SiteProfile};
use clap::{Args, Parser, Subcommand};
use dotenvy::dotenv;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cart-agent", version, about = "Fill an online shopping cart with an LLM-driven browser agent")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one shopping session in a local Chrome.
    Run {
        /// Items to add to the cart, in order.
        #[arg(required = true)]
        items: Vec<String>,

        /// Close the browser when the run ends instead of leaving it open.
        #[arg(long)]
        close_on_exit: bool,

        #[command(flatten)]
        agent: AgentArgs,
    },
    /// Serve the web UI and the `/agent` endpoint.
    Serve {
        #[arg(long, env = "CART_AGENT_PORT", default_value_t = 3000)]
        port: u16,

        #[command(flatten)]
        agent: AgentArgs,
    },
}

#[derive(Args, Clone)]
struct AgentArgs {
    #[arg(long, env = "PLANNER_MODEL", default_value = DEFAULT_PLANNER_MODEL)]
    model: String,

    #[arg(long, default_value_t = 60)]
    max_steps: usize,

    #[arg(long, default_value_t = 8)]
    history_window: usize,

    #[arg(long, default_value_t = 40)]
    max_elements: usize,

    #[arg(long, default_value_t = 800)]
    step_settle_ms: u64,

    #[arg(long, default_value_t = 5_000)]
    action_timeout_ms: u64,

    /// Outer wall-clock cap for a whole run.
    #[arg(long, default_value_t = 300)]
    run_timeout_secs: u64,

    #[arg(long)]
    headless: bool,

    #[arg(long, env = "SHOP_POSTAL_CODE")]
    postal_code: Option<String>,

    #[arg(long, env = "SHOP_START_URL")]
    start_url: Option<String>,

    #[arg(long, env = "CHROME_PATH")]
    chrome_path: Option<PathBuf>,

    /// Attach to a running Chrome via its DevTools websocket URL.
    #[arg(long, env = "CHROME_WS_URL")]
    debug_ws_url: Option<String>,
}

impl AgentArgs {
    fn agent_config(&self) -> AgentConfig {
        let mut site = SiteProfile::default();
        if let Some(code) = &self.postal_code {
            site.setup_code = code.clone();
        }
        if let Some(url) = &self.start_url {
            site.start_url = url.clone();
        }
        AgentConfig {
            planner_model: self.model.clone(),
            max_steps: self.max_steps,
            step_settle_ms: self.step_settle_ms,
            action_timeout_ms: self.action_timeout_ms,
            history_window: self.history_window,
            max_elements: self.max_elements,
            site,
            ..AgentConfig::default()
        }
    }

    fn browser_options(&self) -> BrowserOptions {
        BrowserOptions {
            headless: self.headless,
            chrome_path: self.chrome_path.clone(),
            debug_ws_url: self.debug_ws_url.clone(),
            ..BrowserOptions::default()
        }
    }

    fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_secs)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,headless_chrome=warn,hyper=warn"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {
        Command::Run {
            items,
            close_on_exit,
            agent,
        } => run_once(agent, items, close_on_exit).await,
        Command::Serve { port, agent } => serve(agent, port).await,
    }
}

async fn run_once(args: AgentArgs, items: Vec<String>, close_on_exit: bool) -> Result<()> {
    let items = clean_goals(items);
    if items.is_empty() {
        bail!("no items to buy");
    }
    let config = args.agent_config();
    let oracle = OracleConfig::from_env()?;
    let policy = if close_on_exit {
        SessionPolicy::always_close()
    } else {
        SessionPolicy::default()
    };
    let agent = Agent::new(
        config.clone(),
        Arc::new(OpenAiOracle::new(oracle, config.planner_model.clone())),
    )?
    .with_policy(policy)
    .with_run_timeout(args.run_timeout());

    let browser = args.browser_options();
    let session = tokio::task::spawn_blocking(move || BrowserSession::launch(&browser))
        .await
        .map_err(|e| anyhow!("Browser launch panicked: {e}"))??;

    let observer = |entry: &RunLogEntry| {
        println!(
            "{:>3}. [{}] {} | {}",
            entry.step,
            if entry.success { "ok" } else { "FAIL" },
            entry.action,
            entry.reason
        );
    };

    let report = agent.run_in_session(session, items, &observer).await;

    let outcome = report.outcome;
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "success": outcome.success,
            "termination": outcome.termination,
            "remaining": outcome.remaining,
        }))
        .context("rendering run summary")?
    );
    if !outcome.success {
        warn!("the agent finished without adding every item");
    }

    if let Some(session) = report.session {
        info!("browser left open; press Ctrl+C to exit");
        tokio::signal::ctrl_c().await?;
        drop(session);
    }
    Ok(())
}

async fn serve(args: AgentArgs, port: u16) -> Result<()> {
    let oracle = match OracleConfig::from_env() {
        Ok(oracle) => Some(oracle),
        Err(e) => {
            error!("{e}; /agent will refuse runs");
            None
        }
    };
    let state = Arc::new(AppState::new(
        args.agent_config(),
        oracle,
        args.browser_options(),
        args.run_timeout(),
    ));

    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
        .await
        .with_context(|| format!("could not bind to port {port}"))?;
    face::serve(listener, state).await
}
