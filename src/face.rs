use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{error, info, warn};

use crate::agent::Agent;
use crate::brain::OpenAiOracle;
use crate::config::{AgentConfig, OracleConfig};
use crate::hands::{BrowserOptions, BrowserSession};
use crate::progress::clean_goals;
use crate::types::{RunLogEntry, RunOutcome, Termination};

/// Events streamed to the operator page via SSE.
#[derive(Clone, Debug)]
pub enum AgentEvent {
    Started { items: Vec<String> },
    Step(RunLogEntry),
    Finished { success: bool, termination: Termination },
}

impl AgentEvent {
    fn to_sse_event(&self) -> Event {
        let (name, data) = match self {
            AgentEvent::Started { items } => ("started", json!({ "items": items })),
            AgentEvent::Step(entry) => ("step", json!(entry)),
            AgentEvent::Finished {
                success,
                termination,
            } => (
                "finished",
                json!({ "success": success, "termination": termination }),
            ),
        };
        Event::default().event(name).data(data.to_string())
    }
}

/// Shared state of the HTTP face.
pub struct AppState {
    pub config: AgentConfig,
    /// `None` when no API key is configured; runs are refused.
    pub oracle: Option<OracleConfig>,
    pub browser: BrowserOptions,
    /// Wall-clock cap for one run.
    pub run_timeout: Duration,
    pub event_tx: broadcast::Sender<AgentEvent>,
    run_lock: tokio::sync::Mutex<()>,
    /// Sessions left open for manual handoff; kept alive for the server's life.
    parked: Mutex<Vec<BrowserSession>>,
}

impl AppState {
    pub fn new(
        config: AgentConfig,
        oracle: Option<OracleConfig>,
        browser: BrowserOptions,
        run_timeout: Duration,
    ) -> Self {
        let (event_tx, _) = broadcast::channel::<AgentEvent>(64);
        Self {
            config,
            oracle,
            browser,
            run_timeout,
            event_tx,
            run_lock: tokio::sync::Mutex::new(()),
            parked: Mutex::new(Vec::new()),
        }
    }

    /// Claim the single run slot. `None` while another run holds it.
    pub fn try_begin_run(&self) -> Option<tokio::sync::MutexGuard<'_, ()>> {
        self.run_lock.try_lock().ok()
    }
}

#[derive(Deserialize)]
struct AgentRequest {
    #[serde(default)]
    items: Vec<String>,
}

#[derive(Serialize)]
struct AgentResponse {
    success: bool,
    logs: Vec<RunLogEntry>,
    message: String,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/agent", post(agent_handler))
        .route("/events", get(sse_handler))
        .route("/favicon.ico", get(|| async { StatusCode::NO_CONTENT }))
        .with_state(state)
}

/// Serve the face on `listener` until the process exits.
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> anyhow::Result<()> {
    info!(target: "face", "web UI running at http://{}", listener.local_addr()?);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

async fn agent_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<AgentRequest>,
) -> Response {
    let items = clean_goals(payload.items);
    if items.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "no items to buy");
    }

    let Some(oracle_config) = state.oracle.clone() else {
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "OPENAI_API_KEY is not configured",
        );
    };

    let Some(_guard) = state.try_begin_run() else {
        return error_response(StatusCode::CONFLICT, "a run is already in progress");
    };

    let oracle = Arc::new(OpenAiOracle::new(
        oracle_config,
        state.config.planner_model.clone(),
    ));
    let agent = match Agent::new(state.config.clone(), oracle) {
        Ok(agent) => agent.with_run_timeout(state.run_timeout),
        Err(e) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };

    info!(target: "face", "starting agent with items: {items:?}");
    let _ = state.event_tx.send(AgentEvent::Started {
        items: items.clone(),
    });

    let browser = state.browser.clone();
    let session = match tokio::task::spawn_blocking(move || BrowserSession::launch(&browser)).await
    {
        Ok(Ok(session)) => session,
        Ok(Err(e)) => {
            error!(target: "face", "{e}");
            return finish(&state, false, Termination::SetupFault, Vec::new(), e.to_string());
        }
        Err(e) => {
            error!(target: "face", "browser launch panicked: {e}");
            return finish(&state, false, Termination::SetupFault, Vec::new(), e.to_string());
        }
    };

    let observer = {
        let event_tx = state.event_tx.clone();
        move |entry: &RunLogEntry| {
            let _ = event_tx.send(AgentEvent::Step(entry.clone()));
        }
    };

    let report = agent.run_in_session(session, items, &observer).await;
    if let Some(session) = report.session {
        if let Ok(mut parked) = state.parked.lock() {
            parked.push(session);
        }
    }
    outcome_response(&state, report.outcome)
}

fn outcome_response(state: &AppState, outcome: RunOutcome) -> Response {
    if outcome.termination == Termination::TimedOut {
        warn!(target: "face", "run exceeded {:?}", state.run_timeout);
        let message = format!(
            "The run exceeded its {}s time limit. Check the browser to continue.",
            state.run_timeout.as_secs()
        );
        let response = finish(state, false, Termination::TimedOut, outcome.logs, message);
        return (StatusCode::GATEWAY_TIMEOUT, response).into_response();
    }
    let message = if outcome.success {
        "Items added to the cart. Check the browser.".to_string()
    } else {
        "The agent finished. Check the browser to complete the purchase.".to_string()
    };
    finish(state, outcome.success, outcome.termination, outcome.logs, message)
}

fn finish(
    state: &AppState,
    success: bool,
    termination: Termination,
    logs: Vec<RunLogEntry>,
    message: String,
) -> Response {
    let _ = state.event_tx.send(AgentEvent::Finished {
        success,
        termination,
    });
    Json(AgentResponse {
        success,
        logs,
        message,
    })
    .into_response()
}

async fn sse_handler(
    State(state): State<Arc<AppState>>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let rx = state.event_tx.subscribe();
    let stream =
        BroadcastStream::new(rx).filter_map(|result: Result<AgentEvent, _>| match result {
            Ok(event) => Some(Ok::<_, Infallible>(event.to_sse_event())),
            Err(_) => None,
        });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

const INDEX_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>Cart Agent</title>
<style>
  body { background: #0a0a0f; color: #e0e0e0; font-family: system-ui, sans-serif; max-width: 760px; margin: 0 auto; padding: 24px; }
  h1 { font-size: 20px; }
  textarea { width: 100%; height: 120px; background: #14141c; color: #e0e0e0; border: 1px solid #2a2a3a; border-radius: 8px; padding: 10px; }
  button { margin-top: 8px; padding: 8px 16px; background: #22c55e; border: 0; border-radius: 6px; color: #000; font-weight: 600; cursor: pointer; }
  button:disabled { background: #555; cursor: default; }
  .entry { padding: 8px 12px; margin-top: 6px; border-radius: 6px; background: #14141c; font-size: 14px; }
  .entry.fail { border-left: 3px solid #ef4444; }
  .entry.ok { border-left: 3px solid #22c55e; }
  .summary { margin-top: 12px; font-weight: 600; }
</style>
</head>
<body>
<h1>Cart Agent</h1>
<textarea id="items" placeholder="One item per line"></textarea>
<button id="go">Start</button>
<div id="log"></div>
<script>
  const log = document.getElementById('log');
  const go = document.getElementById('go');
  const add = (cls, text) => {
    const div = document.createElement('div');
    div.className = cls;
    div.textContent = text;
    log.appendChild(div);
  };
  go.addEventListener('click', async () => {
    const items = document.getElementById('items').value.split('\n').map(s => s.trim()).filter(Boolean);
    if (!items.length) return;
    log.innerHTML = '';
    go.disabled = true;
    try {
      const res = await fetch('/agent', {
        method: 'POST',
        headers: { 'Content-Type': 'application/json' },
        body: JSON.stringify({ items }),
      });
      const body = await res.json();
      add('summary', body.message || body.error);
    } finally {
      go.disabled = false;
    }
  });
  const es = new EventSource('/events');
  es.addEventListener('step', e => {
    const entry = JSON.parse(e.data);
    add('entry ' + (entry.success ? 'ok' : 'fail'), entry.step + '. ' + entry.action + ' | ' + entry.reason);
  });
</script>
</body>
</html>
"##;
