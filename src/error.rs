use thiserror::Error;

/// Faults the agent reports to its caller.
///
/// Only [`AgentError::Launch`] and [`AgentError::Navigation`] end a run; the
/// others are isolated to the step that raised them.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("browser launch failed: {0}")]
    Launch(String),

    #[error("could not open {url}: {reason}")]
    Navigation { url: String, reason: String },

    #[error("planner oracle failed: {0}")]
    Oracle(#[from] OracleError),

    #[error("page snapshot failed: {0}")]
    Snapshot(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("blocking page task aborted: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Transport-level failures talking to the language-model endpoint.
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("request to planner endpoint failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("planner endpoint returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("planner response had no message content")]
    EmptyResponse,
}
