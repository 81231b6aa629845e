//! A browser agent that fills an online shopping cart.
//!
//! Each step captures a bounded snapshot of the live page ([`dom`]), asks a
//! language model for one action ([`brain`]), performs it ([`executor`]) and
//! folds the result into the run's progress ([`progress`]). [`agent`] ties
//! the steps into a bounded loop; [`hands`] owns the Chrome session and
//! [`face`] is the HTTP front end.

pub mod agent;
pub mod brain;
pub mod config;
pub mod dom;
pub mod error;
pub mod executor;
pub mod face;
pub mod hands;
pub mod locator;
pub mod page;
pub mod progress;
pub mod types;

pub use agent::{Agent, ProgressObserver, RunReport};
pub use brain::{OpenAiOracle, Oracle, Planner};
pub use config::{ActionTimings, AgentConfig, OracleConfig, SiteProfile};
pub use error::{AgentError, OracleError};
pub use locator::Locator;
pub use page::Page;
pub use progress::{GoalCompletionOracle, HeuristicCompletion};
pub use types::{ActionKind, AgentAction, RunLogEntry, RunOutcome, Termination};
