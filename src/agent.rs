use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::brain::{Oracle, Planner};
use crate::config::AgentConfig;
use crate::dom;
use crate::error::AgentError;
use crate::executor::Executor;
use crate::hands::{Disposal, ExitKind, Session, SessionPolicy};
use crate::page::Page;
use crate::progress::{GoalCompletionOracle, GoalState, HeuristicCompletion};
use crate::types::{ActionKind, AgentAction, RunLogEntry, RunOutcome, Termination};

/// Receives each log entry as soon as it is recorded.
///
/// Implementations must return quickly and must not panic; the loop waits
/// for them.
pub trait ProgressObserver: Send + Sync {
    fn on_entry(&self, entry: &RunLogEntry);
}

impl<F> ProgressObserver for F
where
    F: Fn(&RunLogEntry) + Send + Sync,
{
    fn on_entry(&self, entry: &RunLogEntry) {
        self(entry)
    }
}

/// A finished run, plus the session if the policy left it open.
pub struct RunReport<S> {
    pub outcome: RunOutcome,
    pub session: Option<S>,
}

pub struct Agent {
    config: AgentConfig,
    planner: Planner,
    executor: Arc<Executor>,
    completion: Arc<dyn GoalCompletionOracle>,
    policy: SessionPolicy,
    run_timeout: Option<Duration>,
}

impl Agent {
    pub fn new(config: AgentConfig, oracle: Arc<dyn Oracle>) -> Result<Self, AgentError> {
        config.validate()?;
        let planner = Planner::new(oracle, config.site.clone(), config.history_window);
        let executor = Executor::new(config.timings, config.action_timeout());
        let completion = Arc::new(HeuristicCompletion::for_site(&config.site));
        Ok(Self {
            config,
            planner,
            executor: Arc::new(executor),
            completion,
            policy: SessionPolicy::default(),
            run_timeout: None,
        })
    }

    pub fn with_completion(mut self, completion: Arc<dyn GoalCompletionOracle>) -> Self {
        self.completion = completion;
        self
    }

    pub fn with_policy(mut self, policy: SessionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Cap the loop's wall-clock time. On expiry the run ends as
    /// [`Termination::TimedOut`] with its partial log, and the session is
    /// disposed like any graceful exit.
    pub fn with_run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout = Some(timeout);
        self
    }

    /// Open the shop in `session` and run the loop there.
    ///
    /// A failed navigation is a setup fault and ends the run before the first
    /// step. The session is then kept or closed according to the policy.
    pub async fn run_in_session<S: Session>(
        &self,
        session: S,
        goals: Vec<String>,
        observer: &dyn ProgressObserver,
    ) -> RunReport<S> {
        let page = session.page();
        let url = self.config.site.start_url.clone();

        info!(target: "agent", "navigating to {url}");
        let nav_page = page.clone();
        let nav_url = url.clone();
        let navigated = match tokio::task::spawn_blocking(move || nav_page.navigate(&nav_url)).await
        {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(AgentError::Navigation {
                url,
                reason: format!("{e:#}"),
            }),
            Err(e) => Err(AgentError::from(e)),
        };

        if let Err(err) = navigated {
            error!(target: "agent", "setup failed: {err}");
            let session = self.dispose(ExitKind::FatalFault, session).await;
            return RunReport {
                outcome: RunOutcome::setup_fault(goals),
                session,
            };
        }

        pause(self.config.initial_settle()).await;
        let outcome = self.run(page, goals, observer).await;
        let session = self.dispose(ExitKind::Graceful, session).await;
        RunReport { outcome, session }
    }

    /// The bounded agent loop on an already open page.
    pub async fn run(
        &self,
        page: Arc<dyn Page>,
        goals: Vec<String>,
        observer: &dyn ProgressObserver,
    ) -> RunOutcome {
        let mut state = GoalState::new(goals);
        let mut logs: Vec<RunLogEntry> = Vec::new();
        let mut history: Vec<String> = Vec::new();
        let mut termination = Termination::BudgetExhausted;
        let deadline = self.run_timeout.map(|timeout| Instant::now() + timeout);

        while state.step() < self.config.max_steps {
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                termination = Termination::TimedOut;
                break;
            }
            let step = state.advance_step();
            let objective = state.objective(&self.config.site);
            info!(target: "agent", "step {step}: {objective}");

            let attempt = self.step(&page, &state, &objective, &history);
            let result = match deadline {
                Some(deadline) => match tokio::time::timeout_at(deadline, attempt).await {
                    Ok(result) => result,
                    Err(_) => {
                        warn!(target: "agent", "step {step} abandoned at the run deadline");
                        termination = Termination::TimedOut;
                        break;
                    }
                },
                None => attempt.await,
            };

            match result {
                Ok((action, success)) => {
                    let entry = RunLogEntry::for_action(step, &action, success);
                    history.push(action.history_line(step, success));
                    observer.on_entry(&entry);
                    logs.push(entry);

                    if let Some(goal) = state.record(&action, success, self.completion.as_ref()) {
                        info!(target: "agent", "item added: {goal}");
                    }

                    if action.ends_run() {
                        termination = match action.action {
                            ActionKind::Done => Termination::Done,
                            _ => Termination::Failed,
                        };
                        info!(target: "agent", ?termination, "planner ended the run: {}", action.reason);
                        break;
                    }
                }
                Err(err) => {
                    warn!(target: "agent", "step {step} failed: {err}");
                    let entry = RunLogEntry::internal_error(step, &err.to_string());
                    observer.on_entry(&entry);
                    logs.push(entry);
                }
            }

            pause(self.config.step_settle()).await;
        }

        match termination {
            Termination::BudgetExhausted => {
                warn!(target: "agent", "step budget of {} exhausted", self.config.max_steps)
            }
            Termination::TimedOut => {
                warn!(target: "agent", "run exceeded its {:?} time limit", self.run_timeout)
            }
            _ => {}
        }

        let outcome = RunOutcome::new(termination, logs, state.into_remaining());
        info!(
            target: "agent",
            success = outcome.success,
            steps = outcome.logs.len(),
            "run finished"
        );
        outcome
    }

    /// extract → plan → execute, in order, each fully settled before the next.
    async fn step(
        &self,
        page: &Arc<dyn Page>,
        state: &GoalState,
        objective: &str,
        history: &[String],
    ) -> Result<(AgentAction, bool), AgentError> {
        let snapshot = {
            let page = page.clone();
            let target = self.config.site.setup_input_selector.clone();
            let max_elements = self.config.max_elements;
            tokio::task::spawn_blocking(move || dom::extract(page.as_ref(), &target, max_elements))
                .await??
        };

        let action = self
            .planner
            .plan(&snapshot, objective, state.remaining(), history)
            .await?;
        info!(target: "agent", "action: {} - {}", action.action, action.reason);

        let success = {
            let page = page.clone();
            let executor = self.executor.clone();
            let action = action.clone();
            tokio::task::spawn_blocking(move || executor.execute(page.as_ref(), &action)).await?
        };

        Ok((action, success))
    }

    async fn dispose<S: Session>(&self, exit: ExitKind, session: S) -> Option<S> {
        match self.policy.disposal(exit) {
            Disposal::LeaveOpen => {
                info!(target: "agent", "leaving the browser open for manual handoff");
                Some(session)
            }
            Disposal::Close => {
                match tokio::task::spawn_blocking(move || session.close()).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => warn!(target: "agent", "closing session failed: {e:#}"),
                    Err(e) => warn!(target: "agent", "closing session panicked: {e}"),
                }
                None
            }
        }
    }
}

async fn pause(duration: Duration) {
    if !duration.is_zero() {
        tokio::time::sleep(duration).await;
    }
}
