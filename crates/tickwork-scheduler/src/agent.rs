//! Agent lifecycle state machine shared by every schedule type.
//!
//! An [`Agent`] owns its state and locks and delegates *when* to run to a
//! [`Scheduler`]. Three locks are involved:
//!
//! - the change lock serialises `start`/`stop` and is held across the stop
//!   polling loop;
//! - the run lock is held for the whole task body, so a long run never
//!   blocks `stop` or status reads;
//! - the state cell is a short-lived mutex around the mutable fields.
//!
//! In-flight task bodies are never interrupted. `stop` waits for the current
//! run to finish (polling every [`STOP_POLL_INTERVAL`]) or gives up with a
//! timeout, leaving the agent running so the caller may retry.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use tickwork_core::{AgentConfiguration, AgentState};
use tracing::{debug, error, info, warn};

use crate::error::{AgentError, Result};
use crate::history::ExecutionHistory;
use crate::task::TaskBinding;

/// Delay between two checks of a running agent while `stop` waits.
pub const STOP_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Decides when an agent runs.
///
/// `arm` is called under the agent's change lock when the agent starts and
/// must begin invoking [`Agent::run`] with `manual = false` from the
/// scheduler's own task. `disarm` stops further automatic executions without
/// interrupting one already in flight.
pub trait Scheduler: Send + Sync {
    fn arm(&self, agent: &Arc<Agent>) -> Result<()>;

    fn disarm(&self);

    /// Human-readable schedule, e.g. "30 second(s)".
    fn describe(&self) -> String;

    /// Next planned automatic execution, when the scheduler knows it.
    fn next_execution(&self) -> Option<DateTime<Local>> {
        None
    }
}

/// Point-in-time copy of an agent's mutable fields.
#[derive(Debug, Clone)]
pub struct AgentSnapshot {
    pub state: AgentState,
    pub previous_state: AgentState,
    pub start_date: Option<DateTime<Local>>,
    pub last_execution_date: Option<DateTime<Local>>,
    pub last_execution_duration: Option<Duration>,
    pub average_execution_duration: Duration,
    /// Runs retained for the average, capped at one day of minutely runs.
    pub history_len: usize,
    pub execution_count: u64,
    pub failure_count: u64,
}

struct StateCell {
    state: AgentState,
    previous_state: AgentState,
    start_date: Option<DateTime<Local>>,
    last_execution_date: Option<DateTime<Local>>,
    last_execution_duration: Option<Duration>,
    history: ExecutionHistory,
    execution_count: u64,
    failure_count: u64,
}

impl StateCell {
    fn is_started(&self) -> bool {
        self.state == AgentState::Started
            || (self.state == AgentState::Running && self.previous_state == AgentState::Started)
    }
}

/// One schedulable unit of recurring work plus its lifecycle state.
pub struct Agent {
    config: AgentConfiguration,
    task: TaskBinding,
    scheduler: Box<dyn Scheduler>,
    cell: Mutex<StateCell>,
    change_lock: tokio::sync::Mutex<()>,
    run_lock: Mutex<()>,
    stop_requested: AtomicBool,
}

impl Agent {
    pub fn new(
        config: AgentConfiguration,
        task: TaskBinding,
        scheduler: Box<dyn Scheduler>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            task,
            scheduler,
            cell: Mutex::new(StateCell {
                state: AgentState::Set,
                previous_state: AgentState::Set,
                start_date: None,
                last_execution_date: None,
                last_execution_duration: None,
                history: ExecutionHistory::new(),
                execution_count: 0,
                failure_count: 0,
            }),
            change_lock: tokio::sync::Mutex::new(()),
            run_lock: Mutex::new(()),
            stop_requested: AtomicBool::new(false),
        })
    }

    pub fn name(&self) -> &str {
        self.config.name()
    }

    pub fn kind(&self) -> &str {
        self.config.kind()
    }

    pub fn configuration(&self) -> &AgentConfiguration {
        &self.config
    }

    pub fn hidden(&self) -> bool {
        self.config.hidden()
    }

    pub fn state(&self) -> AgentState {
        self.cell().state
    }

    /// Started, or running an execution that began while started.
    pub fn is_started(&self) -> bool {
        self.cell().is_started()
    }

    pub fn is_running(&self) -> bool {
        self.cell().state == AgentState::Running
    }

    pub fn is_stopped(&self) -> bool {
        self.cell().state == AgentState::Stopped
    }

    pub fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    pub fn schedule_description(&self) -> String {
        self.scheduler.describe()
    }

    pub fn next_execution(&self) -> Option<DateTime<Local>> {
        self.scheduler.next_execution()
    }

    pub fn snapshot(&self) -> AgentSnapshot {
        let cell = self.cell();
        AgentSnapshot {
            state: cell.state,
            previous_state: cell.previous_state,
            start_date: cell.start_date,
            last_execution_date: cell.last_execution_date,
            last_execution_duration: cell.last_execution_duration,
            average_execution_duration: cell.history.average(),
            history_len: cell.history.len(),
            execution_count: cell.execution_count,
            failure_count: cell.failure_count,
        }
    }

    /// Arm the scheduler and move to `Started`.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        self.check_startable()?;
        let _change = self.change_lock.lock().await;
        self.check_startable()?;

        if let Err(e) = self.scheduler.arm(self) {
            error!(agent = %self.name(), error = %e, "failed to arm scheduler");
            self.cell().state = AgentState::Error;
            return Err(e);
        }

        self.stop_requested.store(false, Ordering::SeqCst);
        let mut cell = self.cell();
        if cell.state == AgentState::Running {
            // A manual run is in flight; it restores into the started state.
            cell.previous_state = AgentState::Started;
        } else {
            cell.state = AgentState::Started;
        }
        cell.start_date = Some(Local::now());
        info!(agent = %self.name(), schedule = %self.scheduler.describe(), "agent started");
        Ok(())
    }

    /// Disarm the scheduler and move to `Stopped`, waiting for an in-flight
    /// run up to the configured stop timeout.
    pub async fn stop(&self) -> Result<()> {
        self.stop_requested.store(true, Ordering::SeqCst);
        self.check_stoppable()?;
        let _change = self.change_lock.lock().await;
        self.check_stoppable()?;

        let timeout = self.config.stop_timeout_secs();
        let max_attempts = (timeout >= 0).then_some(timeout / 2);
        let mut attempts = 0;
        loop {
            {
                let mut cell = self.cell();
                if cell.state != AgentState::Running {
                    cell.state = AgentState::Stopped;
                    cell.start_date = None;
                    break;
                }
            }
            if max_attempts.is_some_and(|max| attempts >= max) {
                warn!(
                    agent = %self.name(),
                    timeout_secs = timeout,
                    "stop timed out waiting for run"
                );
                return Err(AgentError::Timeout {
                    name: self.name().to_string(),
                    secs: timeout,
                });
            }
            debug!(agent = %self.name(), attempt = attempts + 1, "waiting for in-flight run");
            tokio::time::sleep(STOP_POLL_INTERVAL).await;
            attempts += 1;
        }

        self.scheduler.disarm();
        info!(agent = %self.name(), "agent stopped");
        Ok(())
    }

    /// Execute the task once.
    ///
    /// Automatic executions (`manual = false`) are skipped once a stop was
    /// requested and are silent no-ops while another run is in flight. Manual
    /// executions bypass the stop request but fail with `AlreadyRunning`.
    /// Task errors and panics are logged, never returned.
    pub fn run(&self, manual: bool) -> Result<()> {
        if !manual && self.stop_requested() {
            debug!(agent = %self.name(), "stop requested, skipping scheduled run");
            return Ok(());
        }
        if self.is_running() {
            return self.reject_overlap(manual);
        }

        let _run = match self.run_lock.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(p)) => p.into_inner(),
            Err(TryLockError::WouldBlock) => return self.reject_overlap(manual),
        };

        {
            let mut cell = self.cell();
            if cell.state == AgentState::Running {
                return self.reject_overlap(manual);
            }
            cell.previous_state = cell.state;
            cell.state = AgentState::Running;
            cell.last_execution_date = Some(Local::now());
        }
        debug!(agent = %self.name(), manual, "run started");

        let started = Instant::now();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.task.invoke()));
        let elapsed = started.elapsed();

        let failed = match outcome {
            Ok(Ok(())) => false,
            Ok(Err(e)) => {
                let msg = format!("{e:#}");
                error!(
                    agent = %self.name(),
                    task = %self.task.task_ref(),
                    error = %msg,
                    "task failed"
                );
                true
            }
            Err(panic) => {
                let msg = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!(
                    agent = %self.name(),
                    task = %self.task.task_ref(),
                    panic = %msg,
                    "task panicked"
                );
                true
            }
        };

        let mut cell = self.cell();
        cell.last_execution_duration = Some(elapsed);
        cell.history.push(Some(elapsed));
        cell.execution_count += 1;
        if failed {
            cell.failure_count += 1;
        }
        cell.state = cell.previous_state;
        debug!(agent = %self.name(), duration_ms = elapsed.as_millis() as u64, "run finished");
        Ok(())
    }

    /// Entry point for scheduler tasks.
    pub(crate) fn run_scheduled(&self) {
        if let Err(e) = self.run(false) {
            warn!(agent = %self.name(), error = %e, "scheduled run rejected");
        }
    }

    fn reject_overlap(&self, manual: bool) -> Result<()> {
        if manual {
            return Err(AgentError::AlreadyRunning {
                name: self.name().to_string(),
            });
        }
        debug!(agent = %self.name(), "previous run still in progress, skipping");
        Ok(())
    }

    fn check_startable(&self) -> Result<()> {
        let cell = self.cell();
        if cell.is_started() {
            return Err(AgentError::AlreadyStarted {
                name: self.name().to_string(),
            });
        }
        if cell.state == AgentState::Stopped {
            return Err(AgentError::IllegalState {
                name: self.name().to_string(),
                reason: "stopped; reset required".to_string(),
            });
        }
        Ok(())
    }

    fn check_stoppable(&self) -> Result<()> {
        if self.cell().state == AgentState::Stopped {
            return Err(AgentError::AlreadyStopped {
                name: self.name().to_string(),
            });
        }
        Ok(())
    }

    fn cell(&self) -> MutexGuard<'_, StateCell> {
        self.cell.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("name", &self.name())
            .field("type", &self.kind())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
