use std::sync::{Arc, Mutex, PoisonError, Weak};

use chrono::{DateTime, Local};
use tickwork_core::AgentConfiguration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::agent::{Agent, Scheduler};
use crate::cron::CronExpression;
use crate::error::Result;
use crate::task::{TaskBinding, TaskResolver};

/// Fires an agent once per occurrence of a cron expression.
///
/// Not fixed-rate: the next occurrence is computed when the schedule is armed
/// and again right after every execution, whatever its outcome, and exactly
/// one execution is pending at a time.
pub struct CronScheduler {
    state: Arc<CronState>,
    shutdown: Mutex<Option<watch::Sender<bool>>>,
}

struct CronState {
    expression: CronExpression,
    next_execution: Mutex<Option<DateTime<Local>>>,
}

impl CronState {
    fn schedule_next_execution(&self) -> Option<DateTime<Local>> {
        self.schedule_after(Local::now())
    }

    /// Cache the first occurrence strictly after `from`.
    fn schedule_after(&self, from: DateTime<Local>) -> Option<DateTime<Local>> {
        let next = self.expression.next_after(&from);
        *self.next_slot() = next;
        next
    }

    fn clear(&self) {
        *self.next_slot() = None;
    }

    fn next_slot(&self) -> std::sync::MutexGuard<'_, Option<DateTime<Local>>> {
        self.next_execution
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl CronScheduler {
    pub fn new(expression: CronExpression) -> Self {
        Self {
            state: Arc::new(CronState {
                expression,
                next_execution: Mutex::new(None),
            }),
            shutdown: Mutex::new(None),
        }
    }

    pub fn expression(&self) -> &CronExpression {
        &self.state.expression
    }

    /// Compute and cache the next occurrence strictly after now.
    pub fn schedule_next_execution(&self) -> Option<DateTime<Local>> {
        self.state.schedule_next_execution()
    }
}

impl Scheduler for CronScheduler {
    fn arm(&self, agent: &Arc<Agent>) -> Result<()> {
        let (tx, rx) = watch::channel(false);
        if let Some(previous) = self
            .shutdown
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(tx)
        {
            let _ = previous.send(true);
        }

        let next = self.state.schedule_next_execution();
        info!(
            agent = %agent.name(),
            expression = %self.state.expression.expression(),
            next = ?next,
            "cron schedule armed"
        );
        tokio::spawn(fire_on_schedule(
            Arc::clone(&self.state),
            Arc::downgrade(agent),
            agent.name().to_string(),
            rx,
        ));
        Ok(())
    }

    fn disarm(&self) {
        if let Some(tx) = self
            .shutdown
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            let _ = tx.send(true);
        }
        self.state.clear();
    }

    fn describe(&self) -> String {
        self.state.expression.to_string()
    }

    fn next_execution(&self) -> Option<DateTime<Local>> {
        *self.state.next_slot()
    }
}

async fn fire_on_schedule(
    state: Arc<CronState>,
    agent: Weak<Agent>,
    name: String,
    mut shutdown: watch::Receiver<bool>,
) {
    // Last instant handed to the agent; a run that ends early, or a clock
    // running behind the timer, must not yield the same occurrence twice.
    let mut fired: Option<DateTime<Local>> = None;
    loop {
        let stopping = *shutdown.borrow();
        if stopping {
            break;
        }
        let from = fired.map_or_else(Local::now, |at| at.max(Local::now()));
        let Some(next) = state.schedule_after(from) else {
            warn!(
                agent = %name,
                expression = %state.expression.expression(),
                "cron expression has no future occurrence; no further executions"
            );
            let _ = shutdown.changed().await;
            break;
        };
        debug!(agent = %name, next = %next, "next cron execution scheduled");

        let delay = (next - Local::now()).to_std().unwrap_or_default();
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.changed() => break,
        }

        fired = Some(next);
        let Some(agent) = agent.upgrade() else { break };
        if let Err(e) = tokio::task::spawn_blocking(move || agent.run_scheduled()).await {
            warn!(agent = %name, error = %e, "scheduled cron run did not complete");
        }
    }
    state.clear();
    debug!(agent = %name, "cron schedule loop exited");
}

/// Agent constructor registered under the `cron` type.
pub fn build_cron_agent(
    config: AgentConfiguration,
    resolver: &dyn TaskResolver,
) -> Result<Arc<Agent>> {
    let expression = CronExpression::parse(config.schedule())?;
    let task = TaskBinding::bind(config.task(), resolver)?;
    Ok(Agent::new(config, task, Box::new(CronScheduler::new(expression))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike, Weekday};

    #[test]
    fn every_computation_is_strictly_in_the_future() {
        let scheduler = CronScheduler::new(CronExpression::parse("0 0 * * 0").unwrap());
        assert!(scheduler.next_execution().is_none());

        let before = Local::now();
        let first = scheduler.schedule_next_execution().unwrap();
        assert!(first > before);
        assert_eq!(first.weekday(), Weekday::Sun);
        assert_eq!((first.hour(), first.minute()), (0, 0));
        assert_eq!(scheduler.next_execution(), Some(first));

        let again = scheduler.schedule_next_execution().unwrap();
        assert!(again > Local::now());
        assert_eq!(again, first);
    }

    #[test]
    fn occurrence_after_a_fired_instant_is_the_following_one() {
        let scheduler = CronScheduler::new(CronExpression::parse("* * * * *").unwrap());
        let fired = scheduler.schedule_next_execution().unwrap();

        // The clock may read just before `fired` once the timer wakes.
        let next = scheduler.state.schedule_after(fired).unwrap();
        assert_eq!(next - fired, chrono::Duration::minutes(1));
        assert_eq!(scheduler.next_execution(), Some(next));

        let later = Local::now() + chrono::Duration::hours(3);
        let after_later = scheduler.state.schedule_after(later).unwrap();
        assert!(after_later > later);
        assert!(after_later - later <= chrono::Duration::minutes(1));
    }

    #[test]
    fn disarm_clears_cached_instant() {
        let scheduler = CronScheduler::new(CronExpression::parse("*/5 * * * *").unwrap());
        scheduler.schedule_next_execution();
        assert!(scheduler.next_execution().is_some());
        scheduler.disarm();
        assert!(scheduler.next_execution().is_none());
    }

    #[test]
    fn describe_includes_expression_and_text() {
        let scheduler = CronScheduler::new(CronExpression::parse("0 0 * * 0").unwrap());
        assert_eq!(scheduler.describe(), "0 0 * * 0 (at 00:00, on Sunday)");
    }
}
