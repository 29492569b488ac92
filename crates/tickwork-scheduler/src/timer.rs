use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use chrono::{DateTime, Local, NaiveDateTime};
use tickwork_core::AgentConfiguration;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::agent::{Agent, Scheduler};
use crate::error::Result;
use crate::interval::{next_aligned_fire, to_local, TimeInterval};
use crate::task::{TaskBinding, TaskResolver};

/// Fires an agent at a fixed rate, with the first fire aligned to a clock
/// boundary of the interval's unit.
///
/// Each armed agent gets one dedicated tokio task. Fires hand the run to the
/// blocking pool without waiting for it, so a slow task never shifts the
/// cadence; overlapping fires become no-ops through the agent's running guard.
pub struct FixedIntervalScheduler {
    interval: TimeInterval,
    shutdown: Mutex<Option<watch::Sender<bool>>>,
    /// First fire of the current arming; later fires follow at fixed rate.
    anchor: Mutex<Option<NaiveDateTime>>,
}

impl FixedIntervalScheduler {
    pub fn new(interval: TimeInterval) -> Self {
        Self {
            interval,
            shutdown: Mutex::new(None),
            anchor: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> TimeInterval {
        self.interval
    }

    /// First fire instant for an agent armed at `now`.
    pub fn first_fire(&self, now: NaiveDateTime) -> NaiveDateTime {
        next_aligned_fire(now, self.interval)
    }

    /// Fire due after `now` for a schedule whose first fire was `anchor`.
    pub fn fire_after(&self, anchor: NaiveDateTime, now: NaiveDateTime) -> NaiveDateTime {
        if now < anchor {
            return anchor;
        }
        let period = self.interval.as_duration();
        let elapsed = (now - anchor).num_milliseconds() / period.num_milliseconds();
        anchor + period * (elapsed as i32 + 1)
    }

    fn anchor(&self) -> std::sync::MutexGuard<'_, Option<NaiveDateTime>> {
        self.anchor.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Scheduler for FixedIntervalScheduler {
    fn arm(&self, agent: &Arc<Agent>) -> Result<()> {
        let now = Local::now().naive_local();
        let first = self.first_fire(now);
        let delay = (first - now).to_std().unwrap_or_default();

        let (tx, rx) = watch::channel(false);
        if let Some(previous) = self
            .shutdown
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(tx)
        {
            let _ = previous.send(true);
        }
        *self.anchor() = Some(first);

        info!(
            agent = %agent.name(),
            first_fire = %first,
            every = %self.interval,
            "fixed-interval schedule armed"
        );
        tokio::spawn(fire_at_fixed_rate(
            Arc::downgrade(agent),
            tokio::time::Instant::now() + delay,
            self.interval.as_std(),
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
        *self.anchor() = None;
    }

    fn describe(&self) -> String {
        self.interval.describe()
    }

    fn next_execution(&self) -> Option<DateTime<Local>> {
        let anchor = (*self.anchor())?;
        Some(to_local(self.fire_after(anchor, Local::now().naive_local())))
    }
}

async fn fire_at_fixed_rate(
    agent: Weak<Agent>,
    start: tokio::time::Instant,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval_at(start, period);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let Some(agent) = agent.upgrade() else { break };
                tokio::task::spawn_blocking(move || agent.run_scheduled());
            }
            _ = shutdown.changed() => break,
        }
    }
    debug!("fixed-interval schedule loop exited");
}

/// Agent constructor registered under the `timer` type.
pub fn build_timer_agent(
    config: AgentConfiguration,
    resolver: &dyn TaskResolver,
) -> Result<Arc<Agent>> {
    let interval = TimeInterval::parse(config.schedule())?;
    let task = TaskBinding::bind(config.task(), resolver)?;
    Ok(Agent::new(
        config,
        task,
        Box::new(FixedIntervalScheduler::new(interval)),
    ))
}
