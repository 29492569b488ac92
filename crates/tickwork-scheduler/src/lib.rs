//! `tickwork-scheduler`: in-process agent scheduler.
//!
//! # Overview
//!
//! An [`Agent`] wraps one bound task and a lifecycle state machine
//! (`SET` → `STARTED` ⇄ `RUNNING` → `STOPPED`). When it runs is decided by a
//! [`Scheduler`]; the [`AgentFactory`] picks one from the configuration's
//! `type`, and the [`AgentManager`] keeps the registry operators act on.
//!
//! # Agent types
//!
//! | Type    | Scheduler                | Schedule string                  |
//! |---------|--------------------------|----------------------------------|
//! | `timer` | `FixedIntervalScheduler` | `"30 seconds"`, `"5m"`, `"2 h"`  |
//! | `cron`  | `CronScheduler`          | 5-field unix cron, `"0 0 * * 0"` |

pub mod agent;
pub mod cron;
pub mod cron_scheduler;
pub mod error;
pub mod factory;
pub mod history;
pub mod interval;
pub mod manager;
pub mod provider;
pub mod report;
pub mod task;
pub mod timer;

pub use agent::{Agent, AgentSnapshot, Scheduler};
pub use cron::CronExpression;
pub use cron_scheduler::CronScheduler;
pub use error::{AgentError, ErrorKind, Result};
pub use factory::AgentFactory;
pub use interval::{TimeInterval, TimeUnit};
pub use manager::AgentManager;
pub use provider::{ConfigurationProvider, MergedConfigurationProvider};
pub use report::{AgentSummary, StatusReport};
pub use task::{
    CompositeTaskResolver, MarkedUnitResolver, NamedTaskResolver, Operation, Task, TaskBinding,
    TaskResolver, TaskUnit,
};
pub use timer::FixedIntervalScheduler;
